//! Structure-of-arrays photon ensemble.
//!
//! `x`, `y` and `flux` are always allocated. The angle pair (`dxdz`, `dydz`)
//! and `wavelength` are only allocated when something writes to them; once
//! allocated they stay allocated. The size `N` is fixed at construction.
//!
//! Flux conventions: unit photons carry flux 1, "fat" photons carry the
//! combined flux of several, negative flux is legal (interpolated profiles use
//! it), and a removed photon is marked by flux 0 rather than by shrinking the
//! arrays.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, ArrayView1, ArrayViewMut1, Zip};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image::Image;

/// Names of the per-photon attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    X,
    Y,
    Flux,
    Dxdz,
    Dydz,
    Wavelength,
}

impl Attribute {
    pub const ALL: [Attribute; 6] = [
        Attribute::X,
        Attribute::Y,
        Attribute::Flux,
        Attribute::Dxdz,
        Attribute::Dydz,
        Attribute::Wavelength,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Attribute::X => "x",
            Attribute::Y => "y",
            Attribute::Flux => "flux",
            Attribute::Dxdz => "dxdz",
            Attribute::Dydz => "dydz",
            Attribute::Wavelength => "wavelength",
        }
    }

    /// True for attributes whose storage is allocated on first write.
    pub fn is_lazy(self) -> bool {
        matches!(self, Attribute::Dxdz | Attribute::Dydz | Attribute::Wavelength)
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhotonError {
    #[error("{attribute} has length {got}, expected {expected}")]
    Shape {
        attribute: Attribute,
        expected: usize,
        got: usize,
    },
    #[error("photon index {index} out of range for size {size}")]
    Index { index: usize, size: usize },
    #[error("cannot place {len} photons at offset {start} in an array of size {size}")]
    Range { start: usize, len: usize, size: usize },
    #[error("both photon arrays have {0} allocated")]
    Conflict(Attribute),
    #[error("cannot parse photon array: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Angles {
    dxdz: Array1<f64>,
    dydz: Array1<f64>,
}

impl Angles {
    fn zeros(n: usize) -> Self {
        Self {
            dxdz: Array1::zeros(n),
            dydz: Array1::zeros(n),
        }
    }
}

/// Optional initial values for `PhotonArray::create`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhotonInit<'a> {
    pub x: Option<&'a [f64]>,
    pub y: Option<&'a [f64]>,
    pub flux: Option<&'a [f64]>,
    pub dxdz: Option<&'a [f64]>,
    pub dydz: Option<&'a [f64]>,
    pub wavelength: Option<&'a [f64]>,
}

/// A fixed-size, mutable batch of photons.
///
/// Equality compares allocation state as well as contents: an ensemble with
/// all-zero angles allocated is not equal to one without angles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "PhotonArraySnapshot", try_from = "PhotonArraySnapshot")]
pub struct PhotonArray {
    x: Array1<f64>,
    y: Array1<f64>,
    flux: Array1<f64>,
    angles: Option<Angles>,
    wavelength: Option<Array1<f64>>,
}

impl PhotonArray {
    /// Ensemble of `n` photons with zeroed position and flux and no optional
    /// arrays.
    pub fn new(n: usize) -> Self {
        Self {
            x: Array1::zeros(n),
            y: Array1::zeros(n),
            flux: Array1::zeros(n),
            angles: None,
            wavelength: None,
        }
    }

    /// Ensemble of `n` photons initialised from whichever values are given.
    ///
    /// Optional arrays are allocated only when a value is supplied for them.
    /// Supplying either of `dxdz`/`dydz` allocates both.
    pub fn create(n: usize, init: PhotonInit<'_>) -> Result<Self, PhotonError> {
        let mut photons = Self::new(n);
        let fields = [
            (Attribute::X, init.x),
            (Attribute::Y, init.y),
            (Attribute::Flux, init.flux),
            (Attribute::Dxdz, init.dxdz),
            (Attribute::Dydz, init.dydz),
            (Attribute::Wavelength, init.wavelength),
        ];
        for (attribute, values) in fields {
            if let Some(values) = values {
                photons.set(attribute, values)?;
            }
        }
        Ok(photons)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.x.len()
    }

    pub fn has_allocated_angles(&self) -> bool {
        self.angles.is_some()
    }

    pub fn has_allocated_wavelengths(&self) -> bool {
        self.wavelength.is_some()
    }

    /// Whether storage exists for `attribute`. Never allocates.
    pub fn has_allocated(&self, attribute: Attribute) -> bool {
        match attribute {
            Attribute::X | Attribute::Y | Attribute::Flux => true,
            Attribute::Dxdz | Attribute::Dydz => self.has_allocated_angles(),
            Attribute::Wavelength => self.has_allocated_wavelengths(),
        }
    }

    /// Angle storage, zero-filled on first use.
    fn angles_or_allocate(&mut self) -> &mut Angles {
        let n = self.size();
        self.angles.get_or_insert_with(|| {
            log::trace!("allocating angle arrays for {n} photons");
            Angles::zeros(n)
        })
    }

    /// Wavelength storage, zero-filled on first use.
    fn wavelength_or_allocate(&mut self) -> &mut Array1<f64> {
        let n = self.size();
        self.wavelength.get_or_insert_with(|| {
            log::trace!("allocating wavelength array for {n} photons");
            Array1::zeros(n)
        })
    }

    /// Read-only view of `attribute`, `None` if it has not been allocated.
    pub fn get(&self, attribute: Attribute) -> Option<ArrayView1<'_, f64>> {
        match attribute {
            Attribute::X => Some(self.x.view()),
            Attribute::Y => Some(self.y.view()),
            Attribute::Flux => Some(self.flux.view()),
            Attribute::Dxdz => self.angles.as_ref().map(|a| a.dxdz.view()),
            Attribute::Dydz => self.angles.as_ref().map(|a| a.dydz.view()),
            Attribute::Wavelength => self.wavelength.as_ref().map(|w| w.view()),
        }
    }

    /// Mutable view of `attribute`, allocating it if needed.
    pub fn get_or_allocate(&mut self, attribute: Attribute) -> ArrayViewMut1<'_, f64> {
        match attribute {
            Attribute::X => self.x.view_mut(),
            Attribute::Y => self.y.view_mut(),
            Attribute::Flux => self.flux.view_mut(),
            Attribute::Dxdz => self.angles_or_allocate().dxdz.view_mut(),
            Attribute::Dydz => self.angles_or_allocate().dydz.view_mut(),
            Attribute::Wavelength => self.wavelength_or_allocate().view_mut(),
        }
    }

    /// Overwrite every element of `attribute` with `values`.
    ///
    /// The length is checked before any allocation happens, so a failed
    /// assignment leaves the allocation state unchanged.
    pub fn set(&mut self, attribute: Attribute, values: &[f64]) -> Result<(), PhotonError> {
        if values.len() != self.size() {
            return Err(PhotonError::Shape {
                attribute,
                expected: self.size(),
                got: values.len(),
            });
        }
        self.get_or_allocate(attribute)
            .assign(&ArrayView1::from(values));
        Ok(())
    }

    pub fn x(&self) -> ArrayView1<'_, f64> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    pub fn flux(&self) -> ArrayView1<'_, f64> {
        self.flux.view()
    }

    pub fn dxdz(&self) -> Option<ArrayView1<'_, f64>> {
        self.get(Attribute::Dxdz)
    }

    pub fn dydz(&self) -> Option<ArrayView1<'_, f64>> {
        self.get(Attribute::Dydz)
    }

    pub fn wavelength(&self) -> Option<ArrayView1<'_, f64>> {
        self.get(Attribute::Wavelength)
    }

    pub fn x_mut(&mut self) -> ArrayViewMut1<'_, f64> {
        self.x.view_mut()
    }

    pub fn y_mut(&mut self) -> ArrayViewMut1<'_, f64> {
        self.y.view_mut()
    }

    pub fn flux_mut(&mut self) -> ArrayViewMut1<'_, f64> {
        self.flux.view_mut()
    }

    pub fn dxdz_mut(&mut self) -> ArrayViewMut1<'_, f64> {
        self.get_or_allocate(Attribute::Dxdz)
    }

    pub fn dydz_mut(&mut self) -> ArrayViewMut1<'_, f64> {
        self.get_or_allocate(Attribute::Dydz)
    }

    /// Both angle arrays at once, allocating them if needed.
    pub fn angles_mut(&mut self) -> (ArrayViewMut1<'_, f64>, ArrayViewMut1<'_, f64>) {
        let angles = self.angles_or_allocate();
        (angles.dxdz.view_mut(), angles.dydz.view_mut())
    }

    pub fn wavelength_mut(&mut self) -> ArrayViewMut1<'_, f64> {
        self.get_or_allocate(Attribute::Wavelength)
    }

    pub fn set_x(&mut self, values: &[f64]) -> Result<(), PhotonError> {
        self.set(Attribute::X, values)
    }

    pub fn set_y(&mut self, values: &[f64]) -> Result<(), PhotonError> {
        self.set(Attribute::Y, values)
    }

    pub fn set_flux(&mut self, values: &[f64]) -> Result<(), PhotonError> {
        self.set(Attribute::Flux, values)
    }

    pub fn set_dxdz(&mut self, values: &[f64]) -> Result<(), PhotonError> {
        self.set(Attribute::Dxdz, values)
    }

    pub fn set_dydz(&mut self, values: &[f64]) -> Result<(), PhotonError> {
        self.set(Attribute::Dydz, values)
    }

    pub fn set_wavelength(&mut self, values: &[f64]) -> Result<(), PhotonError> {
        self.set(Attribute::Wavelength, values)
    }

    /// Set position and flux of photon `i`.
    pub fn set_photon(&mut self, i: usize, x: f64, y: f64, flux: f64) -> Result<(), PhotonError> {
        if i >= self.size() {
            return Err(PhotonError::Index {
                index: i,
                size: self.size(),
            });
        }
        self.x[i] = x;
        self.y[i] = y;
        self.flux[i] = flux;
        Ok(())
    }

    pub fn total_flux(&self) -> f64 {
        self.flux.sum()
    }

    pub fn scale_flux(&mut self, scale: f64) {
        self.flux *= scale;
    }

    pub fn scale_xy(&mut self, scale: f64) {
        self.x *= scale;
        self.y *= scale;
    }

    /// Copy `other` into positions `start..start + other.size()`.
    ///
    /// Optional arrays present on `other` are allocated here if needed.
    pub fn assign_at(&mut self, start: usize, other: &PhotonArray) -> Result<(), PhotonError> {
        let len = other.size();
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.size())
            .ok_or(PhotonError::Range {
                start,
                len,
                size: self.size(),
            })?;
        let range = start..end;
        self.x.slice_mut(ndarray::s![range.clone()]).assign(&other.x);
        self.y.slice_mut(ndarray::s![range.clone()]).assign(&other.y);
        self.flux.slice_mut(ndarray::s![range.clone()]).assign(&other.flux);
        if let Some(src) = &other.angles {
            let dst = self.angles_or_allocate();
            dst.dxdz.slice_mut(ndarray::s![range.clone()]).assign(&src.dxdz);
            dst.dydz.slice_mut(ndarray::s![range.clone()]).assign(&src.dydz);
        }
        if let Some(src) = &other.wavelength {
            self.wavelength_or_allocate()
                .slice_mut(ndarray::s![range])
                .assign(src);
        }
        Ok(())
    }

    /// Convolve with another ensemble of the same size by adding positions
    /// photon-by-photon. Flux becomes `flux * other.flux * N` so the total
    /// flux of the result is the product of the two totals.
    ///
    /// Angle or wavelength arrays are taken from `other` when only `other`
    /// has them; having them on both sides is an error.
    pub fn convolve(&mut self, other: &PhotonArray) -> Result<(), PhotonError> {
        let n = self.size();
        if other.size() != n {
            return Err(PhotonError::Shape {
                attribute: Attribute::X,
                expected: n,
                got: other.size(),
            });
        }
        if self.angles.is_some() && other.angles.is_some() {
            return Err(PhotonError::Conflict(Attribute::Dxdz));
        }
        if self.wavelength.is_some() && other.wavelength.is_some() {
            return Err(PhotonError::Conflict(Attribute::Wavelength));
        }
        if let Some(angles) = &other.angles {
            self.angles = Some(angles.clone());
        }
        if let Some(wavelength) = &other.wavelength {
            self.wavelength = Some(wavelength.clone());
        }
        let n = n as f64;
        Zip::from(&mut self.x)
            .and(&mut self.y)
            .and(&mut self.flux)
            .and(&other.x)
            .and(&other.y)
            .and(&other.flux)
            .for_each(|x, y, f, &ox, &oy, &of| {
                *x += ox;
                *y += oy;
                *f *= of * n;
            });
        Ok(())
    }

    /// Add each photon's flux to the pixel that contains it.
    ///
    /// Pixel centres sit on integer coordinates, so a photon at `x` lands in
    /// column `floor(x + 0.5)`. Photons outside the image are skipped.
    /// Returns the flux that was actually added.
    pub fn add_to(&self, image: &mut Image<f64>) -> f64 {
        let bounds = image.bounds();
        let mut added = 0.0;
        let mut skipped = 0usize;
        for ((&x, &y), &flux) in self.x.iter().zip(self.y.iter()).zip(self.flux.iter()) {
            let ix = (x + 0.5).floor();
            let iy = (y + 0.5).floor();
            let inside = ix >= bounds.xmin as f64
                && ix <= bounds.xmax as f64
                && iy >= bounds.ymin as f64
                && iy <= bounds.ymax as f64;
            match image.get_mut(ix as i32, iy as i32) {
                Some(pixel) if inside => {
                    *pixel += flux;
                    added += flux;
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            log::trace!("{skipped} photons fell outside {bounds:?}");
        }
        added
    }

    /// Value-level copy from which an equal ensemble can be rebuilt.
    pub fn snapshot(&self) -> PhotonArraySnapshot {
        PhotonArraySnapshot {
            n: self.size(),
            x: self.x.to_vec(),
            y: self.y.to_vec(),
            flux: self.flux.to_vec(),
            dxdz: self.angles.as_ref().map(|a| a.dxdz.to_vec()),
            dydz: self.angles.as_ref().map(|a| a.dydz.to_vec()),
            wavelength: self.wavelength.as_ref().map(|w| w.to_vec()),
        }
    }

    pub fn from_snapshot(snapshot: &PhotonArraySnapshot) -> Result<Self, PhotonError> {
        Self::create(
            snapshot.n,
            PhotonInit {
                x: Some(&snapshot.x),
                y: Some(&snapshot.y),
                flux: Some(&snapshot.flux),
                dxdz: snapshot.dxdz.as_deref(),
                dydz: snapshot.dydz.as_deref(),
                wavelength: snapshot.wavelength.as_deref(),
            },
        )
    }

    /// Verbose text form listing every allocated array. `str::parse` turns it
    /// back into an equal ensemble.
    pub fn repr(&self) -> String {
        let mut s = format!(
            "PhotonArray({}, x={}, y={}, flux={}",
            self.size(),
            format_values(self.x.view()),
            format_values(self.y.view()),
            format_values(self.flux.view()),
        );
        if let Some(angles) = &self.angles {
            s.push_str(&format!(
                ", dxdz={}, dydz={}",
                format_values(angles.dxdz.view()),
                format_values(angles.dydz.view())
            ));
        }
        if let Some(wavelength) = &self.wavelength {
            s.push_str(&format!(", wavelength={}", format_values(wavelength.view())));
        }
        s.push(')');
        s
    }
}

fn format_values(values: ArrayView1<f64>) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v:?}")).collect();
    format!("[{}]", parts.join(", "))
}

fn parse_values(list: &str) -> Result<Vec<f64>, PhotonError> {
    if list.trim().is_empty() {
        return Ok(Vec::new());
    }
    list.split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| PhotonError::Parse(format!("bad value {v:?}: {e}")))
        })
        .collect()
}

impl fmt::Display for PhotonArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhotonArray({})", self.size())
    }
}

impl FromStr for PhotonArray {
    type Err = PhotonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .trim()
            .strip_prefix("PhotonArray(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| {
                PhotonError::Parse(format!("expected `PhotonArray(n, name=[v, ...], ...)`, got {s:?}"))
            })?;
        let (n_str, mut rest) = body.split_once(',').unwrap_or((body, ""));
        let n: usize = n_str
            .trim()
            .parse()
            .map_err(|e| PhotonError::Parse(format!("bad size {n_str:?}: {e}")))?;

        let mut fields: Vec<(Attribute, Vec<f64>)> = Vec::new();
        loop {
            rest = rest.trim_start_matches([',', ' ']);
            if rest.is_empty() {
                break;
            }
            let (name, tail) = rest.split_once("=[").ok_or_else(|| {
                PhotonError::Parse(format!("expected `name=[v, ...]` at {rest:?}"))
            })?;
            let attribute = Attribute::from_name(name.trim())
                .ok_or_else(|| PhotonError::Parse(format!("unknown attribute {name:?}")))?;
            let (list, tail) = tail
                .split_once(']')
                .ok_or_else(|| PhotonError::Parse(format!("unterminated {name} list, expected `]`")))?;
            if list.contains('[') {
                return Err(PhotonError::Parse(format!(
                    "nested brackets in {name} list, expected `{name}=[v, ...]`"
                )));
            }
            fields.push((attribute, parse_values(list)?));
            rest = tail;
        }

        let mut photons = PhotonArray::new(n);
        for (attribute, values) in &fields {
            photons.set(*attribute, values)?;
        }
        Ok(photons)
    }
}

/// Serializable form of a `PhotonArray`. Optional arrays are `None` exactly
/// when they were not allocated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotonArraySnapshot {
    pub n: usize,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub flux: Vec<f64>,
    pub dxdz: Option<Vec<f64>>,
    pub dydz: Option<Vec<f64>>,
    pub wavelength: Option<Vec<f64>>,
}

impl From<PhotonArray> for PhotonArraySnapshot {
    fn from(photons: PhotonArray) -> Self {
        photons.snapshot()
    }
}

impl TryFrom<PhotonArraySnapshot> for PhotonArray {
    type Error = PhotonError;

    fn try_from(snapshot: PhotonArraySnapshot) -> Result<Self, Self::Error> {
        PhotonArray::from_snapshot(&snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Bounds;

    fn sample() -> PhotonArray {
        PhotonArray::create(
            2,
            PhotonInit {
                x: Some(&[1.0, 2.0]),
                y: Some(&[3.0, 4.0]),
                flux: Some(&[5.0, -1.0]),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_new_sizes_and_zeroes() {
        for n in [0, 1, 17] {
            let p = PhotonArray::new(n);
            assert_eq!(p.size(), n);
            assert_eq!(p.x().len(), n);
            assert!(p.flux().iter().all(|&f| f == 0.0));
            assert!(!p.has_allocated_angles());
            assert!(!p.has_allocated_wavelengths());
        }
    }

    #[test]
    fn test_create_rejects_wrong_length() {
        let err = PhotonArray::create(
            3,
            PhotonInit {
                y: Some(&[1.0, 2.0]),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            PhotonError::Shape {
                attribute: Attribute::Y,
                expected: 3,
                got: 2
            }
        );
    }

    #[test]
    fn test_queries_do_not_allocate() {
        let mut p = sample();
        assert!(p.dxdz().is_none());
        assert!(!p.has_allocated(Attribute::Dydz));
        p.x_mut()[0] = 9.0;
        let _ = p.flux();
        assert!(!p.has_allocated_angles());
        assert!(!p.has_allocated_wavelengths());
    }

    #[test]
    fn test_setting_dxdz_allocates_both_angles() {
        let mut p = sample();
        p.set_dxdz(&[0.1, 0.2]).unwrap();
        assert!(p.has_allocated_angles());
        assert!(!p.has_allocated_wavelengths());
        assert_eq!(p.dydz().unwrap().to_vec(), vec![0.0, 0.0]);
        assert_eq!(p.dxdz().unwrap().to_vec(), vec![0.1, 0.2]);
    }

    #[test]
    fn test_failed_set_does_not_allocate() {
        let mut p = sample();
        assert!(p.set_wavelength(&[500.0]).is_err());
        assert!(!p.has_allocated_wavelengths());
    }

    #[test]
    fn test_mut_access_allocates_and_persists() {
        let mut p = sample();
        {
            let mut w = p.wavelength_mut();
            w[1] = 650.0;
        }
        assert!(p.has_allocated_wavelengths());
        assert_eq!(p.wavelength().unwrap().to_vec(), vec![0.0, 650.0]);
        p.set_flux(&[0.0, 0.0]).unwrap();
        assert!(p.has_allocated_wavelengths());
    }

    #[test]
    fn test_equality_tracks_allocation_state() {
        let with_wl = PhotonArray::create(
            3,
            PhotonInit {
                wavelength: Some(&[1.0, 2.0, 3.0]),
                ..Default::default()
            },
        )
        .unwrap();
        let mut plain = PhotonArray::new(3);
        assert_ne!(with_wl, plain);
        assert_ne!(plain, with_wl);

        let zero_angles = PhotonArray::create(
            3,
            PhotonInit {
                dxdz: Some(&[0.0; 3]),
                ..Default::default()
            },
        )
        .unwrap();
        assert_ne!(zero_angles, PhotonArray::new(3));

        let _ = plain.wavelength_mut();
        assert_ne!(with_wl, plain);
        plain.set_wavelength(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(with_wl, plain);
        assert_eq!(plain, plain.clone());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut cases = vec![PhotonArray::new(0), sample()];
        let mut angles = sample();
        angles.set_dydz(&[0.5, -0.5]).unwrap();
        cases.push(angles.clone());
        let mut all = angles;
        all.set_wavelength(&[400.0, 700.0]).unwrap();
        cases.push(all);

        for p in cases {
            let snap = p.snapshot();
            assert_eq!(snap.dxdz.is_some(), p.has_allocated_angles());
            assert_eq!(PhotonArray::from_snapshot(&snap).unwrap(), p);

            let json = serde_json::to_string(&p).unwrap();
            let back: PhotonArray = serde_json::from_str(&json).unwrap();
            assert_eq!(back, p);
        }
    }

    #[test]
    fn test_deserialize_checks_lengths() {
        let json = r#"{"n":2,"x":[1.0],"y":[0.0,0.0],"flux":[0.0,0.0],"dxdz":null,"dydz":null,"wavelength":null}"#;
        assert!(serde_json::from_str::<PhotonArray>(json).is_err());
    }

    #[test]
    fn test_text_forms() {
        let mut p = sample();
        assert_eq!(p.to_string(), "PhotonArray(2)");
        assert_eq!(
            p.repr(),
            "PhotonArray(2, x=[1.0, 2.0], y=[3.0, 4.0], flux=[5.0, -1.0])"
        );
        p.set_dxdz(&[0.1, 0.2]).unwrap();
        p.set_wavelength(&[500.5, 1e-7]).unwrap();
        let parsed: PhotonArray = p.repr().parse().unwrap();
        assert_eq!(parsed, p);

        let empty: PhotonArray = PhotonArray::new(0).repr().parse().unwrap();
        assert_eq!(empty, PhotonArray::new(0));
        assert!("PhotonArray(2, z=[1.0, 2.0])".parse::<PhotonArray>().is_err());
    }

    #[test]
    fn test_set_photon_and_flux_ops() {
        let mut p = PhotonArray::new(4);
        for i in 0..4 {
            p.set_photon(i, i as f64, -(i as f64), 0.25).unwrap();
        }
        assert!(matches!(
            p.set_photon(4, 0.0, 0.0, 1.0),
            Err(PhotonError::Index { index: 4, size: 4 })
        ));
        assert_eq!(p.total_flux(), 1.0);
        p.scale_flux(8.0);
        assert_eq!(p.total_flux(), 8.0);
        p.scale_xy(2.0);
        assert_eq!(p.x().to_vec(), vec![0.0, 2.0, 4.0, 6.0]);
        assert_eq!(p.y()[3], -6.0);
    }

    #[test]
    fn test_assign_at_copies_optional_arrays() {
        let mut big = PhotonArray::new(4);
        let mut small = sample();
        small.set_wavelength(&[450.0, 550.0]).unwrap();
        big.assign_at(2, &small).unwrap();
        assert_eq!(big.x().to_vec(), vec![0.0, 0.0, 1.0, 2.0]);
        assert_eq!(big.wavelength().unwrap().to_vec(), vec![0.0, 0.0, 450.0, 550.0]);
        assert!(!big.has_allocated_angles());
        assert!(matches!(
            big.assign_at(3, &small),
            Err(PhotonError::Range { .. })
        ));
    }

    #[test]
    fn test_assign_at_huge_start_is_range_error() {
        let mut p = PhotonArray::new(4);
        assert!(matches!(
            p.assign_at(usize::MAX, &PhotonArray::new(2)),
            Err(PhotonError::Range {
                start: usize::MAX,
                len: 2,
                size: 4
            })
        ));
        assert_eq!(p, PhotonArray::new(4));
    }

    #[test]
    fn test_parse_errors_name_expected_form() {
        let message = |s: &str| match s.parse::<PhotonArray>() {
            Err(PhotonError::Parse(msg)) => msg,
            other => panic!("expected a parse error for {s:?}, got {other:?}"),
        };
        assert!(message("Photons(2)").contains("PhotonArray(n, name=[v, ...], ...)"));
        assert!(message("PhotonArray(2, x=1.0)").contains("name=[v, ...]"));
        assert!(message("PhotonArray(2, x=[[1.0], 2.0])").contains("nested brackets"));
        assert!(message("PhotonArray(2, x=[1.0, 2.0)").contains("expected `]`"));
    }

    #[test]
    fn test_convolve() {
        let mut a = sample();
        let mut b = PhotonArray::create(
            2,
            PhotonInit {
                x: Some(&[0.5, 0.5]),
                y: Some(&[-1.0, 1.0]),
                flux: Some(&[0.5, 0.5]),
                ..Default::default()
            },
        )
        .unwrap();
        b.set_dxdz(&[0.1, 0.1]).unwrap();
        a.convolve(&b).unwrap();
        assert_eq!(a.x().to_vec(), vec![1.5, 2.5]);
        assert_eq!(a.y().to_vec(), vec![2.0, 5.0]);
        assert_eq!(a.flux().to_vec(), vec![5.0, -1.0]);
        assert!(a.has_allocated_angles());
        assert_eq!(a.convolve(&b), Err(PhotonError::Conflict(Attribute::Dxdz)));
        assert!(a.convolve(&PhotonArray::new(3)).is_err());
    }

    #[test]
    fn test_add_to_image() {
        let p = PhotonArray::create(
            4,
            PhotonInit {
                x: Some(&[0.0, 0.49, 1.5, 10.0]),
                y: Some(&[0.0, 0.2, 1.0, 0.0]),
                flux: Some(&[1.0, 2.0, -0.5, 4.0]),
                ..Default::default()
            },
        )
        .unwrap();
        let mut im = Image::new(Bounds::new(0, 2, 0, 2), 0.0);
        let added = p.add_to(&mut im);
        assert_eq!(added, 2.5);
        assert_eq!(im.get(0, 0), Some(&3.0));
        assert_eq!(im.get(2, 1), Some(&-0.5));
    }
}
