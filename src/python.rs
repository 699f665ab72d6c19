//! PyO3 bindings for the photon ensemble and the badpix output.

use ndarray::Array2;
use numpy::{AllowTypeChange, IntoPyArray, PyArray1, PyArray2, PyArrayLike1, PyReadonlyArray2};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::accumulator::{AccumulateError, BuildContext, StampAccumulator};
use crate::badpix::{self, MaskPixel};
use crate::bounds::Bounds;
use crate::image::{Image, ImageError};
use crate::photon_array::{Attribute, PhotonArray, PhotonError, PhotonInit};
use crate::registry::OutputConfig;

impl From<PhotonError> for PyErr {
    fn from(err: PhotonError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

impl From<ImageError> for PyErr {
    fn from(err: ImageError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

impl From<AccumulateError> for PyErr {
    fn from(err: AccumulateError) -> PyErr {
        PyRuntimeError::new_err(err.to_string())
    }
}

/// Anything numpy can turn into a 1-D float array: arrays of any numeric
/// dtype, lists, tuples.
type Values<'py> = PyArrayLike1<'py, f64, AllowTypeChange>;

fn to_vec(values: Option<Values<'_>>) -> Option<Vec<f64>> {
    values.map(|v| v.as_array().to_vec())
}

/// A collection of photons incident on a detector.
///
/// Attribute getters return a fresh numpy copy of the stored values;
/// assigning to the attribute writes back, so `pa.x += 1.0` and
/// `pa.flux = [...]` update the ensemble while `pa.x[0] = 1.0` only changes
/// the copy. Reading `dxdz`, `dydz` or `wavelength` allocates them
/// (zero-filled) if needed; use `hasAllocatedAngles()` and
/// `hasAllocatedWavelengths()` to check without allocating.
#[pyclass(name = "PhotonArray", module = "photonstamp.photon_array")]
pub struct PyPhotonArray {
    inner: PhotonArray,
}

impl PyPhotonArray {
    fn read<'py>(&mut self, py: Python<'py>, attribute: Attribute) -> Bound<'py, PyArray1<f64>> {
        self.inner
            .get_or_allocate(attribute)
            .to_owned()
            .into_pyarray(py)
    }

    fn assign(&mut self, attribute: Attribute, values: Values<'_>) -> PyResult<()> {
        let values = values.as_array().to_vec();
        self.inner.set(attribute, &values)?;
        Ok(())
    }
}

#[pymethods]
impl PyPhotonArray {
    #[new]
    #[pyo3(signature = (n, x=None, y=None, flux=None, dxdz=None, dydz=None, wavelength=None))]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        n: usize,
        x: Option<Values<'_>>,
        y: Option<Values<'_>>,
        flux: Option<Values<'_>>,
        dxdz: Option<Values<'_>>,
        dydz: Option<Values<'_>>,
        wavelength: Option<Values<'_>>,
    ) -> PyResult<Self> {
        let (x, y, flux) = (to_vec(x), to_vec(y), to_vec(flux));
        let (dxdz, dydz, wavelength) = (to_vec(dxdz), to_vec(dydz), to_vec(wavelength));
        let inner = PhotonArray::create(
            n,
            PhotonInit {
                x: x.as_deref(),
                y: y.as_deref(),
                flux: flux.as_deref(),
                dxdz: dxdz.as_deref(),
                dydz: dydz.as_deref(),
                wavelength: wavelength.as_deref(),
            },
        )?;
        Ok(Self { inner })
    }

    pub fn size(&self) -> usize {
        self.inner.size()
    }

    #[pyo3(name = "hasAllocatedAngles")]
    pub fn has_allocated_angles(&self) -> bool {
        self.inner.has_allocated_angles()
    }

    #[pyo3(name = "hasAllocatedWavelengths")]
    pub fn has_allocated_wavelengths(&self) -> bool {
        self.inner.has_allocated_wavelengths()
    }

    #[getter]
    fn x<'py>(&mut self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.read(py, Attribute::X)
    }

    #[setter]
    fn set_x(&mut self, values: Values<'_>) -> PyResult<()> {
        self.assign(Attribute::X, values)
    }

    #[getter]
    fn y<'py>(&mut self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.read(py, Attribute::Y)
    }

    #[setter]
    fn set_y(&mut self, values: Values<'_>) -> PyResult<()> {
        self.assign(Attribute::Y, values)
    }

    #[getter]
    fn flux<'py>(&mut self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.read(py, Attribute::Flux)
    }

    #[setter]
    fn set_flux(&mut self, values: Values<'_>) -> PyResult<()> {
        self.assign(Attribute::Flux, values)
    }

    #[getter]
    fn dxdz<'py>(&mut self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.read(py, Attribute::Dxdz)
    }

    #[setter]
    fn set_dxdz(&mut self, values: Values<'_>) -> PyResult<()> {
        self.assign(Attribute::Dxdz, values)
    }

    #[getter]
    fn dydz<'py>(&mut self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.read(py, Attribute::Dydz)
    }

    #[setter]
    fn set_dydz(&mut self, values: Values<'_>) -> PyResult<()> {
        self.assign(Attribute::Dydz, values)
    }

    #[getter]
    fn wavelength<'py>(&mut self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.read(py, Attribute::Wavelength)
    }

    #[setter]
    fn set_wavelength(&mut self, values: Values<'_>) -> PyResult<()> {
        self.assign(Attribute::Wavelength, values)
    }

    #[pyo3(name = "setPhoton")]
    pub fn set_photon(&mut self, i: usize, x: f64, y: f64, flux: f64) -> PyResult<()> {
        self.inner.set_photon(i, x, y, flux)?;
        Ok(())
    }

    #[pyo3(name = "getTotalFlux")]
    pub fn total_flux(&self) -> f64 {
        self.inner.total_flux()
    }

    #[pyo3(name = "scaleFlux")]
    pub fn scale_flux(&mut self, scale: f64) {
        self.inner.scale_flux(scale);
    }

    #[pyo3(name = "scaleXY")]
    pub fn scale_xy(&mut self, scale: f64) {
        self.inner.scale_xy(scale);
    }

    #[pyo3(name = "assignAt")]
    pub fn assign_at(&mut self, start: usize, other: PyRef<'_, Self>) -> PyResult<()> {
        self.inner.assign_at(start, &other.inner)?;
        Ok(())
    }

    pub fn convolve(&mut self, other: PyRef<'_, Self>) -> PyResult<()> {
        self.inner.convolve(&other.inner)?;
        Ok(())
    }

    fn __eq__(&self, other: &Bound<'_, PyAny>) -> bool {
        other
            .downcast::<Self>()
            .map(|o| o.borrow().inner == self.inner)
            .unwrap_or(false)
    }

    fn __repr__(&self) -> String {
        self.inner.repr()
    }

    fn __str__(&self) -> String {
        self.inner.to_string()
    }

    /// Constructor arguments for pickling. Unallocated optional arrays are
    /// passed as `None` so the copy has the same allocation state.
    #[allow(clippy::type_complexity)]
    fn __getnewargs__<'py>(
        &self,
        py: Python<'py>,
    ) -> (
        usize,
        Bound<'py, PyArray1<f64>>,
        Bound<'py, PyArray1<f64>>,
        Bound<'py, PyArray1<f64>>,
        Option<Bound<'py, PyArray1<f64>>>,
        Option<Bound<'py, PyArray1<f64>>>,
        Option<Bound<'py, PyArray1<f64>>>,
    ) {
        let snap = self.inner.snapshot();
        (
            snap.n,
            snap.x.into_pyarray(py),
            snap.y.into_pyarray(py),
            snap.flux.into_pyarray(py),
            snap.dxdz.map(|v| v.into_pyarray(py)),
            snap.dydz.map(|v| v.into_pyarray(py)),
            snap.wavelength.map(|v| v.into_pyarray(py)),
        )
    }
}

fn bounds_from_tuple((xmin, xmax, ymin, ymax): (i32, i32, i32, i32)) -> Bounds {
    Bounds::new(xmin, xmax, ymin, ymax)
}

/// Builds the badpix mask for a run, one hook call at a time.
#[pyclass(name = "BadPixBuilder", module = "photonstamp.badpix")]
pub struct PyBadPixBuilder {
    acc: StampAccumulator<MaskPixel>,
    config: OutputConfig,
}

impl Default for PyBadPixBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[pymethods]
impl PyBadPixBuilder {
    #[new]
    pub fn new() -> Self {
        Self {
            acc: StampAccumulator::new(badpix::OUTPUT_NAME),
            config: OutputConfig::default(),
        }
    }

    /// Stamp hook. `stamp_bounds` is `(xmin, xmax, ymin, ymax)`.
    pub fn process_stamp(
        &mut self,
        obj_num: usize,
        stamp_bounds: (i32, i32, i32, i32),
        accumulate_in_stamps: bool,
    ) -> PyResult<()> {
        let mut base = BuildContext::new(Bounds::undefined());
        base.accumulate_in_stamps = accumulate_in_stamps;
        base.current_stamp_bounds = bounds_from_tuple(stamp_bounds);
        badpix::process_stamp(&mut self.acc, None, &self.config, &base, obj_num)?;
        Ok(())
    }

    /// Record a precomputed mask stamp whose lower-left pixel is `(xmin, ymin)`.
    pub fn add_stamp(
        &mut self,
        obj_num: usize,
        xmin: i32,
        ymin: i32,
        values: PyReadonlyArray2<MaskPixel>,
    ) -> PyResult<()> {
        let values: Array2<MaskPixel> = values.as_array().to_owned();
        let (rows, cols) = values.dim();
        let bounds = Bounds::from_origin(xmin, ymin, rows, cols).ok_or_else(|| {
            PyValueError::new_err(format!(
                "a {rows}x{cols} stamp at ({xmin}, {ymin}) does not fit in pixel coordinates"
            ))
        })?;
        self.acc.insert_stamp(obj_num, Image::from_array(bounds, values)?);
        Ok(())
    }

    /// Image hook. `image_bounds` is `(xmin, xmax, ymin, ymax)`.
    pub fn process_image(
        &mut self,
        image_bounds: (i32, i32, i32, i32),
        image_num: usize,
        start_image_num: usize,
    ) -> PyResult<()> {
        let mut base = BuildContext::new(bounds_from_tuple(image_bounds));
        base.image_num = image_num;
        base.start_image_num = start_image_num;
        badpix::process_image(&mut self.acc, &self.config, &base)?;
        Ok(())
    }

    /// The single mask of the run; raises if there is not exactly one.
    pub fn hdu<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray2<MaskPixel>>> {
        let image = badpix::hdu(&self.acc)?;
        Ok(image.array().to_owned().into_pyarray(py))
    }

    pub fn images<'py>(&self, py: Python<'py>) -> Vec<Bound<'py, PyArray2<MaskPixel>>> {
        self.acc
            .images()
            .map(|im| im.array().to_owned().into_pyarray(py))
            .collect()
    }
}

/// Attach `submodule` to `py_module` and make it importable as
/// `parent.child`, which pickle needs to find the classes it holds.
fn add_importable_submodule(
    py_module: &Bound<'_, PyModule>,
    submodule: &Bound<'_, PyModule>,
) -> PyResult<()> {
    py_module.add_submodule(submodule)?;
    let qualified = format!("{}.{}", py_module.name()?, submodule.name()?);
    py_module
        .py()
        .import("sys")?
        .getattr("modules")?
        .set_item(qualified, submodule)?;
    Ok(())
}

pub(crate) fn register_photon_array_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "photon_array")?;
    submodule.add("__doc__", "Structure-of-arrays photon ensembles.")?;
    submodule.add_class::<PyPhotonArray>()?;
    add_importable_submodule(py_module, &submodule)
}

pub(crate) fn register_badpix_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "badpix")?;
    submodule.add("__doc__", "Bad-pixel mask accumulation.")?;
    submodule.add_class::<PyBadPixBuilder>()?;
    add_importable_submodule(py_module, &submodule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyo3::ffi::c_str;
    use pyo3::types::PyDict;

    fn with_package<F>(body: F)
    where
        F: for<'py> FnOnce(Python<'py>, &Bound<'py, PyDict>) -> PyResult<()>,
    {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let package = PyModule::new(py, "photonstamp")?;
            register_photon_array_module(&package)?;
            register_badpix_module(&package)?;
            py.import("sys")?
                .getattr("modules")?
                .set_item("photonstamp", &package)?;
            let locals = PyDict::new(py);
            body(py, &locals)
        })
        .unwrap();
    }

    #[test]
    fn test_constructor_accepts_lists_and_int_arrays() {
        with_package(|py, locals| {
            py.run(
                c_str!(
                    r#"
import numpy as np
from photonstamp.photon_array import PhotonArray
pa = PhotonArray(3, x=[1, 2, 3], y=np.arange(3), flux=(1.0, 1.0, 2.0))
assert list(pa.y) == [0.0, 1.0, 2.0]
pa.wavelength = [500, 600, 700]
assert pa.hasAllocatedWavelengths()
assert pa.getTotalFlux() == 4.0
"#
                ),
                None,
                Some(locals),
            )
        });
    }

    #[test]
    fn test_getters_copy_and_setters_write_back() {
        with_package(|py, locals| {
            py.run(
                c_str!(
                    r#"
from photonstamp.photon_array import PhotonArray
pa = PhotonArray(2, x=[1.0, 2.0])
xs = pa.x
pa.scaleXY(2.0)
assert list(xs) == [1.0, 2.0]
pa.x += 1.0
assert list(pa.x) == [3.0, 5.0]
assert not pa.hasAllocatedAngles()
assert list(pa.dydz) == [0.0, 0.0]
assert pa.hasAllocatedAngles()
"#
                ),
                None,
                Some(locals),
            )
        });
    }

    #[test]
    fn test_pickle_keeps_allocation_state() {
        with_package(|py, locals| {
            py.run(
                c_str!(
                    r#"
import pickle
import photonstamp.photon_array
from photonstamp.photon_array import PhotonArray
pa = PhotonArray(2, x=[1.0, 2.0], flux=[3.0, 4.0], dxdz=[0.5, -0.5])
copy = pickle.loads(pickle.dumps(pa))
assert copy == pa
assert copy.hasAllocatedAngles()
assert not copy.hasAllocatedWavelengths()
"#
                ),
                None,
                Some(locals),
            )
        });
    }

    #[test]
    fn test_add_stamp_rejects_overflowing_origin() {
        with_package(|py, locals| {
            py.run(
                c_str!(
                    r#"
import numpy as np
from photonstamp.badpix import BadPixBuilder
b = BadPixBuilder()
try:
    b.add_stamp(0, 2147483647, 0, np.zeros((1, 2), dtype=np.int16))
except ValueError:
    pass
else:
    raise AssertionError("stamp past the coordinate range was accepted")
b.add_stamp(1, 0, 0, np.ones((2, 2), dtype=np.int16))
b.process_image((0, 3, 0, 3), 0, 0)
assert int(b.hdu().sum()) == 4
"#
                ),
                None,
                Some(locals),
            )
        });
    }
}
