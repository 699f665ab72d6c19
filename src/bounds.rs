//! Inclusive integer pixel bounds.
//!
//! A `Bounds` covers every pixel `(x, y)` with `xmin <= x <= xmax` and
//! `ymin <= y <= ymax`. An undefined bounds covers nothing; it is what an
//! intersection of two disjoint rectangles produces.

use std::ops::BitAnd;

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle of pixels, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub xmin: i32,
    pub xmax: i32,
    pub ymin: i32,
    pub ymax: i32,
}

impl Bounds {
    /// Build bounds from corner coordinates. Returns undefined bounds when
    /// the maximum is smaller than the minimum on either axis.
    pub fn new(xmin: i32, xmax: i32, ymin: i32, ymax: i32) -> Self {
        if xmax < xmin || ymax < ymin {
            return Self::undefined();
        }
        Self {
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    /// Bounds of a `rows x cols` grid whose lower-left pixel is `(xmin, ymin)`.
    /// `None` when the far edge falls outside the `i32` coordinate range.
    pub fn from_origin(xmin: i32, ymin: i32, rows: usize, cols: usize) -> Option<Self> {
        let far = |min: i32, len: usize| -> Option<i32> {
            let len = i64::try_from(len).ok()?;
            i32::try_from(i64::from(min) + len - 1).ok()
        };
        if rows == 0 || cols == 0 {
            return Some(Self::undefined());
        }
        Some(Self::new(xmin, far(xmin, cols)?, ymin, far(ymin, rows)?))
    }

    /// Bounds that contain no pixels.
    pub const fn undefined() -> Self {
        Self {
            xmin: 0,
            xmax: -1,
            ymin: 0,
            ymax: -1,
        }
    }

    #[inline]
    pub fn is_defined(&self) -> bool {
        self.xmin <= self.xmax && self.ymin <= self.ymax
    }

    /// Number of columns, zero when undefined.
    pub fn width(&self) -> usize {
        if self.is_defined() {
            offset(self.xmin, self.xmax) + 1
        } else {
            0
        }
    }

    /// Number of rows, zero when undefined.
    pub fn height(&self) -> usize {
        if self.is_defined() {
            offset(self.ymin, self.ymax) + 1
        } else {
            0
        }
    }

    /// Array shape `(rows, cols)` of a grid covering these bounds.
    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    pub fn includes(&self, x: i32, y: i32) -> bool {
        self.is_defined() && x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    /// True when every pixel of `other` is also inside `self`.
    pub fn contains(&self, other: &Bounds) -> bool {
        other.is_defined()
            && self.includes(other.xmin, other.ymin)
            && self.includes(other.xmax, other.ymax)
    }

    /// Overlap of two rectangles, undefined when they are disjoint.
    pub fn intersect(&self, other: &Bounds) -> Bounds {
        if !self.is_defined() || !other.is_defined() {
            return Self::undefined();
        }
        Bounds::new(
            self.xmin.max(other.xmin),
            self.xmax.min(other.xmax),
            self.ymin.max(other.ymin),
            self.ymax.min(other.ymax),
        )
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::undefined()
    }
}

impl BitAnd for Bounds {
    type Output = Bounds;

    fn bitand(self, rhs: Bounds) -> Bounds {
        self.intersect(&rhs)
    }
}

/// Distance from `origin` to `coord` along one axis, for `coord >= origin`.
/// Computed in `i64` so spans wider than `i32::MAX` do not wrap.
#[inline]
pub(crate) fn offset(origin: i32, coord: i32) -> usize {
    (i64::from(coord) - i64::from(origin)) as usize
}
