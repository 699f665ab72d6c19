//! Bounded pixel grids and region combination.
//!
//! An `Image<T>` is an `Array2<T>` placed on the pixel plane by its `Bounds`.
//! Row `r` holds pixels with `y = ymin + r`, column `c` holds `x = xmin + c`.

use std::ops::{Add, BitOr};

use ndarray::{s, Array2, ArrayView2, ArrayViewMut2, Zip};
use thiserror::Error;

use crate::bounds::{offset, Bounds};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("region {region:?} is not inside image bounds {bounds:?}")]
    OutOfBounds { region: Bounds, bounds: Bounds },
    #[error("values have shape {got:?} but region needs {expected:?}")]
    Shape {
        expected: (usize, usize),
        got: (usize, usize),
    },
}

/// Per-pixel operator used to fold a stamp into an image.
pub trait CombineRule<T>: Sync {
    fn combine(&self, existing: T, incoming: T) -> T;
}

/// Bitwise OR, the rule for defect masks. Merging the same stamp twice is a
/// no-op on the second pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitwiseOr;

impl<T: BitOr<Output = T>> CombineRule<T> for BitwiseOr {
    #[inline]
    fn combine(&self, existing: T, incoming: T) -> T {
        existing | incoming
    }
}

/// Arithmetic accumulation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl<T: Add<Output = T>> CombineRule<T> for Sum {
    #[inline]
    fn combine(&self, existing: T, incoming: T) -> T {
        existing + incoming
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image<T> {
    bounds: Bounds,
    array: Array2<T>,
}

impl<T: Clone> Image<T> {
    /// Allocate a grid over `bounds` with every pixel set to `init_value`.
    pub fn new(bounds: Bounds, init_value: T) -> Self {
        Self {
            bounds,
            array: Array2::from_elem(bounds.shape(), init_value),
        }
    }

    /// Wrap an existing array. Fails if its shape does not match `bounds`.
    pub fn from_array(bounds: Bounds, array: Array2<T>) -> Result<Self, ImageError> {
        if array.dim() != bounds.shape() {
            return Err(ImageError::Shape {
                expected: bounds.shape(),
                got: array.dim(),
            });
        }
        Ok(Self { bounds, array })
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn array(&self) -> ArrayView2<'_, T> {
        self.array.view()
    }

    pub fn array_mut(&mut self) -> ArrayViewMut2<'_, T> {
        self.array.view_mut()
    }

    pub fn into_array(self) -> Array2<T> {
        self.array
    }

    /// Pixel value at `(x, y)`, `None` outside the bounds.
    pub fn get(&self, x: i32, y: i32) -> Option<&T> {
        let (r, c) = self.index_of(x, y)?;
        self.array.get((r, c))
    }

    pub fn get_mut(&mut self, x: i32, y: i32) -> Option<&mut T> {
        let (r, c) = self.index_of(x, y)?;
        self.array.get_mut((r, c))
    }

    #[inline]
    fn index_of(&self, x: i32, y: i32) -> Option<(usize, usize)> {
        if !self.bounds.includes(x, y) {
            return None;
        }
        Some((offset(self.bounds.ymin, y), offset(self.bounds.xmin, x)))
    }

    fn check_region(&self, region: &Bounds) -> Result<(), ImageError> {
        if !self.bounds.contains(region) {
            return Err(ImageError::OutOfBounds {
                region: *region,
                bounds: self.bounds,
            });
        }
        Ok(())
    }

    /// View of the pixels inside `region`, which must lie within the image.
    pub fn sub_image(&self, region: &Bounds) -> Result<ArrayView2<'_, T>, ImageError> {
        self.check_region(region)?;
        let (r0, c0) = (
            offset(self.bounds.ymin, region.ymin),
            offset(self.bounds.xmin, region.xmin),
        );
        let (h, w) = region.shape();
        Ok(self.array.slice(s![r0..r0 + h, c0..c0 + w]))
    }

    pub fn sub_image_mut(&mut self, region: &Bounds) -> Result<ArrayViewMut2<'_, T>, ImageError> {
        self.check_region(region)?;
        let (r0, c0) = (
            offset(self.bounds.ymin, region.ymin),
            offset(self.bounds.xmin, region.xmin),
        );
        let (h, w) = region.shape();
        Ok(self.array.slice_mut(s![r0..r0 + h, c0..c0 + w]))
    }

    /// Overwrite the pixels inside `region` with `values`.
    pub fn set_sub_image(&mut self, region: &Bounds, values: ArrayView2<T>) -> Result<(), ImageError> {
        if values.dim() != region.shape() {
            return Err(ImageError::Shape {
                expected: region.shape(),
                got: values.dim(),
            });
        }
        self.sub_image_mut(region)?.assign(&values);
        Ok(())
    }

    /// Fold `other` into this image over the overlap of both bounds.
    ///
    /// Pixels outside the overlap are untouched on both sides. Returns the
    /// overlap, which is undefined when the images are disjoint.
    pub fn combine_from<R>(&mut self, other: &Image<T>, rule: &R) -> Bounds
    where
        T: Copy,
        R: CombineRule<T> + ?Sized,
    {
        let region = other.bounds & self.bounds;
        if !region.is_defined() {
            return region;
        }
        // region lies inside both bounds, so neither view can fail.
        match (self.sub_image_mut(&region), other.sub_image(&region)) {
            (Ok(dst), Ok(src)) => {
                Zip::from(dst)
                    .and(src)
                    .for_each(|d, &s| *d = rule.combine(*d, s));
                region
            }
            (dst, src) => {
                debug_assert!(
                    false,
                    "intersection {region:?} outside its operands: {:?}, {:?}",
                    dst.err(),
                    src.err()
                );
                Bounds::undefined()
            }
        }
    }
}
