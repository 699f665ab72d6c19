//! Per-image stamp accumulation.
//!
//! Stamps are recorded one per object into a scratch map while an image is
//! being drawn. When the image is done, every stamp is folded into a
//! full-frame grid over the overlap of the two bounds and the scratch map is
//! cleared for the next image.
//!
//! Per-object stamps may be built on worker threads, but each worker must
//! own its scratch map; `merge_scratch` joins them before the image is
//! finished.

use std::collections::BTreeMap;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bounds::Bounds;
use crate::image::{CombineRule, Image};
use crate::registry::{MultiImageWriter, WriteError};

/// Stamps keyed by object number.
pub type Scratch<T> = BTreeMap<usize, Image<T>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccumulateError {
    #[error("No {output} images were created.")]
    NoImages { output: String },
    #[error("{count} {output} images were created, but expecting only 1.")]
    TooManyImages { output: String, count: usize },
    #[error("object {0} already has a stamp")]
    DuplicateStamp(usize),
    #[error("image number {image_num} precedes start image number {start_image_num}")]
    ImageIndex {
        image_num: usize,
        start_image_num: usize,
    },
}

/// The per-build values the orchestrator hands to every hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildContext {
    /// Whether stamp-level accumulation is on for this run.
    pub accumulate_in_stamps: bool,
    /// Bounds of the stamp currently being drawn.
    pub current_stamp_bounds: Bounds,
    /// Full-frame bounds of the image currently being built.
    pub image_bounds: Bounds,
    pub image_num: usize,
    pub start_image_num: usize,
}

impl BuildContext {
    pub fn new(image_bounds: Bounds) -> Self {
        Self {
            accumulate_in_stamps: false,
            current_stamp_bounds: Bounds::undefined(),
            image_bounds,
            image_num: 0,
            start_image_num: 0,
        }
    }

    /// Slot of the current image in the finished image list.
    pub fn image_slot(&self) -> Result<usize, AccumulateError> {
        self.image_num
            .checked_sub(self.start_image_num)
            .ok_or(AccumulateError::ImageIndex {
                image_num: self.image_num,
                start_image_num: self.start_image_num,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    AccumulatingStamps,
    Finalized,
}

/// Scratch stamps for the image in progress plus the finished images of the
/// run.
#[derive(Debug, Clone)]
pub struct StampAccumulator<T> {
    name: String,
    scratch: Scratch<T>,
    images: Vec<Option<Image<T>>>,
    state: BuildState,
}

impl<T: Copy> StampAccumulator<T> {
    /// Empty accumulator for the output called `name` (used in messages).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scratch: Scratch::new(),
            images: Vec::new(),
            state: BuildState::Idle,
        }
    }

    /// Empty accumulator with `n_images` slots reserved for the run.
    pub fn with_images(name: impl Into<String>, n_images: usize) -> Self {
        let mut acc = Self::new(name);
        acc.images.resize_with(n_images, || None);
        acc
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn scratch(&self) -> &Scratch<T> {
        &self.scratch
    }

    /// Record the stamp for object `obj_num`, replacing any earlier one.
    pub fn insert_stamp(&mut self, obj_num: usize, stamp: Image<T>) {
        log::trace!(
            "{}: stamp for object {obj_num} at {:?}",
            self.name,
            stamp.bounds()
        );
        self.scratch.insert(obj_num, stamp);
        self.state = BuildState::AccumulatingStamps;
    }

    /// Join a scratch map built elsewhere. Object numbers must not overlap
    /// with stamps already recorded; on error nothing is merged.
    pub fn merge_scratch(&mut self, other: Scratch<T>) -> Result<(), AccumulateError> {
        if let Some(&dup) = other.keys().find(|&&k| self.scratch.contains_key(&k)) {
            return Err(AccumulateError::DuplicateStamp(dup));
        }
        if !other.is_empty() {
            self.state = BuildState::AccumulatingStamps;
        }
        self.scratch.extend(other);
        Ok(())
    }

    /// Fold every recorded stamp into `image` with `rule`, then clear the
    /// scratch map. Returns the number of stamps that overlapped the image.
    pub fn fold_scratch<R>(&mut self, image: &mut Image<T>, rule: &R) -> usize
    where
        R: CombineRule<T> + ?Sized,
    {
        let mut merged = 0usize;
        for stamp in self.scratch.values() {
            if image.combine_from(stamp, rule).is_defined() {
                merged += 1;
            }
        }
        log::debug!(
            "{}: merged {merged} of {} stamps into {:?}",
            self.name,
            self.scratch.len(),
            image.bounds()
        );
        self.scratch.clear();
        merged
    }

    /// Store a finished image at `slot`, growing the image list if needed.
    pub fn store_image(&mut self, slot: usize, image: Image<T>) {
        if slot >= self.images.len() {
            self.images.resize_with(slot + 1, || None);
        }
        self.images[slot] = Some(image);
        self.state = BuildState::Finalized;
    }

    /// Finished images in slot order.
    pub fn images(&self) -> impl Iterator<Item = &Image<T>> {
        self.images.iter().flatten()
    }

    pub fn image_count(&self) -> usize {
        self.images().count()
    }

    /// The single finished image of the run.
    pub fn select_output(&self) -> Result<&Image<T>, AccumulateError> {
        let mut images = self.images();
        match (images.next(), self.image_count()) {
            (Some(image), 1) => Ok(image),
            (None, _) => Err(AccumulateError::NoImages {
                output: self.name.clone(),
            }),
            (Some(_), count) => Err(AccumulateError::TooManyImages {
                output: self.name.clone(),
                count,
            }),
        }
    }

    /// Hand all finished images, in order, to `writer` as one file.
    pub fn write_outputs(
        &self,
        writer: &mut dyn MultiImageWriter<T>,
        destination: &Path,
    ) -> Result<(), WriteError> {
        let images: Vec<&Image<T>> = self.images().collect();
        log::debug!(
            "{}: writing {} images to {}",
            self.name,
            images.len(),
            destination.display()
        );
        writer.write_multi(&images, destination)
    }
}

/// Build one stamp per object on the rayon pool.
///
/// Each object number is handled independently, so the result is the same
/// scratch map a sequential loop would produce.
pub fn build_scratch_parallel<T, F>(objects: &[usize], make_stamp: F) -> Scratch<T>
where
    T: Send,
    F: Fn(usize) -> Option<Image<T>> + Sync,
{
    objects
        .par_iter()
        .filter_map(|&obj_num| make_stamp(obj_num).map(|stamp| (obj_num, stamp)))
        .collect()
}
