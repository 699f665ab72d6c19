//! The `badpix` extra output: a per-pixel defect mask.
//!
//! Defects and saturation are not modelled yet, so every stamp contribution
//! is all zero. The accumulation path is still exercised in full so that a
//! defect model only has to fill in the stamp.

use crate::accumulator::{AccumulateError, BuildContext, StampAccumulator};
use crate::image::{BitwiseOr, Image};
use crate::photon_array::PhotonArray;
use crate::registry::{write_multi, OutputConfig, OutputHooks, OutputRegistry, RegistryError};

pub const OUTPUT_NAME: &str = "badpix";

/// Mask pixels hold OR-able defect flags.
pub type MaskPixel = i16;

/// Stamp hook: record a zero mask over the current stamp when stamp-level
/// accumulation is on, otherwise do nothing.
pub fn process_stamp(
    acc: &mut StampAccumulator<MaskPixel>,
    _photons: Option<&PhotonArray>,
    _config: &OutputConfig,
    base: &BuildContext,
    obj_num: usize,
) -> Result<(), AccumulateError> {
    if base.accumulate_in_stamps {
        acc.insert_stamp(obj_num, Image::new(base.current_stamp_bounds, 0));
    }
    Ok(())
}

/// Image hook: OR every recorded stamp into a fresh full-frame mask and
/// store it at `image_num - start_image_num`.
pub fn process_image(
    acc: &mut StampAccumulator<MaskPixel>,
    _config: &OutputConfig,
    base: &BuildContext,
) -> Result<(), AccumulateError> {
    let slot = base.image_slot()?;
    let mut image = Image::new(base.image_bounds, 0);
    if !acc.scratch().is_empty() {
        acc.fold_scratch(&mut image, &BitwiseOr);
    } else {
        log::debug!(
            "{}: no stamps for image {}, mask built at image level",
            acc.name(),
            base.image_num
        );
    }
    acc.store_image(slot, image);
    Ok(())
}

/// HDU hook: the one mask of the run.
pub fn hdu(acc: &StampAccumulator<MaskPixel>) -> Result<&Image<MaskPixel>, AccumulateError> {
    acc.select_output()
}

pub fn hooks() -> OutputHooks<MaskPixel> {
    OutputHooks {
        stamp: process_stamp,
        image: process_image,
        write: write_multi,
        hdu,
    }
}

/// Add the `badpix` output type to `registry`.
pub fn register(registry: &mut OutputRegistry<MaskPixel>) -> Result<(), RegistryError> {
    registry.register(OUTPUT_NAME, hooks())
}
