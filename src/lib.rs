//! Photon ensembles and stamp-to-image accumulation for an image simulator.

#[cfg(feature = "python")]
use pyo3::prelude::*;

pub mod accumulator;
pub mod badpix;
pub mod bounds;
pub mod image;
pub mod photon_array;
#[cfg(feature = "python")]
mod python;
pub mod registry;

pub use accumulator::{AccumulateError, BuildContext, BuildState, Scratch, StampAccumulator};
pub use bounds::Bounds;
pub use image::{BitwiseOr, CombineRule, Image, ImageError, Sum};
pub use photon_array::{Attribute, PhotonArray, PhotonArraySnapshot, PhotonError, PhotonInit};
pub use registry::{MultiImageWriter, OutputConfig, OutputHooks, OutputRegistry};

#[cfg(feature = "python")]
#[pymodule]
fn photonstamp(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    python::register_photon_array_module(py_module)?;
    python::register_badpix_module(py_module)?;

    py_module.add(
        "__doc__",
        "Photon arrays and extra-output accumulation implemented in Rust.",
    )?;

    Ok(())
}
