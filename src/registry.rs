//! Named extra-output types and the writer seam.
//!
//! An output type is a record of four hooks that an orchestrator calls in
//! order: `stamp` after each object is drawn, `image` after each image, then
//! `write` (whole file) or `hdu` (single extension). The registry is an
//! ordinary value built once per run and passed by reference.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::accumulator::{AccumulateError, BuildContext, StampAccumulator};
use crate::image::Image;
use crate::photon_array::PhotonArray;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writer rejected {path}: {reason}")]
    Rejected { path: PathBuf, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown output type {0:?}")]
    UnknownOutput(String),
    #[error("output type {0:?} is already registered")]
    Duplicate(String),
}

/// Writes an ordered list of grids as one file, one extension per grid.
pub trait MultiImageWriter<T> {
    fn write_multi(&mut self, images: &[&Image<T>], destination: &Path) -> Result<(), WriteError>;
}

/// Writer that keeps every call in memory.
#[derive(Debug, Clone)]
pub struct MemoryWriter<T> {
    pub files: Vec<(PathBuf, Vec<Image<T>>)>,
}

impl<T> Default for MemoryWriter<T> {
    fn default() -> Self {
        Self { files: Vec::new() }
    }
}

impl<T: Clone> MultiImageWriter<T> for MemoryWriter<T> {
    fn write_multi(&mut self, images: &[&Image<T>], destination: &Path) -> Result<(), WriteError> {
        self.files.push((
            destination.to_path_buf(),
            images.iter().map(|&im| im.clone()).collect(),
        ));
        Ok(())
    }
}

/// The extra-output block of a run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_type: String,
    pub file_name: Option<PathBuf>,
    /// Extension number when the output goes into the main file instead.
    pub hdu: Option<usize>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_type: "badpix".to_string(),
            file_name: None,
            hdu: None,
        }
    }
}

pub type StampFn<T> = fn(
    &mut StampAccumulator<T>,
    Option<&PhotonArray>,
    &OutputConfig,
    &BuildContext,
    usize,
) -> Result<(), AccumulateError>;
pub type ImageFn<T> =
    fn(&mut StampAccumulator<T>, &OutputConfig, &BuildContext) -> Result<(), AccumulateError>;
pub type WriteFn<T> =
    fn(&mut dyn MultiImageWriter<T>, &[&Image<T>], &Path) -> Result<(), WriteError>;
pub type HduFn<T> = for<'a> fn(&'a StampAccumulator<T>) -> Result<&'a Image<T>, AccumulateError>;

pub struct OutputHooks<T> {
    pub stamp: StampFn<T>,
    pub image: ImageFn<T>,
    pub write: WriteFn<T>,
    pub hdu: HduFn<T>,
}

impl<T> Clone for OutputHooks<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for OutputHooks<T> {}

/// Default `write` hook: hand the images straight to the writer.
pub fn write_multi<T>(
    writer: &mut dyn MultiImageWriter<T>,
    images: &[&Image<T>],
    destination: &Path,
) -> Result<(), WriteError> {
    writer.write_multi(images, destination)
}

pub struct OutputRegistry<T> {
    outputs: BTreeMap<String, OutputHooks<T>>,
}

impl<T> Default for OutputRegistry<T> {
    fn default() -> Self {
        Self {
            outputs: BTreeMap::new(),
        }
    }
}

impl<T> OutputRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        hooks: OutputHooks<T>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        log::debug!("registered extra output {name:?}");
        self.outputs.insert(name, hooks);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&OutputHooks<T>, RegistryError> {
        self.outputs
            .get(name)
            .ok_or_else(|| RegistryError::UnknownOutput(name.to_string()))
    }

    /// Hooks for the output type named in `config`.
    pub fn hooks_for(&self, config: &OutputConfig) -> Result<&OutputHooks<T>, RegistryError> {
        self.get(&config.output_type)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Bounds;

    fn noop_stamp(
        _: &mut StampAccumulator<u8>,
        _: Option<&PhotonArray>,
        _: &OutputConfig,
        _: &BuildContext,
        _: usize,
    ) -> Result<(), AccumulateError> {
        Ok(())
    }

    fn noop_image(
        _: &mut StampAccumulator<u8>,
        _: &OutputConfig,
        _: &BuildContext,
    ) -> Result<(), AccumulateError> {
        Ok(())
    }

    fn first(acc: &StampAccumulator<u8>) -> Result<&Image<u8>, AccumulateError> {
        acc.select_output()
    }

    fn hooks() -> OutputHooks<u8> {
        OutputHooks {
            stamp: noop_stamp,
            image: noop_image,
            write: write_multi,
            hdu: first,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = OutputRegistry::new();
        registry.register("mask", hooks()).unwrap();
        registry.register("weight", hooks()).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["mask", "weight"]);
        assert!(registry.get("mask").is_ok());
        assert_eq!(
            registry.get("psf").err(),
            Some(RegistryError::UnknownOutput("psf".into()))
        );
        assert_eq!(
            registry.register("mask", hooks()),
            Err(RegistryError::Duplicate("mask".into()))
        );
    }

    #[test]
    fn test_hooks_for_config() {
        let mut registry = OutputRegistry::new();
        registry.register("mask", hooks()).unwrap();
        let config: OutputConfig =
            serde_json::from_str(r#"{"output_type": "mask", "file_name": "mask.fits"}"#).unwrap();
        assert_eq!(config.file_name, Some(PathBuf::from("mask.fits")));
        assert_eq!(config.hdu, None);
        assert!(registry.hooks_for(&config).is_ok());
        assert!(registry.hooks_for(&OutputConfig::default()).is_err());
    }

    #[test]
    fn test_default_write_hook_uses_writer() {
        let im = Image::new(Bounds::new(0, 1, 0, 1), 9u8);
        let mut writer = MemoryWriter::<u8>::default();
        let write = hooks().write;
        write(&mut writer, &[&im, &im], Path::new("out.fits")).unwrap();
        assert_eq!(writer.files.len(), 1);
        assert_eq!(writer.files[0].1.len(), 2);
    }
}
