//! # Data stores
//!
//! Interfaces to the collaborators the calibration depends on:
//!  * [InfluenceFunctionProvider]: source of the influence functions
//!  * [ArtifactSink]: persistence of the derived matrices ([ModalBase])
//!  * [DeformableMirror] and [Interferometer]: the devices
//!
//! [PickleStore] persists influence functions and artifacts as pickle files in a directory,
//! [MemoryStore] keeps them in memory.

use std::{
    collections::HashMap,
    fs::File,
    path::{Path, PathBuf},
};

use crate::{error::DeviceError, InfluenceFunctions, MaskedImage, ModalBase};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot open {1}")]
    Open(#[source] std::io::Error, PathBuf),
    #[error("cannot create {1}")]
    Create(#[source] std::io::Error, PathBuf),
    #[error("pickle (de)serialization failed")]
    Pickle(#[from] serde_pickle::Error),
    #[error("{0} not found")]
    NotFound(String),
}
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Source of influence functions
pub trait InfluenceFunctionProvider {
    /// Returns the influence functions with the given tracking number
    fn influence_functions(&self, tracking_number: &str) -> StoreResult<InfluenceFunctions>;
}

/// Persistence of derived artifacts
pub trait ArtifactSink {
    /// Saves the artifact under its tag
    fn save_artifact(&mut self, artifact: &ModalBase) -> StoreResult<()>;
}

/// Deformable mirror interface
pub trait DeformableMirror {
    /// Returns the number of actuators
    fn n_actuator(&self) -> usize;
    /// Returns the current command
    fn shape(&mut self) -> std::result::Result<Vec<f64>, DeviceError>;
    /// Applies a new command
    fn set_shape(&mut self, command: &[f64]) -> std::result::Result<(), DeviceError>;
}

/// Interferometer interface
pub trait Interferometer {
    /// Measures a wavefront
    fn wavefront(&mut self) -> std::result::Result<MaskedImage, DeviceError>;
}

/// Directory of pickle files
///
/// Influence functions are read from `<root>/<tracking number>.pickle`
/// and artifacts are written to `<root>/<tag>.pickle`
#[derive(Debug, Clone)]
pub struct PickleStore {
    root: PathBuf,
}

impl PickleStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name).with_extension("pickle")
    }
    fn dump<T: serde::Serialize>(&self, name: &str, data: &T) -> StoreResult<PathBuf> {
        let path = self.path(name);
        let mut file = File::create(&path).map_err(|e| StoreError::Create(e, path.clone()))?;
        serde_pickle::to_writer(&mut file, data, Default::default())?;
        log::info!("{} written to {:?}", name, path);
        Ok(path)
    }
    fn load<T: serde::de::DeserializeOwned>(&self, name: &str) -> StoreResult<T> {
        let path = self.path(name);
        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(name.to_string()),
            _ => StoreError::Open(e, path.clone()),
        })?;
        Ok(serde_pickle::from_reader(file, Default::default())?)
    }
    /// Saves the influence functions under their tracking number
    pub fn save_influence_functions(&self, ifs: &InfluenceFunctions) -> StoreResult<PathBuf> {
        self.dump(ifs.tracking_number(), ifs)
    }
    /// Loads an artifact
    pub fn load_artifact(&self, tag: &str) -> StoreResult<ModalBase> {
        self.load(tag)
    }
}

impl InfluenceFunctionProvider for PickleStore {
    fn influence_functions(&self, tracking_number: &str) -> StoreResult<InfluenceFunctions> {
        self.load(tracking_number)
    }
}

impl ArtifactSink for PickleStore {
    fn save_artifact(&mut self, artifact: &ModalBase) -> StoreResult<()> {
        self.dump(&artifact.tag, artifact).map(|_| ())
    }
}

/// In-memory store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    influence_functions: HashMap<String, InfluenceFunctions>,
    artifacts: HashMap<String, ModalBase>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }
    /// Adds influence functions to the store
    pub fn insert(&mut self, ifs: InfluenceFunctions) -> &mut Self {
        self.influence_functions
            .insert(ifs.tracking_number().to_string(), ifs);
        self
    }
    /// Returns an artifact
    pub fn artifact(&self, tag: &str) -> Option<&ModalBase> {
        self.artifacts.get(tag)
    }
}

impl InfluenceFunctionProvider for MemoryStore {
    fn influence_functions(&self, tracking_number: &str) -> StoreResult<InfluenceFunctions> {
        self.influence_functions
            .get(tracking_number)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(tracking_number.to_string()))
    }
}

impl ArtifactSink for MemoryStore {
    fn save_artifact(&mut self, artifact: &ModalBase) -> StoreResult<()> {
        self.artifacts.insert(artifact.tag.clone(), artifact.clone());
        Ok(())
    }
}
