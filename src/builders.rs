//! # Builders
//!
//! The builders hold the configuration of [Converter](crate::Converter) and
//! [Flattening](crate::Flattening).
//! They can be saved to and loaded from toml files.

mod converter;
mod flattening;

use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

pub use converter::ConverterBuilder;
pub use flattening::FlatteningBuilder;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot open toml file: {1}")]
    Open(#[source] std::io::Error, PathBuf),
    #[error("cannot create toml file: {1}")]
    Create(#[source] std::io::Error, PathBuf),
    #[error("cannot read toml file: {1}")]
    Read(#[source] std::io::Error, PathBuf),
    #[error("cannot write toml file: {1}")]
    Write(#[source] std::io::Error, PathBuf),
    #[error("cannot deserialize builder from toml")]
    Load(#[from] toml::de::Error),
    #[error("cannot serialize builder into toml")]
    Save(#[from] toml::ser::Error),
}

pub(crate) fn load<T, P>(path: P) -> std::result::Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let mut file =
        File::open(&path).map_err(|e| ConfigError::Open(e, path.as_ref().to_path_buf()))?;
    let mut toml = String::new();
    file.read_to_string(&mut toml)
        .map_err(|e| ConfigError::Read(e, path.as_ref().to_path_buf()))?;
    Ok(toml::from_str(&toml)?)
}

pub(crate) fn save<T, P>(builder: &T, header: &str, path: P) -> std::result::Result<(), ConfigError>
where
    T: serde::Serialize,
    P: AsRef<Path>,
{
    let toml = toml::to_string_pretty(builder)?;
    let mut file =
        File::create(&path).map_err(|e| ConfigError::Create(e, path.as_ref().to_path_buf()))?;
    write!(file, "# {}\n\n{}", header, toml)
        .map_err(|e| ConfigError::Write(e, path.as_ref().to_path_buf()))?;
    Ok(())
}
