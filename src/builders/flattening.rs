use std::{path::Path, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Builder, Flattening, InfluenceFunctions, Result};

use super::{ConfigError, ConverterBuilder};

/// [Flattening] builder
///
/// Default properties:
///  - max. command : 1
///  - # iteration  : 1
///  - delay        : 0s
///  - converter    : [ConverterBuilder] default
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatteningBuilder {
    pub max_command: f64,
    pub n_iteration: usize,
    pub delay: Duration,
    pub converter: ConverterBuilder,
}

impl Default for FlatteningBuilder {
    fn default() -> Self {
        Self {
            max_command: 1.,
            n_iteration: 1,
            delay: Duration::ZERO,
            converter: Default::default(),
        }
    }
}

impl FlatteningBuilder {
    /// Loads the builder from a toml file
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        super::load(path)
    }
    /// Saves the builder into a toml file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), ConfigError> {
        super::save(self, "::dm_calibration::FlatteningBuilder", path)
    }
    /// Sets the largest absolute command that can be applied to the mirror
    pub fn max_command(self, max_command: f64) -> Self {
        Self {
            max_command,
            ..self
        }
    }
    /// Sets the number of closed-loop iterations
    pub fn n_iteration(self, n_iteration: usize) -> Self {
        Self {
            n_iteration,
            ..self
        }
    }
    /// Sets the delay between closed-loop iterations
    pub fn delay(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }
    /// Sets the converter builder
    pub fn converter(self, converter: ConverterBuilder) -> Self {
        Self { converter, ..self }
    }
    /// Sets the influence functions of the converter
    pub fn influence_functions<I: Into<Arc<InfluenceFunctions>>>(self, ifs: I) -> Self {
        Self {
            converter: self.converter.influence_functions(ifs),
            ..self
        }
    }
}

impl Builder for FlatteningBuilder {
    type Component = Flattening;

    fn build(self) -> Result<Self::Component> {
        Ok(Flattening {
            converter: self.converter.build()?,
            max_command: self.max_command,
            n_iteration: self.n_iteration,
            delay: self.delay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AcquisitionBasis;

    #[test]
    fn toml_round_trip() -> anyhow::Result<()> {
        let path = std::env::temp_dir().join(format!("flattening-{}.toml", std::process::id()));
        let builder = FlatteningBuilder::default()
            .max_command(0.5)
            .n_iteration(3)
            .delay(Duration::from_millis(250))
            .converter(ConverterBuilder::default().rcond(1e-6).basis(AcquisitionBasis::Hadamard));
        builder.save(&path)?;
        let loaded = FlatteningBuilder::load(&path)?;
        std::fs::remove_file(&path)?;
        assert_eq!(loaded.max_command, 0.5);
        assert_eq!(loaded.n_iteration, 3);
        assert_eq!(loaded.delay, Duration::from_millis(250));
        assert_eq!(loaded.converter.rcond, 1e-6);
        assert_eq!(loaded.converter.basis, Some(AcquisitionBasis::Hadamard));
        Ok(())
    }

    #[test]
    fn missing_influence_functions() {
        assert!(matches!(
            FlatteningBuilder::default().build(),
            Err(crate::CalibrationError::MissingInfluenceFunctions)
        ));
    }
}
