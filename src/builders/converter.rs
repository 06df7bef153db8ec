use std::{path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    reconstructor::RCOND,
    store::InfluenceFunctionProvider,
    AcquisitionBasis, Builder, CalibrationError, CommandBasis, Converter, InfluenceFunctions,
    Result,
};

use super::ConfigError;

/// [Converter] builder
///
/// Default properties:
///  - rcond : 1e-15
///  - basis : the acquisition basis of the influence functions
///
/// # Examples
///
/// ```
/// use dm_calibration::{AcquisitionBasis, Builder, Converter, FromBuilder, InfluenceFunctions, MaskedImage};
/// use nalgebra::DMatrix;
///
/// let layers = vec![MaskedImage::unmasked(DMatrix::identity(4, 4))];
/// let ifs = InfluenceFunctions::new("20240701_120000", layers, AcquisitionBasis::Zonal)?;
/// let converter = Converter::builder().rcond(1e-6).influence_functions(ifs).build()?;
/// assert_eq!(converter.rcond(), 1e-6);
/// # Ok::<(), dm_calibration::CalibrationError>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterBuilder {
    pub rcond: f64,
    pub basis: Option<AcquisitionBasis>,
    #[serde(skip)]
    influence_functions: Option<Arc<InfluenceFunctions>>,
}

impl Default for ConverterBuilder {
    fn default() -> Self {
        Self {
            rcond: RCOND,
            basis: None,
            influence_functions: None,
        }
    }
}

impl ConverterBuilder {
    /// Loads the builder from a toml file
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        super::load(path)
    }
    /// Saves the builder into a toml file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), ConfigError> {
        super::save(self, "::dm_calibration::ConverterBuilder", path)
    }
    /// Sets the relative cutoff of the singular values of the interaction matrix
    pub fn rcond(self, rcond: f64) -> Self {
        Self { rcond, ..self }
    }
    /// Overrides the acquisition basis of the influence functions
    pub fn basis(mut self, basis: AcquisitionBasis) -> Self {
        self.basis = Some(basis);
        self
    }
    /// Sets the influence functions
    pub fn influence_functions<I: Into<Arc<InfluenceFunctions>>>(mut self, ifs: I) -> Self {
        self.influence_functions = Some(ifs.into());
        self
    }
    /// Loads the influence functions with the given tracking number from the provider
    pub fn load_influence_functions<P: InfluenceFunctionProvider>(
        self,
        provider: &P,
        tracking_number: &str,
    ) -> Result<Self> {
        let ifs = provider.influence_functions(tracking_number)?;
        Ok(self.influence_functions(ifs))
    }
}

impl Builder for ConverterBuilder {
    type Component = Converter;

    fn build(self) -> Result<Self::Component> {
        let ifs = self
            .influence_functions
            .ok_or(CalibrationError::MissingInfluenceFunctions)?;
        let basis = CommandBasis::new(self.basis.unwrap_or(ifs.basis()), ifs.n_actuator())?;
        Converter::new(ifs, basis, self.rcond)
    }
}
