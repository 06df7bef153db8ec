use std::{fmt::Display, ops::Deref};

use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    mask::{self, Mask},
    CalibrationError, InfluenceFunctions, Result,
};

/// Interaction matrix
///
/// Each column is the influence function of one actuator restricted to the
/// valid pixels of the analysis mask, in the order given by [mask::compress].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionMatrix(DMatrix<f64>);

impl InteractionMatrix {
    /// Builds the interaction matrix of the influence functions restricted to `analysis_mask`
    pub fn build(ifs: &InfluenceFunctions, analysis_mask: &Mask) -> Result<Self> {
        let shape = ifs.image_shape();
        if analysis_mask.shape() != shape {
            return Err(CalibrationError::shape_mismatch(
                shape,
                analysis_mask.shape(),
            ));
        }
        let n_valid = mask::n_valid(analysis_mask);
        if n_valid == 0 {
            return Err(CalibrationError::NoValidSamples);
        }
        let columns = ifs
            .layers()
            .par_iter()
            .map(|layer| mask::compress(layer.data(), analysis_mask))
            .collect::<Result<Vec<Vec<f64>>>>()?;
        let mat = DMatrix::<f64>::from_iterator(n_valid, ifs.n_actuator(), columns.into_iter().flatten());
        log::debug!("interaction matrix: {:?}", mat.shape());
        Ok(Self(mat))
    }
    /// Returns the number of valid pixels
    pub fn n_valid(&self) -> usize {
        self.0.nrows()
    }
    /// Returns the number of actuators
    pub fn n_actuator(&self) -> usize {
        self.0.ncols()
    }
    /// Returns a reference to the matrix
    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.0
    }
}

impl Deref for InteractionMatrix {
    type Target = DMatrix<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<InteractionMatrix> for DMatrix<f64> {
    fn from(value: InteractionMatrix) -> Self {
        value.0
    }
}

impl Display for InteractionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Interaction matrix ({} valid pixels x {} actuators)",
            self.n_valid(),
            self.n_actuator()
        )
    }
}
