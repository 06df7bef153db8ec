use std::fmt::Display;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{CalibrationError, InteractionMatrix, Result};

/// Default relative cutoff of the singular values
pub const RCOND: f64 = 1e-15;

/// Interaction matrix pseudo-inverse
///
/// Singular values smaller or equal to `rcond` times the largest singular value
/// are discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconstructor {
    mat: DMatrix<f64>,
    rcond: f64,
    cutoff: f64,
    singular_values: Vec<f64>,
}

impl Reconstructor {
    /// Computes the pseudo-inverse of the interaction matrix
    pub fn new(interaction: &InteractionMatrix, rcond: f64) -> Result<Self> {
        if rcond.is_nan() || rcond < 0. {
            return Err(CalibrationError::PseudoInverse(format!(
                "rcond must be non-negative, found {rcond}"
            )));
        }
        let svd = interaction.as_matrix().clone().svd(true, true);
        let mut singular_values: Vec<f64> = svd.singular_values.iter().cloned().collect();
        singular_values.sort_by(|a, b| b.total_cmp(a));
        let s_max = singular_values.first().cloned().unwrap_or_default();
        let s_min = singular_values.last().cloned().unwrap_or_default();
        let cutoff = rcond * s_max;
        log::info!(
            "Calibration singular values range: [{:e},{:e}], cutoff: {:e}",
            s_min,
            s_max,
            cutoff
        );
        let mat = svd
            .pseudo_inverse(cutoff)
            .map_err(|msg| CalibrationError::PseudoInverse(msg.to_string()))?;
        let this = Self {
            mat,
            rcond,
            cutoff,
            singular_values,
        };
        if this.rank() < this.n_actuator() {
            log::warn!(
                "reconstructor rank ({}) is smaller than the number of actuators ({})",
                this.rank(),
                this.n_actuator()
            );
        }
        Ok(this)
    }
    /// Returns the relative cutoff of the singular values
    pub fn rcond(&self) -> f64 {
        self.rcond
    }
    /// Returns the absolute cutoff of the singular values
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }
    /// Returns the singular values of the interaction matrix, sorted in descending order
    pub fn singular_values(&self) -> &[f64] {
        &self.singular_values
    }
    /// Returns the number of singular values kept in the pseudo-inverse
    pub fn rank(&self) -> usize {
        self.singular_values
            .iter()
            .filter(|&&s| s > self.cutoff)
            .count()
    }
    /// Returns the condition number of the retained singular values
    pub fn cond(&self) -> f64 {
        match self.rank() {
            0 => f64::INFINITY,
            n => self.singular_values[0] / self.singular_values[n - 1],
        }
    }
    /// Returns the number of actuators
    pub fn n_actuator(&self) -> usize {
        self.mat.nrows()
    }
    /// Returns the number of valid pixels
    pub fn n_valid(&self) -> usize {
        self.mat.ncols()
    }
    /// Returns a reference to the matrix
    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.mat
    }
    /// Least-squares zonal command corresponding to the valid wavefront samples
    pub fn solve(&self, samples: &[f64]) -> Result<DVector<f64>> {
        if samples.len() != self.n_valid() {
            return Err(CalibrationError::CommandLength {
                expected: self.n_valid(),
                found: samples.len(),
            });
        }
        Ok(&self.mat * DVector::from_column_slice(samples))
    }
}

impl Display for Reconstructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Reconstructor ({} x {}); rank: {}; cond: {:6.3E}",
            self.n_actuator(),
            self.n_valid(),
            self.rank(),
            self.cond()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mask, AcquisitionBasis, InfluenceFunctions, MaskedImage};

    fn interaction(columns: &[[f64; 4]]) -> InteractionMatrix {
        let layers = columns
            .iter()
            .map(|c| MaskedImage::unmasked(DMatrix::from_row_slice(2, 2, c)))
            .collect();
        let ifs = InfluenceFunctions::new("test", layers, AcquisitionBasis::Zonal).unwrap();
        InteractionMatrix::build(&ifs, &mask::unmasked((2, 2))).unwrap()
    }

    #[test]
    fn pseudo_inverse_identity() {
        let d = interaction(&[[1., 0., 0., 0.], [0., 2., 0., 0.]]);
        let rec = Reconstructor::new(&d, RCOND).unwrap();
        assert_eq!(rec.rank(), 2);
        let c = rec.solve(&[3., 4., 0., 0.]).unwrap();
        assert!((c[0] - 3.).abs() < 1e-12);
        assert!((c[1] - 2.).abs() < 1e-12);
        assert!((rec.cond() - 2.).abs() < 1e-12);
    }

    #[test]
    fn relative_cutoff() {
        // singular values are 1 and 1e-3
        let d = interaction(&[[1., 0., 0., 0.], [0., 1e-3, 0., 0.]]);
        let full = Reconstructor::new(&d, 1e-4).unwrap();
        assert_eq!(full.rank(), 2);
        assert!((full.solve(&[0., 1., 0., 0.]).unwrap()[1] - 1e3).abs() < 1e-6);
        let truncated = Reconstructor::new(&d, 1e-2).unwrap();
        assert_eq!(truncated.rank(), 1);
        assert_eq!(truncated.solve(&[0., 1., 0., 0.]).unwrap()[1], 0.);
    }

    #[test]
    fn rank_deficient_is_not_an_error() {
        let d = interaction(&[[1., 1., 0., 0.], [1., 1., 0., 0.]]);
        let rec = Reconstructor::new(&d, RCOND).unwrap();
        assert_eq!(rec.rank(), 1);
        let c = rec.solve(&[2., 2., 0., 0.]).unwrap();
        assert!((c[0] - 1.).abs() < 1e-12 && (c[1] - 1.).abs() < 1e-12);
    }

    #[test]
    fn negative_rcond() {
        let d = interaction(&[[1., 0., 0., 0.]]);
        assert!(matches!(
            Reconstructor::new(&d, -1.),
            Err(CalibrationError::PseudoInverse(_))
        ));
    }

    #[test]
    fn samples_length() {
        let d = interaction(&[[1., 0., 0., 0.]]);
        let rec = Reconstructor::new(&d, RCOND).unwrap();
        assert!(matches!(
            rec.solve(&[1., 2.]),
            Err(CalibrationError::CommandLength {
                expected: 4,
                found: 2
            })
        ));
    }
}
