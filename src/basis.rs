//! # Command bases
//!
//! The reconstructor returns commands in the basis of the influence functions cube.
//! When the influence functions were acquired by applying the columns of a
//! transform matrix `T` to the mirror, the command sent to the mirror is `T c`.
//!
//! The same generator must be used when the calibration commands are synthesized
//! and when the commands are converted back: a mismatch is not detected and
//! corrupts the commands.

use std::fmt::Display;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{AcquisitionBasis, CalibrationError, Result};

/// Order of the Hadamard generator
pub const HADAMARD_ORDER: usize = 128;

/// Returns the `n x n` identity matrix
pub fn zonal_matrix(n: usize) -> DMatrix<f64> {
    DMatrix::identity(n, n)
}

/// Returns the leading `n x n` block of the Sylvester Hadamard matrix of order [HADAMARD_ORDER]
///
/// The entries are `(-1)^popcount(i & j)`
pub fn hadamard_matrix(n: usize) -> Result<DMatrix<f64>> {
    if n == 0 || n > HADAMARD_ORDER {
        return Err(CalibrationError::UnsupportedActuatorCount {
            n_actuator: n,
            max: HADAMARD_ORDER,
        });
    }
    if !n.is_power_of_two() {
        log::warn!(
            "{n} is not a power of 2, the truncated Hadamard matrix is not orthogonal"
        );
    }
    Ok(DMatrix::from_fn(n, n, |i, j| {
        if (i & j).count_ones() % 2 == 0 {
            1f64
        } else {
            -1f64
        }
    }))
}

/// Square transform from the cube basis to the mirror command basis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasisTransform {
    kind: AcquisitionBasis,
    mat: DMatrix<f64>,
    inverse: Option<DMatrix<f64>>,
}

impl BasisTransform {
    /// Hadamard transform for `n_actuator` actuators
    pub fn hadamard(n_actuator: usize) -> Result<Self> {
        let mat = hadamard_matrix(n_actuator)?;
        let inverse = mat.clone().try_inverse();
        if inverse.is_none() {
            log::warn!("the {n_actuator}x{n_actuator} Hadamard transform is singular");
        }
        Ok(Self {
            kind: AcquisitionBasis::Hadamard,
            mat,
            inverse,
        })
    }
    /// Returns the kind of transform
    pub fn kind(&self) -> AcquisitionBasis {
        self.kind
    }
    /// Returns the transform matrix
    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.mat
    }
    /// Returns the size of the transform
    pub fn n_actuator(&self) -> usize {
        self.mat.nrows()
    }
    /// Checks if the columns of the transform are mutually orthogonal
    pub fn is_orthogonal(&self) -> bool {
        let gram = self.mat.transpose() * &self.mat;
        let scale = gram.diagonal().amax().max(f64::EPSILON);
        gram.iter()
            .enumerate()
            .filter(|(k, _)| k % (self.n_actuator() + 1) != 0)
            .all(|(_, g)| g.abs() <= scale * 1e-12)
    }
    fn check(&self, len: usize) -> Result<()> {
        if len != self.n_actuator() {
            return Err(CalibrationError::CommandLength {
                expected: self.n_actuator(),
                found: len,
            });
        }
        Ok(())
    }
    /// Converts a command in the cube basis into a mirror command
    pub fn to_commanded(&self, c: &DVector<f64>) -> Result<DVector<f64>> {
        self.check(c.len())?;
        Ok(&self.mat * c)
    }
    /// Converts a mirror command into a command in the cube basis
    pub fn to_zonal(&self, c: &DVector<f64>) -> Result<DVector<f64>> {
        self.check(c.len())?;
        let inverse = self
            .inverse
            .as_ref()
            .ok_or(CalibrationError::SingularTransform)?;
        Ok(inverse * c)
    }
}

/// Basis of the commands sent to the mirror
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum CommandBasis {
    /// The commands are the actuator commands
    #[default]
    Zonal,
    /// The commands are transformed before being sent to the mirror
    Transformed(BasisTransform),
}

impl CommandBasis {
    /// Creates the command basis matching the acquisition basis of `n_actuator` influence functions
    pub fn new(basis: AcquisitionBasis, n_actuator: usize) -> Result<Self> {
        Ok(match basis {
            AcquisitionBasis::Zonal => CommandBasis::Zonal,
            AcquisitionBasis::Hadamard => {
                CommandBasis::Transformed(BasisTransform::hadamard(n_actuator)?)
            }
        })
    }
    /// Returns the acquisition basis
    pub fn kind(&self) -> AcquisitionBasis {
        match self {
            CommandBasis::Zonal => AcquisitionBasis::Zonal,
            CommandBasis::Transformed(t) => t.kind(),
        }
    }
    /// Converts a command in the cube basis into a mirror command
    pub fn to_commanded(&self, c: DVector<f64>) -> Result<DVector<f64>> {
        match self {
            CommandBasis::Zonal => Ok(c),
            CommandBasis::Transformed(t) => t.to_commanded(&c),
        }
    }
    /// Converts a mirror command into a command in the cube basis
    pub fn to_zonal(&self, c: DVector<f64>) -> Result<DVector<f64>> {
        match self {
            CommandBasis::Zonal => Ok(c),
            CommandBasis::Transformed(t) => t.to_zonal(&c),
        }
    }
    /// Returns the matrix which columns are the commands applied to the mirror
    /// to acquire the influence functions
    pub fn modal_base(&self, n_actuator: usize) -> Result<DMatrix<f64>> {
        match self {
            CommandBasis::Zonal => Ok(zonal_matrix(n_actuator)),
            CommandBasis::Transformed(t) => {
                t.check(n_actuator)?;
                Ok(t.as_matrix().clone())
            }
        }
    }
    /// Synthesizes the calibration commands for the given mode amplitudes
    ///
    /// Column `k` is the mirror command for mode `k` with amplitude `amplitudes[k]`
    pub fn calibration_commands(&self, amplitudes: &[f64]) -> Result<DMatrix<f64>> {
        let base = self.modal_base(amplitudes.len())?;
        Ok(base * DMatrix::from_diagonal(&DVector::from_column_slice(amplitudes)))
    }
}

impl Display for CommandBasis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandBasis::Zonal => write!(f, "zonal command basis"),
            CommandBasis::Transformed(t) => write!(
                f,
                "{} command basis ({}x{})",
                t.kind(),
                t.n_actuator(),
                t.n_actuator()
            ),
        }
    }
}

/// A tagged matrix of mirror commands, e.g. a modal base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalBase {
    pub tag: String,
    /// Tracking number of the influence functions the base derives from
    pub iftn: Option<String>,
    pub matrix: DMatrix<f64>,
}

impl ModalBase {
    pub fn new<S: Into<String>>(tag: S, matrix: DMatrix<f64>) -> Self {
        Self {
            tag: tag.into(),
            iftn: None,
            matrix,
        }
    }
    /// Sets the influence functions tracking number
    pub fn iftn<S: Into<String>>(mut self, iftn: S) -> Self {
        self.iftn = Some(iftn.into());
        self
    }
    /// Zonal modal base
    pub fn zonal<S: Into<String>>(tag: S, n_actuator: usize) -> Self {
        Self::new(tag, zonal_matrix(n_actuator))
    }
    /// Hadamard modal base
    pub fn hadamard<S: Into<String>>(tag: S, n_actuator: usize) -> Result<Self> {
        Ok(Self::new(tag, hadamard_matrix(n_actuator)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sylvester_hadamard() {
        let h = hadamard_matrix(4).unwrap();
        let expected = DMatrix::from_row_slice(
            4,
            4,
            &[
                1., 1., 1., 1., //
                1., -1., 1., -1., //
                1., 1., -1., -1., //
                1., -1., -1., 1.,
            ],
        );
        assert_eq!(h, expected);
        assert_eq!(&h.transpose() * &h, DMatrix::identity(4, 4) * 4.);
    }

    #[test]
    fn hadamard_truncation_is_leading_block() {
        let h128 = hadamard_matrix(HADAMARD_ORDER).unwrap();
        let h8 = hadamard_matrix(8).unwrap();
        assert_eq!(h128.view((0, 0), (8, 8)).clone_owned(), h8);
    }

    #[test]
    fn unsupported_counts() {
        for n in [0, HADAMARD_ORDER + 1] {
            assert!(matches!(
                hadamard_matrix(n),
                Err(CalibrationError::UnsupportedActuatorCount { .. })
            ));
        }
    }

    #[test]
    fn orthogonality_flag() {
        assert!(BasisTransform::hadamard(16).unwrap().is_orthogonal());
        assert!(!BasisTransform::hadamard(3).unwrap().is_orthogonal());
    }

    #[test]
    fn forward_inverse() {
        let basis = CommandBasis::new(AcquisitionBasis::Hadamard, 8).unwrap();
        let c = DVector::from_fn(8, |i, _| i as f64 - 3.5);
        let commanded = basis.to_commanded(c.clone()).unwrap();
        let zonal = basis.to_zonal(commanded).unwrap();
        assert!((zonal - c).amax() < 1e-12);
    }

    #[test]
    fn zonal_is_identity() {
        let basis = CommandBasis::Zonal;
        let c = DVector::from_vec(vec![1., -2., 3.]);
        assert_eq!(basis.to_commanded(c.clone()).unwrap(), c);
    }

    #[test]
    fn calibration_commands_match_transform() {
        let basis = CommandBasis::new(AcquisitionBasis::Hadamard, 4).unwrap();
        let cmds = basis.calibration_commands(&[0.5; 4]).unwrap();
        let h = hadamard_matrix(4).unwrap();
        assert_eq!(cmds, h * 0.5);
    }

    #[test]
    fn command_length() {
        let basis = CommandBasis::new(AcquisitionBasis::Hadamard, 4).unwrap();
        assert!(matches!(
            basis.to_commanded(DVector::zeros(3)),
            Err(CalibrationError::CommandLength {
                expected: 4,
                found: 3
            })
        ));
    }
}
