use crate::{builders::ConfigError, store::StoreError};

/// Error raised by a device (deformable mirror or interferometer)
pub type DeviceError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("shape mismatch, expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("no valid samples left after masking")]
    NoValidSamples,
    #[error("the influence functions cube is empty")]
    EmptyCube,
    #[error("the influence functions are missing")]
    MissingInfluenceFunctions,
    #[error("influence function #{layer} is {found:?} but the cube is {expected:?}")]
    InconsistentCube {
        layer: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("command length mismatch, expected {expected}, found {found}")]
    CommandLength { expected: usize, found: usize },
    #[error("{n_actuator} actuators is not supported by a transform generator of order {max}")]
    UnsupportedActuatorCount { n_actuator: usize, max: usize },
    #[error("the command basis transform is not invertible")]
    SingularTransform,
    #[error("linear fit needs at least 2 distinct amplitudes")]
    DegenerateFit,
    #[error("pseudo-inverse: {0}")]
    PseudoInverse(String),
    #[error("command has non-finite values")]
    NonFiniteCommand,
    #[error("command too large: {max:e} > {limit:e}")]
    CommandTooLarge { max: f64, limit: f64 },
    #[error("storage failure")]
    Store(#[from] StoreError),
    #[error("configuration failure")]
    Config(#[from] ConfigError),
    #[error("device failure")]
    Device(#[source] DeviceError),
}

impl CalibrationError {
    pub(crate) fn shape_mismatch(expected: (usize, usize), found: (usize, usize)) -> Self {
        Self::ShapeMismatch { expected, found }
    }
}
