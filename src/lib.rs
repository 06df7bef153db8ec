//!
//! # Deformable mirror calibration
//!
//! Derives the command reconstructor of a deformable mirror from the influence functions
//! measured with an interferometer.
//!
//! The [Converter] holds the [InfluenceFunctions] and computes on demand:
//!  * the master mask, union of the influence functions masks,
//!  * the analysis mask, the master mask possibly combined with a wavefront mask,
//!  * the [InteractionMatrix], the influence functions restricted to the analysis mask,
//!  * the [Reconstructor], the pseudo-inverse of the interaction matrix.
//!
//! The reconstructed commands are mapped into the [CommandBasis] used to acquire the
//! influence functions.
//!
//! ```
//! use dm_calibration::{
//!     AcquisitionBasis, Builder, Converter, FromBuilder, InfluenceFunctions, MaskedImage,
//! };
//! use nalgebra::DMatrix;
//!
//! let layers: Vec<_> = (0..4)
//!     .map(|k| MaskedImage::unmasked(DMatrix::from_fn(4, 4, |i, j| ((i + j * k) % 3) as f64)))
//!     .collect();
//! let ifs = InfluenceFunctions::new("20240701_120000", layers, AcquisitionBasis::Hadamard)?;
//! let wavefront = ifs.synthesize(&[0.; 4])?;
//! let mut converter = Converter::builder().influence_functions(ifs).build()?;
//! let command = converter.convert(&wavefront)?;
//! assert_eq!(command.len(), 4);
//! # Ok::<(), dm_calibration::CalibrationError>(())
//! ```

pub mod aberration;
pub mod basis;
pub mod builders;
pub mod converter;
pub mod error;
pub mod flattening;
pub mod influence_functions;
pub mod interaction;
pub mod linearity;
pub mod mask;
pub mod reconstructor;
pub mod store;

#[doc(inline)]
pub use self::basis::{BasisTransform, CommandBasis, ModalBase};
#[doc(inline)]
pub use self::builders::{ConverterBuilder, FlatteningBuilder};
#[doc(inline)]
pub use self::converter::{Converter, ConverterState};
#[doc(inline)]
pub use self::error::CalibrationError;
#[doc(inline)]
pub use self::flattening::{Flattening, FlatteningReport};
#[doc(inline)]
pub use self::influence_functions::{AcquisitionBasis, InfluenceFunctions, MaskedImage};
#[doc(inline)]
pub use self::interaction::InteractionMatrix;
#[doc(inline)]
pub use self::linearity::LinearityFit;
#[doc(inline)]
pub use self::mask::Mask;
#[doc(inline)]
pub use self::reconstructor::Reconstructor;

pub type Result<T> = std::result::Result<T, CalibrationError>;

/// Builder type trait
pub trait Builder: Default {
    type Component;
    fn new() -> Self {
        Default::default()
    }
    fn build(self) -> Result<Self::Component>;
}

/// Access to the builder of a component
pub trait FromBuilder {
    type ComponentBuilder: Builder;
    fn builder() -> Self::ComponentBuilder {
        Self::ComponentBuilder::new()
    }
}
