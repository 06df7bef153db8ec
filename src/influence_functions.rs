//! # Influence functions
//!
//! The deformable mirror influence functions are stored as a cube of
//! [MaskedImage]s, one per actuator (or per mode of the acquisition basis).

use std::fmt::Display;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{
    mask::{self, Mask},
    CalibrationError, Result,
};

/// An image with a validity mask, `true` mask values flag invalid pixels
///
/// The data and the mask always have the same shape, deserialization included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMaskedImage")]
pub struct MaskedImage {
    data: DMatrix<f64>,
    mask: Mask,
}

#[derive(Deserialize)]
struct RawMaskedImage {
    data: DMatrix<f64>,
    mask: Mask,
}

impl TryFrom<RawMaskedImage> for MaskedImage {
    type Error = CalibrationError;

    fn try_from(RawMaskedImage { data, mask }: RawMaskedImage) -> Result<Self> {
        Self::new(data, mask)
    }
}

impl MaskedImage {
    /// Creates a new masked image
    ///
    /// The data and the mask must have the same shape
    pub fn new(data: DMatrix<f64>, mask: Mask) -> Result<Self> {
        if data.shape() != mask.shape() {
            return Err(CalibrationError::shape_mismatch(data.shape(), mask.shape()));
        }
        Ok(Self { data, mask })
    }
    /// Creates a masked image with all pixels valid
    pub fn unmasked(data: DMatrix<f64>) -> Self {
        let mask = mask::unmasked(data.shape());
        Self { data, mask }
    }
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }
    pub fn mask(&self) -> &Mask {
        &self.mask
    }
    /// Returns the data and the mask
    pub fn into_parts(self) -> (DMatrix<f64>, Mask) {
        (self.data, self.mask)
    }
    /// Flags the pixel `(row, column)` as invalid, pixels outside the image are ignored
    pub fn invalidate(&mut self, ij: (usize, usize)) -> &mut Self {
        if let Some(invalid) = self.mask.get_mut(ij) {
            *invalid = true;
        }
        self
    }
    /// Returns the number of rows and columns
    pub fn shape(&self) -> (usize, usize) {
        self.data.shape()
    }
    /// Returns the number of valid pixels
    pub fn n_valid(&self) -> usize {
        mask::n_valid(&self.mask)
    }
    /// Returns the valid samples, ordered as [mask::compress]
    pub fn compressed(&self) -> Result<Vec<f64>> {
        mask::compress(&self.data, &self.mask)
    }
}

/// Basis of the commands applied to the mirror when the influence functions were acquired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionBasis {
    #[default]
    Zonal,
    Hadamard,
}

impl Display for AcquisitionBasis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionBasis::Zonal => f.write_str("zonal"),
            AcquisitionBasis::Hadamard => f.write_str("hadamard"),
        }
    }
}

/// Influence functions cube
///
/// The layers are ordered by actuator index and share the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawInfluenceFunctions")]
pub struct InfluenceFunctions {
    tracking_number: String,
    layers: Vec<MaskedImage>,
    basis: AcquisitionBasis,
}

#[derive(Deserialize)]
struct RawInfluenceFunctions {
    tracking_number: String,
    layers: Vec<MaskedImage>,
    basis: AcquisitionBasis,
}

impl TryFrom<RawInfluenceFunctions> for InfluenceFunctions {
    type Error = CalibrationError;

    fn try_from(raw: RawInfluenceFunctions) -> Result<Self> {
        Self::new(raw.tracking_number, raw.layers, raw.basis)
    }
}

impl InfluenceFunctions {
    /// Creates a new influence functions cube
    pub fn new<S: Into<String>>(
        tracking_number: S,
        layers: Vec<MaskedImage>,
        basis: AcquisitionBasis,
    ) -> Result<Self> {
        let expected = layers.first().ok_or(CalibrationError::EmptyCube)?.shape();
        for (layer, image) in layers.iter().enumerate() {
            let found = image.shape();
            if found != expected || image.mask.shape() != expected {
                return Err(CalibrationError::InconsistentCube {
                    layer,
                    expected,
                    found,
                });
            }
        }
        Ok(Self {
            tracking_number: tracking_number.into(),
            layers,
            basis,
        })
    }
    /// Returns the tracking number of the influence functions acquisition
    pub fn tracking_number(&self) -> &str {
        &self.tracking_number
    }
    /// Returns the acquisition basis
    pub fn basis(&self) -> AcquisitionBasis {
        self.basis
    }
    /// Returns the number of actuators
    pub fn n_actuator(&self) -> usize {
        self.layers.len()
    }
    /// Returns the shape of the influence function images
    pub fn image_shape(&self) -> (usize, usize) {
        self.layers.first().map(MaskedImage::shape).unwrap_or_default()
    }
    /// Returns the influence function of actuator `i`
    pub fn layer(&self, i: usize) -> Option<&MaskedImage> {
        self.layers.get(i)
    }
    /// Iterates over the influence functions
    pub fn iter(&self) -> impl Iterator<Item = &MaskedImage> {
        self.layers.iter()
    }
    pub(crate) fn layers(&self) -> &[MaskedImage] {
        &self.layers
    }
    /// Returns the master mask
    ///
    /// A pixel is invalid if it is invalid for at least one actuator
    pub fn master_mask(&self) -> Result<Mask> {
        mask::master_mask(self.layers.iter().map(MaskedImage::mask))
    }
    /// Returns the wavefront that results from applying the zonal command `c`
    ///
    /// The wavefront is the linear combination of the influence functions weighted by
    /// the command, masked with the master mask
    pub fn synthesize(&self, c: &[f64]) -> Result<MaskedImage> {
        if c.len() != self.n_actuator() {
            return Err(CalibrationError::CommandLength {
                expected: self.n_actuator(),
                found: c.len(),
            });
        }
        let (nrows, ncols) = self.image_shape();
        let data = self
            .layers
            .iter()
            .zip(c)
            .fold(DMatrix::<f64>::zeros(nrows, ncols), |wf, (layer, &ci)| {
                wf + &layer.data * ci
            });
        Ok(MaskedImage {
            data,
            mask: self.master_mask()?,
        })
    }
}

impl Display for InfluenceFunctions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Influence functions {}: {} x {:?} ({} basis)",
            self.tracking_number,
            self.n_actuator(),
            self.image_shape(),
            self.basis
        )
    }
}
