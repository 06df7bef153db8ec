//! # Mask algebra
//!
//! Masks are boolean matrices where `true` flags an invalid pixel.
//!
//! All the conversions between a 2D image and the vector of its valid samples
//! go through [compress]: the valid pixels are visited in row-major order
//! (row by row, left to right) both when the interaction matrix columns are
//! built and when a wavefront is projected onto the reconstructor.

use nalgebra::DMatrix;

use crate::{CalibrationError, Result};

/// Pixel validity mask, `true` for invalid pixels
pub type Mask = DMatrix<bool>;

/// Returns the master mask of a set of masks
///
/// A pixel of the master mask is invalid if it is invalid in at least one of the masks.
/// All the masks must have the same shape.
pub fn master_mask<'a>(masks: impl IntoIterator<Item = &'a Mask>) -> Result<Mask> {
    let mut masks = masks.into_iter();
    let first = masks.next().ok_or(CalibrationError::EmptyCube)?;
    masks.try_fold(first.clone(), |master, mask| combine(mask, &master))
}

/// Combines two masks with the logical OR operator
pub fn combine(mask: &Mask, other: &Mask) -> Result<Mask> {
    if mask.shape() != other.shape() {
        return Err(CalibrationError::shape_mismatch(other.shape(), mask.shape()));
    }
    Ok(mask.zip_map(other, |a, b| a || b))
}

/// Returns a mask with every pixel valid
pub fn unmasked(shape: (usize, usize)) -> Mask {
    Mask::from_element(shape.0, shape.1, false)
}

/// Returns the number of valid pixels
pub fn n_valid(mask: &Mask) -> usize {
    mask.iter().filter(|&&invalid| !invalid).count()
}

/// Iterates over the `(row, column)` indices of the valid pixels in row-major order
pub fn valid_pixels(mask: &Mask) -> impl Iterator<Item = (usize, usize)> + '_ {
    let (nrows, ncols) = mask.shape();
    (0..nrows)
        .flat_map(move |i| (0..ncols).map(move |j| (i, j)))
        .filter(move |&ij| !mask[ij])
}

/// Returns the values of `data` at the valid pixels of `mask`
///
/// The samples are ordered according to [valid_pixels].
pub fn compress(data: &DMatrix<f64>, mask: &Mask) -> Result<Vec<f64>> {
    if data.shape() != mask.shape() {
        return Err(CalibrationError::shape_mismatch(mask.shape(), data.shape()));
    }
    Ok(valid_pixels(mask).map(|ij| data[ij]).collect())
}
