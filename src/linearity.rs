//! # Actuator linearity
//!
//! Linear fit of the actuator responses measured for a set of command amplitudes.

use nalgebra::DMatrix;

use crate::{mask, CalibrationError, MaskedImage, Result};

/// Mean of the valid pixels within `half_width` pixels of the image maximum
pub fn peak_response(image: &MaskedImage, half_width: usize) -> Result<f64> {
    let (data, mask) = (image.data(), image.mask());
    let (i0, j0) = mask::valid_pixels(mask)
        .max_by(|&a, &b| data[a].total_cmp(&data[b]))
        .ok_or(CalibrationError::NoValidSamples)?;
    let (nrows, ncols) = image.shape();
    let rows = i0.saturating_sub(half_width)..(i0 + half_width).min(nrows);
    let cols = j0.saturating_sub(half_width)..(j0 + half_width).min(ncols);
    let (sum, n) = rows
        .flat_map(|i| cols.clone().map(move |j| (i, j)))
        .filter(|&ij| !mask[ij])
        .fold((0f64, 0usize), |(sum, n), ij| (sum + data[ij], n + 1));
    if n == 0 {
        return Err(CalibrationError::NoValidSamples);
    }
    Ok(sum / n as f64)
}

/// Builds the `[n_amplitude x n_actuator]` matrix of the actuator responses
///
/// The images are ordered amplitude first: image `i * n_actuator + j` is the response
/// of actuator `j` to amplitude `amplitudes[i]`, normalized by that amplitude.
pub fn response_matrix(
    amplitudes: &[f64],
    images: &[MaskedImage],
    half_width: usize,
) -> Result<DMatrix<f64>> {
    let n_amplitude = amplitudes.len();
    if n_amplitude == 0 || images.len() % n_amplitude != 0 {
        return Err(CalibrationError::CommandLength {
            expected: n_amplitude,
            found: images.len(),
        });
    }
    let n_actuator = images.len() / n_amplitude;
    let mut responses = DMatrix::<f64>::zeros(n_amplitude, n_actuator);
    for (k, image) in images.iter().enumerate() {
        let (i, j) = (k / n_actuator, k % n_actuator);
        responses[(i, j)] = peak_response(image, half_width)? * amplitudes[i];
    }
    Ok(responses)
}

/// Per actuator linear fit of the responses versus the amplitudes
#[derive(Debug, Clone)]
pub struct LinearityFit {
    /// Fitted slopes
    pub slope: Vec<f64>,
    /// Fitted intercepts
    pub intercept: Vec<f64>,
    /// Fitted responses `[n_amplitude x n_actuator]`
    pub fit: DMatrix<f64>,
    /// Residuals `[n_amplitude x n_actuator]`
    pub residuals: DMatrix<f64>,
    /// Standard deviation of the residuals
    pub rms: Vec<f64>,
}

impl LinearityFit {
    /// Fits a line to each column of `responses`
    pub fn fit(amplitudes: &[f64], responses: &DMatrix<f64>) -> Result<Self> {
        let n = amplitudes.len();
        if responses.nrows() != n {
            return Err(CalibrationError::shape_mismatch(
                (n, responses.ncols()),
                responses.shape(),
            ));
        }
        let nf = n as f64;
        let x_mean = amplitudes.iter().sum::<f64>() / nf;
        let sxx: f64 = amplitudes.iter().map(|x| (x - x_mean).powi(2)).sum();
        if n < 2 || sxx == 0. {
            return Err(CalibrationError::DegenerateFit);
        }
        let (slope, intercept): (Vec<f64>, Vec<f64>) = responses
            .column_iter()
            .map(|y| {
                let y_mean = y.sum() / nf;
                let sxy: f64 = amplitudes
                    .iter()
                    .zip(y.iter())
                    .map(|(x, y)| (x - x_mean) * (y - y_mean))
                    .sum();
                let a = sxy / sxx;
                (a, y_mean - a * x_mean)
            })
            .unzip();
        let fit = DMatrix::from_fn(n, responses.ncols(), |i, j| {
            slope[j] * amplitudes[i] + intercept[j]
        });
        let residuals = responses - &fit;
        let rms = residuals
            .column_iter()
            .map(|r| {
                let mean = r.sum() / nf;
                (r.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / nf).sqrt()
            })
            .collect();
        Ok(Self {
            slope,
            intercept,
            fit,
            residuals,
            rms,
        })
    }
}
