//! # Mirror flattening
//!
//! Measures the mirror wavefront with the interferometer, converts it into a command
//! and subtracts it from the current mirror command.

use std::{thread, time::Duration};

use indicatif::ProgressBar;
use nalgebra::DVector;

use crate::{
    builders::FlatteningBuilder,
    store::{DeformableMirror, Interferometer},
    CalibrationError, Converter, FromBuilder, MaskedImage, Result,
};

/// Flattening step record
#[derive(Debug, Clone)]
pub struct FlatteningReport {
    /// Wavefront before flattening
    pub initial: MaskedImage,
    /// Command computed from the initial wavefront
    pub delta: DVector<f64>,
    /// Command applied to the mirror
    pub command: DVector<f64>,
    /// Wavefront after flattening
    pub flat: MaskedImage,
}

impl FlatteningReport {
    /// Root mean square of the valid samples of the initial and of the flat wavefronts
    pub fn wfe_rms(&self) -> Result<(f64, f64)> {
        Ok((rms(&self.initial)?, rms(&self.flat)?))
    }
}

fn rms(wavefront: &MaskedImage) -> Result<f64> {
    let samples = wavefront.compressed()?;
    if samples.is_empty() {
        return Ok(0.);
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    Ok((samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt())
}

/// Deformable mirror flattening
pub struct Flattening {
    pub(crate) converter: Converter,
    pub(crate) max_command: f64,
    pub(crate) n_iteration: usize,
    pub(crate) delay: Duration,
}

impl FromBuilder for Flattening {
    type ComponentBuilder = FlatteningBuilder;
}

impl Flattening {
    /// Returns the converter
    pub fn converter(&mut self) -> &mut Converter {
        &mut self.converter
    }
    /// Performs one flattening step
    ///
    /// The mirror is left untouched if the command has non-finite values
    /// or if the largest absolute command exceeds the maximum command.
    pub fn step<D, I>(&mut self, dm: &mut D, interferometer: &mut I) -> Result<FlatteningReport>
    where
        D: DeformableMirror,
        I: Interferometer,
    {
        if dm.n_actuator() != self.converter.n_actuator() {
            return Err(CalibrationError::CommandLength {
                expected: self.converter.n_actuator(),
                found: dm.n_actuator(),
            });
        }
        let initial = interferometer
            .wavefront()
            .map_err(CalibrationError::Device)?;
        let delta = self.converter.convert(&initial)?;
        let shape = DVector::from_vec(dm.shape().map_err(CalibrationError::Device)?);
        if shape.len() != delta.len() {
            return Err(CalibrationError::CommandLength {
                expected: delta.len(),
                found: shape.len(),
            });
        }
        let command = shape - &delta;
        if command.iter().any(|c| !c.is_finite()) {
            return Err(CalibrationError::NonFiniteCommand);
        }
        let max = command.amax();
        log::info!("max command: {:e}", max);
        if max > self.max_command {
            return Err(CalibrationError::CommandTooLarge {
                max,
                limit: self.max_command,
            });
        }
        dm.set_shape(command.as_slice())
            .map_err(CalibrationError::Device)?;
        let flat = interferometer
            .wavefront()
            .map_err(CalibrationError::Device)?;
        self.converter.check_shape(flat.shape())?;
        let report = FlatteningReport {
            initial,
            delta,
            command,
            flat,
        };
        let (before, after) = report.wfe_rms()?;
        log::info!("WFE RMS: {:e} -> {:e}", before, after);
        Ok(report)
    }
    /// Repeats the flattening step
    ///
    /// The loop stops at the first error
    pub fn close_loop<D, I>(
        &mut self,
        dm: &mut D,
        interferometer: &mut I,
        pb: Option<ProgressBar>,
    ) -> Result<Vec<FlatteningReport>>
    where
        D: DeformableMirror,
        I: Interferometer,
    {
        let mut reports = Vec::with_capacity(self.n_iteration);
        for i in 0..self.n_iteration {
            if i > 0 && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            reports.push(self.step(dm, interferometer)?);
            if let Some(pb) = pb.as_ref() {
                pb.inc(1);
            }
        }
        if let Some(pb) = pb.as_ref() {
            pb.finish();
        }
        Ok(reports)
    }
}
