//! # Wavefront to command conversion
//!
//! [Converter] turns a wavefront measured by the interferometer into a deformable mirror command.
//!
//! The analysis mask, the interaction matrix and the reconstructor are derived from the
//! influence functions and computed lazily.
//! Each time the analysis mask is set, the mask epoch is incremented; the interaction matrix
//! and the reconstructor are tagged with the epoch they have been computed for and are
//! recomputed when their epoch differs from the current one.
//!
//! # Examples
//!
//! ```
//! use dm_calibration::{
//!     AcquisitionBasis, Builder, Converter, FromBuilder, InfluenceFunctions, MaskedImage,
//! };
//! use nalgebra::DMatrix;
//!
//! let layers: Vec<_> = (0..3)
//!     .map(|k| MaskedImage::unmasked(DMatrix::from_fn(8, 8, |i, j| (i * 8 + j == 9 * k) as u8 as f64)))
//!     .collect();
//! let ifs = InfluenceFunctions::new("20240701_120000", layers, AcquisitionBasis::Zonal)?;
//! let wavefront = ifs.synthesize(&[1., 1., 1.])?;
//! let mut converter = Converter::builder().influence_functions(ifs).build()?;
//! let command = converter.convert(&wavefront)?;
//! assert!(command.iter().all(|c| (c - 1.).abs() < 1e-9));
//! # Ok::<(), dm_calibration::CalibrationError>(())
//! ```

use std::{fmt::Display, sync::Arc};

use nalgebra::{DMatrix, DVector};

use crate::{
    aberration,
    builders::ConverterBuilder,
    mask::{self, Mask},
    store::ArtifactSink,
    CalibrationError, CommandBasis, FromBuilder, InfluenceFunctions, InteractionMatrix,
    MaskedImage, ModalBase, Reconstructor, Result,
};

/// A value computed for a given analysis mask epoch
#[derive(Debug, Clone)]
struct Cached<T> {
    epoch: u64,
    value: T,
}

/// [Converter] cache state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterState {
    /// No analysis mask
    Created,
    /// The analysis mask is set but the interaction matrix or the reconstructor is out of date
    MaskSet,
    /// The interaction matrix and the reconstructor match the analysis mask
    Ready,
}

/// Wavefront to command converter
///
/// The converter is not meant to be shared between threads without synchronization:
/// setting the analysis mask while converting a wavefront would invalidate the reconstructor.
#[derive(Debug)]
pub struct Converter {
    ifs: Arc<InfluenceFunctions>,
    basis: CommandBasis,
    rcond: f64,
    master_mask: Mask,
    analysis_mask: Option<Mask>,
    epoch: u64,
    interaction: Option<Cached<InteractionMatrix>>,
    reconstructor: Option<Cached<Reconstructor>>,
    n_interaction_builds: usize,
    n_reconstructor_builds: usize,
}

impl FromBuilder for Converter {
    type ComponentBuilder = ConverterBuilder;
}

impl Converter {
    pub(crate) fn new(
        ifs: Arc<InfluenceFunctions>,
        basis: CommandBasis,
        rcond: f64,
    ) -> Result<Self> {
        let master_mask = ifs.master_mask()?;
        log::info!("{} with a {}", ifs, basis);
        Ok(Self {
            ifs,
            basis,
            rcond,
            master_mask,
            analysis_mask: None,
            epoch: 0,
            interaction: None,
            reconstructor: None,
            n_interaction_builds: 0,
            n_reconstructor_builds: 0,
        })
    }
    /// Returns the influence functions
    pub fn influence_functions(&self) -> &InfluenceFunctions {
        &self.ifs
    }
    /// Returns the command basis
    pub fn basis(&self) -> &CommandBasis {
        &self.basis
    }
    /// Returns the number of actuators
    pub fn n_actuator(&self) -> usize {
        self.ifs.n_actuator()
    }
    /// Returns the relative singular values cutoff of the reconstructor
    pub fn rcond(&self) -> f64 {
        self.rcond
    }
    /// Returns the master mask of the influence functions
    pub fn master_mask(&self) -> &Mask {
        &self.master_mask
    }
    /// Returns the analysis mask, if any
    pub fn analysis_mask(&self) -> Option<&Mask> {
        self.analysis_mask.as_ref()
    }
    /// Sets the analysis mask
    ///
    /// The interaction matrix and the reconstructor are invalidated
    pub fn set_analysis_mask(&mut self, analysis_mask: Mask) -> &mut Self {
        self.analysis_mask = Some(analysis_mask);
        self.epoch += 1;
        log::debug!("analysis mask epoch: {}", self.epoch);
        self
    }
    /// Sets the analysis mask to the master mask
    pub fn set_analysis_mask_from_master_mask(&mut self) -> &mut Self {
        self.set_analysis_mask(self.master_mask.clone())
    }
    fn ensure_analysis_mask(&mut self) {
        if self.analysis_mask.is_none() {
            self.set_analysis_mask_from_master_mask();
        }
    }
    /// Returns the cache state
    pub fn state(&self) -> ConverterState {
        let fresh = |epoch: Option<u64>| epoch == Some(self.epoch);
        match self.analysis_mask {
            None => ConverterState::Created,
            Some(_)
                if fresh(self.interaction.as_ref().map(|c| c.epoch))
                    && fresh(self.reconstructor.as_ref().map(|c| c.epoch)) =>
            {
                ConverterState::Ready
            }
            Some(_) => ConverterState::MaskSet,
        }
    }
    /// Returns the number of times the interaction matrix has been computed
    pub fn n_interaction_builds(&self) -> usize {
        self.n_interaction_builds
    }
    /// Returns the number of times the reconstructor has been computed
    pub fn n_reconstructor_builds(&self) -> usize {
        self.n_reconstructor_builds
    }
    /// Returns the interaction matrix
    ///
    /// The interaction matrix is computed if it does not exist or if the analysis mask has changed.
    /// If the analysis mask is not set, it is set to the master mask.
    pub fn interaction_matrix(&mut self) -> Result<&InteractionMatrix> {
        self.ensure_analysis_mask();
        let epoch = self.epoch;
        let cached = match self.interaction.take() {
            Some(cached) if cached.epoch == epoch => cached,
            _ => {
                let analysis_mask = self.analysis_mask.as_ref().unwrap_or(&self.master_mask);
                let value = InteractionMatrix::build(&self.ifs, analysis_mask)?;
                self.n_interaction_builds += 1;
                log::info!("{}", value);
                Cached { epoch, value }
            }
        };
        Ok(&self.interaction.insert(cached).value)
    }
    /// Returns the reconstructor, the pseudo-inverse of the interaction matrix
    ///
    /// The reconstructor is computed if it does not exist or if the analysis mask has changed.
    pub fn reconstructor(&mut self) -> Result<&Reconstructor> {
        self.ensure_analysis_mask();
        let epoch = self.epoch;
        let cached = match self.reconstructor.take() {
            Some(cached) if cached.epoch == epoch => cached,
            _ => {
                let rcond = self.rcond;
                let value = Reconstructor::new(self.interaction_matrix()?, rcond)?;
                self.n_reconstructor_builds += 1;
                log::info!("{}", value);
                Cached { epoch, value }
            }
        };
        Ok(&self.reconstructor.insert(cached).value)
    }
    pub(crate) fn check_shape(&self, shape: (usize, usize)) -> Result<()> {
        let expected = self.ifs.image_shape();
        if shape != expected {
            return Err(CalibrationError::shape_mismatch(expected, shape));
        }
        Ok(())
    }
    /// Converts a wavefront into a mirror command
    ///
    /// The analysis mask is set to the union of the wavefront mask and of the master mask,
    /// the interaction matrix and the reconstructor are reused if the analysis mask is unchanged.
    pub fn convert(&mut self, wavefront: &MaskedImage) -> Result<DVector<f64>> {
        self.check_shape(wavefront.shape())?;
        let analysis_mask = mask::combine(wavefront.mask(), &self.master_mask)?;
        let samples = mask::compress(wavefront.data(), &analysis_mask)?;
        if samples.is_empty() {
            return Err(CalibrationError::NoValidSamples);
        }
        if self.analysis_mask.as_ref() != Some(&analysis_mask) {
            self.set_analysis_mask(analysis_mask);
        }
        let zonal = self.reconstructor()?.solve(&samples)?;
        self.basis.to_commanded(zonal)
    }
    /// Returns the mirror commands of the first `n_mode` Zernike modes
    ///
    /// The Zernike modes are defined on the valid pixels of `mask`, or of the master mask if `mask` is `None`,
    /// and the analysis mask is set accordingly.
    /// The commands are the columns of the returned `[n_actuator x n_mode]` matrix.
    pub fn zernike_commands(&mut self, n_mode: usize, mask: Option<Mask>) -> Result<DMatrix<f64>> {
        match mask {
            Some(mask) => {
                self.check_shape(mask.shape())?;
                self.set_analysis_mask(mask);
            }
            None => {
                self.set_analysis_mask_from_master_mask();
            }
        }
        let surfaces = match self.analysis_mask.as_ref() {
            Some(analysis_mask) => aberration::zernike_surfaces(n_mode, analysis_mask)?,
            None => aberration::zernike_surfaces(n_mode, &self.master_mask)?,
        };
        let reconstructor = self.reconstructor()?;
        let zonal = surfaces
            .iter()
            .map(|surface| reconstructor.solve(surface))
            .collect::<Result<Vec<_>>>()?;
        let commands = zonal
            .into_iter()
            .map(|c| self.basis.to_commanded(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(DMatrix::from_iterator(
            self.n_actuator(),
            n_mode,
            commands.iter().flat_map(|c| c.iter().cloned()),
        ))
    }
    /// Saves a command matrix with a reference to the influence functions tracking number
    pub fn save_modal_base<S, T>(&self, sink: &mut S, tag: T, matrix: DMatrix<f64>) -> Result<()>
    where
        S: ArtifactSink,
        T: Into<String>,
    {
        let base = ModalBase::new(tag, matrix).iftn(self.ifs.tracking_number());
        sink.save_artifact(&base)?;
        Ok(())
    }
}

impl Display for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "CONVERTER ({:?}):", self.state())?;
        writeln!(f, " * {}", self.ifs)?;
        writeln!(f, " * {}", self.basis)?;
        if let Some(mask) = &self.analysis_mask {
            writeln!(f, " * analysis mask: {} valid pixels", mask::n_valid(mask))?;
        }
        if let Some(Cached { value, .. }) = &self.reconstructor {
            writeln!(f, " * {}", value)?;
        }
        Ok(())
    }
}
