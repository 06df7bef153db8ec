use std::{cell::RefCell, rc::Rc};

use dm_calibration::{
    error::DeviceError,
    store::{ArtifactSink, DeformableMirror, Interferometer, MemoryStore},
    AcquisitionBasis, Builder, CalibrationError, Converter, Flattening, FromBuilder,
    InfluenceFunctions, MaskedImage,
};
use nalgebra::DMatrix;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn gaussians(n_side: usize, n_px: usize) -> InfluenceFunctions {
    let pitch = n_px as f64 / n_side as f64;
    let layers = (0..n_side * n_side)
        .map(|k| {
            let (yc, xc) = (
                pitch * ((k / n_side) as f64 + 0.5),
                pitch * ((k % n_side) as f64 + 0.5),
            );
            MaskedImage::unmasked(DMatrix::<f64>::from_fn(n_px, n_px, |i, j| {
                let r2 = (i as f64 - yc).powi(2) + (j as f64 - xc).powi(2);
                (-r2 / pitch.powi(2)).exp()
            }))
        })
        .collect();
    InfluenceFunctions::new("20240701_120000", layers, AcquisitionBasis::Zonal).unwrap()
}

/// Mirror sharing its command with the interferometer
struct Mirror(Rc<RefCell<Vec<f64>>>);
impl DeformableMirror for Mirror {
    fn n_actuator(&self) -> usize {
        self.0.borrow().len()
    }
    fn shape(&mut self) -> Result<Vec<f64>, DeviceError> {
        Ok(self.0.borrow().clone())
    }
    fn set_shape(&mut self, command: &[f64]) -> Result<(), DeviceError> {
        self.0.borrow_mut().copy_from_slice(command);
        Ok(())
    }
}

/// Interferometer seeing the mirror surface plus a static aberration
struct Bench {
    ifs: InfluenceFunctions,
    aberration: Vec<f64>,
    command: Rc<RefCell<Vec<f64>>>,
}
impl Interferometer for Bench {
    fn wavefront(&mut self) -> Result<MaskedImage, DeviceError> {
        let c: Vec<f64> = self
            .command
            .borrow()
            .iter()
            .zip(&self.aberration)
            .map(|(c, a)| c + a)
            .collect();
        Ok(self.ifs.synthesize(&c)?)
    }
}

/// Interferometer replaying recorded wavefronts
struct Replay(Vec<MaskedImage>);
impl Interferometer for Replay {
    fn wavefront(&mut self) -> Result<MaskedImage, DeviceError> {
        if self.0.is_empty() {
            return Err("no more wavefronts".into());
        }
        Ok(self.0.remove(0))
    }
}

fn setup(aberration: Vec<f64>) -> (Mirror, Bench) {
    let command = Rc::new(RefCell::new(vec![0f64; aberration.len()]));
    (
        Mirror(command.clone()),
        Bench {
            ifs: gaussians(3, 24),
            aberration,
            command,
        },
    )
}

#[test]
fn flatten() -> anyhow::Result<()> {
    init();
    let aberration: Vec<f64> = (0..9).map(|k| 0.1 * (k as f64 - 4.)).collect();
    let (mut dm, mut bench) = setup(aberration.clone());
    let mut flattening = Flattening::builder()
        .influence_functions(gaussians(3, 24))
        .n_iteration(2)
        .build()?;
    let reports = flattening.close_loop(&mut dm, &mut bench, None)?;
    assert_eq!(reports.len(), 2);
    let (before, after) = reports[0].wfe_rms()?;
    assert!(after < before * 1e-6);
    let command = dm.shape().unwrap();
    command
        .iter()
        .zip(&aberration)
        .for_each(|(c, a)| assert!((c + a).abs() < 1e-6));
    Ok(())
}

#[test]
fn command_too_large() -> anyhow::Result<()> {
    init();
    let (mut dm, mut bench) = setup(vec![2.; 9]);
    let mut flattening = Flattening::builder()
        .influence_functions(gaussians(3, 24))
        .max_command(1.)
        .build()?;
    assert!(matches!(
        flattening.step(&mut dm, &mut bench),
        Err(CalibrationError::CommandTooLarge { .. })
    ));
    assert!(dm.shape().unwrap().iter().all(|c| *c == 0.));
    Ok(())
}

#[test]
fn mirror_size_mismatch() -> anyhow::Result<()> {
    init();
    let (_, mut bench) = setup(vec![0.; 9]);
    let mut dm = Mirror(Rc::new(RefCell::new(vec![0.; 4])));
    let mut flattening = Flattening::builder()
        .influence_functions(gaussians(3, 24))
        .build()?;
    assert!(matches!(
        flattening.step(&mut dm, &mut bench),
        Err(CalibrationError::CommandLength {
            expected: 9,
            found: 4
        })
    ));
    Ok(())
}

#[test]
fn zernike_modal_base() -> anyhow::Result<()> {
    init();
    let mut converter = Converter::builder()
        .influence_functions(gaussians(4, 32))
        .build()?;
    let z = converter.zernike_commands(6, None)?;
    assert_eq!(z.shape(), (16, 6));
    assert!(z.column(0).sum() > 0.);

    let mut store = MemoryStore::default();
    converter.save_modal_base(&mut store, "zernike", z.clone())?;
    let saved = store.artifact("zernike").unwrap();
    assert_eq!(saved.iftn.as_deref(), Some("20240701_120000"));
    assert_eq!(saved.matrix, z);

    let mut other = MemoryStore::default();
    let zonal = dm_calibration::ModalBase::zonal("zonal", 16);
    other.save_artifact(&zonal)?;
    assert_eq!(other.artifact("zonal").map(|m| m.matrix.shape()), Some((16, 16)));
    Ok(())
}

#[test]
fn non_finite_command() -> anyhow::Result<()> {
    init();
    let ifs = gaussians(3, 24);
    let (mut data, mask) = ifs.synthesize(&[0.1; 9])?.into_parts();
    data[(0, 0)] = f64::NAN;
    let mut interferometer = Replay(vec![MaskedImage::new(data, mask)?]);
    let mut dm = Mirror(Rc::new(RefCell::new(vec![0.; 9])));
    let mut flattening = Flattening::builder()
        .influence_functions(ifs)
        .max_command(1.)
        .build()?;
    assert!(matches!(
        flattening.step(&mut dm, &mut interferometer),
        Err(CalibrationError::NonFiniteCommand)
    ));
    assert!(dm.shape().unwrap().iter().all(|c| *c == 0.));
    Ok(())
}

#[test]
fn flat_wavefront_shape_mismatch() -> anyhow::Result<()> {
    init();
    let ifs = gaussians(3, 24);
    let mut interferometer = Replay(vec![
        ifs.synthesize(&[0.1; 9])?,
        MaskedImage::unmasked(DMatrix::zeros(24, 23)),
    ]);
    let mut dm = Mirror(Rc::new(RefCell::new(vec![0.; 9])));
    let mut flattening = Flattening::builder().influence_functions(ifs).build()?;
    assert!(matches!(
        flattening.step(&mut dm, &mut interferometer),
        Err(CalibrationError::ShapeMismatch {
            expected: (24, 24),
            found: (24, 23)
        })
    ));
    Ok(())
}
