//! # Low-order aberrations
//!
//! Zernike polynomials sampled on the valid pixels of a mask.

use crate::{
    mask::{self, Mask},
    CalibrationError, Result,
};

/// Returns the number of radial orders that contains at least `n_mode` Zernike polynomials
fn n_radial_order(n_mode: usize) -> usize {
    let mut n = 0;
    while n * (n + 1) / 2 < n_mode {
        n += 1;
    }
    n
}

/// Polar coordinates of the valid pixels of the mask
///
/// The unit disk is centered on and spans the bounding box of the valid pixels
pub fn polar_coordinates(mask: &Mask) -> Result<Vec<(f64, f64)>> {
    let pixels: Vec<_> = mask::valid_pixels(mask).collect();
    let Some(&(i0, j0)) = pixels.first() else {
        return Err(CalibrationError::NoValidSamples);
    };
    let (i_min, i_max, j_min, j_max) = pixels.iter().fold(
        (i0, i0, j0, j0),
        |(i_min, i_max, j_min, j_max), &(i, j)| (i_min.min(i), i_max.max(i), j_min.min(j), j_max.max(j)),
    );
    let yc = 0.5 * (i_min + i_max) as f64;
    let xc = 0.5 * (j_min + j_max) as f64;
    let radius = match 0.5 * (i_max - i_min).max(j_max - j_min) as f64 {
        r if r > 0. => r,
        _ => 1.,
    };
    Ok(pixels
        .into_iter()
        .map(|(i, j)| {
            let x = (j as f64 - xc) / radius;
            let y = (i as f64 - yc) / radius;
            (x.hypot(y), y.atan2(x))
        })
        .collect())
}

/// Returns the first `n_mode` Zernike polynomials (Noll ordering) sampled on the valid pixels of the mask
///
/// Each surface is ordered like [mask::compress]
pub fn zernike_surfaces(n_mode: usize, mask: &Mask) -> Result<Vec<Vec<f64>>> {
    let coordinates = polar_coordinates(mask)?;
    if n_mode == 0 {
        return Ok(vec![]);
    }
    let (j, n, m) = zernike::jnm(n_radial_order(n_mode) as u32);
    Ok(j.into_iter()
        .zip(n.into_iter())
        .zip(m.into_iter())
        .take(n_mode)
        .map(|((j, n), m)| {
            coordinates
                .iter()
                .map(|&(r, o)| zernike::zernike(j, n, m, r, o))
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radial_orders() {
        assert_eq!(n_radial_order(1), 1);
        assert_eq!(n_radial_order(3), 2);
        assert_eq!(n_radial_order(4), 3);
        assert_eq!(n_radial_order(10), 4);
    }

    #[test]
    fn piston_is_constant() {
        let mask = mask::unmasked((9, 9));
        let surfaces = zernike_surfaces(3, &mask).unwrap();
        assert_eq!(surfaces.len(), 3);
        assert!(surfaces.iter().all(|s| s.len() == 81));
        let p0 = surfaces[0][0];
        assert!(surfaces[0].iter().all(|p| (p - p0).abs() < 1e-12));
        // tip and tilt are odd
        assert!((surfaces[1].iter().sum::<f64>()).abs() < 1e-9);
        assert!((surfaces[2].iter().sum::<f64>()).abs() < 1e-9);
    }

    #[test]
    fn fully_masked() {
        let mask = Mask::from_element(4, 4, true);
        assert!(matches!(
            zernike_surfaces(3, &mask),
            Err(CalibrationError::NoValidSamples)
        ));
    }
}
