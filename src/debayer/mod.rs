//! Debayering: reconstructing three color components per pixel from the
//! single-component CFA raster.
//!
//! Both interpolators run after a shared pre-pass that subtracts black
//! levels, applies white-balance multipliers, and scatters each sample into
//! its color slot of a four-component scratch plane (red, first green,
//! second green, blue). Only the RG/GB filter layout is supported.

mod bilinear;
mod lmmse;

use log::debug;
use num_enum::TryFromPrimitive;

use crate::constants::bayer_color;
use crate::error::RawError;
use crate::SensorPlane;

/// Interpolation algorithms, numbered as the host metadata encodes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum DebayerAlgorithm {
    /// Neighbor-averaging interpolation.
    Bilinear = 1,
    /// Zhang-Wu directional linear minimum mean-square-error estimation.
    Lmmse = 2,
}

impl DebayerAlgorithm {
    /// Resolves a metadata algorithm code, rejecting unknown values.
    pub fn from_code(code: u8) -> Result<Self, RawError> {
        Self::try_from_primitive(code).map_err(|_| RawError::UnknownDebayerAlgorithm(code))
    }
}

/// Knobs for the interpolation stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebayerOptions {
    /// Number of 3x3 median passes over the chroma differences after LMMSE
    /// interpolation. Costly relative to its quality gain, so 0 by default.
    pub median_passes: usize,
}

/// CFA color of a pixel, honoring the vertical phase shift.
#[inline]
pub(crate) fn cfa_color(line: usize, col: usize, vshift: usize) -> usize {
    bayer_color(line + vshift, col)
}

/// Three-channel color (0 = R, 1 = G, 2 = B) at a CFA site.
#[inline]
pub(crate) fn fc(line: usize, col: usize, vshift: usize) -> usize {
    match cfa_color(line, col, vshift) {
        0 => 0,
        3 => 2,
        _ => 1,
    }
}

/// Debayers the sensor plane into a three-component interleaved image of
/// the same dimensions (R, G, B order).
///
/// `wb` and `black` are indexed by CFA position; `vshift` is the vertical
/// phase shift reported by the border analyzer.
pub fn debayer(
    algorithm: DebayerAlgorithm,
    plane: &SensorPlane,
    vshift: usize,
    wb: &[f64; 4],
    black: &[u16; 4],
    options: &DebayerOptions,
) -> Result<Vec<u16>, RawError> {
    debug!(
        "debayering {}x{} with {:?}, vshift {}",
        plane.width, plane.height, algorithm, vshift
    );
    let scratch = apply_black_and_wb(plane, vshift, wb, black);
    match algorithm {
        DebayerAlgorithm::Bilinear => {
            bilinear::interpolate(scratch, plane.width, plane.height, vshift)
        }
        DebayerAlgorithm::Lmmse => {
            lmmse::interpolate(&scratch, plane.width, plane.height, vshift, options)
        }
    }
}

/// Copies each CFA sample into its color slot of a four-component scratch
/// plane, clamping at the black level and scaling by the white-balance
/// multiplier on the way. The other three slots at each pixel stay zero.
fn apply_black_and_wb(
    plane: &SensorPlane,
    vshift: usize,
    wb: &[f64; 4],
    black: &[u16; 4],
) -> Vec<u16> {
    let (width, height) = (plane.width, plane.height);
    let mut scratch = vec![0u16; width * height * 4];

    for line in 0..height {
        for col in 0..width {
            let color = cfa_color(line, col, vshift);
            let sample = plane.data[line * width + col];
            let leveled = sample.saturating_sub(black[color]);
            let scaled = (f64::from(leveled) * wb[color]).round().min(65535.0) as u16;
            scratch[(line * width + col) * 4 + color] = scaled;
        }
    }
    scratch
}
