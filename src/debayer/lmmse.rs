//! Directional linear minimum mean-square-error interpolation.
//!
//! L. Zhang and X. Wu, "Color demosaicking via directional linear minimum
//! mean square-error estimation", IEEE Trans. on Image Processing, vol. 14,
//! pp. 2167-2178, Dec. 2005.
//!
//! The image is mirror-padded into a working plane of six floats per pixel.
//! Green/chroma differences are estimated horizontally and vertically with
//! a 5-tap filter, smoothed by a Gaussian-like low pass, and fused per
//! direction with weights derived from local signal and noise variances.
//! Red and blue are then rebuilt from the recovered differences.

use crate::debayer::{cfa_color, fc, DebayerOptions};
use crate::error::RawError;

/// Pixels of padding around the image; also the minimum image side length.
const BORDER: usize = 10;

/// Working-plane slots. The first three are reused for the recovered R/G/B
/// once the difference planes are no longer needed, exactly mirroring how
/// the estimation stages hand over to the reconstruction stages.
const H_DIFF: usize = 0;
const V_DIFF: usize = 1;
const H_LOW: usize = 2;
const V_LOW: usize = 3;
const CFA: usize = 4;
const RED: usize = 0;
const GREEN: usize = 1;
const BLUE: usize = 2;

/// Reflects an out-of-range coordinate back into `0..n`.
#[inline]
fn mirror(i: isize, n: usize) -> usize {
    let n = n as isize;
    let r = if i < 0 {
        -i - 1
    } else if i >= n {
        2 * n - 1 - i
    } else {
        i
    };
    r as usize
}

/// Clamps `x` into the interval spanned by `y` and `z`, whichever order
/// they are in.
#[inline]
fn ulim(x: f32, y: f32, z: f32) -> f32 {
    if y < z {
        x.clamp(y, z)
    } else {
        x.clamp(z, y)
    }
}

pub(crate) fn interpolate(
    scratch: &[u16],
    width: usize,
    height: usize,
    vshift: usize,
    options: &DebayerOptions,
) -> Result<Vec<u16>, RawError> {
    if width < BORDER || height < BORDER {
        return Err(RawError::ImageTooSmall {
            width,
            height,
            min: BORDER,
        });
    }

    let rr1 = height + 2 * BORDER;
    let cc1 = width + 2 * BORDER;
    let at = |rr: usize, cc: usize| rr * cc1 + cc;

    // pre-pass value of the pixel at image coordinates, taken from its own
    // CFA slot and normalized to [0, 1]
    let cfa_value = |row: usize, col: usize| -> f32 {
        let color = cfa_color(row, col, vshift);
        f32::from(scratch[(row * width + col) * 4 + color]) / 65535.0
    };

    let mut qix = vec![[0f32; 6]; rr1 * cc1];

    // low pass filter coefficients (sigma = 2, 9 taps), normalized
    let h0 = 1.0f32;
    let h1 = (-1.0f32 / 8.0).exp();
    let h2 = (-4.0f32 / 8.0).exp();
    let h3 = (-9.0f32 / 8.0).exp();
    let h4 = (-16.0f32 / 8.0).exp();
    let hs = h0 + 2.0 * (h1 + h2 + h3 + h4);
    let (h0, h1, h2, h3, h4) = (h0 / hs, h1 / hs, h2 / hs, h3 / hs, h4 / hs);

    // mirror the CFA samples into the padded working plane
    for rr in 0..rr1 {
        for cc in 0..cc1 {
            let row = mirror(rr as isize - BORDER as isize, height);
            let col = mirror(cc as isize - BORDER as isize, width);
            qix[at(rr, cc)][CFA] = cfa_value(row, col);
        }
    }

    // directional green/chroma difference estimates
    for rr in 2..rr1 - 2 {
        // at red/blue sites
        let start = 2 + (fc(rr, 2, vshift) & 1);
        for cc in (start..cc1 - 2).step_by(2) {
            let center = qix[at(rr, cc)][CFA];
            let v0 = 0.0625
                * (qix[at(rr - 1, cc - 1)][CFA]
                    + qix[at(rr - 1, cc + 1)][CFA]
                    + qix[at(rr + 1, cc - 1)][CFA]
                    + qix[at(rr + 1, cc + 1)][CFA])
                + 0.25 * center;

            // horizontal
            let mut est = -0.25 * (qix[at(rr, cc - 2)][CFA] + qix[at(rr, cc + 2)][CFA])
                + 0.5 * (qix[at(rr, cc - 1)][CFA] + center + qix[at(rr, cc + 1)][CFA]);
            let luma = v0 + 0.5 * est;
            est = if center > 1.75 * luma {
                ulim(est, qix[at(rr, cc - 1)][CFA], qix[at(rr, cc + 1)][CFA])
            } else {
                est.clamp(0.0, 1.0)
            };
            qix[at(rr, cc)][H_DIFF] = est - center;

            // vertical
            let mut est = -0.25 * (qix[at(rr - 2, cc)][CFA] + qix[at(rr + 2, cc)][CFA])
                + 0.5 * (qix[at(rr - 1, cc)][CFA] + center + qix[at(rr + 1, cc)][CFA]);
            let luma = v0 + 0.5 * est;
            est = if center > 1.75 * luma {
                ulim(est, qix[at(rr - 1, cc)][CFA], qix[at(rr + 1, cc)][CFA])
            } else {
                est.clamp(0.0, 1.0)
            };
            qix[at(rr, cc)][V_DIFF] = est - center;
        }

        // at green sites the difference is taken directly, negated
        let start = 2 + (fc(rr, 3, vshift) & 1);
        for cc in (start..cc1 - 2).step_by(2) {
            let center = qix[at(rr, cc)][CFA];
            let est_h = 0.25 * (qix[at(rr, cc - 2)][CFA] + qix[at(rr, cc + 2)][CFA])
                - 0.5 * (qix[at(rr, cc - 1)][CFA] + center + qix[at(rr, cc + 1)][CFA]);
            let est_v = 0.25 * (qix[at(rr - 2, cc)][CFA] + qix[at(rr + 2, cc)][CFA])
                - 0.5 * (qix[at(rr - 1, cc)][CFA] + center + qix[at(rr + 1, cc)][CFA]);
            qix[at(rr, cc)][H_DIFF] = est_h.clamp(-1.0, 0.0) + center;
            qix[at(rr, cc)][V_DIFF] = est_v.clamp(-1.0, 0.0) + center;
        }
    }

    // low pass over the difference planes, each along its own axis
    for rr in 4..rr1 - 4 {
        for cc in 4..cc1 - 4 {
            let low_h = h0 * qix[at(rr, cc)][H_DIFF]
                + h1 * (qix[at(rr, cc - 1)][H_DIFF] + qix[at(rr, cc + 1)][H_DIFF])
                + h2 * (qix[at(rr, cc - 2)][H_DIFF] + qix[at(rr, cc + 2)][H_DIFF])
                + h3 * (qix[at(rr, cc - 3)][H_DIFF] + qix[at(rr, cc + 3)][H_DIFF])
                + h4 * (qix[at(rr, cc - 4)][H_DIFF] + qix[at(rr, cc + 4)][H_DIFF]);
            let low_v = h0 * qix[at(rr, cc)][V_DIFF]
                + h1 * (qix[at(rr - 1, cc)][V_DIFF] + qix[at(rr + 1, cc)][V_DIFF])
                + h2 * (qix[at(rr - 2, cc)][V_DIFF] + qix[at(rr + 2, cc)][V_DIFF])
                + h3 * (qix[at(rr - 3, cc)][V_DIFF] + qix[at(rr + 3, cc)][V_DIFF])
                + h4 * (qix[at(rr - 4, cc)][V_DIFF] + qix[at(rr + 4, cc)][V_DIFF]);
            let cell = &mut qix[at(rr, cc)];
            cell[H_LOW] = low_h;
            cell[V_LOW] = low_v;
        }
    }

    // fuse the directional estimates at red/blue sites, weighting each
    // direction by its signal variance against the residual noise variance
    for rr in 4..rr1 - 4 {
        let start = 4 + (fc(rr, 4, vshift) & 1);
        for cc in (start..cc1 - 4).step_by(2) {
            let (xh, vh) = directional_estimate(&qix, at(rr, cc - 4), 1, qix[at(rr, cc)][H_DIFF]);
            let (xv, vv) = directional_estimate(&qix, at(rr - 4, cc), cc1, qix[at(rr, cc)][V_DIFF]);
            qix[at(rr, cc)][CFA] = (xh * vv + xv * vh) / (vh + vv);
        }
    }

    // rebuild full color: sampled values into the R/G/B slots, green
    // restored from the interpolated difference at chroma sites
    for rr in 0..rr1 {
        for cc in 0..cc1 {
            let row = mirror(rr as isize - BORDER as isize, height);
            let col = mirror(cc as isize - BORDER as isize, width);
            let value = cfa_value(row, col);
            let channel = fc(rr, cc, vshift);
            let cell = &mut qix[at(rr, cc)];
            cell[channel] = value;
            if channel != GREEN {
                cell[GREEN] = value + cell[CFA];
            }
        }
    }

    // red and blue at green sites, from the axial neighbors' differences
    for rr in 1..rr1 - 1 {
        let start = 1 + (fc(rr, 2, vshift) & 1);
        let channel = fc(rr, start + 1, vshift);
        for cc in (start..cc1 - 1).step_by(2) {
            let horizontal = qix[at(rr, cc)][GREEN]
                + 0.5
                    * (qix[at(rr, cc - 1)][channel] - qix[at(rr, cc - 1)][GREEN]
                        + qix[at(rr, cc + 1)][channel]
                        - qix[at(rr, cc + 1)][GREEN]);
            qix[at(rr, cc)][channel] = horizontal;

            let other = 2 - channel;
            let vertical = qix[at(rr, cc)][GREEN]
                + 0.5
                    * (qix[at(rr - 1, cc)][other] - qix[at(rr - 1, cc)][GREEN]
                        + qix[at(rr + 1, cc)][other]
                        - qix[at(rr + 1, cc)][GREEN]);
            qix[at(rr, cc)][other] = vertical;
        }
    }

    // the opposite chroma at red/blue sites, from the diagonal-free
    // four-neighbor mean of recovered differences
    for rr in 1..rr1 - 1 {
        let start = 1 + (fc(rr, 1, vshift) & 1);
        for cc in (start..cc1 - 1).step_by(2) {
            let channel = 2 - fc(rr, cc, vshift);
            let value = qix[at(rr, cc)][GREEN]
                + 0.25
                    * (qix[at(rr - 1, cc)][channel] - qix[at(rr - 1, cc)][GREEN]
                        + qix[at(rr, cc - 1)][channel]
                        - qix[at(rr, cc - 1)][GREEN]
                        + qix[at(rr, cc + 1)][channel]
                        - qix[at(rr, cc + 1)][GREEN]
                        + qix[at(rr + 1, cc)][channel]
                        - qix[at(rr + 1, cc)][GREEN]);
            qix[at(rr, cc)][channel] = value;
        }
    }

    for _ in 0..options.median_passes {
        median_refine(&mut qix, rr1, cc1, vshift);
    }

    // clamp and write the three-component output; the sampled component at
    // each site keeps its pre-pass value
    let mut out = vec![0u16; width * height * 3];
    for row in 0..height {
        for col in 0..width {
            let rr = row + BORDER;
            let cc = col + BORDER;
            let sampled = fc(row, col, vshift);
            let cell = &qix[at(rr, cc)];
            let base = (row * width + col) * 3;
            for channel in 0..3 {
                out[base + channel] = if channel == sampled {
                    scratch[(row * width + col) * 4 + cfa_color(row, col, vshift)]
                } else {
                    clip(65535.0 * cell[channel] + 0.5)
                };
            }
        }
    }
    Ok(out)
}

/// Nine-tap mean/variance fusion of one direction. `start` is the flat cell
/// index of the first tap, `stride` the step between taps (1 horizontally,
/// the row pitch vertically); the low-passed plane sits one slot above the
/// difference plane. Returns the LMMSE estimate and its residual variance.
fn directional_estimate(qix: &[[f32; 6]], start: usize, stride: usize, center_diff: f32) -> (f32, f32) {
    let diff_slot = if stride == 1 { H_DIFF } else { V_DIFF };
    let low_slot = diff_slot + 2;

    let mut mean = 0.0f32;
    for k in 0..9 {
        mean += qix[start + k * stride][low_slot];
    }
    let mean = mean / 9.0;

    let mut signal = 1e-7f32;
    let mut noise = 1e-7f32;
    for k in 0..9 {
        let cell = &qix[start + k * stride];
        let s = cell[low_slot] - mean;
        signal += s * s;
        let n = cell[diff_slot] - cell[low_slot];
        noise += n * n;
    }

    let center_low = qix[start + 4 * stride][low_slot];
    let estimate = (center_diff * signal + center_low * noise) / (signal + noise);
    let variance = signal * noise / (signal + noise);
    (estimate, variance)
}

/// One pass of the optional 3x3 median refinement over the chroma
/// differences, followed by rebuilding the colors from the filtered
/// differences.
fn median_refine(qix: &mut [[f32; 6]], rr1: usize, cc1: usize, vshift: usize) {
    let at = |rr: usize, cc: usize| rr * cc1 + cc;

    for channel in [RED, BLUE] {
        let diff = channel + 3;

        for cell in qix.iter_mut() {
            cell[diff] = cell[channel] - cell[GREEN];
        }

        for rr in 1..rr1 - 1 {
            for cc in 1..cc1 - 1 {
                let mut window = [
                    qix[at(rr - 1, cc - 1)][diff],
                    qix[at(rr - 1, cc)][diff],
                    qix[at(rr - 1, cc + 1)][diff],
                    qix[at(rr, cc - 1)][diff],
                    qix[at(rr, cc)][diff],
                    qix[at(rr, cc + 1)][diff],
                    qix[at(rr + 1, cc - 1)][diff],
                    qix[at(rr + 1, cc)][diff],
                    qix[at(rr + 1, cc + 1)][diff],
                ];
                window.sort_unstable_by(f32::total_cmp);
                qix[at(rr, cc)][CFA] = window[4];
            }
        }

        for cell in qix.iter_mut() {
            cell[diff] = cell[CFA];
        }
    }

    // red/blue at green positions from the filtered differences
    for rr in 0..rr1 {
        let start = fc(rr, 1, vshift) & 1;
        for cc in (start..cc1).step_by(2) {
            let cell = &mut qix[at(rr, cc)];
            cell[RED] = cell[GREEN] + cell[RED + 3];
            cell[BLUE] = cell[GREEN] + cell[BLUE + 3];
        }
    }

    // red/blue and green at chroma positions
    for rr in 0..rr1 {
        let start = fc(rr, 0, vshift) & 1;
        for cc in (start..cc1).step_by(2) {
            let channel = 2 - fc(rr, cc, vshift);
            let cell = &mut qix[at(rr, cc)];
            cell[channel] = cell[GREEN] + cell[channel + 3];
            cell[GREEN] = 0.5 * ((cell[RED] - cell[RED + 3]) + (cell[BLUE] - cell[BLUE + 3]));
        }
    }
}

#[inline]
fn clip(x: f32) -> u16 {
    (x as i32).clamp(0, 65535) as u16
}
