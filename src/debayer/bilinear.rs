//! Neighbor-averaging interpolation.
//!
//! Each missing component is the mean of the nearest sampled sites of that
//! component: green at red/blue sites from the four cardinal neighbors, red
//! and blue at the opposite chroma site from the four diagonal neighbors,
//! and red/blue at green sites from the two neighbors along the axis that
//! carries the color. Pixels on the image edge average whatever neighbors
//! exist, down to a single one in the corners.

use crate::debayer::cfa_color;
use crate::error::RawError;

const BORDER: usize = 2;

/// Slot of a pixel in the four-component scratch plane.
#[inline]
fn slot_at(scratch: &[u16], width: usize, line: usize, col: usize, slot: usize) -> u32 {
    u32::from(scratch[(line * width + col) * 4 + slot])
}

/// Green value at a green site, wherever of the two green slots it lives.
#[inline]
fn green_at(scratch: &[u16], width: usize, line: usize, col: usize) -> u32 {
    let base = (line * width + col) * 4;
    u32::from(scratch[base + 1]) + u32::from(scratch[base + 2])
}

pub(crate) fn interpolate(
    mut scratch: Vec<u16>,
    width: usize,
    height: usize,
    vshift: usize,
) -> Result<Vec<u16>, RawError> {
    if width < BORDER || height < BORDER {
        return Err(RawError::ImageTooSmall {
            width,
            height,
            min: BORDER,
        });
    }

    let idx = |line: usize, col: usize, slot: usize| (line * width + col) * 4 + slot;

    // green at red/blue sites: the cardinal neighbors are all green sites
    for line in 0..height {
        for col in 0..width {
            let color = cfa_color(line, col, vshift);
            if color == 1 || color == 2 {
                continue;
            }

            let mut sum = 0u32;
            let mut count = 0u32;
            if line > 0 {
                sum += green_at(&scratch, width, line - 1, col);
                count += 1;
            }
            if line + 1 < height {
                sum += green_at(&scratch, width, line + 1, col);
                count += 1;
            }
            if col > 0 {
                sum += green_at(&scratch, width, line, col - 1);
                count += 1;
            }
            if col + 1 < width {
                sum += green_at(&scratch, width, line, col + 1);
                count += 1;
            }
            scratch[idx(line, col, 1)] = (sum / count) as u16;
        }
    }

    // expose a green value in both slots at the sampled green sites, so the
    // final collapse can take whichever is populated
    for line in 0..height {
        for col in 0..width {
            match cfa_color(line, col, vshift) {
                1 => scratch[idx(line, col, 2)] = scratch[idx(line, col, 1)],
                2 => scratch[idx(line, col, 1)] = scratch[idx(line, col, 2)],
                _ => {}
            }
        }
    }

    // red everywhere it was not sampled, then blue the same way
    interpolate_chroma(&mut scratch, width, height, vshift, 0, 3);
    interpolate_chroma(&mut scratch, width, height, vshift, 3, 0);

    // collapse the four scratch slots into R, G, B
    let mut out = vec![0u16; width * height * 3];
    for pixel in 0..width * height {
        let base = pixel * 4;
        let g1 = scratch[base + 1];
        out[pixel * 3] = scratch[base];
        out[pixel * 3 + 1] = if g1 != 0 { g1 } else { scratch[base + 2] };
        out[pixel * 3 + 2] = scratch[base + 3];
    }
    Ok(out)
}

/// Fills `slot` (red 0 or blue 3) at every site where it was not sampled.
/// `opposite` is the CFA color of the opposite chroma.
fn interpolate_chroma(
    scratch: &mut [u16],
    width: usize,
    height: usize,
    vshift: usize,
    slot: usize,
    opposite: usize,
) {
    // rows whose even/odd phase carries this color's sampled sites
    let sampled_row_parity = if slot == 0 { 0 } else { 1 };

    for line in 0..height {
        for col in 0..width {
            let color = cfa_color(line, col, vshift);
            if color == slot {
                continue;
            }

            let mut sum = 0u32;
            let mut count = 0u32;

            if color == opposite {
                // opposite chroma site: the diagonal neighbors are sampled
                if line > 0 && col > 0 {
                    sum += slot_at(scratch, width, line - 1, col - 1, slot);
                    count += 1;
                }
                if line > 0 && col + 1 < width {
                    sum += slot_at(scratch, width, line - 1, col + 1, slot);
                    count += 1;
                }
                if line + 1 < height && col > 0 {
                    sum += slot_at(scratch, width, line + 1, col - 1, slot);
                    count += 1;
                }
                if line + 1 < height && col + 1 < width {
                    sum += slot_at(scratch, width, line + 1, col + 1, slot);
                    count += 1;
                }
            } else if (line + vshift) % 2 == sampled_row_parity {
                // green site in a sampled row: neighbors sit left and right
                if col > 0 {
                    sum += slot_at(scratch, width, line, col - 1, slot);
                    count += 1;
                }
                if col + 1 < width {
                    sum += slot_at(scratch, width, line, col + 1, slot);
                    count += 1;
                }
            } else {
                // green site between sampled rows: neighbors above and below
                if line > 0 {
                    sum += slot_at(scratch, width, line - 1, col, slot);
                    count += 1;
                }
                if line + 1 < height {
                    sum += slot_at(scratch, width, line + 1, col, slot);
                    count += 1;
                }
            }

            scratch[(line * width + col) * 4 + slot] = (sum / count) as u16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debayer::tests::mosaic_plane;
    use crate::debayer::{debayer, DebayerAlgorithm, DebayerOptions};

    #[test]
    fn test_constant_mosaic_is_idempotent() {
        // every CFA site carries the same value; the output must be that
        // value in all three channels at every pixel
        let plane = mosaic_plane(6, 6, 0, [900, 900, 900, 900]);
        let out = debayer(
            DebayerAlgorithm::Bilinear,
            &plane,
            0,
            &[1.0; 4],
            &[0; 4],
            &DebayerOptions::default(),
        )
        .unwrap();
        assert!(out.iter().all(|&v| v == 900));
    }

    #[test]
    fn test_solid_colors_survive() {
        let plane = mosaic_plane(4, 4, 0, [100, 200, 200, 50]);
        let out = debayer(
            DebayerAlgorithm::Bilinear,
            &plane,
            0,
            &[1.0; 4],
            &[0; 4],
            &DebayerOptions::default(),
        )
        .unwrap();
        for pixel in out.chunks_exact(3) {
            assert_eq!(pixel, &[100, 200, 50]);
        }
    }

    #[test]
    fn test_solid_colors_survive_with_vshift() {
        let plane = mosaic_plane(6, 6, 1, [100, 200, 200, 50]);
        let out = debayer(
            DebayerAlgorithm::Bilinear,
            &plane,
            1,
            &[1.0; 4],
            &[0; 4],
            &DebayerOptions::default(),
        )
        .unwrap();
        for pixel in out.chunks_exact(3) {
            assert_eq!(pixel, &[100, 200, 50]);
        }
    }

    #[test]
    fn test_gradient_interpolates_between_neighbors() {
        // red ramps horizontally across red columns; interpolated red at
        // green sites must fall between its neighbors
        let width = 6;
        let height = 4;
        let mut data = vec![0u16; width * height];
        for line in 0..height {
            for col in 0..width {
                data[line * width + col] = match cfa_color(line, col, 0) {
                    0 => 100 * (col as u16 + 1),
                    _ => 300,
                };
            }
        }
        let plane = crate::SensorPlane {
            data,
            width,
            height,
        };
        let out = debayer(
            DebayerAlgorithm::Bilinear,
            &plane,
            0,
            &[1.0; 4],
            &[0; 4],
            &DebayerOptions::default(),
        )
        .unwrap();

        // pixel (0,1) sits between red samples 100 and 300
        assert_eq!(out[(0 * width + 1) * 3], 200);
        // pixel (0,3) between 300 and 500
        assert_eq!(out[(0 * width + 3) * 3], 400);
    }

    #[test]
    fn test_too_small_rejected() {
        let plane = mosaic_plane(1, 5, 0, [1, 1, 1, 1]);
        assert_eq!(
            debayer(
                DebayerAlgorithm::Bilinear,
                &plane,
                0,
                &[1.0; 4],
                &[0; 4],
                &DebayerOptions::default(),
            )
            .unwrap_err(),
            RawError::ImageTooSmall {
                width: 1,
                height: 5,
                min: 2
            }
        );
    }
}
