//! Conversion of debayered RGB data from the camera color space to the
//! working color space.
//!
//! ProPhoto RGB under a D65 reference is the working space. The camera
//! supplies a 3x3 camera-to-XYZ matrix; the derived conversion matrix is
//! applied to every pixel in planar single-precision float form.

use log::debug;

use crate::constants::{PROPHOTO_RGB_MATRIX, SENSOR_FULL_SCALE};
use crate::error::RawError;

pub type Matrix3 = [[f64; 3]; 3];

/// Derives the matrix taking camera RGB to the working color space.
///
/// The camera matrix is first taken through the fixed XYZ-to-ProPhoto
/// matrix, then each row is normalized to sum to 1 so that a sensor white
/// of (1, 1, 1) maps to working-space white. The result is the Moore-Penrose
/// pseudo-inverse of that normalized matrix, computed by Gauss-Jordan
/// elimination on `[TᵀT | I]`; pixels are treated as column vectors.
pub fn conversion_matrix(cam_xyz: &Matrix3) -> Result<Matrix3, RawError> {
    let mut t = multiply(cam_xyz, &PROPHOTO_RGB_MATRIX);

    for row in t.iter_mut() {
        let sum: f64 = row.iter().sum();
        if sum == 0.0 {
            return Err(RawError::SingularMatrix);
        }
        for value in row.iter_mut() {
            *value /= sum;
        }
    }

    pseudo_inverse(&t)
}

/// Converts 16-bit interleaved RGB pixels to floating-point working-space
/// RGB.
///
/// Samples are linearized against the 14-bit sensor full scale. The output
/// is deliberately not clamped; callers clip before display.
pub fn convert_to_working(
    pixels: &[u16],
    width: usize,
    height: usize,
    cam_xyz: &Matrix3,
) -> Result<Vec<f32>, RawError> {
    let count = width * height;
    if pixels.len() < count * 3 {
        return Err(RawError::BufferTooSmall {
            needed: count * 3,
            actual: pixels.len(),
        });
    }

    let matrix = conversion_matrix(cam_xyz)?;
    debug!("converting {}x{} pixels to working space", width, height);

    let mut planes = make_planar(pixels, count);
    multiply_planes(&mut planes, &matrix);
    Ok(interleave(&planes, count))
}

/// Unpacks the interleaved buffer into one float plane per component,
/// dividing by the sensor full scale on the way.
fn make_planar(pixels: &[u16], count: usize) -> [Vec<f32>; 3] {
    let mut planes = [
        vec![0f32; count],
        vec![0f32; count],
        vec![0f32; count],
    ];
    for pixel in 0..count {
        for (component, plane) in planes.iter_mut().enumerate() {
            plane[pixel] = f32::from(pixels[pixel * 3 + component]) / SENSOR_FULL_SCALE;
        }
    }
    planes
}

/// Multiplies every pixel by the matrix, in single precision.
fn multiply_planes(planes: &mut [Vec<f32>; 3], matrix: &Matrix3) {
    let mut m = [[0f32; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            m[i][j] = matrix[i][j] as f32;
        }
    }

    let count = planes[0].len();
    for pixel in 0..count {
        let r = planes[0][pixel];
        let g = planes[1][pixel];
        let b = planes[2][pixel];
        planes[0][pixel] = m[0][0] * r + m[0][1] * g + m[0][2] * b;
        planes[1][pixel] = m[1][0] * r + m[1][1] * g + m[1][2] * b;
        planes[2][pixel] = m[2][0] * r + m[2][1] * g + m[2][2] * b;
    }
}

/// Packs the planar buffers back into interleaved RGB.
fn interleave(planes: &[Vec<f32>; 3], count: usize) -> Vec<f32> {
    let mut out = vec![0f32; count * 3];
    for pixel in 0..count {
        out[pixel * 3] = planes[0][pixel];
        out[pixel * 3 + 1] = planes[1][pixel];
        out[pixel * 3 + 2] = planes[2][pixel];
    }
    out
}

fn multiply(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = [[0f64; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            for (k, b_row) in b.iter().enumerate() {
                out[i][j] += a[i][k] * b_row[j];
            }
        }
    }
    out
}

/// Moore-Penrose pseudo-inverse of a 3x3 matrix via Gauss-Jordan
/// elimination on `[AᵀA | I]`, returning `(AᵀA)⁻¹ Aᵀ`.
fn pseudo_inverse(a: &Matrix3) -> Result<Matrix3, RawError> {
    let mut work = [[0f64; 6]; 3];
    for i in 0..3 {
        work[i][i + 3] = 1.0;
        for j in 0..3 {
            for row in a.iter() {
                work[i][j] += row[i] * row[j];
            }
        }
    }

    for i in 0..3 {
        let pivot = work[i][i];
        if pivot == 0.0 {
            return Err(RawError::SingularMatrix);
        }
        for j in 0..6 {
            work[i][j] /= pivot;
        }
        for k in 0..3 {
            if k == i {
                continue;
            }
            let factor = work[k][i];
            for j in 0..6 {
                work[k][j] -= work[i][j] * factor;
            }
        }
    }

    let mut out = [[0f64; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                out[i][j] += work[i][k + 3] * a[j][k];
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: Matrix3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    fn normalized_prophoto() -> Matrix3 {
        let mut t = PROPHOTO_RGB_MATRIX;
        for row in t.iter_mut() {
            let sum: f64 = row.iter().sum();
            for v in row.iter_mut() {
                *v /= sum;
            }
        }
        t
    }

    #[test]
    fn test_normalized_rows_sum_to_one() {
        let t = normalized_prophoto();
        for row in &t {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_conversion_matrix_inverts_normalized_t() {
        // with an identity camera matrix, M is the inverse of the
        // normalized ProPhoto matrix: M * T must be the identity
        let m = conversion_matrix(&IDENTITY).unwrap();
        let t = normalized_prophoto();
        let product = multiply(&m, &t);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (product[i][j] - expected).abs() < 1e-6,
                    "product[{i}][{j}] = {}",
                    product[i][j]
                );
            }
        }
    }

    #[test]
    fn test_uniform_grey_is_preserved() {
        // rows of T sum to 1, so T and its inverse both fix (g, g, g); a
        // mid-grey input must come through unchanged
        let half = (SENSOR_FULL_SCALE / 2.0) as u16;
        let pixels = vec![half; 2 * 2 * 3];
        let out = convert_to_working(&pixels, 2, 2, &IDENTITY).unwrap();
        for &v in &out {
            assert!((v - 0.5).abs() < 1e-5, "value {v}");
        }
    }

    #[test]
    fn test_transform_is_linear_in_input() {
        let pixels: Vec<u16> = vec![4096, 8192, 2048, 8192, 16384, 4096];
        let out = convert_to_working(&pixels, 2, 1, &IDENTITY).unwrap();
        // the second pixel is exactly twice the first, so its output is too
        for c in 0..3 {
            assert!((out[3 + c] - 2.0 * out[c]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_singular_camera_matrix_rejected() {
        let zero = [[0.0; 3]; 3];
        assert_eq!(
            conversion_matrix(&zero).unwrap_err(),
            RawError::SingularMatrix
        );
    }

    #[test]
    fn test_undersized_buffer_rejected() {
        let pixels = vec![0u16; 5];
        assert_eq!(
            convert_to_working(&pixels, 2, 1, &IDENTITY).unwrap_err(),
            RawError::BufferTooSmall {
                needed: 6,
                actual: 5
            }
        );
    }
}
