//! End-to-end pipeline validation: a synthetic sensor image is entropy
//! coded by hand, decoded, unsliced, analyzed, trimmed, debayered, and
//! converted to the working color space.

use std::sync::Arc;

use cr2raw_rs::colorspace;
use cr2raw_rs::cr2::{self, Borders};
use cr2raw_rs::debayer::{debayer, DebayerAlgorithm, DebayerOptions};
use cr2raw_rs::lossless::{Decompressor, HuffmanTable};

const SENSOR_WIDTH: usize = 16;
const SENSOR_HEIGHT: usize = 14;
const COMPONENTS: usize = 2;
const SAMPLES_PER_LINE: usize = SENSOR_WIDTH / COMPONENTS;
const PRECISION: u8 = 12;
/// Slice descriptor [N, W]: two slices of four JPEG columns each.
const SLICES: [usize; 2] = [1, 8];
/// Clockwise from the top, inclusive: a 12x12 active area.
const BORDERS: Borders = Borders {
    top: 2,
    right: 15,
    bottom: 13,
    left: 4,
};
const MASKED_VALUE: u16 = 100;
const ACTIVE_VALUE: u16 = 1100;

/// MSB-first bit writer with JPEG byte-stuffing.
struct BitWriter {
    bytes: Vec<u8>,
    acc: u32,
    filled: u32,
}

impl BitWriter {
    fn new() -> Self {
        BitWriter {
            bytes: Vec::new(),
            acc: 0,
            filled: 0,
        }
    }

    fn put(&mut self, value: u32, count: u32) {
        for i in (0..count).rev() {
            self.acc = (self.acc << 1) | ((value >> i) & 1);
            self.filled += 1;
            if self.filled == 8 {
                let byte = self.acc as u8;
                self.bytes.push(byte);
                if byte == 0xFF {
                    self.bytes.push(0x00);
                }
                self.acc = 0;
                self.filled = 0;
            }
        }
    }

    fn finish(mut self) -> Vec<u8> {
        while self.filled != 0 {
            self.put(0, 1);
        }
        self.bytes
    }
}

/// Encodes a prediction difference as its magnitude category (a 4-bit
/// codeword in the test table) followed by the category's raw bits.
fn encode_delta(writer: &mut BitWriter, delta: i32) {
    if delta == 0 {
        writer.put(0, 4);
        return;
    }
    let magnitude = 32 - delta.unsigned_abs().leading_zeros();
    let raw = if delta > 0 {
        delta as u32
    } else {
        (delta + (1 << magnitude) - 1) as u32
    };
    writer.put(magnitude, 4);
    writer.put(raw, magnitude);
}

/// Table mapping the 4-bit codeword `k` to magnitude category `k`.
fn category_table() -> Arc<HuffmanTable> {
    let mut table = HuffmanTable::new();
    for k in 0..16u16 {
        table.add(k, 4, k as u8).unwrap();
    }
    Arc::new(table)
}

/// The synthetic sensor plane: a masked border around a constant active
/// area.
fn sensor_image() -> Vec<u16> {
    let mut plane = vec![MASKED_VALUE; SENSOR_WIDTH * SENSOR_HEIGHT];
    for row in BORDERS.top..=BORDERS.bottom {
        for col in BORDERS.left..=BORDERS.right {
            plane[row * SENSOR_WIDTH + col] = ACTIVE_VALUE;
        }
    }
    plane
}

/// Reads the sensor plane in slice-walk order, producing the flat sample
/// sequence the decompressor would emit.
fn sliced_sequence(plane: &[u16]) -> Vec<u16> {
    let slice_width = SLICES[1] / COMPONENTS;
    let mut sequence = Vec::with_capacity(plane.len());
    for slice in 0..=SLICES[0] {
        let start = slice * slice_width;
        let end = if slice < SLICES[0] {
            (slice + 1) * slice_width
        } else {
            SAMPLES_PER_LINE
        };
        for line in 0..SENSOR_HEIGHT {
            for col in start..end {
                for component in 0..COMPONENTS {
                    sequence.push(plane[line * SENSOR_WIDTH + col * COMPONENTS + component]);
                }
            }
        }
    }
    sequence
}

/// Entropy codes the flat sequence the way a camera would: row by row,
/// components interleaved, each row's first sample predicted from mid-grey.
fn encode_stream(sequence: &[u16]) -> Vec<u8> {
    let row_samples = SAMPLES_PER_LINE * COMPONENTS;
    let mid_grey = 1 << (PRECISION - 1);
    let mut writer = BitWriter::new();

    for row in sequence.chunks_exact(row_samples) {
        for position in 0..SAMPLES_PER_LINE {
            for component in 0..COMPONENTS {
                let value = i32::from(row[position * COMPONENTS + component]);
                let predicted = if position == 0 {
                    mid_grey
                } else {
                    i32::from(row[(position - 1) * COMPONENTS + component])
                };
                encode_delta(&mut writer, value - predicted);
            }
        }
    }
    writer.finish()
}

fn decode_sensor_plane() -> cr2raw_rs::SensorPlane {
    let image = sensor_image();
    let sequence = sliced_sequence(&image);
    let stream = encode_stream(&sequence);

    let mut dec = Decompressor::new(SAMPLES_PER_LINE, SENSOR_HEIGHT, PRECISION, COMPONENTS).unwrap();
    dec.add_table(0, category_table());
    dec.set_table_for_component(0, 0);
    dec.set_table_for_component(1, 0);
    dec.set_predictor(1).unwrap();

    let consumed = dec.decompress(&stream, 0).unwrap();
    assert!(dec.is_done());
    assert!(consumed <= stream.len());
    assert_eq!(dec.output(), &sequence[..]);

    let plane = cr2::unslice(&dec, SLICES, SENSOR_WIDTH, SENSOR_HEIGHT).unwrap();
    assert_eq!(plane.data, image);
    plane
}

#[test]
fn test_decode_unslice_analyze_trim() {
    let mut plane = decode_sensor_plane();

    assert_eq!(cr2::bayer_shift(&plane, &BORDERS), 0);
    assert_eq!(cr2::black_levels(&plane, &BORDERS), [MASKED_VALUE; 4]);

    let bytes = cr2::trim(&mut plane, &BORDERS);
    assert_eq!(bytes, 12 * 12 * 2);
    assert_eq!(plane.width, 12);
    assert_eq!(plane.height, 12);
    assert!(plane.data.iter().all(|&v| v == ACTIVE_VALUE));
}

#[test]
fn test_full_develop_bilinear() {
    let mut plane = decode_sensor_plane();
    let vshift = cr2::bayer_shift(&plane, &BORDERS);
    let black = cr2::black_levels(&plane, &BORDERS);
    cr2::trim(&mut plane, &BORDERS);

    let wb = [1.5, 1.0, 1.0, 0.5];
    let rgb = debayer(
        DebayerAlgorithm::Bilinear,
        &plane,
        usize::from(vshift),
        &wb,
        &black,
        &DebayerOptions::default(),
    )
    .unwrap();

    // (1100 - 100) scaled by the per-color multipliers, at every pixel
    for pixel in rgb.chunks_exact(3) {
        assert_eq!(pixel, &[1500, 1000, 500]);
    }

    // identity camera matrix: the working-space result is the normalized
    // ProPhoto inverse applied to the linearized pixel
    let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    let matrix = colorspace::conversion_matrix(&identity).unwrap();
    let linear = [1500.0 / 16384.0, 1000.0 / 16384.0, 500.0 / 16384.0];
    let expected: Vec<f32> = (0..3)
        .map(|i| {
            (matrix[i][0] * linear[0] + matrix[i][1] * linear[1] + matrix[i][2] * linear[2]) as f32
        })
        .collect();

    let working = colorspace::convert_to_working(&rgb, plane.width, plane.height, &identity).unwrap();
    for pixel in working.chunks_exact(3) {
        for c in 0..3 {
            assert!((pixel[c] - expected[c]).abs() < 1e-4, "{pixel:?} vs {expected:?}");
        }
    }
}

#[test]
fn test_full_develop_lmmse() {
    let mut plane = decode_sensor_plane();
    let vshift = cr2::bayer_shift(&plane, &BORDERS);
    let black = cr2::black_levels(&plane, &BORDERS);
    cr2::trim(&mut plane, &BORDERS);

    let rgb = debayer(
        DebayerAlgorithm::Lmmse,
        &plane,
        usize::from(vshift),
        &[1.0; 4],
        &black,
        &DebayerOptions::default(),
    )
    .unwrap();

    // constant input comes back constant, well inside the mirrored border
    for row in 3..9 {
        for col in 3..9 {
            let base = (row * plane.width + col) * 3;
            for c in 0..3 {
                let v = i32::from(rgb[base + c]);
                assert!((v - 1000).abs() <= 2, "({row},{col}) channel {c} = {v}");
            }
        }
    }
}
