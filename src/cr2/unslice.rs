//! Reassembly of CR2 vertical slices into a sensor-sized plane.
//!
//! Canon stores the sensor image as a handful of vertical strips laid out
//! sequentially in the JPEG raster, with several Bayer columns packed into
//! each JPEG pixel. The unslicer walks the decompressor output as a flat
//! stream and scatters it back into spatial order. This is only meaningful
//! for regular RAW frames where both sampling factors are 1.

use log::debug;

use crate::error::RawError;
use crate::lossless::Decompressor;
use crate::SensorPlane;

/// Rearranges the decompressor's sliced output into a contiguous
/// single-component sensor plane.
///
/// `slices` is the CR2 slice descriptor `[N, W]`: `N + 1` total slices, each
/// non-final slice `W / components` JPEG pixels wide, the last slice running
/// out to the frame edge. The sensor dimensions must match the frame
/// geometry (`samples_per_line * components` by `lines`); the component
/// count acts purely as a geometric factor here, and downstream stages treat
/// the result as a plain one-component raster.
pub fn unslice(
    jpeg: &Decompressor,
    slices: [usize; 2],
    sensor_width: usize,
    sensor_height: usize,
) -> Result<SensorPlane, RawError> {
    let components = jpeg.components();
    let samples_per_line = jpeg.samples_per_line();
    let lines = jpeg.lines();
    let row_width = samples_per_line * components;

    if sensor_width != row_width || sensor_height != lines {
        return Err(RawError::BufferTooSmall {
            needed: row_width * lines,
            actual: sensor_width * sensor_height,
        });
    }

    let slice_count = slices[0];
    let slice_width = slices[1] / components;

    let mut plane = vec![0u16; sensor_width * sensor_height];
    let mut source = jpeg.output().iter();

    for slice in 0..=slice_count {
        let start_col = slice * slice_width;
        let end_col = if slice < slice_count {
            (slice + 1) * slice_width
        } else {
            samples_per_line
        };

        for line in 0..lines {
            for col in start_col..end_col {
                let dest = line * row_width + col * components;
                for component in 0..components {
                    let Some(&sample) = source.next() else {
                        return Err(RawError::Truncated);
                    };
                    plane[dest + component] = sample;
                }
            }
        }
    }

    debug!(
        "unsliced {} slices of {} columns into {}x{} plane",
        slice_count + 1,
        slice_width,
        sensor_width,
        sensor_height
    );

    Ok(SensorPlane {
        data: plane,
        width: sensor_width,
        height: sensor_height,
    })
}
