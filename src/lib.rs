/*!
# cr2raw-rs

`cr2raw-rs` is a pure Rust core for turning Canon CR2 sensor data into a
linear, working-space RGB image.

A CR2 file carries the sensor's Bayer-mosaic samples as a lossless JPEG
(SOF3) bitstream whose image has been sliced into vertical strips. Getting a
usable image back out takes a pipeline of pure transforms, each a module of
this crate:

1. **`lossless`** - Huffman tables plus the left-predictor entropy decoder,
   producing an interleaved 16-bit component plane.
2. **`cr2::unslice`** - rearranges the sliced decoder output into a
   contiguous sensor-sized plane.
3. **`cr2::borders`** - uses the masked sensor border to estimate per-CFA
   black levels and detect a vertical Bayer phase shift, then trims the
   plane to the active area.
4. **`debayer`** - subtracts black, applies white balance, and interpolates
   the missing color components (bilinear or LMMSE).
5. **`colorspace`** - derives a camera-to-working matrix and converts the
   image to ProPhoto RGB (D65) as planar floats.

Every stage operates on owned buffers and keeps no state between images;
decoding two images on two threads is safe. Huffman tables are shared
between decompressors with `Arc`.

## Scope

Container parsing (TIFF/IFD walking), thumbnail extraction, and camera
metadata lookup are the caller's job: the crate takes entropy-coded bytes
plus frame geometry, slice/border descriptors, white-balance multipliers,
and the camera's XYZ matrix. Only the RG/GB filter layout and sampling
factors of 1 are supported.
*/

pub mod colorspace;
pub mod constants;
pub mod cr2;
pub mod debayer;
pub mod error;
pub mod lossless;

pub use error::RawError;

/// Single-component sensor raster, one `u16` sample per pixel in row-major
/// order. Produced by the unslicer, analyzed and trimmed by the border
/// stage, and consumed by the debayerer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorPlane {
    pub data: Vec<u16>,
    pub width: usize,
    pub height: usize,
}
