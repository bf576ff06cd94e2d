//! CR2 sensor-plane geometry: reassembling the sliced JPEG output into a
//! contiguous raster and analyzing the masked sensor borders.

pub mod borders;
pub mod unslice;

pub use borders::{bayer_shift, black_levels, trim, Borders};
pub use unslice::unslice;
