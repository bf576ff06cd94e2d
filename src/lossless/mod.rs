//! Lossless JPEG (SOF3) decoding: Huffman tables, the entropy bitstream,
//! and the predictive scan decoder.

pub mod bitstream;
pub mod decoder;
pub mod huffman;

pub use bitstream::BitReader;
pub use decoder::Decompressor;
pub use huffman::HuffmanTable;
