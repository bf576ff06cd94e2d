use thiserror::Error;

/// Errors raised by the decode pipeline.
///
/// Every error is terminal for the current image: no stage retries
/// internally, and the caller decides whether to fall back to a different
/// decoder.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawError {
    /// A codeword insertion collided with an already-occupied table entry.
    #[error("Duplicate Huffman code")]
    DuplicateHuffmanCode,
    /// A codeword was inserted with a bit length outside 1..=16, or with
    /// bits set above its stated length.
    #[error("Huffman code length out of range")]
    OversizedHuffmanCode,
    /// The bitstream contained a bit pattern no codeword matches.
    #[error("No Huffman code matches the bitstream")]
    UnknownHuffmanCode,
    /// A non-stuffed `0xFF xx` marker was reached before all samples were
    /// decoded. `bytes_consumed` counts input bytes read up to the marker so
    /// the caller can seek to the following segment.
    #[error("JPEG marker found after {bytes_consumed} bytes")]
    MarkerFound { bytes_consumed: usize },
    /// The input stream ran out before the output plane was filled.
    #[error("Input exhausted before all samples were decoded")]
    Truncated,
    /// Only the left-neighbor predictor (selection value 1) is implemented.
    #[error("Unsupported predictor selection {0}")]
    UnsupportedPredictor(u8),
    /// Sample precision must be within 8..=16 bits.
    #[error("Unsupported sample precision {0}")]
    UnsupportedPrecision(u8),
    /// Component count must be within 1..=4.
    #[error("Unsupported component count {0}")]
    UnsupportedComponentCount(usize),
    /// A Huffman table slot referenced during decoding was never filled.
    #[error("No Huffman table installed in slot {0}")]
    MissingHuffmanTable(usize),
    /// An output buffer is smaller than the declared geometry demands.
    #[error("Buffer too small: need {needed} samples, have {actual}")]
    BufferTooSmall { needed: usize, actual: usize },
    /// The image cannot accommodate the chosen interpolation border.
    #[error("Image {width}x{height} too small: interpolation needs {min} pixels per side")]
    ImageTooSmall {
        width: usize,
        height: usize,
        min: usize,
    },
    /// Debayer algorithm codes are 1 (bilinear) and 2 (LMMSE).
    #[error("Unknown debayer algorithm code {0}")]
    UnknownDebayerAlgorithm(u8),
    /// The camera matrix pseudo-inverse hit a zero pivot.
    #[error("Color matrix is singular")]
    SingularMatrix,
}
