//! Compression level taxonomy and its mapping onto `flate2::Compression`.

use crate::error::GzSpliceError;
use flate2::Compression;

/// A DEFLATE compression level, using the `{-2, -1, 0, 1..=9}` taxonomy
/// rather than `flate2::Compression`'s `0..=9` so that `HuffmanOnly` and
/// `Default` can be represented and round-tripped through the gzip XFL byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Huffman coding only, no LZ77 matching. `flate2` exposes no portable
    /// Huffman-only strategy, so this compresses at the default level but is
    /// still accepted and serialised faithfully in the XFL byte.
    HuffmanOnly,
    /// Let the compressor choose a balanced level.
    Default,
    /// Store bytes without compression.
    NoCompression,
    /// Fastest compression, lowest ratio.
    BestSpeed,
    /// Slowest compression, highest ratio.
    BestCompression,
    /// An exact numeric level in `1..=9`, for callers that want something
    /// between `BestSpeed` and `BestCompression`.
    Precise(u32),
}

impl Level {
    /// The level's value under the input taxonomy: `-2, -1, 0, 1..=9`.
    pub fn as_i32(self) -> i32 {
        match self {
            Level::HuffmanOnly => -2,
            Level::Default => -1,
            Level::NoCompression => 0,
            Level::BestSpeed => 1,
            Level::BestCompression => 9,
            Level::Precise(n) => n as i32,
        }
    }

    /// Constructs a `Level` from its numeric taxonomy value, rejecting
    /// anything outside `[-2, 9]`.
    pub fn from_i32(value: i32) -> Result<Level, GzSpliceError> {
        match value {
            -2 => Ok(Level::HuffmanOnly),
            -1 => Ok(Level::Default),
            0 => Ok(Level::NoCompression),
            1 => Ok(Level::BestSpeed),
            9 => Ok(Level::BestCompression),
            1..=8 => Ok(Level::Precise(value as u32)),
            _ => Err(GzSpliceError::InvalidLevel(value)),
        }
    }

    /// Maps this level onto the `flate2::Compression` the compressor is
    /// constructed with.
    pub fn to_flate2(self) -> Compression {
        match self {
            Level::NoCompression => Compression::none(),
            Level::BestSpeed => Compression::fast(),
            Level::BestCompression => Compression::best(),
            Level::Precise(n) => Compression::new(n),
            Level::Default | Level::HuffmanOnly => Compression::default(),
        }
    }

    /// The gzip header's XFL byte contribution for this level: `2` for
    /// best-compression, `4` for best-speed, `0` otherwise.
    pub fn xfl(self) -> u8 {
        match self {
            Level::BestCompression => 2,
            Level::BestSpeed => 4,
            _ => 0,
        }
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::Default
    }
}
