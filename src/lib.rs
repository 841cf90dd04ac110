//! # gz-splice: streaming gzip writer with DEFLATE blob splicing
//!
//! `gz-splice` produces a single, valid gzip (RFC 1952) member from a mix of
//! raw byte payloads (compressed inline) and pre-compressed gzip blobs
//! (spliced in verbatim, without decompressing them). The decompressed
//! content of the output equals the concatenation, in write order, of every
//! raw payload and every spliced blob's decompressed content.
//!
//! Splicing trades compression ratio (it breaks cross-blob back-references)
//! for the ability to reuse existing DEFLATE payloads instead of
//! decompress-then-recompress. CRC32 and ISIZE are combined arithmetically
//! across the mix rather than recomputed from scratch.
//!
//! ## Quick start
//!
//! ```
//! use gz_splice::GzSpliceWriter;
//!
//! let mut writer = GzSpliceWriter::new(Vec::new());
//! writer.write_raw(b"hello ")?;
//! writer.write_raw(b"world")?;
//! writer.close()?;
//! # Ok::<(), gz_splice::GzSpliceError>(())
//! ```
//!
//! ### Splicing a pre-compressed blob
//!
//! ```
//! use flate2::write::GzEncoder;
//! use flate2::Compression;
//! use gz_splice::GzSpliceWriter;
//! use std::io::Write;
//!
//! let mut pre_compressed = GzEncoder::new(Vec::new(), Compression::default());
//! pre_compressed.write_all(b"bar")?;
//! let blob = pre_compressed.finish()?;
//!
//! let mut writer = GzSpliceWriter::new(Vec::new());
//! writer.write_raw(b"foo")?;
//! writer.write_compressed(&blob)?;
//! writer.close()?;
//! # Ok::<(), gz_splice::GzSpliceError>(())
//! ```

pub mod blob;
pub mod crc;
mod deflate_scan;
pub mod error;
pub mod header;
pub mod level;
pub mod writer;

pub use blob::{parse, ParsedBlob};
pub use crc::combine;
pub use error::{GzSpliceError, Result};
pub use header::HeaderFields;
pub use level::Level;
pub use writer::GzSpliceWriter;
