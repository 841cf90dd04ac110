//! The streaming writer state machine: gzip header emission, lazy DEFLATE
//! compression of raw payloads, byte-aligned splicing of foreign DEFLATE
//! payloads, CRC32/ISIZE bookkeeping, and trailer emission on close.
//!
//! Bundles the running state and the public operations that mutate it in
//! one type, backed by `flate2` and `crc32fast` for the actual compression
//! and checksumming.

use crate::blob;
use crate::crc;
use crate::deflate_scan::{self, FinalBlock};
use crate::error::{GzSpliceError, Result};
use crate::header::{self, HeaderFields};
use crate::level::Level;
use crc32fast::Hasher;
use flate2::{Compress, FlushCompress, Status};
use std::io::{self, Write};

/// Size of the scratch buffer `Compress::compress` writes into per call.
const CHUNK: usize = 32 * 1024;

/// A streaming gzip writer that compresses raw payloads inline and splices
/// in pre-compressed gzip blobs without decompressing them.
///
/// Produces exactly one gzip member (RFC 1952) whose decompressed content is
/// the concatenation, in write order, of every raw payload and every
/// spliced blob's decompressed content.
pub struct GzSpliceWriter<W: Write> {
    dest: W,
    compressor: Compress,
    level: Level,
    header: HeaderFields,
    crc: Hasher,
    isize: u32,
    latched_error: Option<GzSpliceError>,
    header_written: bool,
    closed: bool,
    deflate_active: bool,
    buf: Vec<u8>,
}

impl<W: Write> GzSpliceWriter<W> {
    /// Creates a writer with `Level::Default` compression.
    pub fn new(dest: W) -> Self {
        Self::with_level_enum(dest, Level::Default)
    }

    /// Creates a writer with an explicit numeric level in the
    /// `{-2, -1, 0, 1..=9}` taxonomy, rejecting anything outside that range.
    pub fn with_level(dest: W, level: i32) -> Result<Self> {
        let level = Level::from_i32(level)?;
        Ok(Self::with_level_enum(dest, level))
    }

    fn with_level_enum(dest: W, level: Level) -> Self {
        GzSpliceWriter {
            dest,
            compressor: Compress::new(level.to_flate2(), false),
            level,
            header: HeaderFields::default(),
            crc: Hasher::new(),
            isize: 0,
            latched_error: None,
            header_written: false,
            closed: false,
            deflate_active: false,
            buf: vec![0u8; CHUNK],
        }
    }

    /// Sets the header's modification time (unix seconds; `0` means unset).
    /// Only effective before the header has been written.
    pub fn set_mtime(&mut self, mtime: u32) -> Result<()> {
        self.check_header_mutable()?;
        self.header.mtime = mtime;
        Ok(())
    }

    /// Sets the header's OS byte (default `255`, unknown).
    pub fn set_os(&mut self, os: u8) -> Result<()> {
        self.check_header_mutable()?;
        self.header.os = Some(os);
        Ok(())
    }

    /// Sets the header's extra field (must be at most 65535 bytes).
    pub fn set_extra(&mut self, extra: Vec<u8>) -> Result<()> {
        self.check_header_mutable()?;
        self.header.extra = Some(extra);
        Ok(())
    }

    /// Sets the header's filename field (Latin-1, must not contain NUL).
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        self.check_header_mutable()?;
        self.header.name = Some(name.into());
        Ok(())
    }

    /// Sets the header's comment field (Latin-1, must not contain NUL).
    pub fn set_comment(&mut self, comment: impl Into<String>) -> Result<()> {
        self.check_header_mutable()?;
        self.header.comment = Some(comment.into());
        Ok(())
    }

    fn check_header_mutable(&mut self) -> Result<()> {
        if let Some(e) = &self.latched_error {
            return Err(e.latch_copy());
        }
        if self.header_written {
            let err = GzSpliceError::HeaderAlreadyWritten;
            self.latched_error = Some(err.latch_copy());
            return Err(err);
        }
        Ok(())
    }

    /// Compresses `data` inline, updating the running CRC32 and ISIZE.
    /// Returns the number of bytes consumed (`data.len()` on success).
    pub fn write_raw(&mut self, data: &[u8]) -> Result<usize> {
        if let Some(e) = &self.latched_error {
            return Err(e.latch_copy());
        }
        let result = self.write_raw_inner(data);
        self.latch(result)
    }

    fn write_raw_inner(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_header_written()?;
        self.crc.update(data);
        self.isize = self.isize.wrapping_add(data.len() as u32);
        drive_compress(
            &mut self.compressor,
            data,
            FlushCompress::None,
            &mut self.dest,
            &mut self.buf,
        )?;
        self.deflate_active = true;
        Ok(data.len())
    }

    /// Splices `blob`'s DEFLATE payload directly into the output, folding
    /// its trailer's CRC32/ISIZE into the running totals without
    /// decompressing it. Returns the number of DEFLATE bytes emitted.
    ///
    /// The blob's own final block arrives with `BFINAL = 1`, which would
    /// terminate the single DEFLATE stream this writer produces if written
    /// through unchanged. This clears that bit and patches in a
    /// byte-realigning empty block right after the blob's content, so the
    /// stream stays open for whatever `write_raw`/`write_compressed`/
    /// `close` does next.
    pub fn write_compressed(&mut self, blob: &[u8]) -> Result<usize> {
        if let Some(e) = &self.latched_error {
            return Err(e.latch_copy());
        }
        let result = self.write_compressed_inner(blob);
        self.latch(result)
    }

    fn write_compressed_inner(&mut self, blob: &[u8]) -> Result<usize> {
        self.ensure_header_written()?;
        if self.deflate_active {
            drive_compress(
                &mut self.compressor,
                &[],
                FlushCompress::Sync,
                &mut self.dest,
                &mut self.buf,
            )?;
            self.deflate_active = false;
        }

        let parsed = blob::parse(blob)?;
        self.combine_crc(parsed.crc, parsed.isize as u64);
        self.isize = self.isize.wrapping_add(parsed.isize);
        let final_block = deflate_scan::find_final_block(parsed.payload)?;
        write_spliced_payload(&mut self.dest, parsed.payload, &final_block)?;
        Ok(parsed.payload.len())
    }

    /// Byte-aligns the DEFLATE stream without emitting a trailer. A no-op
    /// once the writer is closed.
    pub fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if let Some(e) = &self.latched_error {
            return Err(e.latch_copy());
        }
        let result = self.flush_inner();
        self.latch(result)
    }

    fn flush_inner(&mut self) -> Result<()> {
        self.ensure_header_written()?;
        if self.deflate_active {
            drive_compress(
                &mut self.compressor,
                &[],
                FlushCompress::Sync,
                &mut self.dest,
                &mut self.buf,
            )?;
            self.deflate_active = false;
        }
        self.dest.flush().map_err(GzSpliceError::from)
    }

    /// Finalises the DEFLATE stream and emits the 8-byte trailer. Idempotent:
    /// a second call returns the same result as the first without emitting
    /// additional bytes.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return match &self.latched_error {
                Some(e) => Err(e.latch_copy()),
                None => Ok(()),
            };
        }
        self.closed = true;
        if let Some(e) = &self.latched_error {
            return Err(e.latch_copy());
        }
        let result = self.close_inner();
        self.latch(result)
    }

    fn close_inner(&mut self) -> Result<()> {
        self.ensure_header_written()?;
        // A spliced blob always arrives with its own BFINAL cleared (see
        // `write_compressed_inner`), so the DEFLATE stream is never closed
        // by a splice alone: the compressor always needs to emit the real
        // terminating block, even when it has had no raw bytes to compress
        // since the last splice.
        drive_compress(
            &mut self.compressor,
            &[],
            FlushCompress::Finish,
            &mut self.dest,
            &mut self.buf,
        )?;
        let crc_value = self.crc.clone().finalize();
        self.dest.write_all(&crc_value.to_le_bytes())?;
        self.dest.write_all(&self.isize.to_le_bytes())?;
        Ok(())
    }

    /// Discards all writer state, returning the writer to its initial state
    /// bound to `new_dest`. The compression level is preserved; header
    /// fields, CRC/ISIZE, and any latched error are not. Returns the
    /// previous destination.
    pub fn reset(&mut self, new_dest: W) -> W {
        let old_dest = std::mem::replace(&mut self.dest, new_dest);
        self.compressor = Compress::new(self.level.to_flate2(), false);
        self.header = HeaderFields::default();
        self.crc = Hasher::new();
        self.isize = 0;
        self.latched_error = None;
        self.header_written = false;
        self.closed = false;
        self.deflate_active = false;
        old_dest
    }

    fn ensure_header_written(&mut self) -> Result<()> {
        if !self.header_written {
            header::write_header(&mut self.dest, &self.header, self.level)?;
            self.header_written = true;
        }
        Ok(())
    }

    /// Folds a spliced blob's trailer CRC32 into the running CRC32 via the
    /// GF(2) combine, resuming the hasher from the combined value so later
    /// raw writes continue the checksum correctly.
    fn combine_crc(&mut self, other: u32, len: u64) {
        let current = self.crc.clone().finalize();
        let combined = crc::combine(current, other, len);
        self.crc = Hasher::new_with_initial(combined);
    }

    fn latch<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.latched_error = Some(e.latch_copy());
        }
        result
    }
}

/// Drives `compressor` over `input` with the given flush mode, writing
/// produced bytes to `dest` as they become available. `buf` is reused as
/// scratch space across calls; its length bounds how much output is
/// produced per `compress` call, not the total output.
fn drive_compress<W: Write>(
    compressor: &mut Compress,
    mut input: &[u8],
    flush: FlushCompress,
    dest: &mut W,
    buf: &mut [u8],
) -> io::Result<()> {
    loop {
        let before_in = compressor.total_in();
        let before_out = compressor.total_out();
        let status = compressor
            .compress(input, buf, flush)
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "DEFLATE compression failed"))?;
        let consumed = (compressor.total_in() - before_in) as usize;
        let produced = (compressor.total_out() - before_out) as usize;
        if produced > 0 {
            dest.write_all(&buf[..produced])?;
        }
        input = &input[consumed..];
        if status == Status::StreamEnd || (input.is_empty() && produced == 0) {
            break;
        }
    }
    Ok(())
}

/// Writes `payload` to `dest` with its final block's `BFINAL` bit cleared,
/// followed by a byte-realigning empty stored block patched in immediately
/// after the final block's content.
///
/// An empty stored block's header and byte-alignment padding are both
/// all-zero bits, and so is whatever padding already trails the final
/// block's content inside `payload` (real encoders zero-pad their last byte
/// on finish) — so when at least 3 such bits remain before `payload`'s own
/// end, they already form a valid header and no extra byte is needed before
/// the block's 4-byte `LEN`/`NLEN` pair. Otherwise one explicit zero byte is
/// inserted to complete the header and alignment.
fn write_spliced_payload<W: Write>(
    dest: &mut W,
    payload: &[u8],
    final_block: &FinalBlock,
) -> Result<()> {
    let header_byte = final_block.header_bit_offset / 8;
    let header_bit = final_block.header_bit_offset % 8;
    dest.write_all(&payload[..header_byte])?;
    dest.write_all(&[payload[header_byte] & !(1 << header_bit)])?;
    dest.write_all(&payload[header_byte + 1..])?;

    let content_end_bit = final_block.content_end_bit_offset % 8;
    let spare_bits_in_last_byte = if content_end_bit == 0 { 0 } else { 8 - content_end_bit };
    if spare_bits_in_last_byte >= 3 {
        dest.write_all(&[0x00, 0x00, 0xff, 0xff])?;
    } else {
        dest.write_all(&[0x00, 0x00, 0x00, 0xff, 0xff])?;
    }
    Ok(())
}
