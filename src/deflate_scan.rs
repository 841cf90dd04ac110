//! Bit-level walk of a raw DEFLATE stream's block structure.
//!
//! Splicing a foreign gzip blob's payload into the middle of our own stream
//! requires turning its final block (`BFINAL == 1`) into a non-final one, so
//! the decoder keeps reading past it instead of stopping at its end. Doing
//! that correctly needs two things this module provides: the bit offset of
//! that block's header (to clear the `BFINAL` bit), and the bit offset right
//! after its content ends (to know how to patch in a byte-realigning empty
//! block immediately after it, since Huffman-coded blocks don't generally
//! end on a byte boundary). Neither requires reconstructing the decompressed
//! bytes, only walking the block structure far enough to find where things
//! start and stop.

use crate::error::GzSpliceError;

const MAX_BITS: usize = 15;

struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        BitReader { data, byte_pos: 0, bit_pos: 0 }
    }

    fn bit_offset(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    fn read_bit(&mut self) -> Result<u32, GzSpliceError> {
        let byte = *self
            .data
            .get(self.byte_pos)
            .ok_or(GzSpliceError::InvalidBlob("deflate stream ends mid-block"))?;
        let bit = (byte >> self.bit_pos) & 1;
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
        Ok(bit as u32)
    }

    /// Reads `count` bits packed least-significant-bit first (the ordinary
    /// DEFLATE convention for everything except Huffman codes themselves).
    fn read_bits(&mut self, count: u32) -> Result<u32, GzSpliceError> {
        let mut value = 0u32;
        for i in 0..count {
            value |= self.read_bit()? << i;
        }
        Ok(value)
    }

    fn align_to_byte(&mut self) {
        if self.bit_pos != 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    fn read_u16_le(&mut self) -> Result<u16, GzSpliceError> {
        let lo = *self
            .data
            .get(self.byte_pos)
            .ok_or(GzSpliceError::InvalidBlob("truncated stored block length"))?;
        let hi = *self
            .data
            .get(self.byte_pos + 1)
            .ok_or(GzSpliceError::InvalidBlob("truncated stored block length"))?;
        self.byte_pos += 2;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn skip_bytes(&mut self, n: usize) -> Result<(), GzSpliceError> {
        if self.byte_pos + n > self.data.len() {
            return Err(GzSpliceError::InvalidBlob(
                "stored block body runs past end of payload",
            ));
        }
        self.byte_pos += n;
        Ok(())
    }
}

/// A canonical Huffman decode table built from per-symbol code lengths, per
/// RFC 1951 §3.2.2's `counts`/`offsets`/`symbols` construction.
struct Huffman {
    counts: [u16; MAX_BITS + 1],
    symbols: Vec<u16>,
}

impl Huffman {
    fn build(lengths: &[u8]) -> Huffman {
        let mut counts = [0u16; MAX_BITS + 1];
        for &len in lengths {
            counts[len as usize] += 1;
        }
        counts[0] = 0;

        let mut offsets = [0u16; MAX_BITS + 2];
        for len in 1..=MAX_BITS {
            offsets[len + 1] = offsets[len] + counts[len];
        }

        let mut symbols = vec![0u16; lengths.len()];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len != 0 {
                symbols[offsets[len as usize] as usize] = symbol as u16;
                offsets[len as usize] += 1;
            }
        }

        Huffman { counts, symbols }
    }

    /// Decodes one symbol. Huffman codes are packed most-significant-bit
    /// first (RFC 1951 §3.1.1), unlike every other field in the format, so
    /// this accumulates bits by shifting left rather than OR-ing into place.
    fn decode(&self, br: &mut BitReader) -> Result<u16, GzSpliceError> {
        let mut code = 0i32;
        let mut first = 0i32;
        let mut index = 0i32;
        for len in 1..=MAX_BITS {
            code |= br.read_bit()? as i32;
            let count = self.counts[len] as i32;
            if code - first < count {
                return Ok(self.symbols[(index + (code - first)) as usize]);
            }
            index += count;
            first += count;
            first <<= 1;
            code <<= 1;
        }
        Err(GzSpliceError::InvalidBlob("invalid Huffman code in deflate stream"))
    }
}

const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

const CODE_LENGTH_ORDER: [usize; 19] =
    [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];

fn fixed_literal_huffman() -> Huffman {
    let mut lengths = [0u8; 288];
    for (symbol, len) in lengths.iter_mut().enumerate() {
        *len = match symbol {
            0..=143 => 8,
            144..=255 => 9,
            256..=279 => 7,
            _ => 8,
        };
    }
    Huffman::build(&lengths)
}

fn fixed_distance_huffman() -> Huffman {
    Huffman::build(&[5u8; 30])
}

fn dynamic_huffman_pair(br: &mut BitReader) -> Result<(Huffman, Huffman), GzSpliceError> {
    let hlit = br.read_bits(5)? as usize + 257;
    let hdist = br.read_bits(5)? as usize + 1;
    let hclen = br.read_bits(4)? as usize + 4;

    let mut code_length_lengths = [0u8; 19];
    for &order in CODE_LENGTH_ORDER.iter().take(hclen) {
        code_length_lengths[order] = br.read_bits(3)? as u8;
    }
    let code_length_huffman = Huffman::build(&code_length_lengths);

    let mut lengths = Vec::with_capacity(hlit + hdist);
    while lengths.len() < hlit + hdist {
        let symbol = code_length_huffman.decode(br)?;
        match symbol {
            0..=15 => lengths.push(symbol as u8),
            16 => {
                let prev = *lengths.last().ok_or(GzSpliceError::InvalidBlob(
                    "repeat-previous code length with no previous entry",
                ))?;
                let repeat = br.read_bits(2)? + 3;
                for _ in 0..repeat {
                    lengths.push(prev);
                }
            }
            17 => {
                let repeat = br.read_bits(3)? + 3;
                for _ in 0..repeat {
                    lengths.push(0);
                }
            }
            18 => {
                let repeat = br.read_bits(7)? + 11;
                for _ in 0..repeat {
                    lengths.push(0);
                }
            }
            _ => return Err(GzSpliceError::InvalidBlob("invalid code length symbol")),
        }
    }
    if lengths.len() != hlit + hdist {
        return Err(GzSpliceError::InvalidBlob(
            "code length repeat overran expected count",
        ));
    }

    let literal = Huffman::build(&lengths[..hlit]);
    let distance = Huffman::build(&lengths[hlit..]);
    Ok((literal, distance))
}

/// Walks a Huffman-coded block body (fixed or dynamic) from the current bit
/// position until the end-of-block symbol (256), without reconstructing any
/// output bytes.
fn skip_huffman_body(
    br: &mut BitReader,
    literal: &Huffman,
    distance: &Huffman,
) -> Result<(), GzSpliceError> {
    loop {
        let symbol = literal.decode(br)?;
        match symbol {
            0..=255 => continue,
            256 => return Ok(()),
            257..=285 => {
                let idx = (symbol - 257) as usize;
                let extra = LENGTH_EXTRA[idx] as u32;
                if extra > 0 {
                    br.read_bits(extra)?;
                }
                let dist_symbol = distance.decode(br)?;
                let dist_extra = *DIST_EXTRA
                    .get(dist_symbol as usize)
                    .ok_or(GzSpliceError::InvalidBlob("invalid distance code"))?
                    as u32;
                if dist_extra > 0 {
                    br.read_bits(dist_extra)?;
                }
            }
            _ => return Err(GzSpliceError::InvalidBlob("invalid literal/length symbol")),
        }
    }
}

fn skip_stored_body(br: &mut BitReader) -> Result<(), GzSpliceError> {
    br.align_to_byte();
    let len = br.read_u16_le()?;
    let nlen = br.read_u16_le()?;
    if len != !nlen {
        return Err(GzSpliceError::InvalidBlob("stored block LEN/NLEN mismatch"));
    }
    br.skip_bytes(len as usize)
}

/// The final block of a DEFLATE stream, located without reconstructing its
/// decompressed content.
pub(crate) struct FinalBlock {
    /// Bit offset of the final block's 3-bit header (`BFINAL` + `BTYPE`).
    pub(crate) header_bit_offset: usize,
    /// Bit offset immediately after the final block's content: its
    /// end-of-block symbol for a Huffman-coded block, or its last data byte
    /// for a stored block.
    pub(crate) content_end_bit_offset: usize,
}

/// Walks `payload` block by block until it finds the one with `BFINAL == 1`.
pub(crate) fn find_final_block(payload: &[u8]) -> Result<FinalBlock, GzSpliceError> {
    let mut br = BitReader::new(payload);
    loop {
        let header_bit_offset = br.bit_offset();
        let bfinal = br.read_bit()?;
        let btype = br.read_bits(2)?;
        match btype {
            0 => skip_stored_body(&mut br)?,
            1 => {
                let literal = fixed_literal_huffman();
                let distance = fixed_distance_huffman();
                skip_huffman_body(&mut br, &literal, &distance)?;
            }
            2 => {
                let (literal, distance) = dynamic_huffman_pair(&mut br)?;
                skip_huffman_body(&mut br, &literal, &distance)?;
            }
            _ => return Err(GzSpliceError::InvalidBlob("reserved deflate block type")),
        }
        if bfinal == 1 {
            return Ok(FinalBlock {
                header_bit_offset,
                content_end_bit_offset: br.bit_offset(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate_payload_of(data: &[u8], level: Compression) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), level);
        enc.write_all(data).unwrap();
        let gz = enc.finish().unwrap();
        // Strip the 10-byte header and 8-byte trailer to get the raw
        // DEFLATE payload, mirroring what `blob::parse` hands the writer.
        gz[10..gz.len() - 8].to_vec()
    }

    #[test]
    fn finds_final_block_in_fixed_huffman_stream() {
        let payload = deflate_payload_of(b"hello world, hello world", Compression::default());
        let found = find_final_block(&payload).unwrap();
        assert!(found.header_bit_offset < payload.len() * 8);
        assert!(found.content_end_bit_offset <= payload.len() * 8);
    }

    #[test]
    fn finds_final_block_in_dynamic_huffman_stream() {
        let payload = deflate_payload_of(
            b"the quick brown fox jumps over the lazy dog, again and again and again",
            Compression::best(),
        );
        let found = find_final_block(&payload).unwrap();
        assert!(found.header_bit_offset < payload.len() * 8);
        assert!(found.content_end_bit_offset <= payload.len() * 8);
    }

    #[test]
    fn finds_final_block_in_stored_stream() {
        let payload = deflate_payload_of(b"abcdefgh", Compression::none());
        let found = find_final_block(&payload).unwrap();
        assert!(found.header_bit_offset < payload.len() * 8);
        assert!(found.content_end_bit_offset <= payload.len() * 8);
    }

    #[test]
    fn finds_final_block_past_leading_non_final_blocks() {
        // Z_FULL_FLUSH-style multi-block inputs aren't easy to construct
        // directly through GzEncoder, so approximate with enough data and a
        // low compression level to encourage multiple blocks; regardless of
        // block count, the scan must land on one whose header reports
        // BFINAL, and that block's reported end must not exceed the stream.
        let data = vec![b'x'; 200_000];
        let payload = deflate_payload_of(&data, Compression::fast());
        let found = find_final_block(&payload).unwrap();
        assert!(found.content_end_bit_offset <= payload.len() * 8);
    }

    #[test]
    fn rejects_truncated_stream() {
        let payload = deflate_payload_of(b"some reasonably long text here", Compression::best());
        let truncated = &payload[..payload.len() / 2];
        assert!(find_final_block(truncated).is_err());
    }
}
