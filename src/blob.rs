//! Parses a candidate gzip blob to locate its DEFLATE payload and trailer,
//! without decompressing it.
//!
//! Reads fixed fields, conditionally skips variable-length fields based on
//! a flag byte, and bails out with a structured error the moment a field
//! doesn't fit.

use crate::error::GzSpliceError;

/// gzip magic bytes plus the DEFLATE compression method byte.
const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

const FLAG_FHCRC: u8 = 0x02;
const FLAG_FEXTRA: u8 = 0x04;
const FLAG_FNAME: u8 = 0x08;
const FLAG_FCOMMENT: u8 = 0x10;

const FIXED_HEADER_LEN: usize = 10;
const TRAILER_LEN: usize = 8;

/// The DEFLATE payload and trailer fields extracted from a gzip blob.
///
/// `payload` aliases the input slice; parsing never allocates.
#[derive(Debug, Clone, Copy)]
pub struct ParsedBlob<'a> {
    pub payload: &'a [u8],
    pub crc: u32,
    pub isize: u32,
}

/// Validates and parses `blob` as a single-member gzip stream, returning its
/// DEFLATE payload and trailer fields.
///
/// Does not re-run CRC32 over the payload to cross-check the blob's own
/// trailer: trusting the caller's blob here is what makes splicing cheaper
/// than decompress-then-recompress.
pub fn parse(blob: &[u8]) -> Result<ParsedBlob<'_>, GzSpliceError> {
    if blob.len() < FIXED_HEADER_LEN + TRAILER_LEN {
        return Err(GzSpliceError::InvalidBlob("blob shorter than header+trailer"));
    }
    if blob[0..3] != GZIP_MAGIC {
        return Err(GzSpliceError::InvalidBlob("bad gzip magic or compression method"));
    }

    let flag = blob[3];
    let payload_end = blob.len() - TRAILER_LEN;
    let mut i = FIXED_HEADER_LEN;

    if flag & FLAG_FEXTRA != 0 {
        if i + 2 > payload_end {
            return Err(GzSpliceError::InvalidBlob("truncated FEXTRA length"));
        }
        let extra_len = u16::from_le_bytes([blob[i], blob[i + 1]]) as usize;
        i += 2;
        i = i
            .checked_add(extra_len)
            .filter(|&end| end <= payload_end)
            .ok_or(GzSpliceError::InvalidBlob("truncated FEXTRA field"))?;
    }

    if flag & FLAG_FNAME != 0 {
        i = find_nul(blob, i, payload_end)
            .ok_or(GzSpliceError::InvalidBlob("unterminated FNAME field"))?
            + 1;
    }

    if flag & FLAG_FCOMMENT != 0 {
        i = find_nul(blob, i, payload_end)
            .ok_or(GzSpliceError::InvalidBlob("unterminated FCOMMENT field"))?
            + 1;
    }

    if flag & FLAG_FHCRC != 0 {
        if i + 2 > payload_end {
            return Err(GzSpliceError::InvalidBlob("truncated FHCRC field"));
        }
        i += 2;
    }

    if i > payload_end {
        return Err(GzSpliceError::InvalidBlob("header fields overran trailer"));
    }

    let payload = &blob[i..payload_end];
    let crc = u32::from_le_bytes(blob[payload_end..payload_end + 4].try_into().unwrap());
    let isize = u32::from_le_bytes(
        blob[payload_end + 4..payload_end + 8]
            .try_into()
            .unwrap(),
    );

    Ok(ParsedBlob { payload, crc, isize })
}

/// Scans `blob[from..limit]` for a NUL byte, returning its index.
fn find_nul(blob: &[u8], from: usize, limit: usize) -> Option<usize> {
    blob[from..limit].iter().position(|&b| b == 0).map(|p| from + p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn parses_plain_blob() {
        let blob = gzip(b"hello world");
        let parsed = parse(&blob).unwrap();
        assert_eq!(parsed.isize, 11);
        assert!(!parsed.payload.is_empty());
    }

    #[test]
    fn parses_blob_with_all_optional_fields_and_empty_payload() {
        let mut blob = vec![0x1f, 0x8b, 0x08, FLAG_FEXTRA | FLAG_FNAME | FLAG_FCOMMENT | FLAG_FHCRC];
        blob.extend_from_slice(&0u32.to_le_bytes()); // mtime
        blob.push(0); // xfl
        blob.push(255); // os
        blob.extend_from_slice(&3u16.to_le_bytes()); // extra len
        blob.extend_from_slice(&[1, 2, 3]); // extra bytes
        blob.extend_from_slice(b"name\0");
        blob.extend_from_slice(b"comment\0");
        blob.extend_from_slice(&[0xAB, 0xCD]); // fake FHCRC
        // no DEFLATE payload
        blob.extend_from_slice(&0u32.to_le_bytes()); // crc
        blob.extend_from_slice(&0u32.to_le_bytes()); // isize

        let parsed = parse(&blob).unwrap();
        assert!(parsed.payload.is_empty());
        assert_eq!(parsed.isize, 0);
        assert_eq!(parsed.crc, 0);
    }

    #[test]
    fn rejects_too_short_blob() {
        let blob = vec![0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(parse(&blob), Err(GzSpliceError::InvalidBlob(_))));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut blob = gzip(b"data");
        blob[0] = 0;
        assert!(matches!(parse(&blob), Err(GzSpliceError::InvalidBlob(_))));
    }

    #[test]
    fn rejects_truncated_name_field() {
        let mut blob = vec![0x1f, 0x8b, 0x08, FLAG_FNAME];
        blob.extend_from_slice(&0u32.to_le_bytes());
        blob.push(0);
        blob.push(255);
        blob.extend_from_slice(b"no_nul_here"); // never terminated
        blob.extend_from_slice(&0u32.to_le_bytes());
        blob.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(parse(&blob), Err(GzSpliceError::InvalidBlob(_))));
    }
}
