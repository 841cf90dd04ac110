//! Serialises the 10-byte fixed gzip header plus optional extra/name/comment
//! fields, per RFC 1952.

use crate::error::GzSpliceError;
use crate::level::Level;
use std::io::{self, Write};

const FLAG_FHCRC: u8 = 0x02;
const FLAG_FEXTRA: u8 = 0x04;
const FLAG_FNAME: u8 = 0x08;
const FLAG_FCOMMENT: u8 = 0x10;

/// The configurable fields of a gzip header.
///
/// Defaults match RFC 1952's recommendation for "unknown": `mtime = 0`,
/// `os = 255`.
#[derive(Debug, Clone, Default)]
pub struct HeaderFields {
    pub mtime: u32,
    pub os: Option<u8>,
    pub extra: Option<Vec<u8>>,
    pub name: Option<String>,
    pub comment: Option<String>,
}

impl HeaderFields {
    fn os_byte(&self) -> u8 {
        self.os.unwrap_or(255)
    }
}

/// Encodes `s` as Latin-1 bytes, NUL-terminated, rejecting codepoints
/// outside `(0, 0xFF]`.
fn encode_latin1_nul_terminated(s: &str) -> Result<Vec<u8>, GzSpliceError> {
    let mut out = Vec::with_capacity(s.len() + 1);
    for c in s.chars() {
        let code = c as u32;
        if code == 0 || code > 0xFF {
            return Err(GzSpliceError::NonLatin1Header);
        }
        out.push(code as u8);
    }
    out.push(0);
    Ok(out)
}

/// Writes the gzip header for `fields` at compression `level` to `dest`.
pub fn write_header<W: Write>(
    dest: &mut W,
    fields: &HeaderFields,
    level: Level,
) -> Result<(), GzSpliceError> {
    let name_bytes = fields.name.as_deref().map(encode_latin1_nul_terminated).transpose()?;
    let comment_bytes = fields
        .comment
        .as_deref()
        .map(encode_latin1_nul_terminated)
        .transpose()?;

    if let Some(extra) = &fields.extra {
        if extra.len() > u16::MAX as usize {
            return Err(GzSpliceError::HeaderExtraTooLarge);
        }
    }

    let mut flag = 0u8;
    if fields.extra.is_some() {
        flag |= FLAG_FEXTRA;
    }
    if name_bytes.is_some() {
        flag |= FLAG_FNAME;
    }
    if comment_bytes.is_some() {
        flag |= FLAG_FCOMMENT;
    }

    write_all(dest, &[0x1f, 0x8b, 0x08, flag])?;
    write_all(dest, &fields.mtime.to_le_bytes())?;
    write_all(dest, &[level.xfl(), fields.os_byte()])?;

    if let Some(extra) = &fields.extra {
        write_all(dest, &(extra.len() as u16).to_le_bytes())?;
        write_all(dest, extra)?;
    }
    if let Some(name) = &name_bytes {
        write_all(dest, name)?;
    }
    if let Some(comment) = &comment_bytes {
        write_all(dest, comment)?;
    }

    Ok(())
}

fn write_all<W: Write>(dest: &mut W, buf: &[u8]) -> Result<(), GzSpliceError> {
    dest.write_all(buf).map_err(io_err)
}

fn io_err(e: io::Error) -> GzSpliceError {
    GzSpliceError::Io(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_header_is_ten_bytes() {
        let fields = HeaderFields::default();
        let mut out = Vec::new();
        write_header(&mut out, &fields, Level::Default).unwrap();
        assert_eq!(out.len(), 10);
        assert_eq!(&out[0..3], &[0x1f, 0x8b, 0x08]);
        assert_eq!(out[3], 0); // no optional fields
        assert_eq!(out[9], 255); // default os
    }

    #[test]
    fn xfl_reflects_level() {
        let fields = HeaderFields::default();
        let mut out = Vec::new();
        write_header(&mut out, &fields, Level::BestCompression).unwrap();
        assert_eq!(out[8], 2);

        let mut out = Vec::new();
        write_header(&mut out, &fields, Level::BestSpeed).unwrap();
        assert_eq!(out[8], 4);
    }

    #[test]
    fn name_and_comment_are_nul_terminated() {
        let fields = HeaderFields {
            name: Some("data.txt".to_string()),
            comment: Some("hi".to_string()),
            ..Default::default()
        };
        let mut out = Vec::new();
        write_header(&mut out, &fields, Level::Default).unwrap();
        assert_eq!(out[3], FLAG_FNAME | FLAG_FCOMMENT);
        let rest = &out[10..];
        assert_eq!(&rest[..9], b"data.txt\0");
        assert_eq!(&rest[9..], b"hi\0");
    }

    #[test]
    fn extra_field_is_length_prefixed() {
        let fields = HeaderFields {
            extra: Some(vec![1, 2, 3, 4]),
            ..Default::default()
        };
        let mut out = Vec::new();
        write_header(&mut out, &fields, Level::Default).unwrap();
        assert_eq!(out[3], FLAG_FEXTRA);
        assert_eq!(&out[10..12], &4u16.to_le_bytes());
        assert_eq!(&out[12..16], &[1, 2, 3, 4]);
    }

    #[test]
    fn rejects_embedded_nul_in_ascii_name() {
        let fields = HeaderFields {
            name: Some("evil\0name".to_string()),
            ..Default::default()
        };
        let mut out = Vec::new();
        assert!(matches!(
            write_header(&mut out, &fields, Level::Default),
            Err(GzSpliceError::NonLatin1Header)
        ));
    }

    #[test]
    fn rejects_non_latin1_name() {
        let fields = HeaderFields {
            name: Some("héllo—日本".to_string()),
            ..Default::default()
        };
        let mut out = Vec::new();
        assert!(matches!(
            write_header(&mut out, &fields, Level::Default),
            Err(GzSpliceError::NonLatin1Header)
        ));
    }

    #[test]
    fn accepts_latin1_supplement_name() {
        let fields = HeaderFields {
            name: Some("café".to_string()),
            ..Default::default()
        };
        let mut out = Vec::new();
        write_header(&mut out, &fields, Level::Default).unwrap();
        assert_eq!(&out[10..], "café\0".chars().map(|c| c as u8).collect::<Vec<_>>());
    }

    #[test]
    fn rejects_oversized_extra_field() {
        let fields = HeaderFields {
            extra: Some(vec![0u8; u16::MAX as usize + 1]),
            ..Default::default()
        };
        let mut out = Vec::new();
        assert!(matches!(
            write_header(&mut out, &fields, Level::Default),
            Err(GzSpliceError::HeaderExtraTooLarge)
        ));
    }
}
