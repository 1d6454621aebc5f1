//! Archive (`ar`) parsing (SPEC_FULL §3/§9 "Open question: behaviour on
//! archives"): splits a `!<arch>\n`-format file into its named members
//! without linking against `libarchive`/`ar` — this crate reads just enough
//! of the format to hand each member's bytes to [`crate::binfile::BinFile::open`].
//!
//! GNU extended filenames (the `//` member) are resolved; the `/` symbol-index
//! member is skipped, since relocation resolution in this crate always works
//! from the members' own symbol tables rather than the archive's index.

use crate::error::{self, Result};

const GLOBAL_MAGIC: &[u8; 8] = b"!<arch>\n";
const HEADER_LEN: usize = 60;
const END_MARKER: &[u8; 2] = b"`\n";

pub struct Member<'a> {
    pub name: String,
    pub data: &'a [u8],
}

/// Parses every member out of `data`. Preserves the C tool's archive
/// behaviour verbatim (DESIGN.md Open Question): this function always
/// returns every member; callers wanting "first member only, with a
/// warning" behaviour call [`first_member`] instead.
pub fn parse_members(data: &[u8]) -> Result<Vec<Member<'_>>> {
    if data.len() < GLOBAL_MAGIC.len() || &data[..GLOBAL_MAGIC.len()] != GLOBAL_MAGIC {
        return Err(error::Error::ArchiveParsingError {
            msg: "missing '!<arch>\\n' global header".into(),
        });
    }
    let mut pos = GLOBAL_MAGIC.len();
    let mut long_names: Vec<u8> = Vec::new();
    let mut out = Vec::new();

    while pos + HEADER_LEN <= data.len() {
        let header = &data[pos..pos + HEADER_LEN];
        if &header[58..60] != END_MARKER {
            return Err(error::Error::ArchiveParsingError {
                msg: format!("malformed member header at offset {pos:#x}"),
            });
        }
        let raw_name = std::str::from_utf8(&header[0..16]).unwrap_or("").trim_end();
        let size_str = std::str::from_utf8(&header[48..58]).unwrap_or("0").trim();
        let size: usize = size_str.parse().map_err(|_| error::Error::ArchiveParsingError {
            msg: format!("malformed member size {size_str:?}"),
        })?;
        let body_start = pos + HEADER_LEN;
        let body_end = body_start + size;
        if body_end > data.len() {
            return Err(error::Error::ArchiveParsingError {
                msg: "member body truncated".into(),
            });
        }
        let body = &data[body_start..body_end];

        if raw_name == "//" {
            long_names = body.to_vec();
        } else if raw_name == "/" {
            // Symbol index; not needed since members carry their own symtab.
        } else if let Some(rest) = raw_name.strip_prefix('/') {
            let offset: usize = rest.trim().parse().unwrap_or(0);
            let name = long_names
                .get(offset..)
                .and_then(|s| s.iter().position(|&b| b == b'\n').map(|p| &s[..p]))
                .map(|s| String::from_utf8_lossy(s).trim_end_matches('/').to_string())
                .unwrap_or_else(|| raw_name.to_string());
            out.push(Member { name, data: body });
        } else {
            out.push(Member {
                name: raw_name.trim_end_matches('/').to_string(),
                data: body,
            });
        }

        pos = body_end + (size % 2); // members are padded to an even boundary
    }
    Ok(out)
}

/// The C tool's default when the caller passes no explicit member array: the
/// first member is parsed and a warning is logged (DESIGN.md Open Question,
/// preserved verbatim rather than redesigned).
pub fn first_member(data: &[u8]) -> Result<Member<'_>> {
    let members = parse_members(data)?;
    if members.len() > 1 {
        log::warn!(
            "archive has {} members but no member array was given; parsing only the first ({})",
            members.len(),
            members[0].name
        );
    }
    members
        .into_iter()
        .next()
        .ok_or_else(|| error::Error::ArchiveParsingError {
            msg: "archive has no members".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(name: &str, size: usize) -> Vec<u8> {
        let mut header = vec![b' '; HEADER_LEN];
        header[0..name.len()].copy_from_slice(name.as_bytes());
        header[16..16 + 1].copy_from_slice(b"0");
        let size_str = size.to_string();
        header[48..48 + size_str.len()].copy_from_slice(size_str.as_bytes());
        header[58] = b'`';
        header[59] = b'\n';
        header
    }

    fn build_archive(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = GLOBAL_MAGIC.to_vec();
        for (name, body) in members {
            out.extend_from_slice(&pad(name, body.len()));
            out.extend_from_slice(body);
            if body.len() % 2 == 1 {
                out.push(b'\n');
            }
        }
        out
    }

    #[test]
    fn parses_two_short_named_members() {
        let archive = build_archive(&[("a.o/", b"AAAA"), ("b.o/", b"BBB")]);
        let members = parse_members(&archive).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].name, "a.o");
        assert_eq!(members[0].data, b"AAAA");
        assert_eq!(members[1].name, "b.o");
        assert_eq!(members[1].data, b"BBB");
    }

    #[test]
    fn first_member_warns_but_succeeds_on_multi_member_archive() {
        let archive = build_archive(&[("a.o/", b"AAAA"), ("b.o/", b"BB")]);
        let m = first_member(&archive).unwrap();
        assert_eq!(m.name, "a.o");
    }

    #[test]
    fn rejects_missing_global_header() {
        assert!(parse_members(b"not an archive").is_err());
    }
}
