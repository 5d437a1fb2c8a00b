//! Entity and relation vocabularies.
//!
//! `idx2ent.npy`/`idx2rel.npy` hold one name per index as a numpy string
//! array. candle only reads numeric arrays, so the header and the fixed-width
//! `<U`/`|S` payloads are decoded here. Object arrays (`|O`, pickled) only
//! contribute their length. A plain `.txt` file with one name per line is
//! accepted when no `.npy` is present.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

const MAGIC: &[u8] = b"\x93NUMPY";

/// Vocabulary size, with names when they could be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    pub len: usize,
    pub names: Option<Vec<String>>,
}

impl Vocabulary {
    fn from_names(names: Vec<String>) -> Self {
        Self {
            len: names.len(),
            names: Some(names),
        }
    }
}

/// Load `<root>/<stem>.npy`, falling back to `<root>/<stem>.txt`.
pub fn load_vocabulary(root: &Path, stem: &str) -> Result<Option<Vocabulary>> {
    let npy = root.join(format!("{stem}.npy"));
    if npy.exists() {
        return read_npy_vocabulary(&npy).map(Some);
    }
    let txt = root.join(format!("{stem}.txt"));
    if txt.exists() {
        let text = fs::read_to_string(&txt)?;
        return Ok(Some(Vocabulary::from_names(
            text.lines().map(str::to_owned).collect(),
        )));
    }
    debug!(vocabulary = stem, "no vocabulary file");
    Ok(None)
}

/// Decode a one-dimensional numpy string array.
pub fn read_npy_vocabulary(path: &Path) -> Result<Vocabulary> {
    let bytes = fs::read(path)?;
    let invalid = |msg: &str| Error::InvalidDataset(format!("{}: {msg}", path.display()));

    if bytes.len() < 10 || !bytes.starts_with(MAGIC) {
        return Err(invalid("not an npy file"));
    }
    let (header_len, offset) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 if bytes.len() >= 12 => (
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            12,
        ),
        _ => return Err(invalid("unsupported npy version")),
    };
    let data_start = offset + header_len;
    let header = bytes
        .get(offset..data_start)
        .and_then(|h| std::str::from_utf8(h).ok())
        .ok_or_else(|| invalid("truncated header"))?;

    let descr = header_value(header, "descr")
        .and_then(|v| v.strip_prefix('\'').or_else(|| v.strip_prefix('"')))
        .and_then(|v| v.split(['\'', '"']).next())
        .ok_or_else(|| invalid("missing descr"))?;
    let len = header_value(header, "shape")
        .and_then(parse_shape)
        .ok_or_else(|| invalid("missing shape"))?;

    let mut chars = descr.chars();
    let order = chars.next().ok_or_else(|| invalid("empty descr"))?;
    let kind = chars.next().ok_or_else(|| invalid("empty descr"))?;
    let width: usize = chars.as_str().parse().unwrap_or(0);
    let data = &bytes[data_start..];

    let names = match kind {
        'U' => {
            let item = width * 4;
            if data.len() < item * len {
                return Err(invalid("truncated data"));
            }
            (0..len)
                .map(|i| decode_utf32(&data[i * item..(i + 1) * item], order == '>'))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid("invalid code point"))?
        }
        'S' => {
            if data.len() < width * len {
                return Err(invalid("truncated data"));
            }
            (0..len)
                .map(|i| {
                    let raw = &data[i * width..(i + 1) * width];
                    let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
                    String::from_utf8_lossy(&raw[..end]).into_owned()
                })
                .collect()
        }
        _ => {
            debug!(path = %path.display(), descr, "vocabulary names not decodable, using length only");
            return Ok(Vocabulary { len, names: None });
        }
    };
    Ok(Vocabulary::from_names(names))
}

/// Raw text after `'key':` in the header dict.
fn header_value<'h>(header: &'h str, key: &str) -> Option<&'h str> {
    let at = header
        .find(&format!("'{key}'"))
        .or_else(|| header.find(&format!("\"{key}\"")))?;
    let rest = &header[at + key.len() + 2..];
    Some(rest.trim_start().strip_prefix(':')?.trim_start())
}

/// Element count of a `(a, b, ...)` shape tuple.
fn parse_shape(value: &str) -> Option<usize> {
    let inner = value.strip_prefix('(')?.split(')').next()?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .try_fold(1usize, |n, d| d.parse::<usize>().ok().map(|d| n * d))
}

fn decode_utf32(raw: &[u8], big_endian: bool) -> Option<String> {
    raw.chunks_exact(4)
        .map(|c| {
            let c = [c[0], c[1], c[2], c[3]];
            if big_endian {
                u32::from_be_bytes(c)
            } else {
                u32::from_le_bytes(c)
            }
        })
        .take_while(|&c| c != 0)
        .map(char::from_u32)
        .collect()
}

/// Encode names the way `numpy.save` stores a `<U` array.
#[cfg(test)]
pub(crate) fn encode_npy_strings(names: &[&str]) -> Vec<u8> {
    let width = names.iter().map(|n| n.chars().count()).max().unwrap_or(1).max(1);
    let mut header = format!(
        "{{'descr': '<U{width}', 'fortran_order': False, 'shape': ({},), }}",
        names.len()
    );
    // pad so the payload starts on a 64-byte boundary, header ends in '\n'
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');

    let mut out = MAGIC.to_vec();
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for name in names {
        let mut n = 0;
        for c in name.chars() {
            out.extend_from_slice(&(c as u32).to_le_bytes());
            n += 1;
        }
        for _ in n..width {
            out.extend_from_slice(&0u32.to_le_bytes());
        }
    }
    out
}
