//! `meta` tag: the key/value metadata dictionary colord attaches to
//! profiles it manages (`EDID_md5`, `CMF_product`, `DATA_source`, etc).

use crate::bytes::{read_uint32_be, write_uint32_be};
use crate::error::{ErrorKind, Result};
use std::collections::BTreeMap;

const SIG: &[u8; 4] = b"meta";
const RECORD_SIZE: u32 = 16;

pub type MetaDict = BTreeMap<String, String>;

pub fn parse(data: &[u8]) -> Result<MetaDict> {
    if data.len() < 16 || &data[0..4] != SIG {
        return Err(ErrorKind::FileInvalid("bad meta tag signature".into()));
    }
    let count = read_uint32_be(data, 8) as usize;
    let record_size = read_uint32_be(data, 12) as usize;
    let mut dict = MetaDict::new();
    for i in 0..count {
        let o = 16 + i * record_size;
        if o + 16 > data.len() {
            return Err(ErrorKind::FileInvalid("truncated meta record".into()));
        }
        let name_offset = read_uint32_be(data, o) as usize;
        let name_size = read_uint32_be(data, o + 4) as usize;
        let value_offset = read_uint32_be(data, o + 8) as usize;
        let value_size = read_uint32_be(data, o + 12) as usize;
        let name = read_cstr(data, name_offset, name_size)?;
        let value = read_cstr(data, value_offset, value_size)?;
        dict.insert(name, value);
    }
    Ok(dict)
}

fn read_cstr(data: &[u8], offset: usize, size: usize) -> Result<String> {
    let end = offset + size;
    if end > data.len() {
        return Err(ErrorKind::FileInvalid("meta string out of bounds".into()));
    }
    let raw = &data[offset..end];
    let trimmed = raw.split(|&b| b == 0).next().unwrap_or(raw);
    Ok(String::from_utf8_lossy(trimmed).into_owned())
}

#[must_use]
pub fn write(dict: &MetaDict) -> Vec<u8> {
    let header_len = 16 + dict.len() * RECORD_SIZE as usize;
    let mut strings: Vec<u8> = Vec::new();
    let mut records = Vec::with_capacity(dict.len());
    for (name, value) in dict {
        let name_offset = header_len + strings.len();
        strings.extend_from_slice(name.as_bytes());
        strings.push(0);
        let value_offset = header_len + strings.len();
        strings.extend_from_slice(value.as_bytes());
        strings.push(0);
        records.push((name_offset, name.len() + 1, value_offset, value.len() + 1));
    }
    let mut out = vec![0u8; header_len + strings.len()];
    out[0..4].copy_from_slice(SIG);
    write_uint32_be(&mut out, 8, dict.len() as u32);
    write_uint32_be(&mut out, 12, RECORD_SIZE);
    for (i, (no, ns, vo, vs)) in records.into_iter().enumerate() {
        let o = 16 + i * RECORD_SIZE as usize;
        write_uint32_be(&mut out, o, no as u32);
        write_uint32_be(&mut out, o + 4, ns as u32);
        write_uint32_be(&mut out, o + 8, vo as u32);
        write_uint32_be(&mut out, o + 12, vs as u32);
    }
    out[header_len..].copy_from_slice(&strings);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let mut dict = MetaDict::new();
        dict.insert("EDID_md5".to_string(), "abc123".to_string());
        dict.insert("CMF_product".to_string(), "colorcore".to_string());
        let bytes = write(&dict);
        let back = parse(&bytes).unwrap();
        assert_eq!(back, dict);
    }
}
