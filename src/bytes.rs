//! Byte-level helpers shared by the CGATS/ICC codecs and the USB drivers
//!

use std::fmt::Write as _;

pub fn read_uint16_be(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

pub fn read_uint16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

pub fn read_uint32_be(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(buf[offset..offset + 4].try_into().unwrap())
}

pub fn read_uint32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

pub fn write_uint16_be(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

pub fn write_uint16_le(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn write_uint32_be(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

pub fn write_uint32_le(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Formats a wire trace the drivers emit behind `COLORD_VERBOSE`/
/// `SPARK_PROTOCOL_DEBUG`: `kind: aa bb cc dd ...`.
#[must_use]
pub fn debug_dump(kind: &str, bytes: &[u8]) -> String {
    let mut out = String::with_capacity(kind.len() + 2 + bytes.len() * 3);
    out.push_str(kind);
    out.push_str(": ");
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_be_le() {
        let mut buf = [0u8; 8];
        write_uint32_be(&mut buf, 0, 0x0102_0304);
        assert_eq!(read_uint32_be(&buf, 0), 0x0102_0304);
        write_uint32_le(&mut buf, 4, 0x0102_0304);
        assert_eq!(read_uint32_le(&buf, 4), 0x0102_0304);
        write_uint16_be(&mut buf, 0, 0xABCD);
        assert_eq!(read_uint16_be(&buf, 0), 0xABCD);
        write_uint16_le(&mut buf, 0, 0xABCD);
        assert_eq!(read_uint16_le(&buf, 0), 0xABCD);
    }

    #[test]
    fn dump_formats_hex() {
        assert_eq!(debug_dump("huey", &[0xDE, 0xAD]), "huey: de ad");
    }
}
