//! `ncl2` (namedColor2) tag: device-independent named spot colors.

use crate::bytes::{read_uint16_be, read_uint32_be, write_uint16_be, write_uint32_be};
use crate::color::Lab;
use crate::error::{ErrorKind, Result};

const SIG: &[u8; 4] = b"ncl2";
const NAME_LEN: usize = 32;

/// A single named color: PCS (Lab) coordinates, plus any device-space
/// coordinates (rarely populated by colorimeter-derived profiles).
#[derive(Debug, Clone, PartialEq)]
pub struct NamedColor {
    pub name: String,
    pub pcs: Lab,
    pub device: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct NamedColorList {
    pub prefix: String,
    pub suffix: String,
    pub colors: Vec<NamedColor>,
}

pub fn parse(data: &[u8]) -> Result<NamedColorList> {
    if data.len() < 84 || &data[0..4] != SIG {
        return Err(ErrorKind::FileInvalid("bad ncl2 tag signature".into()));
    }
    let count = read_uint32_be(data, 12) as usize;
    let num_device_coords = read_uint32_be(data, 16) as usize;
    let prefix = read_fixed_str(data, 20, NAME_LEN);
    let suffix = read_fixed_str(data, 52, NAME_LEN);
    let entry_len = NAME_LEN + 3 * 2 + num_device_coords * 2;
    let mut colors = Vec::with_capacity(count);
    for i in 0..count {
        let o = 84 + i * entry_len;
        if o + entry_len > data.len() {
            return Err(ErrorKind::FileInvalid("truncated ncl2 entry".into()));
        }
        let name = read_fixed_str(data, o, NAME_LEN);
        let l = pcs16_to_l(read_uint16_be(data, o + NAME_LEN));
        let a = pcs16_to_ab(read_uint16_be(data, o + NAME_LEN + 2));
        let b = pcs16_to_ab(read_uint16_be(data, o + NAME_LEN + 4));
        let device = (0..num_device_coords)
            .map(|c| read_uint16_be(data, o + NAME_LEN + 6 + c * 2) as f64 / 65535.0)
            .collect();
        colors.push(NamedColor { name, pcs: Lab { l, a, b }, device });
    }
    Ok(NamedColorList { prefix, suffix, colors })
}

#[must_use]
pub fn write(list: &NamedColorList) -> Vec<u8> {
    let num_device_coords = list.colors.first().map_or(0, |c| c.device.len());
    let entry_len = NAME_LEN + 3 * 2 + num_device_coords * 2;
    let mut out = vec![0u8; 84 + list.colors.len() * entry_len];
    out[0..4].copy_from_slice(SIG);
    write_uint32_be(&mut out, 12, list.colors.len() as u32);
    write_uint32_be(&mut out, 16, num_device_coords as u32);
    write_fixed_str(&mut out, 20, NAME_LEN, &list.prefix);
    write_fixed_str(&mut out, 52, NAME_LEN, &list.suffix);
    for (i, color) in list.colors.iter().enumerate() {
        let o = 84 + i * entry_len;
        write_fixed_str(&mut out, o, NAME_LEN, &color.name);
        write_uint16_be(&mut out, o + NAME_LEN, l_to_pcs16(color.pcs.l));
        write_uint16_be(&mut out, o + NAME_LEN + 2, ab_to_pcs16(color.pcs.a));
        write_uint16_be(&mut out, o + NAME_LEN + 4, ab_to_pcs16(color.pcs.b));
        for (c, coord) in color.device.iter().enumerate() {
            write_uint16_be(&mut out, o + NAME_LEN + 6 + c * 2, (coord.clamp(0.0, 1.0) * 65535.0).round() as u16);
        }
    }
    out
}

fn read_fixed_str(data: &[u8], offset: usize, len: usize) -> String {
    let raw = &data[offset..offset + len];
    let trimmed = raw.split(|&b| b == 0).next().unwrap_or(raw);
    String::from_utf8_lossy(trimmed).into_owned()
}

fn write_fixed_str(buf: &mut [u8], offset: usize, len: usize, s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(len - 1);
    buf[offset..offset + n].copy_from_slice(&bytes[..n]);
}

fn pcs16_to_l(v: u16) -> f64 {
    v as f64 / 65535.0 * 100.0
}
fn l_to_pcs16(l: f64) -> u16 {
    (l.clamp(0.0, 100.0) / 100.0 * 65535.0).round() as u16
}
fn pcs16_to_ab(v: u16) -> f64 {
    v as f64 / 65535.0 * 255.0 - 128.0
}
fn ab_to_pcs16(ab: f64) -> u16 {
    ((ab.clamp(-128.0, 127.0) + 128.0) / 255.0 * 65535.0).round() as u16
}
