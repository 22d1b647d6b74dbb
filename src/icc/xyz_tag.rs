//! `XYZ ` tag type: used by `rXYZ`/`gXYZ`/`bXYZ`/`wtpt` and the header
//! illuminant.

use super::header::{s15f16_of, s15f16_to_f64};
use crate::bytes::{read_uint32_be, write_uint32_be};
use crate::color::Xyz;
use crate::error::{ErrorKind, Result};

const SIG: &[u8; 4] = b"XYZ ";

pub fn parse(data: &[u8]) -> Result<Xyz> {
    if data.len() < 20 || &data[0..4] != SIG {
        return Err(ErrorKind::FileInvalid("bad XYZ tag signature".into()));
    }
    Ok(Xyz {
        x: s15f16_to_f64(read_uint32_be(data, 8) as i32),
        y: s15f16_to_f64(read_uint32_be(data, 12) as i32),
        z: s15f16_to_f64(read_uint32_be(data, 16) as i32),
    })
}

#[must_use]
pub fn write(xyz: Xyz) -> Vec<u8> {
    let mut out = vec![0u8; 20];
    out[0..4].copy_from_slice(SIG);
    write_uint32_be(&mut out, 8, s15f16_of(xyz.x) as u32);
    write_uint32_be(&mut out, 12, s15f16_of(xyz.y) as u32);
    write_uint32_be(&mut out, 16, s15f16_of(xyz.z) as u32);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let xyz = Xyz { x: 0.9642, y: 1.0, z: 0.8249 };
        let bytes = write(xyz);
        let back = parse(&bytes).unwrap();
        assert!((back.x - xyz.x).abs() < 1e-4);
        assert!((back.y - xyz.y).abs() < 1e-4);
        assert!((back.z - xyz.z).abs() < 1e-4);
    }
}
