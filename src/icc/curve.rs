//! `curv` tone curves and the `vcgt` video-card gamma tag built from them.

use crate::bytes::{read_uint16_be, read_uint32_be, write_uint16_be, write_uint32_be};
use crate::color::Rgb;
use crate::error::{ErrorKind, Result};

const CURV_SIG: &[u8; 4] = b"curv";
const VCGT_SIG: &[u8; 4] = b"vcgt";

/// A single-channel tone response curve.
#[derive(Debug, Clone, PartialEq)]
pub enum ToneCurve {
    /// `count == 0`: output equals input.
    Identity,
    /// `count == 1`: a pure power-law gamma.
    Gamma(f64),
    /// `count > 1`: a sampled LUT over `[0, 1]`, linearly interpolated.
    Table(Vec<u16>),
}

impl ToneCurve {
    /// Evaluates the curve at `x` in `[0, 1]`, returning a value in `[0, 1]`.
    #[must_use]
    pub fn eval(&self, x: f64) -> f64 {
        let x = x.clamp(0.0, 1.0);
        match self {
            ToneCurve::Identity => x,
            ToneCurve::Gamma(g) => x.powf(*g),
            ToneCurve::Table(samples) => {
                if samples.len() < 2 {
                    return x;
                }
                let pos = x * (samples.len() - 1) as f64;
                let i0 = (pos.floor() as usize).min(samples.len() - 2);
                let t = pos - i0 as f64;
                let a = samples[i0] as f64 / 65535.0;
                let b = samples[i0 + 1] as f64 / 65535.0;
                a + t * (b - a)
            }
        }
    }

    /// `true` if the curve is non-monotonic (a warning condition per
    /// a profile-author choice, not an error).
    #[must_use]
    pub fn is_non_monotonic(&self) -> bool {
        match self {
            ToneCurve::Table(samples) => samples.windows(2).any(|w| w[1] < w[0]),
            _ => false,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 12 || &data[0..4] != CURV_SIG {
            return Err(ErrorKind::FileInvalid("bad curv tag signature".into()));
        }
        let count = read_uint32_be(data, 8) as usize;
        match count {
            0 => Ok(ToneCurve::Identity),
            1 => {
                if data.len() < 14 {
                    return Err(ErrorKind::FileInvalid("truncated curv gamma entry".into()));
                }
                let raw = read_uint16_be(data, 12);
                Ok(ToneCurve::Gamma(raw as f64 / 256.0))
            }
            n => {
                if data.len() < 12 + n * 2 {
                    return Err(ErrorKind::FileInvalid("truncated curv table".into()));
                }
                let samples = (0..n).map(|i| read_uint16_be(data, 12 + i * 2)).collect();
                Ok(ToneCurve::Table(samples))
            }
        }
    }

    #[must_use]
    pub fn write(&self) -> Vec<u8> {
        match self {
            ToneCurve::Identity => {
                let mut out = vec![0u8; 12];
                out[0..4].copy_from_slice(CURV_SIG);
                out
            }
            ToneCurve::Gamma(g) => {
                let mut out = vec![0u8; 14];
                out[0..4].copy_from_slice(CURV_SIG);
                write_uint32_be(&mut out, 8, 1);
                write_uint16_be(&mut out, 12, (g * 256.0).round() as u16);
                out
            }
            ToneCurve::Table(samples) => {
                let mut out = vec![0u8; 12 + samples.len() * 2];
                out[0..4].copy_from_slice(CURV_SIG);
                write_uint32_be(&mut out, 8, samples.len() as u32);
                for (i, s) in samples.iter().enumerate() {
                    write_uint16_be(&mut out, 12 + i * 2, *s);
                }
                out
            }
        }
    }
}

/// Resamples three tone curves to `length` samples each, as
/// [`crate::icc::Profile::vcgt`] does.
#[must_use]
pub fn curves_to_rgb_array(curves: &[ToneCurve; 3], length: usize) -> Vec<Rgb> {
    (0..length)
        .map(|i| {
            let x = i as f64 / (length - 1).max(1) as f64;
            Rgb { r: curves[0].eval(x), g: curves[1].eval(x), b: curves[2].eval(x) }
        })
        .collect()
}

/// Parses a `vcgt` tag's table-form payload into three tone curves.
/// Formula-form (`tagType == 1`) is also supported, converting its
/// `(gamma, min, max)` per channel into a [`ToneCurve::Gamma`]-equivalent
/// sampled table so callers have one uniform shape to work with.
pub fn parse_vcgt(data: &[u8]) -> Result<[ToneCurve; 3]> {
    if data.len() < 12 || &data[0..4] != VCGT_SIG {
        return Err(ErrorKind::FileInvalid("bad vcgt tag signature".into()));
    }
    let tag_type = read_uint32_be(data, 8);
    match tag_type {
        0 => {
            if data.len() < 24 {
                return Err(ErrorKind::FileInvalid("truncated vcgt table header".into()));
            }
            let num_channels = read_uint32_be(data, 12) as usize;
            let num_entries = read_uint32_be(data, 16) as usize;
            let entry_size = read_uint32_be(data, 20) as usize;
            if num_channels != 3 || !(1..=2).contains(&entry_size) {
                return Err(ErrorKind::FileInvalid("unsupported vcgt table shape".into()));
            }
            let mut channels: Vec<Vec<u16>> = Vec::with_capacity(3);
            let mut offset = 24;
            for _ in 0..3 {
                let mut samples = Vec::with_capacity(num_entries);
                for _ in 0..num_entries {
                    let raw = if entry_size == 2 {
                        read_uint16_be(data, offset)
                    } else {
                        (*data.get(offset).ok_or_else(|| ErrorKind::FileInvalid("truncated vcgt data".into()))? as u16) << 8
                    };
                    samples.push(raw);
                    offset += entry_size;
                }
                channels.push(samples);
            }
            Ok([
                ToneCurve::Table(channels[0].clone()),
                ToneCurve::Table(channels[1].clone()),
                ToneCurve::Table(channels[2].clone()),
            ])
        }
        1 => {
            if data.len() < 12 + 3 * 3 * 4 {
                return Err(ErrorKind::FileInvalid("truncated vcgt formula".into()));
            }
            let read_f = |o: usize| super::header::s15f16_to_f64(read_uint32_be(data, o) as i32);
            let mut out = Vec::with_capacity(3);
            for ch in 0..3 {
                let base = 12 + ch * 12;
                let gamma = read_f(base);
                let min = read_f(base + 4);
                let max = read_f(base + 8);
                let samples: Vec<u16> = (0..=255)
                    .map(|i| {
                        let x = i as f64 / 255.0;
                        ((min + (max - min) * x.powf(gamma)) * 65535.0).round().clamp(0.0, 65535.0) as u16
                    })
                    .collect();
                out.push(ToneCurve::Table(samples));
            }
            Ok([out[0].clone(), out[1].clone(), out[2].clone()])
        }
        _ => Err(ErrorKind::FileInvalid(format!("unsupported vcgt tagType {tag_type}"))),
    }
}

/// Builds a table-form `vcgt` tag from three curves, each resampled to
/// `num_entries` 16-bit samples.
#[must_use]
pub fn write_vcgt(curves: &[ToneCurve; 3], num_entries: usize) -> Vec<u8> {
    let mut out = vec![0u8; 24 + 3 * num_entries * 2];
    out[0..4].copy_from_slice(VCGT_SIG);
    write_uint32_be(&mut out, 8, 0);
    write_uint32_be(&mut out, 12, 3);
    write_uint32_be(&mut out, 16, num_entries as u32);
    write_uint32_be(&mut out, 20, 2);
    let mut offset = 24;
    for curve in curves {
        for i in 0..num_entries {
            let x = i as f64 / (num_entries - 1).max(1) as f64;
            let v = (curve.eval(x) * 65535.0).round().clamp(0.0, 65535.0) as u16;
            write_uint16_be(&mut out, offset, v);
            offset += 2;
        }
    }
    out
}

/// Derives RGB primary Yxy colorants' matching single-gamma response curve,
/// as the EDID builder does for all three channels.
#[must_use]
pub fn single_gamma(gamma: f64) -> [ToneCurve; 3] {
    [ToneCurve::Gamma(gamma), ToneCurve::Gamma(gamma), ToneCurve::Gamma(gamma)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_curve_round_trips() {
        let c = ToneCurve::Identity;
        let bytes = c.write();
        assert_eq!(ToneCurve::parse(&bytes).unwrap(), ToneCurve::Identity);
        assert_eq!(c.eval(0.3), 0.3);
    }

    #[test]
    fn gamma_curve_round_trips_approximately() {
        let c = ToneCurve::Gamma(2.2);
        let bytes = c.write();
        let back = ToneCurve::parse(&bytes).unwrap();
        if let ToneCurve::Gamma(g) = back {
            assert!((g - 2.2).abs() < 0.01);
        } else {
            panic!("expected Gamma variant");
        }
    }

    #[test]
    fn vcgt_table_round_trips() {
        let curves = single_gamma(1.8);
        let bytes = write_vcgt(&curves, 256);
        let back = parse_vcgt(&bytes).unwrap();
        let rgb = curves_to_rgb_array(&back, 256);
        assert_eq!(rgb.len(), 256);
        assert!(rgb[255].r > 0.99);
    }

    #[test]
    fn detects_non_monotonic_table() {
        let c = ToneCurve::Table(vec![0, 100, 50, 200]);
        assert!(c.is_non_monotonic());
        let c2 = ToneCurve::Table(vec![0, 100, 150, 200]);
        assert!(!c2.is_non_monotonic());
    }
}
