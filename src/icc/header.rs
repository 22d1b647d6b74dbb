//! The 128-byte ICC profile header and the tag table that follows it.

use crate::bytes::{read_uint32_be, write_uint32_be};
use crate::error::{ErrorKind, Result};

pub const HEADER_SIZE: usize = 128;
pub const SIGNATURE: &[u8; 4] = b"acsp";

/// A raw 4-byte tag/type signature, displayed as its ASCII form.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    #[must_use]
    pub const fn new(s: &[u8; 4]) -> Self {
        Self(*s)
    }
}

impl std::fmt::Debug for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl std::fmt::Display for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Device/profile class, from header offset 12.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Kind {
    Input,
    Display,
    Output,
    DeviceLink,
    ColorSpace,
    Abstract,
    NamedColor,
    Unknown(FourCc),
}

impl Kind {
    fn from_fourcc(f: FourCc) -> Self {
        match &f.0 {
            b"scnr" => Kind::Input,
            b"mntr" => Kind::Display,
            b"prtr" => Kind::Output,
            b"link" => Kind::DeviceLink,
            b"spac" => Kind::ColorSpace,
            b"abst" => Kind::Abstract,
            b"nmcl" => Kind::NamedColor,
            _ => Kind::Unknown(f),
        }
    }

    fn to_fourcc(self) -> FourCc {
        FourCc(match self {
            Kind::Input => *b"scnr",
            Kind::Display => *b"mntr",
            Kind::Output => *b"prtr",
            Kind::DeviceLink => *b"link",
            Kind::ColorSpace => *b"spac",
            Kind::Abstract => *b"abst",
            Kind::NamedColor => *b"nmcl",
            Kind::Unknown(f) => f.0,
        })
    }
}

/// Data color space, from header offset 16 (and PCS, offset 20).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ColorSpace {
    Rgb,
    Gray,
    Cmyk,
    Xyz,
    Lab,
    Unknown(FourCc),
}

impl ColorSpace {
    fn from_fourcc(f: FourCc) -> Self {
        match &f.0 {
            b"RGB " => ColorSpace::Rgb,
            b"GRAY" => ColorSpace::Gray,
            b"CMYK" => ColorSpace::Cmyk,
            b"XYZ " => ColorSpace::Xyz,
            b"Lab " => ColorSpace::Lab,
            _ => ColorSpace::Unknown(f),
        }
    }

    fn to_fourcc(self) -> FourCc {
        FourCc(match self {
            ColorSpace::Rgb => *b"RGB ",
            ColorSpace::Gray => *b"GRAY",
            ColorSpace::Cmyk => *b"CMYK",
            ColorSpace::Xyz => *b"XYZ ",
            ColorSpace::Lab => *b"Lab ",
            ColorSpace::Unknown(f) => f.0,
        })
    }
}

/// Rendering intent, from header offset 64 (also used by [`crate::transform`]).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RenderingIntent {
    #[default]
    Perceptual,
    RelativeColorimetric,
    Saturation,
    AbsoluteColorimetric,
}

impl RenderingIntent {
    fn from_u32(v: u32) -> Self {
        match v {
            1 => RenderingIntent::RelativeColorimetric,
            2 => RenderingIntent::Saturation,
            3 => RenderingIntent::AbsoluteColorimetric,
            _ => RenderingIntent::Perceptual,
        }
    }

    fn to_u32(self) -> u32 {
        match self {
            RenderingIntent::Perceptual => 0,
            RenderingIntent::RelativeColorimetric => 1,
            RenderingIntent::Saturation => 2,
            RenderingIntent::AbsoluteColorimetric => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Header {
    pub size: u32,
    pub cmm_type: FourCc,
    pub version: u32,
    pub kind: Kind,
    pub color_space: ColorSpace,
    pub pcs: ColorSpace,
    pub platform: FourCc,
    pub flags: u32,
    pub manufacturer: FourCc,
    pub model: FourCc,
    pub attributes: u64,
    pub rendering_intent: RenderingIntent,
    pub illuminant: [i32; 3],
    pub creator: FourCc,
    pub profile_id: [u8; 16],
}

impl Default for Header {
    fn default() -> Self {
        Self {
            size: 0,
            cmm_type: FourCc([0; 4]),
            version: 0x0430_0000,
            kind: Kind::Display,
            color_space: ColorSpace::Rgb,
            pcs: ColorSpace::Xyz,
            platform: FourCc([0; 4]),
            flags: 0,
            manufacturer: FourCc([0; 4]),
            model: FourCc([0; 4]),
            attributes: 0,
            rendering_intent: RenderingIntent::Perceptual,
            illuminant: [s15f16_of(0.9642), s15f16_of(1.0), s15f16_of(0.8249)],
            creator: FourCc(*b"ccor"),
            profile_id: [0; 16],
        }
    }
}

/// Encodes a float as an ICC `s15Fixed16Number`.
#[must_use]
pub fn s15f16_of(v: f64) -> i32 {
    (v * 65536.0).round() as i32
}

/// Decodes an ICC `s15Fixed16Number`.
#[must_use]
pub fn s15f16_to_f64(v: i32) -> f64 {
    v as f64 / 65536.0
}

impl Header {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ErrorKind::FileInvalid("truncated ICC header".into()));
        }
        if &buf[36..40] != SIGNATURE {
            return Err(ErrorKind::FileInvalid("missing 'acsp' signature".into()));
        }
        let size = read_uint32_be(buf, 0);
        if (size as usize) > buf.len() {
            return Err(ErrorKind::FileInvalid("header size exceeds file length".into()));
        }
        let four = |o: usize| FourCc(buf[o..o + 4].try_into().unwrap());
        Ok(Self {
            size,
            cmm_type: four(4),
            version: read_uint32_be(buf, 8),
            kind: Kind::from_fourcc(four(12)),
            color_space: ColorSpace::from_fourcc(four(16)),
            pcs: ColorSpace::from_fourcc(four(20)),
            platform: four(40),
            flags: read_uint32_be(buf, 44),
            manufacturer: four(48),
            model: four(52),
            attributes: ((read_uint32_be(buf, 56) as u64) << 32) | read_uint32_be(buf, 60) as u64,
            rendering_intent: RenderingIntent::from_u32(read_uint32_be(buf, 64)),
            illuminant: [
                read_uint32_be(buf, 68) as i32,
                read_uint32_be(buf, 72) as i32,
                read_uint32_be(buf, 76) as i32,
            ],
            creator: four(80),
            profile_id: buf[84..100].try_into().unwrap(),
        })
    }

    pub fn write(&self, buf: &mut [u8]) {
        assert!(buf.len() >= HEADER_SIZE);
        write_uint32_be(buf, 0, self.size);
        buf[4..8].copy_from_slice(&self.cmm_type.0);
        write_uint32_be(buf, 8, self.version);
        buf[12..16].copy_from_slice(&self.kind.to_fourcc().0);
        buf[16..20].copy_from_slice(&self.color_space.to_fourcc().0);
        buf[20..24].copy_from_slice(&self.pcs.to_fourcc().0);
        buf[36..40].copy_from_slice(SIGNATURE);
        buf[40..44].copy_from_slice(&self.platform.0);
        write_uint32_be(buf, 44, self.flags);
        buf[48..52].copy_from_slice(&self.manufacturer.0);
        buf[52..56].copy_from_slice(&self.model.0);
        write_uint32_be(buf, 56, (self.attributes >> 32) as u32);
        write_uint32_be(buf, 60, self.attributes as u32);
        write_uint32_be(buf, 64, self.rendering_intent.to_u32());
        write_uint32_be(buf, 68, self.illuminant[0] as u32);
        write_uint32_be(buf, 72, self.illuminant[1] as u32);
        write_uint32_be(buf, 76, self.illuminant[2] as u32);
        buf[80..84].copy_from_slice(&self.creator.0);
        buf[84..100].copy_from_slice(&self.profile_id);
    }
}

/// A tag table entry: signature, offset, and size in bytes.
#[derive(Debug, Clone, Copy)]
pub struct TagEntry {
    pub signature: FourCc,
    pub offset: u32,
    pub size: u32,
}

pub fn parse_tag_table(buf: &[u8]) -> Result<Vec<TagEntry>> {
    if buf.len() < HEADER_SIZE + 4 {
        return Err(ErrorKind::FileInvalid("missing tag table".into()));
    }
    let count = read_uint32_be(buf, HEADER_SIZE) as usize;
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let o = HEADER_SIZE + 4 + i * 12;
        if o + 12 > buf.len() {
            return Err(ErrorKind::FileInvalid("truncated tag table".into()));
        }
        entries.push(TagEntry {
            signature: FourCc(buf[o..o + 4].try_into().unwrap()),
            offset: read_uint32_be(buf, o + 4),
            size: read_uint32_be(buf, o + 8),
        });
    }
    Ok(entries)
}

pub fn write_tag_table(entries: &[TagEntry]) -> Vec<u8> {
    let mut out = vec![0u8; 4 + entries.len() * 12];
    write_uint32_be(&mut out, 0, entries.len() as u32);
    for (i, e) in entries.iter().enumerate() {
        let o = 4 + i * 12;
        out[o..o + 4].copy_from_slice(&e.signature.0);
        write_uint32_be(&mut out, o + 4, e.offset);
        write_uint32_be(&mut out, o + 8, e.size);
    }
    out
}

/// 4-byte-pads `n`, as every ICC tag element must be aligned.
#[must_use]
pub fn pad4(n: usize) -> usize {
    (n + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let h = Header { size: 999, kind: Kind::Display, color_space: ColorSpace::Rgb, ..Header::default() };
        let mut buf = [0u8; HEADER_SIZE];
        h.write(&mut buf);
        let back = Header::parse(&buf).unwrap();
        assert_eq!(back.size, 999);
        assert_eq!(back.kind, Kind::Display);
        assert_eq!(back.color_space, ColorSpace::Rgb);
    }

    #[test]
    fn rejects_missing_signature() {
        let buf = [0u8; HEADER_SIZE];
        assert!(Header::parse(&buf).is_err());
    }
}
