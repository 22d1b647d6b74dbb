//! ICC profile codec: load/parse, localized-text and
//! VCGT/metadata/named-color accessors, mutate-and-save, and the EDID
//! minimal-profile builder.

pub mod checksum;
pub mod curve;
pub mod edid;
pub mod header;
pub mod meta;
pub mod mlu;
pub mod named_color;
mod xyz_tag;

pub use curve::ToneCurve;
pub use header::{ColorSpace, FourCc, Kind, RenderingIntent};
pub use meta::MetaDict;
pub use mlu::Mlu;
pub use named_color::{NamedColor, NamedColorList};

use crate::color::{xyz_to_color_temperature, Rgb, Xyz};
use crate::error::{ErrorKind, Result};
use crate::locale::Locale;
use header::{pad4, Header, TagEntry, HEADER_SIZE};
use std::collections::BTreeMap;

/// A loaded (or freshly-built) ICC profile: a header plus a signature-keyed
/// table of raw tag bytes. Tags nobody has asked to interpret round-trip
/// untouched; interpreted tags are re-serialized from their typed form only
/// when mutated.
#[derive(Debug, Clone)]
pub struct Profile {
    pub header: Header,
    tags: BTreeMap<[u8; 4], Vec<u8>>,
    pub warnings: Vec<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}

impl Profile {
    #[must_use]
    pub fn new() -> Self {
        Self { header: Header::default(), tags: BTreeMap::new(), warnings: Vec::new() }
    }

    /// Parses a binary ICC profile: header, tag table, and every tag's raw
    /// bytes (interpreted lazily by the accessors below).
    pub fn load(buf: &[u8]) -> Result<Self> {
        let header = Header::parse(buf)?;
        let entries = header::parse_tag_table(buf)?;
        let mut tags = BTreeMap::new();
        for e in &entries {
            let start = e.offset as usize;
            let end = start + e.size as usize;
            if end > buf.len() {
                return Err(ErrorKind::FileInvalid(format!("tag {} data out of bounds", e.signature)));
            }
            tags.insert(e.signature.0, buf[start..end].to_vec());
        }
        let mut profile = Self { header, tags, warnings: Vec::new() };
        profile.collect_warnings();
        Ok(profile)
    }

    fn collect_warnings(&mut self) {
        if let Ok(curves) = self.vcgt_curves() {
            if curves.iter().any(ToneCurve::is_non_monotonic) {
                self.warnings.push("vcgt: non-monotonic channel curve".to_string());
            }
        }
        for sig in [*b"rTRC", *b"gTRC", *b"bTRC"] {
            if let Ok(ToneCurve::Table(samples)) = self.curve_tag(sig) {
                if samples.iter().any(|&v| v == 0 || v == 65535) && samples.len() > 2 {
                    self.warnings.push(format!("{}: curve clips at an extreme", FourCc(sig)));
                }
            }
        }
    }

    /// Serializes to binary ICC, recomputing `size`, tag offsets, and the
    /// checksum-derived profile ID. Deterministic given identical tag
    /// contents (tags are written in signature order).
    pub fn save(&self) -> Result<Vec<u8>> {
        let mut entries = Vec::with_capacity(self.tags.len());
        let mut data = Vec::new();
        let mut offset = HEADER_SIZE + 4 + self.tags.len() * 12;
        for (sig, bytes) in &self.tags {
            entries.push(TagEntry { signature: FourCc(*sig), offset: offset as u32, size: bytes.len() as u32 });
            data.extend_from_slice(bytes);
            let padded = pad4(bytes.len());
            data.resize(data.len() + (padded - bytes.len()), 0);
            offset += padded;
        }

        let mut header = self.header.clone();
        header.size = offset as u32;
        header.profile_id = [0; 16];

        let mut out = vec![0u8; HEADER_SIZE];
        header.write(&mut out);
        out.extend_from_slice(&header::write_tag_table(&entries));
        out.extend_from_slice(&data);

        let digest = checksum::compute(&out);
        out[84..100].copy_from_slice(&digest);
        Ok(out)
    }

    /// The MD5 profile ID over the canonicalized body, recomputed from the
    /// profile's current contents (independent of whatever `profile_id` was
    /// loaded with).
    pub fn checksum(&self) -> Result<[u8; 16]> {
        Ok(checksum::compute(&self.save()?))
    }

    pub fn size_bytes(&self) -> Result<u32> {
        Ok(self.save()?.len() as u32)
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.header.version
    }

    pub fn set_version(&mut self, version: u32) {
        self.header.version = version;
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.header.kind
    }

    pub fn set_kind(&mut self, kind: Kind) {
        self.header.kind = kind;
    }

    #[must_use]
    pub fn color_space(&self) -> ColorSpace {
        self.header.color_space
    }

    pub fn set_color_space(&mut self, cs: ColorSpace) {
        self.header.color_space = cs;
    }

    /// Raw bytes of `signature` as originally stored (or as last set),
    /// for the fix-profile utility's tag-dump mode.
    pub fn get_tag_data(&self, signature: [u8; 4]) -> Result<Vec<u8>> {
        self.tags
            .get(&signature)
            .cloned()
            .ok_or_else(|| ErrorKind::NoData(format!("no {} tag", FourCc(signature))))
    }

    pub fn set_tag_data(&mut self, signature: [u8; 4], data: Vec<u8>) {
        self.tags.insert(signature, data);
    }

    fn mlu(&self, signature: [u8; 4]) -> Result<Mlu> {
        match self.tags.get(&signature) {
            Some(bytes) => Mlu::parse(bytes),
            None => Err(ErrorKind::NoData(format!("no {} tag", FourCc(signature)))),
        }
    }

    fn set_mlu_entry(&mut self, signature: [u8; 4], locale: Locale, text: impl Into<String>) {
        let mut mlu = self.mlu(signature).unwrap_or_default();
        mlu.set(locale, text);
        self.tags.insert(signature, mlu.write());
    }

    pub fn description(&self, locale: &Locale) -> Result<String> {
        self.mlu(*b"desc")?.get(locale).map(str::to_string)
    }

    pub fn set_description(&mut self, locale: Locale, text: impl Into<String>) {
        self.set_mlu_entry(*b"desc", locale, text);
    }

    pub fn copyright(&self, locale: &Locale) -> Result<String> {
        self.mlu(*b"cprt")?.get(locale).map(str::to_string)
    }

    pub fn set_copyright(&mut self, locale: Locale, text: impl Into<String>) {
        self.set_mlu_entry(*b"cprt", locale, text);
    }

    pub fn manufacturer_desc(&self, locale: &Locale) -> Result<String> {
        self.mlu(*b"dmnd")?.get(locale).map(str::to_string)
    }

    pub fn set_manufacturer_desc(&mut self, locale: Locale, text: impl Into<String>) {
        self.set_mlu_entry(*b"dmnd", locale, text);
    }

    pub fn model_desc(&self, locale: &Locale) -> Result<String> {
        self.mlu(*b"dmdd")?.get(locale).map(str::to_string)
    }

    pub fn set_model_desc(&mut self, locale: Locale, text: impl Into<String>) {
        self.set_mlu_entry(*b"dmdd", locale, text);
    }

    pub fn metadata(&self) -> Result<MetaDict> {
        match self.tags.get(b"meta") {
            Some(bytes) => meta::parse(bytes),
            None => Err(ErrorKind::NoData("no meta tag".into())),
        }
    }

    pub fn set_metadata(&mut self, dict: &MetaDict) {
        self.tags.insert(*b"meta", meta::write(dict));
    }

    pub fn xyz_tag(&self, signature: [u8; 4]) -> Result<Xyz> {
        match self.tags.get(&signature) {
            Some(bytes) => xyz_tag::parse(bytes),
            None => Err(ErrorKind::NoData(format!("no {} tag", FourCc(signature)))),
        }
    }

    pub fn set_xyz_tag(&mut self, signature: [u8; 4], xyz: Xyz) {
        self.tags.insert(signature, xyz_tag::write(xyz));
    }

    pub fn white_point(&self) -> Result<Xyz> {
        self.xyz_tag(*b"wtpt")
    }

    /// Correlated color temperature of the profile's white point, via
    /// McCamy's approximation.
    pub fn correlated_color_temperature(&self) -> Result<f64> {
        Ok(xyz_to_color_temperature(self.white_point()?))
    }

    pub fn primaries(&self) -> Result<(Xyz, Xyz, Xyz)> {
        Ok((self.xyz_tag(*b"rXYZ")?, self.xyz_tag(*b"gXYZ")?, self.xyz_tag(*b"bXYZ")?))
    }

    pub fn curve_tag(&self, signature: [u8; 4]) -> Result<ToneCurve> {
        match self.tags.get(&signature) {
            Some(bytes) => ToneCurve::parse(bytes),
            None => Err(ErrorKind::NoData(format!("no {} tag", FourCc(signature)))),
        }
    }

    pub fn set_curve_tag(&mut self, signature: [u8; 4], curve: &ToneCurve) {
        self.tags.insert(signature, curve.write());
    }

    fn vcgt_curves(&self) -> Result<[ToneCurve; 3]> {
        match self.tags.get(b"vcgt") {
            Some(bytes) => curve::parse_vcgt(bytes),
            None => Err(ErrorKind::NoData("no vcgt tag".into())),
        }
    }

    /// Resamples the `vcgt` curves to `length` RGB samples, as a unified
    /// channel-wise array.
    pub fn vcgt(&self, length: usize) -> Result<Vec<Rgb>> {
        let curves = self.vcgt_curves()?;
        Ok(curve::curves_to_rgb_array(&curves, length))
    }

    pub fn set_vcgt(&mut self, curves: &[ToneCurve; 3], entries: usize) {
        self.tags.insert(*b"vcgt", curve::write_vcgt(curves, entries));
    }

    pub fn named_colors(&self) -> Result<NamedColorList> {
        match self.tags.get(b"ncl2") {
            Some(bytes) => named_color::parse(bytes),
            None => Err(ErrorKind::NoData("no ncl2 tag".into())),
        }
    }

    pub fn set_named_colors(&mut self, list: &NamedColorList) {
        self.tags.insert(*b"ncl2", named_color::write(list));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> Profile {
        let mut p = Profile::new();
        p.set_description(Locale::none(), "Test Monitor");
        p.set_description(Locale::parse("fr").unwrap(), "Moniteur de test");
        p.set_copyright(Locale::none(), "CC0");
        p.set_xyz_tag(*b"wtpt", Xyz { x: 0.9642, y: 1.0, z: 0.8249 });
        let mut meta = MetaDict::new();
        meta.insert("EDID_md5".to_string(), "abc".to_string());
        p.set_metadata(&meta);
        p
    }

    #[test]
    fn round_trips_through_save_load() {
        let p = sample_profile();
        let bytes = p.save().unwrap();
        let back = Profile::load(&bytes).unwrap();
        assert_eq!(back.description(&Locale::none()).unwrap(), "Test Monitor");
        assert_eq!(back.description(&Locale::parse("fr_CA").unwrap()).unwrap(), "Moniteur de test");
        assert_eq!(back.copyright(&Locale::none()).unwrap(), "CC0");
        assert_eq!(back.metadata().unwrap().get("EDID_md5").map(String::as_str), Some("abc"));
    }

    #[test]
    fn checksum_changes_iff_body_changes() {
        let p1 = sample_profile();
        let c1 = p1.checksum().unwrap();
        let mut p2 = sample_profile();
        assert_eq!(c1, p2.checksum().unwrap());
        p2.set_description(Locale::none(), "Different Monitor");
        assert_ne!(c1, p2.checksum().unwrap());
    }

    #[test]
    fn mutating_description_preserves_other_tags() {
        let mut p = sample_profile();
        let white_before = p.white_point().unwrap();
        p.set_description(Locale::none(), "Renamed Monitor");
        assert_eq!(p.white_point().unwrap(), white_before);
        assert_eq!(p.copyright(&Locale::none()).unwrap(), "CC0");
    }

    #[test]
    fn missing_tag_is_no_data() {
        let p = Profile::new();
        assert!(matches!(p.description(&Locale::none()), Err(ErrorKind::NoData(_))));
    }

    #[test]
    fn get_tag_data_returns_raw_bytes() {
        let p = sample_profile();
        let raw = p.get_tag_data(*b"cprt").unwrap();
        assert_eq!(&raw[0..4], b"mluc");
    }
}
