//! `mluc` (multiLocalizedUnicode) tag parsing/writing, and the locale
//! resolution an ICC profile codec requires of it.

use crate::bytes::{read_uint16_be, read_uint32_be, write_uint32_be};
use crate::error::{ErrorKind, Result};
use crate::locale::{resolve, Locale};

const SIG: &[u8; 4] = b"mluc";
const RECORD_SIZE: u32 = 12;

/// A parsed `mluc` tag: one UTF-8 string per `language_country` locale.
#[derive(Debug, Clone, Default)]
pub struct Mlu {
    entries: Vec<(Locale, String)>,
}

impl Mlu {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, locale: Locale, text: impl Into<String>) {
        let text = text.into();
        if let Some(slot) = self.entries.iter_mut().find(|(l, _)| *l == locale) {
            slot.1 = text;
        } else {
            self.entries.push((locale, text));
        }
    }

    /// Resolves text for `want` via the standard three-step fallback.
    /// Missing data is [`ErrorKind::NoData`]; the caller is responsible for
    /// validating `want` beforehand (invalid locale strings never reach
    /// here — they fail at [`Locale::parse`] with [`ErrorKind::InvalidLocale`]).
    pub fn get(&self, want: &Locale) -> Result<&str> {
        resolve(&self.entries, want)
            .map(String::as_str)
            .ok_or_else(|| ErrorKind::NoData(format!("no localized text for {want}")))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 16 || &data[0..4] != SIG {
            return Err(ErrorKind::FileInvalid("bad mluc signature".into()));
        }
        let count = read_uint32_be(data, 8) as usize;
        let record_size = read_uint32_be(data, 12);
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let o = 16 + i * record_size as usize;
            if o + 12 > data.len() {
                return Err(ErrorKind::FileInvalid("truncated mluc record".into()));
            }
            let lang = String::from_utf8_lossy(&data[o..o + 2]).to_ascii_lowercase();
            let country = String::from_utf8_lossy(&data[o + 2..o + 4]).to_ascii_uppercase();
            let len = read_uint32_be(data, o + 4) as usize;
            let rec_offset = read_uint32_be(data, o + 8) as usize;
            if rec_offset + len > data.len() {
                return Err(ErrorKind::FileInvalid("mluc string out of bounds".into()));
            }
            let utf16: Vec<u16> = data[rec_offset..rec_offset + len]
                .chunks_exact(2)
                .map(|c| read_uint16_be(c, 0))
                .collect();
            let text = String::from_utf16_lossy(&utf16);
            let locale_str = if lang.trim_matches('\0').is_empty() {
                String::new()
            } else if country.trim_matches('\0').is_empty() {
                lang.clone()
            } else {
                format!("{lang}_{country}")
            };
            let locale = Locale::parse(&locale_str).unwrap_or_else(|_| Locale::none());
            entries.push((locale, text));
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn write(&self) -> Vec<u8> {
        let count = self.entries.len() as u32;
        let header_len = 16 + self.entries.len() * RECORD_SIZE as usize;
        let mut strings: Vec<u16> = Vec::new();
        let mut offsets = Vec::with_capacity(self.entries.len());
        for (_, text) in &self.entries {
            let units: Vec<u16> = text.encode_utf16().collect();
            offsets.push((header_len + strings.len() * 2, units.len() * 2));
            strings.extend(units);
        }
        let mut out = vec![0u8; header_len + strings.len() * 2];
        out[0..4].copy_from_slice(SIG);
        write_uint32_be(&mut out, 8, count);
        write_uint32_be(&mut out, 12, RECORD_SIZE);
        for (i, (locale, _)) in self.entries.iter().enumerate() {
            let o = 16 + i * RECORD_SIZE as usize;
            let lang = if locale.language.is_empty() { *b"\0\0" } else { lang_bytes(&locale.language) };
            out[o..o + 2].copy_from_slice(&lang);
            let country = locale.territory.as_deref().map(country_bytes).unwrap_or([0, 0]);
            out[o + 2..o + 4].copy_from_slice(&country);
            let (str_offset, str_len) = offsets[i];
            write_uint32_be(&mut out, o + 4, str_len as u32);
            write_uint32_be(&mut out, o + 8, str_offset as u32);
        }
        for (i, unit) in strings.iter().enumerate() {
            out[header_len + i * 2..header_len + i * 2 + 2].copy_from_slice(&unit.to_be_bytes());
        }
        out
    }
}

fn lang_bytes(s: &str) -> [u8; 2] {
    let b = s.as_bytes();
    [*b.first().unwrap_or(&0), *b.get(1).unwrap_or(&0)]
}

fn country_bytes(s: &String) -> [u8; 2] {
    let b = s.as_bytes();
    [*b.first().unwrap_or(&0), *b.get(1).unwrap_or(&0)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_write_parse() {
        let mut mlu = Mlu::new();
        mlu.set(Locale::none(), "Generic Monitor");
        mlu.set(Locale::parse("fr_CA").unwrap(), "Moniteur generique");
        let bytes = mlu.write();
        let back = Mlu::parse(&bytes).unwrap();
        assert_eq!(back.get(&Locale::none()).unwrap(), "Generic Monitor");
        assert_eq!(back.get(&Locale::parse("fr_CA.UTF-8").unwrap()).unwrap(), "Moniteur generique");
    }

    #[test]
    fn missing_locale_falls_back_to_empty_entry() {
        let mut mlu = Mlu::new();
        mlu.set(Locale::none(), "Default");
        assert_eq!(mlu.get(&Locale::parse("de").unwrap()).unwrap(), "Default");
    }

    #[test]
    fn no_entries_is_no_data() {
        let mlu = Mlu::new();
        assert_eq!(mlu.get(&Locale::none()), Err(ErrorKind::NoData("no localized text for ".into())));
    }
}
