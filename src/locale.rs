//! POSIX-style locale strings: `""`, `"en_GB"`,
//! `"fr"`, `"fr.UTF-8"`, `"fr_CA.UTF-8"`, plus the three-step fallback
//! resolution shared by the ICC localized-text lookup and the XML DOM.

use crate::error::ErrorKind;
use std::fmt;

/// A parsed `language[_territory][.encoding]` locale string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Locale {
    pub language: String,
    pub territory: Option<String>,
    pub encoding: Option<String>,
}

impl Locale {
    /// The unspecified/default locale (`""`).
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Parses a POSIX locale string, rejecting shapes that don't match
    /// `language[_territory][.encoding]` with alphabetic language/territory.
    pub fn parse(s: &str) -> Result<Self, ErrorKind> {
        if s.is_empty() {
            return Ok(Self::none());
        }
        let (base, encoding) = match s.split_once('.') {
            Some((b, e)) => (b, Some(e.to_string())),
            None => (s, None),
        };
        let (language, territory) = match base.split_once('_') {
            Some((l, t)) => (l, Some(t.to_string())),
            None => (base, None),
        };
        let valid_lang = !language.is_empty()
            && language.len() <= 3
            && language.chars().all(|c| c.is_ascii_alphabetic());
        let valid_territory = territory
            .as_ref()
            .map(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or(true);
        if !valid_lang || !valid_territory {
            return Err(ErrorKind::InvalidLocale(s.to_string()));
        }
        Ok(Self { language: language.to_lowercase(), territory, encoding })
    }

    /// `language_TERRITORY` with no encoding, e.g. `"fr_CA"`.
    #[must_use]
    pub fn language_territory(&self) -> String {
        match &self.territory {
            Some(t) => format!("{}_{t}", self.language),
            None => self.language.clone(),
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        self.language.is_empty()
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.language)?;
        if let Some(t) = &self.territory {
            write!(f, "_{t}")?;
        }
        if let Some(e) = &self.encoding {
            write!(f, ".{e}")?;
        }
        Ok(())
    }
}

/// Resolves a localized-text lookup against `want` using the standard
/// three-step fallback: exact `xx_YY` match, then language-prefix match
/// (`xx_YY` or `xx_YY.ENC` against any `xx_*`), then the empty-locale entry.
pub fn resolve<'a, T>(entries: &'a [(Locale, T)], want: &Locale) -> Option<&'a T> {
    if let Some((_, v)) = entries.iter().find(|(l, _)| l == want) {
        return Some(v);
    }
    if !want.language.is_empty() {
        if let Some((_, v)) = entries.iter().find(|(l, _)| l.language == want.language) {
            return Some(v);
        }
    }
    entries.iter().find(|(l, _)| l.is_none()).map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_shapes() {
        assert_eq!(Locale::parse("").unwrap(), Locale::none());
        assert_eq!(Locale::parse("fr").unwrap().language, "fr");
        let l = Locale::parse("fr_CA.UTF-8").unwrap();
        assert_eq!(l.language, "fr");
        assert_eq!(l.territory.as_deref(), Some("CA"));
        assert_eq!(l.encoding.as_deref(), Some("UTF-8"));
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(Locale::parse("123").is_err());
        assert!(Locale::parse("to_long_bad").is_err());
    }

    #[test]
    fn resolution_falls_back_through_language_then_empty() {
        let entries = vec![
            (Locale::none(), "default"),
            (Locale::parse("fr").unwrap(), "french"),
            (Locale::parse("en_GB").unwrap(), "british"),
        ];
        assert_eq!(resolve(&entries, &Locale::parse("en_GB").unwrap()), Some(&"british"));
        assert_eq!(resolve(&entries, &Locale::parse("fr_CA.UTF-8").unwrap()), Some(&"french"));
        assert_eq!(resolve(&entries, &Locale::parse("de").unwrap()), Some(&"default"));
    }
}
