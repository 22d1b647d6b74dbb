//! A minimal XML reader: elements, text, and a single
//! recognized localized-text attribute. Not a general XML parser — just
//! enough structure to carry localized strings the way ICC/CGATS side-car
//! metadata sometimes does.

use crate::locale::{resolve, Locale};
use std::collections::HashMap;

/// One recognized attribute name meaning "locale of this text".
pub const LOCALE_ATTR: &str = "xml:lang";

#[derive(Debug, Clone, Default)]
pub struct Node {
    pub name: String,
    pub attrs: HashMap<String, String>,
    pub text: String,
    pub children: Vec<Node>,
}

impl Node {
    /// Resolves a slash-separated path (`"a/b/c"`) to a descendant node.
    pub fn get_node(&self, path: &str) -> Option<&Node> {
        let mut cur = self;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            cur = cur.children.iter().find(|c| c.name == part)?;
        }
        Some(cur)
    }

    /// Resolves the localized text among same-named children carrying
    /// `xml:lang`, using the standard locale fallback chain.
    pub fn localized_text(&self, element_name: &str, want: &Locale) -> Option<&str> {
        let entries: Vec<(Locale, &str)> = self
            .children
            .iter()
            .filter(|c| c.name == element_name)
            .filter_map(|c| {
                let locale = match c.attrs.get(LOCALE_ATTR) {
                    Some(s) => Locale::parse(s).ok()?,
                    None => Locale::none(),
                };
                Some((locale, c.text.as_str()))
            })
            .collect();
        resolve(&entries, want).copied()
    }
}

/// Parses the minimal XML subset this crate needs: elements with attributes,
/// nested children, and text content. Comments and processing instructions
/// are skipped; no DTD/entity support.
pub fn parse(input: &str) -> Result<Node, String> {
    let mut chars = input.char_indices().peekable();
    skip_prolog(&mut chars, input);
    let root = parse_element(&mut chars, input).ok_or_else(|| "no root element found".to_string())?;
    Ok(root)
}

type Chars<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

fn skip_prolog(chars: &mut Chars<'_>, input: &str) {
    loop {
        skip_whitespace(chars);
        if let Some(&(i, '<')) = chars.peek() {
            if input[i..].starts_with("<?") {
                while let Some((_, c)) = chars.next() {
                    if c == '>' {
                        break;
                    }
                }
                continue;
            }
        }
        break;
    }
}

fn skip_whitespace(chars: &mut Chars<'_>) {
    while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
        chars.next();
    }
}

fn parse_element(chars: &mut Chars<'_>, input: &str) -> Option<Node> {
    skip_whitespace(chars);
    let (start, c) = *chars.peek()?;
    if c != '<' {
        return None;
    }
    chars.next();
    let name_start = chars.peek()?.0;
    while matches!(chars.peek(), Some((_, c)) if !c.is_whitespace() && *c != '>' && *c != '/') {
        chars.next();
    }
    let name_end = chars.peek().map(|&(i, _)| i).unwrap_or(input.len());
    let name = input[name_start..name_end].to_string();

    let mut attrs = HashMap::new();
    loop {
        skip_whitespace(chars);
        match chars.peek() {
            Some(&(_, '/')) => {
                chars.next();
                if let Some((_, '>')) = chars.next() {}
                return Some(Node { name, attrs, text: String::new(), children: Vec::new() });
            }
            Some(&(_, '>')) => {
                chars.next();
                break;
            }
            Some(&(attr_start, _)) => {
                while matches!(chars.peek(), Some((_, c)) if *c != '=' && !c.is_whitespace()) {
                    chars.next();
                }
                let attr_name_end = chars.peek().map(|&(i, _)| i).unwrap_or(input.len());
                let attr_name = input[attr_start..attr_name_end].to_string();
                skip_whitespace(chars);
                if let Some((_, '=')) = chars.peek().copied() {
                    chars.next();
                }
                skip_whitespace(chars);
                let quote = chars.next().map(|(_, c)| c)?;
                let val_start = chars.peek()?.0;
                while matches!(chars.peek(), Some((_, c)) if *c != quote) {
                    chars.next();
                }
                let val_end = chars.peek().map(|&(i, _)| i).unwrap_or(input.len());
                attrs.insert(attr_name, input[val_start..val_end].to_string());
                chars.next();
            }
            None => break,
        }
    }

    let mut children = Vec::new();
    let mut text = String::new();
    loop {
        match chars.peek().copied() {
            None => break,
            Some((i, '<')) => {
                if input[i..].starts_with(&format!("</{name}")) {
                    while let Some((_, c)) = chars.next() {
                        if c == '>' {
                            break;
                        }
                    }
                    break;
                }
                if let Some(child) = parse_element(chars, input) {
                    children.push(child);
                } else {
                    break;
                }
            }
            Some((text_start, _)) => {
                while matches!(chars.peek(), Some((_, c)) if *c != '<') {
                    chars.next();
                }
                let text_end = chars.peek().map(|&(i, _)| i).unwrap_or(input.len());
                text.push_str(input[text_start..text_end].trim());
            }
        }
    }
    let _ = start;
    Some(Node { name, attrs, text, children })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_text() {
        let doc = parse(r#"<root><a><b>hello</b></a></root>"#).unwrap();
        assert_eq!(doc.name, "root");
        let node = doc.get_node("a/b").unwrap();
        assert_eq!(node.text, "hello");
    }

    #[test]
    fn localized_text_falls_back() {
        let doc = parse(
            r#"<root>
                <description xml:lang="">Generic</description>
                <description xml:lang="fr">Francais</description>
            </root>"#,
        )
        .unwrap();
        assert_eq!(doc.localized_text("description", &Locale::parse("fr_CA").unwrap()), Some("Francais"));
        assert_eq!(doc.localized_text("description", &Locale::parse("de").unwrap()), Some("Generic"));
    }
}
