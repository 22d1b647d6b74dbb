//! CGATS/IT8 text parsing.

use super::{numeric::parse_g, Document, Kind, Value};
use crate::error::{ErrorKind, Result};

/// Parses a CGATS/IT8 text file. Leading/trailing blank lines and `#`
/// comment lines are tolerated; anything else outside a recognized section
/// is treated as a header key/value pair.
pub fn parse(input: &str) -> Result<Document> {
    let mut lines = input.lines();
    let first = lines
        .next()
        .ok_or_else(|| ErrorKind::FileInvalid("empty CGATS file".into()))?;
    let kind = Kind::from_identifier(first)?;
    let mut doc = Document::new(kind);

    let mut declared_keywords: Vec<String> = Vec::new();
    let rest: Vec<&str> = lines.collect();
    let mut i = 0;
    while i < rest.len() {
        let raw = rest[i];
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            i += 1;
            continue;
        }
        if line == "BEGIN_DATA_FORMAT" {
            i += 1;
            let fields_line = rest.get(i).ok_or_else(|| ErrorKind::FileInvalid("truncated BEGIN_DATA_FORMAT".into()))?;
            doc.fields = fields_line.split_whitespace().map(str::to_string).collect();
            i += 1;
            expect_line(&rest, &mut i, "END_DATA_FORMAT")?;
            continue;
        }
        if line == "BEGIN_DATA" {
            i += 1;
            while i < rest.len() && rest[i].trim() != "END_DATA" {
                let tokens: Vec<&str> = rest[i].split_whitespace().collect();
                if tokens.len() != doc.fields.len() {
                    return Err(ErrorKind::FileInvalid(format!(
                        "data row has {} fields, expected {}",
                        tokens.len(),
                        doc.fields.len()
                    )));
                }
                let row: Vec<Value> = tokens
                    .iter()
                    .map(|t| {
                        let unquoted = unquote(t);
                        match parse_g(&unquoted) {
                            Some(v) if looks_numeric(&unquoted) => Value::Num(v),
                            _ => Value::Text(unquoted),
                        }
                    })
                    .collect();
                doc.rows.push(row);
                i += 1;
            }
            expect_line(&rest, &mut i, "END_DATA")?;
            continue;
        }

        let (key, value) = split_header_line(line);
        if key == "KEYWORD" {
            declared_keywords.push(unquote(&value));
            i += 1;
            continue;
        }
        if key == "NUMBER_OF_FIELDS" || key == "NUMBER_OF_SETS" {
            i += 1;
            continue;
        }
        let unquoted = unquote(&value);
        match key.as_str() {
            "DESCRIPTOR" => doc.title = Some(unquoted),
            "ORIGINATOR" => doc.originator = Some(unquoted),
            "INSTRUMENT" => doc.instrument = Some(unquoted),
            "COLOR_REP" => doc.color_rep = Some(unquoted),
            "CREATED" => doc.created = Some(unquoted),
            "NORMALIZED_TO_Y_100" => doc.normalized = unquoted.eq_ignore_ascii_case("true") || unquoted == "1",
            _ if declared_keywords.iter().any(|k| k == &key) => {
                doc.options.insert(key);
            }
            _ => doc.extra_header.push((key, unquoted)),
        }
        i += 1;
    }
    Ok(doc)
}

fn expect_line(rest: &[&str], i: &mut usize, expected: &str) -> Result<()> {
    match rest.get(*i) {
        Some(l) if l.trim() == expected => {
            *i += 1;
            Ok(())
        }
        _ => Err(ErrorKind::FileInvalid(format!("expected {expected}"))),
    }
}

fn split_header_line(line: &str) -> (String, String) {
    match line.split_once(char::is_whitespace) {
        Some((k, v)) => (k.to_string(), v.trim().to_string()),
        None => (line.to_string(), String::new()),
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn looks_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.')
}
