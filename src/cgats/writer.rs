//! CGATS/IT8 text writing: `%g`-style numerics, tab-separated fields, and a
//! deterministic header ordering so `write(parse(text))` is stable.

use super::{format_g, Document, Value};
use std::fmt::Write as _;

/// Controls for the one behavior that otherwise makes output
/// non-deterministic: the `CREATED` timestamp line.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Emit the document's `created` field (if set) as a `CREATED` header
    /// line. Off by default so `write()` output is reproducible byte-for-byte
    /// across runs, which is what the CCMX/CCSS writers need
    /// for their self-tests.
    pub include_created: bool,
}

/// Serializes `doc` to CGATS/IT8 text.
#[must_use]
pub fn write(doc: &Document, options: WriteOptions) -> String {
    let mut out = String::new();
    let id = doc.kind.identifier();
    let _ = writeln!(out, "{id:<7}");

    if let Some(t) = &doc.title {
        let _ = writeln!(out, "DESCRIPTOR\t\"{t}\"");
    }
    if let Some(o) = &doc.originator {
        let _ = writeln!(out, "ORIGINATOR\t\"{o}\"");
    }
    if let Some(ins) = &doc.instrument {
        let _ = writeln!(out, "INSTRUMENT\t\"{ins}\"");
    }
    if let Some(cr) = &doc.color_rep {
        let _ = writeln!(out, "COLOR_REP\t\"{cr}\"");
    }
    if options.include_created {
        if let Some(c) = &doc.created {
            let _ = writeln!(out, "CREATED\t\"{c}\"");
        }
    }
    if doc.normalized {
        let _ = writeln!(out, "NORMALIZED_TO_Y_100\tTrue");
    }
    for (k, v) in &doc.extra_header {
        let _ = writeln!(out, "{k}\t\"{v}\"");
    }
    for opt in &doc.options {
        let _ = writeln!(out, "KEYWORD\t\"{opt}\"");
        let _ = writeln!(out, "{opt}\t\"\"");
    }

    let _ = writeln!(out, "NUMBER_OF_FIELDS\t{}", doc.fields.len());
    let _ = writeln!(out, "BEGIN_DATA_FORMAT");
    let _ = writeln!(out, " {}", doc.fields.join("\t"));
    let _ = writeln!(out, "END_DATA_FORMAT");

    let _ = writeln!(out, "NUMBER_OF_SETS\t{}", doc.rows.len());
    let _ = writeln!(out, "BEGIN_DATA");
    for row in &doc.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|v| match v {
                Value::Num(n) => format_g(*n),
                Value::Text(s) => format!("\"{s}\""),
            })
            .collect();
        let _ = writeln!(out, " {}", cells.join("\t"));
    }
    let _ = writeln!(out, "END_DATA");
    out
}
