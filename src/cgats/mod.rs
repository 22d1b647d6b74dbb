//! ANSI CGATS/IT8 measurement-file codec.

mod numeric;
mod parser;
mod writer;

pub use numeric::{format_g, parse_g};
pub use parser::parse;
pub use writer::{write, WriteOptions};

use crate::color::{Lab, Matrix3, Rgb, Xyz};
use crate::error::{ErrorKind, Result};
use crate::spectrum::Spectrum;
use std::collections::BTreeSet;

/// The document kinds a CGATS file can declare itself as.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Kind {
    /// Patch definition (reference target).
    Ti1,
    /// Patch measurement.
    Ti3,
    /// Color correction matrix.
    Ccmx,
    /// Colorimeter calibration spectral set.
    Ccss,
    /// Calibration curve.
    Cal,
    /// Color matching functions.
    Cmf,
    /// Raw spectral data.
    Spect,
}

impl Kind {
    /// The leading identifier a file of this kind starts with (detected on
    /// load).
    #[must_use]
    pub fn identifier(self) -> &'static str {
        match self {
            Kind::Ti1 => "CTI1",
            Kind::Ti3 => "CTI3",
            Kind::Ccmx => "CCMX",
            Kind::Ccss => "CCSS",
            Kind::Cal => "CAL",
            Kind::Cmf => "CMF",
            Kind::Spect => "SPECT",
        }
    }

    pub(crate) fn from_identifier(s: &str) -> Result<Self> {
        let s = s.trim();
        [Kind::Ccmx, Kind::Ti1, Kind::Ti3, Kind::Ccss, Kind::Cal, Kind::Cmf, Kind::Spect]
            .into_iter()
            .find(|k| s.starts_with(k.identifier()))
            .ok_or_else(|| ErrorKind::FileInvalid(format!("unrecognized CGATS identifier: {s:?}")))
    }
}

/// A single data field value: numeric columns parse as `f64`; `SAMPLE_ID`/
/// `SAMPLE_NAME` and any other non-numeric column stay text.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(f64),
    Text(String),
}

impl Value {
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Num(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Num(_) => None,
        }
    }
}

/// A parsed (or about-to-be-written) CGATS/IT8 document.
#[derive(Debug, Clone)]
pub struct Document {
    pub kind: Kind,
    pub title: Option<String>,
    pub originator: Option<String>,
    pub instrument: Option<String>,
    pub color_rep: Option<String>,
    /// `CREATED` timestamp; omit (`None`) for deterministic, suppressible
    /// output.
    pub created: Option<String>,
    /// Flag-style options declared via a `KEYWORD` line, e.g. `TYPE_FACTORY`.
    pub options: BTreeSet<String>,
    pub normalized: bool,
    /// Any other header key/value pairs, in file order, for round-trip
    /// fidelity of non-standard keywords this codec doesn't interpret.
    pub extra_header: Vec<(String, String)>,
    pub fields: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Document {
    #[must_use]
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            title: None,
            originator: None,
            instrument: None,
            color_rep: None,
            created: None,
            options: BTreeSet::new(),
            normalized: false,
            extra_header: Vec::new(),
            fields: Vec::new(),
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn has_option(&self, name: &str) -> bool {
        self.options.contains(name)
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    /// For [`Kind::Ccmx`]: reads the 3x3 matrix back out of the 3-row,
    /// `XYZ_X`/`XYZ_Y`/`XYZ_Z` data table.
    pub fn matrix(&self) -> Result<Matrix3> {
        if self.kind != Kind::Ccmx {
            return Err(ErrorKind::InputInvalid("matrix() is only valid on CCMX documents".into()));
        }
        let (ix, iy, iz) = (
            self.field_index("XYZ_X"),
            self.field_index("XYZ_Y"),
            self.field_index("XYZ_Z"),
        );
        let (Some(ix), Some(iy), Some(iz)) = (ix, iy, iz) else {
            return Err(ErrorKind::FileInvalid("CCMX document is missing XYZ columns".into()));
        };
        if self.rows.len() != 3 {
            return Err(ErrorKind::FileInvalid("CCMX document must have exactly 3 rows".into()));
        }
        let mut m = [[0.0; 3]; 3];
        for (r, row) in self.rows.iter().enumerate() {
            m[r][0] = row[ix].as_f64().ok_or_else(|| ErrorKind::FileInvalid("non-numeric CCMX cell".into()))?;
            m[r][1] = row[iy].as_f64().ok_or_else(|| ErrorKind::FileInvalid("non-numeric CCMX cell".into()))?;
            m[r][2] = row[iz].as_f64().ok_or_else(|| ErrorKind::FileInvalid("non-numeric CCMX cell".into()))?;
        }
        Ok(Matrix3::from_rows(m))
    }

    /// Builds a document from a computed CCMX matrix, as [`crate::ccmx`]
    /// does after a least-squares fit.
    pub fn from_ccmx(matrix: Matrix3, title: &str, originator: &str, factory: bool) -> Self {
        let mut doc = Document::new(Kind::Ccmx);
        doc.title = Some(title.to_string());
        doc.originator = Some(originator.to_string());
        doc.color_rep = Some("XYZ".to_string());
        doc.fields = vec!["XYZ_X".into(), "XYZ_Y".into(), "XYZ_Z".into()];
        doc.rows = matrix.0.iter().map(|row| row.iter().map(|&v| Value::Num(v)).collect()).collect();
        if factory {
            doc.options.insert("TYPE_FACTORY".to_string());
        }
        doc
    }

    /// Reads `RGB_*`/`XYZ_*` columns out of row `i`, if present.
    #[must_use]
    pub fn row_rgb_xyz(&self, i: usize) -> Option<(Rgb, Xyz)> {
        let row = self.rows.get(i)?;
        let get = |name: &str| -> Option<f64> { self.field_index(name).and_then(|idx| row[idx].as_f64()) };
        Some((
            Rgb { r: get("RGB_R")?, g: get("RGB_G")?, b: get("RGB_B")? },
            Xyz { x: get("XYZ_X")?, y: get("XYZ_Y")?, z: get("XYZ_Z")? },
        ))
    }

    /// Reads just the `XYZ_*` columns of row `i`, if present (unlike
    /// [`Document::row_rgb_xyz`], doesn't also require `RGB_*` columns).
    #[must_use]
    pub fn row_xyz(&self, i: usize) -> Option<Xyz> {
        let row = self.rows.get(i)?;
        let get = |name: &str| -> Option<f64> { self.field_index(name).and_then(|idx| row[idx].as_f64()) };
        Some(Xyz { x: get("XYZ_X")?, y: get("XYZ_Y")?, z: get("XYZ_Z")? })
    }

    #[must_use]
    pub fn row_lab(&self, i: usize) -> Option<Lab> {
        let row = self.rows.get(i)?;
        let get = |name: &str| -> Option<f64> { self.field_index(name).and_then(|idx| row[idx].as_f64()) };
        Some(Lab { l: get("LAB_L")?, a: get("LAB_A")?, b: get("LAB_B")? })
    }

    #[must_use]
    pub fn sample_id(&self, i: usize) -> Option<&str> {
        let idx = self.field_index("SAMPLE_ID")?;
        self.rows.get(i)?[idx].as_str()
    }

    #[must_use]
    pub fn sample_name(&self, i: usize) -> Option<&str> {
        let idx = self.field_index("SAMPLE_NAME")?;
        self.rows.get(i)?[idx].as_str()
    }

    /// Groups `SPEC_nnn` columns of row `i` into a [`Spectrum`], labeled by
    /// the row's sample id/name if present.
    pub fn row_spectrum(&self, i: usize) -> Result<Option<Spectrum>> {
        let row = match self.rows.get(i) {
            Some(r) => r,
            None => return Ok(None),
        };
        let mut points: Vec<(u32, f64)> = self
            .fields
            .iter()
            .enumerate()
            .filter_map(|(idx, f)| f.strip_prefix("SPEC_").and_then(|n| n.parse::<u32>().ok()).map(|nm| (idx, nm)))
            .filter_map(|(idx, nm)| row[idx].as_f64().map(|v| (nm, v)))
            .collect();
        if points.is_empty() {
            return Ok(None);
        }
        points.sort_by_key(|(nm, _)| *nm);
        let start = points[0].0 as f64;
        let end = points[points.len() - 1].0 as f64;
        let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
        let id = self
            .sample_name(i)
            .or_else(|| self.sample_id(i))
            .unwrap_or("")
            .to_string();
        Ok(Some(Spectrum::new(start, end, values, 1.0)?.with_id(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ccmx_matrix_round_trips() {
        let m = Matrix3::from_rows([[1.3139, 0.21794, 0.89224], [0., 0., 0.], [0., 0., 0.]]);
        let doc = Document::from_ccmx(m, "Factory Calibration", "cd-self-test", true);
        assert!(doc.has_option("TYPE_FACTORY"));
        let back = doc.matrix().unwrap();
        assert!((back.0[0][0] - 1.3139).abs() < 1e-4);
    }
}
