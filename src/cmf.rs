//! Color-matching-function construction from CSV.

use crate::error::{ErrorKind, Result};
use crate::spectrum::Spectrum;

/// The three CIE 1931 standard observer curves, each a [`Spectrum`] over the
/// same wavelength range.
pub struct Cmf {
    pub x_bar: Spectrum,
    pub y_bar: Spectrum,
    pub z_bar: Spectrum,
}

/// Parses a 3- or 4-column CMF CSV: `lambda,X,Y[,Z]`, one row per sample.
/// Blank lines and lines starting with `#` are skipped. `norm` divides every
/// sample once, applied on load.
pub fn parse_csv(input: &str, norm: f64) -> Result<Cmf> {
    let mut reader = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_reader(input.as_bytes());
    let mut wavelengths = Vec::new();
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    let mut zs = Vec::new();
    let mut has_z = None;

    for result in reader.records() {
        let record = result?;
        if record.is_empty() {
            continue;
        }
        let first = record.get(0).unwrap_or("").trim();
        if first.is_empty() || first.starts_with('#') {
            continue;
        }
        let cols = record.len();
        if !(3..=4).contains(&cols) {
            return Err(ErrorKind::InputInvalid(format!("CMF CSV row has {cols} columns, expected 3 or 4")));
        }
        match has_z {
            None => has_z = Some(cols == 4),
            Some(expect4) if expect4 != (cols == 4) => {
                return Err(ErrorKind::InputInvalid("CMF CSV rows have inconsistent column counts".into()))
            }
            _ => {}
        }
        let parse_cell = |i: usize| -> Result<f64> {
            record
                .get(i)
                .and_then(|s| s.trim().parse::<f64>().ok())
                .ok_or_else(|| ErrorKind::InputInvalid(format!("non-numeric CMF CSV cell in row {:?}", record)))
        };
        wavelengths.push(parse_cell(0)?);
        xs.push(parse_cell(1)?);
        ys.push(parse_cell(2)?);
        zs.push(if cols == 4 { parse_cell(3)? } else { 0.0 });
    }

    if wavelengths.len() < 2 {
        return Err(ErrorKind::InputInvalid("CMF CSV needs at least 2 data rows".into()));
    }
    let start = wavelengths[0];
    let end = *wavelengths.last().unwrap();

    Ok(Cmf {
        x_bar: Spectrum::new(start, end, xs, norm)?.with_id("xbar"),
        y_bar: Spectrum::new(start, end, ys, norm)?.with_id("ybar"),
        z_bar: Spectrum::new(start, end, zs, norm)?.with_id("zbar"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# CIE 1931 2-degree observer (abridged)
380,0.0014,0.0000,0.0065
385,0.0022,0.0001,0.0105
390,0.0042,0.0001,0.0201
395,0.0076,0.0002,0.0362
";

    #[test]
    fn parses_three_column_csv() {
        let cmf = parse_csv(SAMPLE, 1.0).unwrap();
        assert_eq!(cmf.x_bar.len(), 4);
        assert_eq!(cmf.x_bar.start_nm(), 380.0);
        assert_eq!(cmf.x_bar.end_nm(), 395.0);
        assert!((cmf.z_bar.values()[0] - 0.0065).abs() < 1e-9);
    }

    #[test]
    fn norm_divides_once() {
        let cmf = parse_csv(SAMPLE, 2.0).unwrap();
        assert_eq!(cmf.x_bar.norm(), 2.0);
        assert!((cmf.x_bar.values()[0] - 0.0014).abs() < 1e-9);
    }

    #[test]
    fn rejects_inconsistent_columns() {
        let bad = "380,0.1,0.2\n385,0.1,0.2,0.3\n";
        assert!(parse_csv(bad, 1.0).is_err());
    }

    #[test]
    fn rejects_too_few_rows() {
        assert!(parse_csv("380,0.1,0.2,0.3\n", 1.0).is_err());
    }
}
