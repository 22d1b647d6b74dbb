//! Least-squares color-correction-matrix fitting.
//!
//! Given matched reference/measured XYZ patch sets (same `sample_id`s in
//! both TI3s), finds the 3x3 `M` that best maps measured → reference in the
//! ordinary-least-squares sense.

use crate::cgats::{Document, Kind};
use crate::color::{Matrix3, Vector3};
use crate::error::{ErrorKind, Result};

/// Minimum patch count below which the fit is underdetermined. colord's own
/// solver tolerates fewer and returns an ill-conditioned matrix; this crate
/// rejects outright.
const MIN_PATCHES: usize = 3;

/// Fits `M` such that `M * measured_i ≈ reference_i` for every patch,
/// solving the closed form `M = R * Mᵀ * (M * Mᵀ)⁻¹` where `R`'s columns are
/// reference XYZs and `M`'s (the measured matrix's) columns are measured
/// XYZs, jointly over all patches.
pub fn fit(reference: &[Vector3], measured: &[Vector3]) -> Result<Matrix3> {
    if reference.len() != measured.len() {
        return Err(ErrorKind::InputInvalid("reference and measured patch counts differ".into()));
    }
    if reference.len() < MIN_PATCHES {
        return Err(ErrorKind::InputInvalid(format!(
            "need at least {MIN_PATCHES} matched patches, got {}",
            reference.len()
        )));
    }

    // Gram = measured * measuredᵀ (3x3, sum over patches of outer products).
    let mut gram = [[0.0; 3]; 3];
    let mut cross = [[0.0; 3]; 3];
    for (r, m) in reference.iter().zip(measured.iter()) {
        for a in 0..3 {
            for b in 0..3 {
                gram[a][b] += m.0[a] * m.0[b];
                cross[a][b] += r.0[a] * m.0[b];
            }
        }
    }
    let gram = Matrix3::from_rows(gram);
    let cross = Matrix3::from_rows(cross);
    let gram_inv = gram.inverse()?;
    Ok(cross.multiply(&gram_inv))
}

/// Loads matched `sample_id`-keyed XYZ patches out of a reference and
/// measured TI3, in the reference's row order, then calls [`fit`].
pub fn fit_from_ti3(reference: &Document, measured: &Document) -> Result<Matrix3> {
    let mut ref_xyz = Vec::new();
    let mut meas_xyz = Vec::new();
    for i in 0..reference.rows.len() {
        let id = reference
            .sample_id(i)
            .ok_or_else(|| ErrorKind::InputInvalid("reference TI3 row missing SAMPLE_ID".into()))?;
        let r_xyz = reference
            .row_xyz(i)
            .ok_or_else(|| ErrorKind::InputInvalid("reference TI3 row missing XYZ columns".into()))?;
        let j = (0..measured.rows.len())
            .find(|&j| measured.sample_id(j) == Some(id))
            .ok_or_else(|| ErrorKind::InputInvalid(format!("measured TI3 is missing sample {id}")))?;
        let m_xyz = measured
            .row_xyz(j)
            .ok_or_else(|| ErrorKind::InputInvalid("measured TI3 row missing XYZ columns".into()))?;
        ref_xyz.push(Vector3::new(r_xyz.x, r_xyz.y, r_xyz.z));
        meas_xyz.push(Vector3::new(m_xyz.x, m_xyz.y, m_xyz.z));
    }
    fit(&ref_xyz, &meas_xyz)
}

/// Fits a CCMX and wraps it as a [`Document`] ready to write, matching the
/// shape colord's `cd-create-profile`/calibration tools emit.
pub fn build_document(
    reference: &Document,
    measured: &Document,
    title: &str,
    originator: &str,
    factory: bool,
) -> Result<Document> {
    let matrix = fit_from_ti3(reference, measured)?;
    Ok(Document::from_ccmx(matrix, title, originator, factory))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_measured_fits_identity() {
        let pts = vec![
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.5, 0.5, 0.0),
        ];
        let m = fit(&pts, &pts).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((m.0[i][j] - expected).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn scaled_measured_fits_diagonal_scale() {
        let reference = vec![
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(0.0, 4.0, 0.0),
            Vector3::new(0.0, 0.0, 6.0),
            Vector3::new(1.0, 2.0, 3.0),
        ];
        let measured = vec![
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 2.0, 0.0),
            Vector3::new(0.0, 0.0, 3.0),
            Vector3::new(0.5, 1.0, 1.5),
        ];
        let m = fit(&reference, &measured).unwrap();
        assert!((m.0[0][0] - 2.0).abs() < 1e-6);
        assert!((m.0[1][1] - 4.0).abs() < 1e-6);
        assert!((m.0[2][2] - 6.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_too_few_patches() {
        let pts = vec![Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0)];
        assert_eq!(fit(&pts, &pts).unwrap_err(), ErrorKind::InputInvalid("need at least 3 matched patches, got 2".into()));
    }

    #[test]
    fn rejects_singular_measured_gram() {
        let reference = vec![Vector3::new(1., 0., 0.), Vector3::new(0., 1., 0.), Vector3::new(1., 1., 0.)];
        let measured = vec![Vector3::new(1., 0., 0.), Vector3::new(2., 0., 0.), Vector3::new(3., 0., 0.)];
        assert!(matches!(fit(&reference, &measured), Err(ErrorKind::Singular)));
    }

    #[test]
    fn build_document_from_matched_ti3s() {
        let mut reference = Document::new(Kind::Ti3);
        reference.fields = vec!["SAMPLE_ID".into(), "XYZ_X".into(), "XYZ_Y".into(), "XYZ_Z".into()];
        reference.rows = vec![
            vec![crate::cgats::Value::Text("A01".into()), crate::cgats::Value::Num(1.0), crate::cgats::Value::Num(0.0), crate::cgats::Value::Num(0.0)],
            vec![crate::cgats::Value::Text("A02".into()), crate::cgats::Value::Num(0.0), crate::cgats::Value::Num(1.0), crate::cgats::Value::Num(0.0)],
            vec![crate::cgats::Value::Text("A03".into()), crate::cgats::Value::Num(0.0), crate::cgats::Value::Num(0.0), crate::cgats::Value::Num(1.0)],
        ];
        let measured = reference.clone();
        let doc = build_document(&reference, &measured, "Factory Calibration", "cd-self-test", true).unwrap();
        assert!(doc.has_option("TYPE_FACTORY"));
        let m = doc.matrix().unwrap();
        assert!((m.0[0][0] - 1.0).abs() < 1e-6);
    }
}
