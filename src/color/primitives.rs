use super::interpolate::{InterpolationKind, InterpolationTable};
use crate::error::Result;

/// CIE D50 reference white, used as the default reference for Lab↔XYZ
/// conversions unless the caller supplies one.
pub const D50_WHITE: Xyz = Xyz { x: 0.9642, y: 1.0, z: 0.8249 };

/// An RGB triple of doubles. Typically `0..1` but negative components are
/// allowed so that math (e.g. chromatic adaptation residuals) isn't clamped
/// prematurely.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

/// An RGB triple of bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// CIE XYZ tristimulus values. Unbounded, typically `0..~200`.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Xyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// CIE L*a*b*. `l: 0..100`, `a`/`b`: roughly `±128`.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

/// CIE Yxy: luminance plus chromaticity coordinates.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Yxy {
    pub y_luminance: f64,
    pub x: f64,
    pub y: f64,
}

/// An ordered sequence of [`Rgb`] samples, used as an input curve (e.g. a
/// VCGT channel or a measured tone response).
pub type ArrayOfRgb = Vec<Rgb>;

/// Linearly interpolates between two RGB colors. `t` is expected in `[0, 1]`
/// but is not clamped; callers should expect values "typically 0..1".
pub fn rgb_interpolate(a: Rgb, b: Rgb, t: f64, out: &mut Rgb) {
    out.r = a.r + (b.r - a.r) * t;
    out.g = a.g + (b.g - a.g) * t;
    out.b = a.b + (b.b - a.b) * t;
}

/// Converts XYZ to Yxy. Degenerate (all-zero) input maps to the origin
/// rather than dividing by zero.
pub fn xyz_to_yxy(xyz: Xyz) -> Yxy {
    let sum = xyz.x + xyz.y + xyz.z;
    if sum.abs() < 1e-12 {
        return Yxy { y_luminance: 0.0, x: 0.0, y: 0.0 };
    }
    Yxy { y_luminance: xyz.y, x: xyz.x / sum, y: xyz.y / sum }
}

/// Converts Yxy to XYZ. Degenerate `y == 0` input maps to the origin.
pub fn yxy_to_xyz(yxy: Yxy) -> Xyz {
    if yxy.y.abs() < 1e-12 {
        return Xyz::default();
    }
    let ratio = yxy.y_luminance / yxy.y;
    Xyz {
        x: yxy.x * ratio,
        y: yxy.y_luminance,
        z: (1.0 - yxy.x - yxy.y) * ratio,
    }
}

fn lab_f(t: f64) -> f64 {
    const DELTA: f64 = 6.0 / 29.0;
    if t > DELTA.powi(3) {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

fn lab_f_inv(t: f64) -> f64 {
    const DELTA: f64 = 6.0 / 29.0;
    if t > DELTA {
        t.powi(3)
    } else {
        3.0 * DELTA * DELTA * (t - 4.0 / 29.0)
    }
}

/// Converts XYZ to CIE L*a*b*, against `white` (D50 unless the
/// caller supplies its own reference white).
pub fn xyz_to_lab(xyz: Xyz, white: Xyz) -> Lab {
    let fx = lab_f(xyz.x / white.x);
    let fy = lab_f(xyz.y / white.y);
    let fz = lab_f(xyz.z / white.z);
    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

/// Inverse of [`xyz_to_lab`].
pub fn lab_to_xyz(lab: Lab, white: Xyz) -> Xyz {
    let fy = (lab.l + 16.0) / 116.0;
    let fx = fy + lab.a / 500.0;
    let fz = fy - lab.b / 200.0;
    Xyz {
        x: white.x * lab_f_inv(fx),
        y: white.y * lab_f_inv(fy),
        z: white.z * lab_f_inv(fz),
    }
}

/// CIE daylight-locus chromaticity coefficients, piecewise cubic in `1/T`
/// (the standard reparameterization of McCamy's approximation, valid for
/// `T` in `[2500, 20000]` K).
pub fn color_temperature_to_xyz(kelvin: f64) -> Result<Xyz> {
    if !(2500.0..=20000.0).contains(&kelvin) {
        return Err(crate::error::ErrorKind::OutOfRange(format!(
            "color temperature {kelvin} K outside [2500, 20000]"
        )));
    }
    let inv_t = 1000.0 / kelvin;
    let inv_t2 = inv_t * inv_t;
    let inv_t3 = inv_t2 * inv_t;
    let x = if kelvin <= 7000.0 {
        -4.6070 * inv_t3 + 2.9678 * inv_t2 + 0.09911 * inv_t + 0.244063
    } else {
        -2.0064 * inv_t3 + 1.9018 * inv_t2 + 0.24748 * inv_t + 0.237040
    };
    let y = -3.000 * x * x + 2.870 * x - 0.275;
    Ok(yxy_to_xyz(Yxy { y_luminance: 1.0, x, y }))
}

/// McCamy's approximation of correlated color temperature from
/// chromaticity. Single-polynomial, unlike the piecewise daylight-locus fit
/// in [`color_temperature_to_xyz`]; accurate to within a few K near the
/// daylight locus but drifts off it further away.
pub fn xyz_to_color_temperature(xyz: Xyz) -> f64 {
    let yxy = xyz_to_yxy(xyz);
    let n = (yxy.x - 0.3320) / (yxy.y - 0.1858);
    -449.0 * n * n * n + 3525.0 * n * n - 6823.3 * n + 5520.33
}

/// Akima-smoothed resample of an RGB curve to `n_out` samples, clamped into
/// the convex hull of the input per channel so the resample can't overshoot
/// past the original curve's extremes.
pub fn rgb_array_interpolate(curve: &ArrayOfRgb, n_out: usize) -> Result<ArrayOfRgb> {
    if curve.len() < 2 || n_out < 2 {
        return Err(crate::error::ErrorKind::InputInvalid(
            "rgb_array_interpolate needs >= 2 input and output points".into(),
        ));
    }
    let xs: Vec<f64> = (0..curve.len()).map(|i| i as f64).collect();
    let channel = |pick: fn(&Rgb) -> f64| -> Result<Vec<f64>> {
        let ys: Vec<f64> = curve.iter().map(pick).collect();
        let (lo, hi) = ys.iter().fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let table = InterpolationTable::new(xs.clone(), ys, InterpolationKind::Akima)?;
        let step = (curve.len() - 1) as f64 / (n_out - 1) as f64;
        Ok((0..n_out).map(|i| table.eval(i as f64 * step).clamp(lo, hi)).collect())
    };
    let r = channel(|c| c.r)?;
    let g = channel(|c| c.g)?;
    let b = channel(|c| c.b)?;
    Ok((0..n_out).map(|i| Rgb { r: r[i], g: g[i], b: b[i] }).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yxy_xyz_round_trip() {
        let xyz = Xyz { x: 41.24, y: 21.26, z: 1.93 };
        let back = yxy_to_xyz(xyz_to_yxy(xyz));
        assert!((back.x - xyz.x).abs() < 1e-6);
        assert!((back.y - xyz.y).abs() < 1e-6);
        assert!((back.z - xyz.z).abs() < 1e-6);
    }

    #[test]
    fn lab_xyz_round_trip() {
        let xyz = Xyz { x: 41.24, y: 21.26, z: 1.93 };
        let lab = xyz_to_lab(xyz, D50_WHITE);
        let back = lab_to_xyz(lab, D50_WHITE);
        assert!((back.x - xyz.x).abs() < 1e-6);
        assert!((back.y - xyz.y).abs() < 1e-6);
        assert!((back.z - xyz.z).abs() < 1e-6);
    }

    #[test]
    fn color_temperature_d65_is_close() {
        let xyz = color_temperature_to_xyz(6504.0).unwrap();
        let yxy = xyz_to_yxy(xyz);
        assert!((yxy.x - 0.3127).abs() < 0.01);
        assert!((yxy.y - 0.3290).abs() < 0.01);
    }

    #[test]
    fn xyz_to_color_temperature_recovers_d65() {
        let xyz = color_temperature_to_xyz(6504.0).unwrap();
        let cct = xyz_to_color_temperature(xyz);
        assert!((cct - 6504.0).abs() < 50.0, "got {cct}");
    }

    #[test]
    fn color_temperature_rejects_out_of_range() {
        assert!(color_temperature_to_xyz(1000.0).is_err());
        assert!(color_temperature_to_xyz(25000.0).is_err());
    }

    #[test]
    fn rgb_array_interpolate_stays_in_hull() {
        let curve = vec![
            Rgb { r: 0.0, g: 0.0, b: 0.0 },
            Rgb { r: 0.5, g: 0.4, b: 0.6 },
            Rgb { r: 1.0, g: 1.0, b: 1.0 },
        ];
        let out = rgb_array_interpolate(&curve, 16).unwrap();
        for c in &out {
            assert!((0.0..=1.0).contains(&c.r));
            assert!((0.0..=1.0).contains(&c.g));
            assert!((0.0..=1.0).contains(&c.b));
        }
        assert_eq!(out.len(), 16);
    }
}
