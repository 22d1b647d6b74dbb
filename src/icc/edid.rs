//! Minimal display-profile construction from EDID-derived parameters
//! (`create_from_edid`), mirroring what colord's `cd-edid`
//! integration feeds into a fresh profile for an uncalibrated monitor.

use super::curve::single_gamma;
use super::header::{ColorSpace, Header, Kind};
use super::Profile;
use crate::color::{yxy_to_xyz, Matrix3, Vector3, Xyz, Yxy};
use crate::error::{ErrorKind, Result};
use crate::locale::Locale;

/// Builds a single-gamma RGB display profile from a chromaticity triangle
/// and white point, as read off an EDID block.
pub fn create_from_edid(gamma: f64, red: Yxy, green: Yxy, blue: Yxy, white: Yxy) -> Result<Profile> {
    let colorants = primaries_to_xyz(red, green, blue, white)?;

    let mut profile = Profile::new();
    profile.header = Header {
        kind: Kind::Display,
        color_space: ColorSpace::Rgb,
        pcs: ColorSpace::Xyz,
        ..Header::default()
    };

    profile.set_description(Locale::none(), "EDID-derived profile");
    profile.set_copyright(Locale::none(), "No copyright, use freely");

    profile.set_xyz_tag(*b"wtpt", yxy_to_xyz(white));
    profile.set_xyz_tag(*b"rXYZ", colorants[0]);
    profile.set_xyz_tag(*b"gXYZ", colorants[1]);
    profile.set_xyz_tag(*b"bXYZ", colorants[2]);

    let [r, g, b] = single_gamma(gamma);
    profile.set_curve_tag(*b"rTRC", &r);
    profile.set_curve_tag(*b"gTRC", &g);
    profile.set_curve_tag(*b"bTRC", &b);

    Ok(profile)
}

/// Scales chromaticity-only primaries (`Y` ignored on input) to full XYZ
/// colorants so their sum reproduces the white point, the standard
/// RGB-working-space construction.
fn primaries_to_xyz(red: Yxy, green: Yxy, blue: Yxy, white: Yxy) -> Result<[Xyz; 3]> {
    let chroma_to_xyz = |c: Yxy| -> Xyz {
        if c.y.abs() < 1e-12 {
            return Xyz::default();
        }
        Xyz { x: c.x / c.y, y: 1.0, z: (1.0 - c.x - c.y) / c.y }
    };
    let (rx, gx, bx) = (chroma_to_xyz(red), chroma_to_xyz(green), chroma_to_xyz(blue));
    let primary_matrix = Matrix3::from_rows([[rx.x, gx.x, bx.x], [rx.y, gx.y, bx.y], [rx.z, gx.z, bx.z]]);
    let white_xyz = chroma_to_xyz(white);
    let scale = primary_matrix
        .inverse()
        .map_err(|_| ErrorKind::Singular)?
        .multiply_vector(&Vector3::new(white_xyz.x, white_xyz.y, white_xyz.z));
    Ok([
        Xyz { x: rx.x * scale.0[0], y: rx.y * scale.0[0], z: rx.z * scale.0[0] },
        Xyz { x: gx.x * scale.0[1], y: gx.y * scale.0[1], z: gx.z * scale.0[1] },
        Xyz { x: bx.x * scale.0[2], y: bx.y * scale.0[2], z: bx.z * scale.0[2] },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::xyz_to_yxy;

    #[test]
    fn edid_profile_round_trips_through_load() {
        let red = Yxy { y_luminance: 1.0, x: 0.569336, y: 0.332031 };
        let green = Yxy { y_luminance: 1.0, x: 0.311523, y: 0.543945 };
        let blue = Yxy { y_luminance: 1.0, x: 0.149414, y: 0.131836 };
        let white = Yxy { y_luminance: 1.0, x: 0.313477, y: 0.329102 };

        let profile = create_from_edid(2.2, red, green, blue, white).unwrap();
        let bytes = profile.save().unwrap();
        let reloaded = Profile::load(&bytes).unwrap();

        assert_eq!(reloaded.header.kind, Kind::Display);
        assert_eq!(reloaded.header.color_space, ColorSpace::Rgb);

        let w = reloaded.xyz_tag(*b"wtpt").unwrap();
        let wyxy = xyz_to_yxy(w);
        assert!((wyxy.x - white.x).abs() < 1e-4);
        assert!((wyxy.y - white.y).abs() < 1e-4);

        let r = reloaded.xyz_tag(*b"rXYZ").unwrap();
        let g = reloaded.xyz_tag(*b"gXYZ").unwrap();
        let b = reloaded.xyz_tag(*b"bXYZ").unwrap();
        let sum = Xyz { x: r.x + g.x + b.x, y: r.y + g.y + b.y, z: r.z + g.z + b.z };
        let sum_yxy = xyz_to_yxy(sum);
        assert!((sum_yxy.x - white.x).abs() < 1e-3);
        assert!((sum_yxy.y - white.y).abs() < 1e-3);

        let cct = reloaded.correlated_color_temperature().unwrap();
        assert!((cct - 6504.0).abs() < 50.0, "got {cct}");
    }
}
