//! Color math & curves: primitives, matrix/vector
//! algebra, and the interpolation kernels the rest of the crate builds on.

mod interpolate;
mod matrix;
mod primitives;

pub use interpolate::{InterpolationKind, InterpolationTable};
pub use matrix::{Matrix3, Vector3};
pub use primitives::{
    color_temperature_to_xyz, lab_to_xyz, rgb_array_interpolate, rgb_interpolate, xyz_to_color_temperature,
    xyz_to_lab, xyz_to_yxy, yxy_to_xyz, Lab, Rgb, Rgb8, Xyz, Yxy, ArrayOfRgb, D50_WHITE,
};
