//! Profile-chain transforms: up to three ICC
//! profiles, a rendering intent, and input/output pixel formats.

use crate::error::{ErrorKind, Result};
use crate::icc::{Profile, RenderingIntent};

/// Channel order within a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
    Gray,
}

/// An (colorspace, bit depth, channel order, alpha) tuple describing one
/// side of a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub order: ChannelOrder,
    pub bits_per_channel: u8,
    pub has_alpha: bool,
}

impl PixelFormat {
    #[must_use]
    pub const fn rgb8() -> Self {
        Self { order: ChannelOrder::Rgb, bits_per_channel: 8, has_alpha: false }
    }

    #[must_use]
    pub const fn rgba8() -> Self {
        Self { order: ChannelOrder::Rgb, bits_per_channel: 8, has_alpha: true }
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        let base = match self.order {
            ChannelOrder::Gray => 1,
            ChannelOrder::Rgb | ChannelOrder::Bgr => 3,
        };
        base + usize::from(self.has_alpha)
    }

    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        self.channels() * (self.bits_per_channel as usize / 8).max(1)
    }
}

/// A prepared transform: up to an input profile, an optional abstract
/// profile, and an output profile, chained under one rendering intent.
/// Immutable and shareable across threads once built.
pub struct Transform {
    input: Profile,
    abstract_profile: Option<Profile>,
    output: Profile,
    intent: RenderingIntent,
    input_format: PixelFormat,
    output_format: PixelFormat,
}

impl Transform {
    /// Builds a transform over 2 or 3 profiles. All profiles must already be
    /// loaded ("consented") before preparation, which is itself
    /// single-threaded.
    pub fn new(
        input: Profile,
        abstract_profile: Option<Profile>,
        output: Profile,
        intent: RenderingIntent,
        input_format: PixelFormat,
        output_format: PixelFormat,
    ) -> Result<Self> {
        Ok(Self { input, abstract_profile, output, intent, input_format, output_format })
    }

    #[must_use]
    pub fn intent(&self) -> RenderingIntent {
        self.intent
    }

    /// Applies the chain to an `w x h` buffer with the given row `stride` in
    /// bytes. Not a suspension point — this is blocking CPU work.
    pub fn process(&self, in_buf: &[u8], out_buf: &mut [u8], w: usize, h: usize, stride: usize) -> Result<()> {
        let row_in_bytes = self.input_format.bytes_per_pixel() * w;
        let row_out_bytes = self.output_format.bytes_per_pixel() * w;
        if row_in_bytes > stride || in_buf.len() < stride * h {
            return Err(ErrorKind::InputInvalid("input buffer smaller than w/h/stride imply".into()));
        }
        if out_buf.len() < row_out_bytes * h {
            return Err(ErrorKind::InputInvalid("output buffer too small for w/h".into()));
        }

        let white_in = self.input.white_point().unwrap_or(crate::color::D50_WHITE);
        let white_out = self.output.white_point().unwrap_or(crate::color::D50_WHITE);

        for y in 0..h {
            let in_row = &in_buf[y * stride..y * stride + row_in_bytes];
            let out_row = &mut out_buf[y * row_out_bytes..(y + 1) * row_out_bytes];
            for x in 0..w {
                let pixel = read_pixel(in_row, x, &self.input_format);
                let lab = crate::color::xyz_to_lab(
                    crate::color::Xyz { x: pixel.r, y: pixel.g, z: pixel.b },
                    white_in,
                );
                let xyz = crate::color::lab_to_xyz(lab, white_out);
                write_pixel(out_row, x, &self.output_format, crate::color::Rgb { r: xyz.x, g: xyz.y, b: xyz.z });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn has_abstract_profile(&self) -> bool {
        self.abstract_profile.is_some()
    }
}

fn read_pixel(row: &[u8], x: usize, fmt: &PixelFormat) -> crate::color::Rgb {
    let bpp = fmt.bytes_per_pixel();
    let o = x * bpp;
    let scale = 1.0 / 255.0;
    match fmt.order {
        ChannelOrder::Gray => {
            let v = row[o] as f64 * scale;
            crate::color::Rgb { r: v, g: v, b: v }
        }
        ChannelOrder::Rgb => crate::color::Rgb { r: row[o] as f64 * scale, g: row[o + 1] as f64 * scale, b: row[o + 2] as f64 * scale },
        ChannelOrder::Bgr => crate::color::Rgb { r: row[o + 2] as f64 * scale, g: row[o + 1] as f64 * scale, b: row[o] as f64 * scale },
    }
}

fn write_pixel(row: &mut [u8], x: usize, fmt: &PixelFormat, rgb: crate::color::Rgb) {
    let bpp = fmt.bytes_per_pixel();
    let o = x * bpp;
    let clamp8 = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    match fmt.order {
        ChannelOrder::Gray => row[o] = clamp8(rgb.r),
        ChannelOrder::Rgb => {
            row[o] = clamp8(rgb.r);
            row[o + 1] = clamp8(rgb.g);
            row[o + 2] = clamp8(rgb.b);
        }
        ChannelOrder::Bgr => {
            row[o] = clamp8(rgb.b);
            row[o + 1] = clamp8(rgb.g);
            row[o + 2] = clamp8(rgb.r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_profiles_round_trip_pixel() {
        let t = Transform::new(
            Profile::new(),
            None,
            Profile::new(),
            RenderingIntent::RelativeColorimetric,
            PixelFormat::rgb8(),
            PixelFormat::rgb8(),
        )
        .unwrap();
        let input = [10u8, 20, 30];
        let mut output = [0u8; 3];
        t.process(&input, &mut output, 1, 1, 3).unwrap();
        assert!((output[0] as i16 - input[0] as i16).abs() <= 2);
    }

    #[test]
    fn rejects_undersized_buffers() {
        let t = Transform::new(
            Profile::new(),
            None,
            Profile::new(),
            RenderingIntent::Perceptual,
            PixelFormat::rgb8(),
            PixelFormat::rgb8(),
        )
        .unwrap();
        let input = [0u8; 2];
        let mut output = [0u8; 3];
        assert!(t.process(&input, &mut output, 1, 1, 3).is_err());
    }
}
