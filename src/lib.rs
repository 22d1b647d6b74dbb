//! Color-management core: sensor drivers for colorimeters and
//! spectrophotometers, an ICC profile codec, a CGATS/IT8 measurement-file
//! codec, and the color math tying them together.
//!
//! See the `src/*` module docs for the component breakdown; each maps to one
//! piece of the overall spec (color math, spectra, the CGATS codec, CCMX/CMF
//! fitting, the ICC codec and store, profile-chain transforms, and the
//! sensor framework with its per-device drivers).

#![allow(dead_code)]

pub mod bytes;
pub mod ccmx;
pub mod cgats;
pub mod cmf;
pub mod color;
pub mod debug;
pub mod dom;
pub mod error;
pub mod icc;
pub mod locale;
pub mod sensor;
pub mod spectrum;
pub mod store;
pub mod transform;

pub use error::{ErrorKind, Result};
