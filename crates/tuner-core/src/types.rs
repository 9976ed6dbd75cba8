//! Core domain types for the renderer.

pub mod format;
pub mod sample;

pub use format::{Encoding, Format};
pub use sample::{DecodedUnit, Sample};
