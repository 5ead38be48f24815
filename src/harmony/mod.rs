//! Symbolic layer: templates, classification, key, meter and timeline cleanup.

pub mod bars;
pub mod classify;
pub mod key;
pub mod meter;
pub mod simplify;
pub mod smooth;
pub mod templates;
