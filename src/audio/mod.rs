pub mod beats;
pub mod chroma;
pub mod decode;
pub mod hpss;
pub mod onset;
pub mod spectrum;
