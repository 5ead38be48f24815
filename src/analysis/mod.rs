pub mod engine;
pub mod fast;
pub mod precise;
pub mod result;
