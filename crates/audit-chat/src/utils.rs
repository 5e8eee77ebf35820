//! Stream decoding helpers.

pub mod frames;

pub use frames::*;
