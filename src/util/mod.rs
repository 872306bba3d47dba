//! Utility Layer
//!
//! General error types shared across the crate

pub mod errors;

pub use errors::*;
