//! Session Layer
//!
//! Conversation data model and the keyed session store

pub mod store;
pub mod types;

pub use store::*;
pub use types::*;
