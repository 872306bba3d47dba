//! Stream Layer
//!
//! Frame decoding, event classification and transcript reduction for the
//! backend event stream

pub mod event;
pub mod frame;
pub mod reducer;
pub mod thinking;

pub use event::*;
pub use frame::*;
pub use reducer::*;
pub use thinking::*;
