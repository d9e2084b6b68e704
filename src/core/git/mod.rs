//! Source checkout management.
//!
//! - `primitives` - one git command each, failures logged and reported, never raised
//! - `sync` - brings the working tree to the requested state

mod primitives;
mod sync;

pub use primitives::*;
pub use sync::*;
