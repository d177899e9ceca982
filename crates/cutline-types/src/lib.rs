//! Shared data types for cutline snapshot sessions.
//!
//! Everything a process records, sends or publishes lives here so the core
//! crate, the reporter and the demo can agree on one shape and emit it as
//! JSON through facet.

mod messages;
mod primitives;
mod record;
mod state;

pub use messages::*;
pub use primitives::*;
pub use record::*;
pub use state::*;
