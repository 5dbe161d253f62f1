//! Common types shared by every layer of the engine.
//!
//! - [`Value`] - the dynamically typed field value stored in documents
//! - [`compare`] - the loose total order used by indices, range queries and sorts
//! - [`LokiEventBus`] - publish/subscribe plumbing for collection events
//! - constants for reserved field names

pub mod compare;
mod constants;
mod event_bus;
mod util;
mod value;

pub use compare::{aeq_helper, gt_helper, loose_cmp, lt_helper, sort_helper};
pub use constants::*;
pub use event_bus::*;
pub use util::*;
pub use value::*;
