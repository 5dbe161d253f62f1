//! Snapshot format and the adapters that store it.

mod adapter;
mod snapshot;

pub use adapter::*;
pub use snapshot::*;
