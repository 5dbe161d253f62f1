//! Dynamic views: named filter and sort pipelines maintained incrementally
//! as their collection changes.

mod dynamic_view;
mod handle;
mod options;

pub use dynamic_view::*;
pub use handle::*;
pub use options::*;
