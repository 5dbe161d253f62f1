//! Chainable resultsets: filtering, sorting, joins and stored transforms.

mod join;
mod options;
#[allow(clippy::module_inception)]
mod resultset;
mod transform;

pub use join::*;
pub use options::*;
pub use resultset::*;
pub use transform::*;
