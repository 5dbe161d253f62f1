//! Query language: parsing, evaluation and fluent builders.
//!
//! A [Query] is parsed from a [crate::collection::Document] written in the
//! query language, or assembled with [field]. The evaluator supports dot
//! notation with fan-out over arrays met along the path.

mod evaluator;
mod fluent;
mod operator;
#[allow(clippy::module_inception)]
mod query;

pub use fluent::*;
pub use operator::{Operator, Pattern};
pub use query::*;
