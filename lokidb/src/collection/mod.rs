//! Collections: the document store, its write and read paths, documents
//! and the events a collection publishes.
//!
//! A [Collection] keeps its documents in ascending id order in a single
//! data array. Binary indices, unique indices and dynamic views refer to
//! documents by their position in that array and are patched in place on
//! every write.

#[allow(clippy::module_inception)]
mod collection;
mod document;
mod event;
mod options;
mod read_operations;
mod write_operations;

pub use collection::*;
pub use document::*;
pub use event::*;
pub use options::*;
