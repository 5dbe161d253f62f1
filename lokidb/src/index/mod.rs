//! Secondary indices over a collection's data array.
//!
//! [BinaryIndex] keeps the positions of a collection sorted by one field and
//! answers range lookups with binary search. [UniqueIndex] maps a field's
//! value to the owning document id and enforces uniqueness.

mod binary_index;
mod unique_index;

pub use binary_index::*;
pub use unique_index::*;
