#![allow(
    dead_code,
    unused_imports,
    clippy::approx_constant,
)]
//! # LokiDB - Embedded In-Memory Document Database
//!
//! LokiDB keeps schemaless documents in memory and answers queries over them
//! with a small query language. Indices and live views are kept up to date on
//! every write instead of being recomputed on read.
//!
//! ## Key Features
//!
//! - **Document store**: Integer ids assigned on insert, never reused, with revision metadata
//! - **Rich Querying**: `$eq`, ranges, `$in`, `$regex`, `$elemMatch`, `$and`/`$or` and more,
//!   with dot notation that fans out over arrays
//! - **Binary indices**: Sorted position arrays patched adaptively on every write
//! - **Unique indices**: Constant time lookup by key with duplicate rejection
//! - **Resultsets**: Chainable find, sort, limit, join and map-reduce
//! - **Dynamic views**: Named filter and sort pipelines maintained incrementally
//! - **Transforms**: Stored, parameterized resultset pipelines
//! - **Events**: Synchronous listeners for inserts, updates, deletes and errors
//! - **Persistence**: JSON snapshots handed to a pluggable adapter
//!
//! ## Quick Start
//!
//! ```rust
//! use lokidb::{doc, field, CollectionOptions, Database, SimpleSortOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut db = Database::new("armory");
//! let weapons = db.add_collection(
//!     "weapons",
//!     CollectionOptions::new().index("weight").unique("name"),
//! )?;
//!
//! weapons.insert(vec![
//!     doc! { name: "mjolnir", owner: "thor", weight: 20 },
//!     doc! { name: "gungnir", owner: "odin", weight: 5 },
//!     doc! { name: "tyrfing", owner: "svafrlami", weight: 10 },
//! ])?;
//!
//! let light = weapons.find(field("weight").lt(15))?;
//! assert_eq!(light.len(), 2);
//!
//! let heaviest = weapons
//!     .chain()
//!     .simplesort("weight", SimpleSortOptions::new().desc(true))
//!     .first()
//!     .and_then(|doc| doc.get("name").and_then(|v| v.as_str()).map(str::to_string));
//! assert_eq!(heaviest.as_deref(), Some("mjolnir"));
//!
//! let mjolnir = weapons.by("name", "mjolnir")?.cloned();
//! assert!(mjolnir.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Data Model
//!
//! A collection holds its documents in one array ordered by id. Binary
//! indices, dynamic views and resultsets all refer to documents by their
//! position in that array. Every write patches those position lists in the
//! same call, so reads never pay for stale state, and a removal renumbers
//! every list against a single removal map.
//!
//! ## Module Organization
//!
//! - [`collection`] - Collections, documents, write and read operations, events
//! - [`common`] - Values, the loose comparison order, the event bus and shared constants
//! - [`database`] - The collection catalog and its persistence entry points
//! - [`errors`] - Error types and result definitions
//! - [`index`] - Binary and unique indices
//! - [`persistence`] - Snapshot format and persistence adapters
//! - [`query`] - Query parsing, evaluation and fluent builders
//! - [`resultset`] - Chainable resultsets, joins and transforms
//! - [`view`] - Dynamic views

pub mod collection;
pub mod common;
pub mod database;
pub mod errors;
pub mod index;
pub mod persistence;
pub mod query;
pub mod resultset;
pub mod view;

pub use collection::{
    Collection, CollectionEventInfo, CollectionEventListener, CollectionEvents, CollectionOptions,
    Document,
};
pub use common::{EventAware, SubscriberRef, Value};
pub use database::{CollectionInfo, Database, DatabaseBuilder};
pub use errors::{ErrorKind, LokiError, LokiResult};
pub use persistence::{MemoryAdapter, PersistenceAdapter};
pub use query::{field, IntoQuery, Query};
pub use resultset::{DataOptions, Resultset, SimpleSortOptions, SortCriterion, TransformStep};
pub use view::{DynamicView, DynamicViewHandle, DynamicViewOptions, SortPriority};
