// doc constants
pub const DOC_ID: &str = "$loki";
pub const DOC_META: &str = "meta";
pub const RESERVED_FIELDS: [&str; 2] = [DOC_ID, DOC_META];

// meta constants
pub const META_REVISION: &str = "revision";
pub const META_CREATED: &str = "created";
pub const META_UPDATED: &str = "updated";
pub const META_VERSION: &str = "version";

// event constants
pub const LOKI_EVENT: &str = "loki_event";

// transform constants
pub const TRANSFORM_PARAM_PREFIX: &str = "[%lktxp]";

// query constants
pub const FIELD_SEPARATOR: char = '.';

// sort constants
/// Once the collection holds more than this many documents per filtered row,
/// an index-assisted sort falls back to a plain comparator sort of the rows.
pub const INDEX_INTERSECT_RATIO: f64 = 10.0;
