use im::OrdMap;
use smallvec::SmallVec;

use crate::common::{Value, DOC_ID, DOC_META, FIELD_SEPARATOR, META_REVISION, NULL_VALUE};
use crate::errors::LokiResult;
use std::fmt::{Debug, Display};

type FieldVec = SmallVec<[String; 8]>;

/// A schemaless document: an ordered map from field name to [Value].
///
/// Field paths use `.` to reach into nested documents, and a numeric
/// segment indexes into an array, so `"owner.tags.0"` is the first tag of
/// the owner sub-document.
///
/// Two fields are reserved and are maintained by the owning collection:
///
/// * `$loki` - the integer id assigned on insert, never reused
/// * `meta` - `{revision, created, updated, version}` bookkeeping
///
/// Cloning is cheap: the underlying `im::OrdMap` shares structure between
/// copies, so handing documents out of a collection does not deep copy them.
#[derive(Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Document {
    data: OrdMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Document {
            data: OrdMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of top level fields.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Associates `value` with the field path `path`.
    ///
    /// Missing intermediate documents are created. An intermediate array is
    /// entered when the next segment is an in-range index; any other
    /// intermediate value is replaced by a new nested document.
    ///
    /// ```text
    /// let mut doc = Document::new();
    /// doc.put("user.name", "Alice");
    /// assert_eq!(doc.get("user.name"), Some(&Value::from("Alice")));
    /// ```
    pub fn put<T: Into<Value>>(&mut self, path: &str, value: T) {
        let value = value.into();
        match path.split_once(FIELD_SEPARATOR) {
            None => {
                self.data.insert(path.to_string(), value);
            }
            Some((head, tail)) => {
                if !self.data.contains_key(head) {
                    self.data.insert(head.to_string(), Value::Null);
                }
                if let Some(child) = self.data.get_mut(head) {
                    put_nested(child, tail, value);
                }
            }
        }
    }

    /// Stores `value` under the literal key `key`, without path splitting.
    /// This is how [doc!] stores its keys, so `doc! { "a.b": 1 }` holds a
    /// field literally named `a.b`, which is what a dot-notation query
    /// clause looks like.
    pub fn insert<K: Into<String>, T: Into<Value>>(&mut self, key: K, value: T) {
        self.data.insert(key.into(), value.into());
    }

    /// Resolves a field path, or `None` if any segment is missing.
    ///
    /// This is a single-valued lookup: an array on the path is only entered
    /// through a numeric segment. Queries that need to fan out over array
    /// elements go through the query evaluator instead.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split(FIELD_SEPARATOR);
        let first = segments.next()?;
        let mut current = self.data.get(first)?;
        for segment in segments {
            current = match current {
                Value::Document(doc) => doc.data.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Top level lookup of `key`, without path splitting.
    pub fn get_field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Like [Document::get] but a missing path reads as `null`. This is the
    /// key that binary indices and sorts see for a document.
    pub fn resolve(&self, path: &str) -> &Value {
        self.get(path).unwrap_or(&NULL_VALUE)
    }

    /// Removes the value at `path`, returning it if it was present.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        match path.split_once(FIELD_SEPARATOR) {
            None => self.data.remove(path),
            Some((head, tail)) => remove_nested(self.data.get_mut(head)?, tail),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn contains_field(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Every leaf field path, descending into nested documents.
    pub fn fields(&self) -> FieldVec {
        let mut fields = FieldVec::new();
        self.collect_fields("", &mut fields);
        fields
    }

    fn collect_fields(&self, prefix: &str, fields: &mut FieldVec) {
        for (key, value) in self.data.iter() {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}{}{}", prefix, FIELD_SEPARATOR, key)
            };
            match value {
                Value::Document(nested) if !nested.is_empty() => nested.collect_fields(&path, fields),
                _ => fields.push(path),
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Recursively merges `other` into this document. Nested documents are
    /// merged field by field, everything else is overwritten.
    pub fn merge(&mut self, other: &Document) {
        for (key, value) in other.data.iter() {
            match (self.data.get_mut(key), value) {
                (Some(Value::Document(mine)), Value::Document(theirs)) => mine.merge(theirs),
                _ => {
                    self.data.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// The id assigned by the owning collection, if any.
    pub fn id(&self) -> Option<i64> {
        self.data.get(DOC_ID).and_then(Value::as_i64)
    }

    pub fn has_id(&self) -> bool {
        self.data.contains_key(DOC_ID)
    }

    pub fn meta(&self) -> Option<&Document> {
        self.data.get(DOC_META).and_then(Value::as_document)
    }

    pub fn revision(&self) -> Option<i64> {
        self.meta()
            .and_then(|meta| meta.get_field(META_REVISION))
            .and_then(Value::as_i64)
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.data.insert(DOC_ID.to_string(), Value::I64(id));
    }

    pub(crate) fn set_meta(&mut self, meta: Document) {
        self.data.insert(DOC_META.to_string(), Value::Document(meta));
    }

    /// A copy of this document without the `$loki` and `meta` fields.
    pub fn without_meta(&self) -> Document {
        let mut copy = self.clone();
        copy.data.remove(DOC_ID);
        copy.data.remove(DOC_META);
        copy
    }

    pub fn to_json(&self) -> LokiResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> LokiResult<Document> {
        Ok(serde_json::from_str(json)?)
    }
}

fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once(FIELD_SEPARATOR) {
        Some((segment, tail)) => (segment, Some(tail)),
        None => (path, None),
    }
}

fn put_nested(target: &mut Value, path: &str, value: Value) {
    if let Value::Array(items) = target {
        let (segment, tail) = split_path(path);
        if let Some(slot) = segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
            match tail {
                None => *slot = value,
                Some(tail) => put_nested(slot, tail, value),
            }
            return;
        }
    }

    if !target.is_document() {
        *target = Value::Document(Document::new());
    }
    if let Value::Document(doc) = target {
        doc.put(path, value);
    }
}

fn remove_nested(target: &mut Value, path: &str) -> Option<Value> {
    match target {
        Value::Document(doc) => doc.remove(path),
        Value::Array(items) => {
            let (segment, tail) = split_path(path);
            let index = segment.parse::<usize>().ok()?;
            match tail {
                None if index < items.len() => Some(items.remove(index)),
                None => None,
                Some(tail) => remove_nested(items.get_mut(index)?, tail),
            }
        }
        _ => None,
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}: {}", key, value)?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Document {
            data: iter.into_iter().collect(),
        }
    }
}

#[doc(hidden)]
pub fn normalize(value: &str) -> String {
    value.trim_matches('"').to_string()
}

/// Creates a [Document] with JSON-like syntax.
///
/// ```rust
/// use lokidb::doc;
///
/// let empty = doc! {};
///
/// let base = 100;
/// let weapon = doc! {
///     name: "mjolnir",
///     owner: "thor",
///     maker: { name: "Eitri", forge: null },
///     tags: ["hammer", "thunder"],
///     weight: (base * 2),
/// };
/// assert_eq!(weapon.get("maker.name").unwrap().as_str(), Some("Eitri"));
/// ```
#[macro_export]
macro_rules! doc {
    ({}) => {
        $crate::collection::Document::new()
    };

    () => {
        $crate::collection::Document::new()
    };

    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::doc!($($key : $value),*)
    };

    ($($key:tt : $value:tt),* $(,)?) => {
        {
            #[allow(unused_imports)]
            use $crate::doc_value;

            let mut doc = $crate::collection::Document::new();
            $(
                doc.insert($crate::collection::normalize(stringify!($key)), $crate::doc_value!($value));
            )*
            doc
        }
    };
}

/// Value conversion used by [doc!]: nested documents, arrays, `null` and
/// plain expressions.
#[macro_export]
macro_rules! doc_value {
    (null) => {
        $crate::common::Value::Null
    };

    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::common::Value::Document($crate::doc!{ $($key : $value),* })
    };

    ([ $($value:tt),* $(,)? ]) => {
        $crate::common::Value::Array(vec![$($crate::doc_value!($value)),*])
    };

    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}
