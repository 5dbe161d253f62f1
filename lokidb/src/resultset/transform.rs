use crate::collection::{Collection, Document};
use crate::common::{Value, TRANSFORM_PARAM_PREFIX};
use crate::errors::{ErrorKind, LokiError, LokiResult};
use crate::resultset::{Resultset, SimpleSortOptions, SortCriterion};
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::sync::Arc;

/// A shareable document predicate.
pub type Predicate = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

/// A shareable document comparator.
pub type Comparator = Arc<dyn Fn(&Document, &Document) -> Ordering + Send + Sync>;

/// One stage of a stored, reusable resultset pipeline.
///
/// String values of the form `"[%lktxp]name"` inside `Find` queries,
/// `Limit`/`Offset` counts and `SimpleSort` fields are replaced by the
/// parameter `name` when the transform runs.
#[derive(Clone)]
pub enum TransformStep {
    Find(Document),
    Where(Predicate),
    SimpleSort {
        field: String,
        options: SimpleSortOptions,
    },
    CompoundSort(Vec<SortCriterion>),
    Sort(Comparator),
    Limit(Value),
    Offset(Value),
}

impl TransformStep {
    pub fn find(query: Document) -> Self {
        TransformStep::Find(query)
    }

    pub fn filter<P>(predicate: P) -> Self
    where
        P: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        TransformStep::Where(Arc::new(predicate))
    }

    pub fn simplesort(field: &str, options: SimpleSortOptions) -> Self {
        TransformStep::SimpleSort {
            field: field.to_string(),
            options,
        }
    }

    pub fn sort<F>(comparator: F) -> Self
    where
        F: Fn(&Document, &Document) -> Ordering + Send + Sync + 'static,
    {
        TransformStep::Sort(Arc::new(comparator))
    }

    pub fn limit<T: Into<Value>>(count: T) -> Self {
        TransformStep::Limit(count.into())
    }

    pub fn offset<T: Into<Value>>(count: T) -> Self {
        TransformStep::Offset(count.into())
    }
}

impl Debug for TransformStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformStep::Find(query) => write!(f, "Find({})", query),
            TransformStep::Where(_) => write!(f, "Where(<fn>)"),
            TransformStep::SimpleSort { field, options } => {
                write!(f, "SimpleSort({}, {:?})", field, options)
            }
            TransformStep::CompoundSort(criteria) => write!(f, "CompoundSort({:?})", criteria),
            TransformStep::Sort(_) => write!(f, "Sort(<fn>)"),
            TransformStep::Limit(count) => write!(f, "Limit({})", count),
            TransformStep::Offset(count) => write!(f, "Offset({})", count),
        }
    }
}

impl<C: Deref<Target = Collection>> Resultset<C> {
    /// Runs `steps` in order, substituting `params` into placeholders.
    pub fn transform(self, steps: &[TransformStep], params: &Document) -> LokiResult<Self> {
        let mut resultset = self;
        for step in steps {
            resultset = match step {
                TransformStep::Find(query) => {
                    let query = match substitute(&Value::Document(query.clone()), params) {
                        Value::Document(query) => query,
                        _ => query.clone(),
                    };
                    resultset.find(query)?
                }
                TransformStep::Where(predicate) => resultset.filter(|doc| predicate(doc)),
                TransformStep::SimpleSort { field, options } => {
                    let field = match substitute(&Value::from(field.as_str()), params) {
                        Value::String(field) => field,
                        _ => field.clone(),
                    };
                    resultset.simplesort(&field, *options)
                }
                TransformStep::CompoundSort(criteria) => resultset.compoundsort(criteria),
                TransformStep::Sort(comparator) => resultset.sort(|a, b| comparator(a, b)),
                TransformStep::Limit(count) => resultset.limit(count_param(count, params, "limit")?),
                TransformStep::Offset(count) => {
                    resultset.offset(count_param(count, params, "offset")?)
                }
            };
        }
        Ok(resultset)
    }

    /// Runs the transform stored on the collection under `name`.
    pub fn transform_named(self, name: &str, params: &Document) -> LokiResult<Self> {
        let steps = self.collection().require_transform(name)?.to_vec();
        self.transform(&steps, params)
    }
}

/// Replaces placeholder strings with parameter values, recursing into
/// arrays and documents. Unknown placeholders are left as they are.
pub(crate) fn substitute(value: &Value, params: &Document) -> Value {
    match value {
        Value::String(text) => text
            .strip_prefix(TRANSFORM_PARAM_PREFIX)
            .and_then(|name| params.get_field(name))
            .cloned()
            .unwrap_or_else(|| value.clone()),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, params)).collect()),
        Value::Document(doc) => {
            let mut copy = Document::new();
            for (key, item) in doc.iter() {
                copy.insert(key.clone(), substitute(item, params));
            }
            Value::Document(copy)
        }
        _ => value.clone(),
    }
}

fn count_param(count: &Value, params: &Document, stage: &str) -> LokiResult<usize> {
    let count = substitute(count, params);
    match count.as_i64() {
        Some(n) if n >= 0 => Ok(n as usize),
        _ => {
            log::error!("Transform {} expects a non-negative integer, got {}", stage, count);
            Err(LokiError::new(
                &format!("Transform {} expects a non-negative integer, got {}", stage, count),
                ErrorKind::InvalidQuery,
            ))
        }
    }
}
