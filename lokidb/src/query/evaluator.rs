use crate::collection::Document;
use crate::common::{aeq_helper, gt_helper, lt_helper, Value, FIELD_SEPARATOR, NULL_VALUE};
use crate::query::{Operator, Query};

impl Query {
    /// Tests a document against this query.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Query::All => true,
            Query::And(clauses) => clauses.iter().all(|q| q.matches(doc)),
            Query::Or(clauses) => clauses.iter().any(|q| q.matches(doc)),
            Query::Field { path, op } => {
                if path.contains(FIELD_SEPARATOR) {
                    let segments: Vec<&str> = path.split(FIELD_SEPARATOR).collect();
                    dot_scan(doc, &segments, op)
                } else {
                    op.matches(doc.get_field(path))
                }
            }
        }
    }
}

/// Walks `segments` from `doc`. When an intermediate value is an array the
/// remaining path is tried against every element and the clause matches if
/// any element does. A numeric segment indexes into an array directly.
fn dot_scan(doc: &Document, segments: &[&str], op: &Operator) -> bool {
    match segments.split_first() {
        None => false,
        Some((first, rest)) => scan_element(doc.get_field(first), rest, op),
    }
}

fn scan_element(element: Option<&Value>, rest: &[&str], op: &Operator) -> bool {
    let Some((segment, tail)) = rest.split_first() else {
        return op.matches(element);
    };

    match element {
        Some(Value::Array(items)) => match segment.parse::<usize>() {
            Ok(i) => scan_element(items.get(i), tail, op),
            Err(_) => items.iter().any(|item| scan_element(child(item, segment), tail, op)),
        },
        Some(value) => scan_element(child(value, segment), tail, op),
        None => scan_element(None, tail, op),
    }
}

#[inline]
fn child<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Document(doc) => doc.get_field(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

impl Operator {
    /// Applies the operator to the value found at a field path; `None`
    /// means the path did not resolve.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let loose = value.unwrap_or(&NULL_VALUE);
        match self {
            Operator::Eq(expected) => value == Some(expected),
            Operator::Ne(expected) => value != Some(expected),
            Operator::Aeq(expected) | Operator::Dteq(expected) => aeq_helper(loose, expected),
            Operator::Gt(bound) => gt_helper(loose, bound, false),
            Operator::Gte(bound) => gt_helper(loose, bound, true),
            Operator::Lt(bound) => lt_helper(loose, bound, false),
            Operator::Lte(bound) => lt_helper(loose, bound, true),
            Operator::Between(lo, hi) => {
                !loose.is_null() && gt_helper(loose, lo, true) && lt_helper(loose, hi, true)
            }
            Operator::In(values) => value.is_some_and(|v| values.contains(v)),
            Operator::Nin(values) => !value.is_some_and(|v| values.contains(v)),
            Operator::KeyIn(doc) => key_text(value).is_some_and(|k| doc.contains_key(&k)),
            Operator::NKeyIn(doc) => !key_text(value).is_some_and(|k| doc.contains_key(&k)),
            Operator::Regex(pattern) => key_text(value).is_some_and(|text| pattern.is_match(&text)),
            Operator::ContainsString(needle) => {
                value.and_then(Value::as_str).is_some_and(|s| s.contains(needle.as_str()))
            }
            Operator::Contains(items) => items.iter().all(|item| contains(value, item)),
            Operator::ContainsAny(items) => items.iter().any(|item| contains(value, item)),
            Operator::ContainsNone(items) => !items.iter().any(|item| contains(value, item)),
            Operator::Size(inner) => match value {
                Some(Value::Array(items)) => inner.matches(Some(&Value::from(items.len()))),
                _ => false,
            },
            Operator::Len(inner) => match value {
                Some(text @ Value::String(_)) => text
                    .length()
                    .is_some_and(|len| inner.matches(Some(&Value::from(len)))),
                _ => false,
            },
            Operator::Type(inner) => {
                let name = value.map_or("undefined", Value::type_name);
                inner.matches(Some(&Value::from(name)))
            }
            Operator::Finite(expected) => {
                let finite = value
                    .and_then(Value::to_number)
                    .is_some_and(f64::is_finite);
                finite == *expected
            }
            Operator::Exists(expected) => value.is_some() == *expected,
            Operator::ElemMatch(query) => match value {
                Some(Value::Array(items)) => items.iter().any(|item| match item {
                    Value::Document(doc) => query.matches(doc),
                    _ => false,
                }),
                _ => false,
            },
            Operator::Not(inner) => !inner.matches(value),
            Operator::And(ops) => ops.iter().all(|op| op.matches(value)),
            Operator::Or(ops) => ops.iter().any(|op| op.matches(value)),
        }
    }
}

/// Text form of a scalar, used as an object key or a regex subject.
fn key_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::I64(v) => Some(v.to_string()),
        Value::F64(v) => Some(v.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn contains(haystack: Option<&Value>, item: &Value) -> bool {
    match haystack {
        Some(Value::Array(values)) => values.contains(item),
        Some(Value::String(s)) => item.as_str().is_some_and(|needle| s.contains(needle)),
        Some(Value::Document(doc)) => key_text(Some(item)).is_some_and(|k| doc.contains_key(&k)),
        _ => false,
    }
}
