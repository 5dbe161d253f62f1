//! Loose comparison over heterogeneous [Value]s.
//!
//! Binary indices, range lookups, `$gt`/`$lt` style operators and every sort
//! share this single total order, so that an index-assisted lookup and a
//! linear scan can never disagree about which documents are in range.
//!
//! The order is:
//!
//! 1. `NaN`
//! 2. `null` (missing fields read as `null`)
//! 3. `false`, then `true`
//! 4. the empty string
//! 5. numbers, numeric strings and dates, compared numerically
//!    (dates by epoch milliseconds)
//! 6. other strings, lexicographically
//! 7. arrays, by length and then element by element
//! 8. documents, all mutually equal

use crate::common::Value;
use std::cmp::Ordering;

#[inline]
fn edge_rank(value: &Value) -> u8 {
    match value {
        Value::F64(v) if v.is_nan() => 0,
        Value::Null => 1,
        Value::Bool(false) => 3,
        Value::Bool(true) => 4,
        Value::String(s) if s.is_empty() => 5,
        _ => 9,
    }
}

#[inline]
fn class_rank(value: &Value) -> u8 {
    match value {
        Value::String(_) => 0,
        Value::Array(_) => 1,
        _ => 2,
    }
}

/// Compares two values under the loose total order.
pub fn loose_cmp(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (edge_rank(a), edge_rank(b));
    if ra != 9 || rb != 9 {
        return ra.cmp(&rb);
    }

    match (a.to_number(), b.to_number()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => match (a, b) {
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()).then_with(|| {
                x.iter()
                    .zip(y.iter())
                    .map(|(l, r)| loose_cmp(l, r))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            }),
            _ => class_rank(a).cmp(&class_rank(b)),
        },
    }
}

/// Loose equality: `"5" == 5`, `null == undefined`, two dates at the same
/// instant are equal.
#[inline]
pub fn aeq_helper(a: &Value, b: &Value) -> bool {
    loose_cmp(a, b) == Ordering::Equal
}

/// `a < b`, or `a <= b` when `or_equal` is set.
#[inline]
pub fn lt_helper(a: &Value, b: &Value, or_equal: bool) -> bool {
    match loose_cmp(a, b) {
        Ordering::Less => true,
        Ordering::Equal => or_equal,
        Ordering::Greater => false,
    }
}

/// `a > b`, or `a >= b` when `or_equal` is set.
#[inline]
pub fn gt_helper(a: &Value, b: &Value, or_equal: bool) -> bool {
    match loose_cmp(a, b) {
        Ordering::Greater => true,
        Ordering::Equal => or_equal,
        Ordering::Less => false,
    }
}

/// Comparator for sorts, reversed when `desc` is set.
#[inline]
pub fn sort_helper(a: &Value, b: &Value, desc: bool) -> Ordering {
    let ordering = loose_cmp(a, b);
    if desc {
        ordering.reverse()
    } else {
        ordering
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_edge_values_sort_first() {
        let mut values = vec![
            Value::from(1),
            Value::from(""),
            Value::Bool(true),
            Value::Null,
            Value::Bool(false),
            Value::F64(f64::NAN),
        ];
        values.sort_by(loose_cmp);
        assert!(matches!(values[0], Value::F64(v) if v.is_nan()));
        assert_eq!(values[1], Value::Null);
        assert_eq!(values[2], Value::Bool(false));
        assert_eq!(values[3], Value::Bool(true));
        assert_eq!(values[4], Value::from(""));
        assert_eq!(values[5], Value::from(1));
    }

    #[test]
    fn test_numeric_strings_compare_numerically() {
        assert!(lt_helper(&Value::from("9"), &Value::from(10), false));
        assert!(aeq_helper(&Value::from("5"), &Value::from(5)));
        assert!(gt_helper(&Value::from("10"), &Value::from("9"), false));
    }

    #[test]
    fn test_numbers_before_plain_strings() {
        assert_eq!(loose_cmp(&Value::from(1000), &Value::from("abc")), Ordering::Less);
        assert_eq!(loose_cmp(&Value::from("abc"), &Value::from("abd")), Ordering::Less);
    }

    #[test]
    fn test_dates_compare_by_instant() {
        let early = Value::from(Utc.timestamp_millis_opt(1_000).unwrap());
        let late = Value::from(Utc.timestamp_millis_opt(2_000).unwrap());
        assert!(lt_helper(&early, &late, false));
        assert!(aeq_helper(&early, &Value::from(Utc.timestamp_millis_opt(1_000).unwrap())));
        assert!(aeq_helper(&early, &Value::from(1_000)));
    }

    #[test]
    fn test_arrays_compare_by_length_first() {
        let short = Value::from(vec![9, 9]);
        let long = Value::from(vec![1, 1, 1]);
        assert_eq!(loose_cmp(&short, &long), Ordering::Less);
        assert_eq!(
            loose_cmp(&Value::from(vec![1, 2]), &Value::from(vec![1, 3])),
            Ordering::Less
        );
    }

    #[test]
    fn test_documents_are_mutually_equal() {
        let a = Value::from(doc! { x: 1 });
        let b = Value::from(doc! { y: "z" });
        assert!(aeq_helper(&a, &b));
        assert_eq!(loose_cmp(&Value::from("abc"), &a), Ordering::Less);
    }

    #[test]
    fn test_sort_helper_desc() {
        assert_eq!(
            sort_helper(&Value::from(1), &Value::from(2), true),
            Ordering::Greater
        );
    }
}
