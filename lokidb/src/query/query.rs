use crate::collection::Document;
use crate::common::{Value, FIELD_SEPARATOR};
use crate::errors::{ErrorKind, LokiError, LokiResult};
use crate::query::operator::is_operator_document;
use crate::query::Operator;

/// A parsed query: a tree of field predicates joined by `$and`/`$or`.
///
/// Queries are usually written in the document query language:
///
/// ```text
/// { owner: "odin" }                              // shorthand for $eq
/// { age: { $gte: 18, $lt: 65 } }                 // implicit $and on one field
/// { owner: "odin", maker: "dwarves" }            // implicit $and across fields
/// { $or: [{ owner: "thor" }, { owner: "odin" }] }
/// { "owner.realm": "asgard" }                    // dot notation
/// ```
///
/// or built with [crate::query::field].
#[derive(Debug, Clone, Default)]
pub enum Query {
    /// Matches every document.
    #[default]
    All,
    And(Vec<Query>),
    Or(Vec<Query>),
    Field { path: String, op: Operator },
}

impl Query {
    /// Parses the document query language.
    pub fn parse(doc: &Document) -> LokiResult<Query> {
        let mut clauses = Vec::with_capacity(doc.size());
        for (key, value) in doc.iter() {
            match key.as_str() {
                "$and" => clauses.push(Query::And(parse_clauses(key, value)?)),
                "$or" => clauses.push(Query::Or(parse_clauses(key, value)?)),
                _ if key.starts_with('$') => {
                    log::error!("Unknown top level query operator {}", key);
                    return Err(LokiError::new(
                        &format!("Unknown top level query operator {}", key),
                        ErrorKind::InvalidOperator,
                    ));
                }
                _ => clauses.push(parse_field(key, value)?),
            }
        }

        Ok(match clauses.len() {
            0 => Query::All,
            1 => clauses.remove(0),
            _ => Query::And(clauses),
        })
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Query::All)
    }

    /// Conjunction of this query and `other`.
    pub fn and(self, other: Query) -> Query {
        match (self, other) {
            (Query::All, q) | (q, Query::All) => q,
            (Query::And(mut left), Query::And(right)) => {
                left.extend(right);
                Query::And(left)
            }
            (Query::And(mut left), right) => {
                left.push(right);
                Query::And(left)
            }
            (left, right) => Query::And(vec![left, right]),
        }
    }

    /// Disjunction of this query and `other`.
    pub fn or(self, other: Query) -> Query {
        match (self, other) {
            (Query::Or(mut left), right) => {
                left.push(right);
                Query::Or(left)
            }
            (left, right) => Query::Or(vec![left, right]),
        }
    }

    /// The single field predicate a binary index could answer: a
    /// top level, non-dotted field with an index-friendly operator.
    pub fn index_candidate(&self) -> Option<(&str, &Operator)> {
        match self {
            Query::Field { path, op } if !path.contains(FIELD_SEPARATOR) && op.index_bounds().is_some() => {
                Some((path.as_str(), op))
            }
            _ => None,
        }
    }

    /// Serializes back to the document query language.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        match self {
            Query::All => {}
            Query::And(clauses) => doc.insert("$and".to_string(), clauses_value(clauses)),
            Query::Or(clauses) => doc.insert("$or".to_string(), clauses_value(clauses)),
            Query::Field { path, op } => doc.insert(path.clone(), Value::Document(op.to_document())),
        }
        doc
    }
}

fn clauses_value(clauses: &[Query]) -> Value {
    Value::Array(
        clauses
            .iter()
            .map(|q| Value::Document(q.to_document()))
            .collect(),
    )
}

fn parse_clauses(key: &str, value: &Value) -> LokiResult<Vec<Query>> {
    let Some(items) = value.as_array() else {
        log::error!("{} expects an array of queries", key);
        return Err(LokiError::new(
            &format!("{} expects an array of queries", key),
            ErrorKind::InvalidQuery,
        ));
    };

    items
        .iter()
        .map(|item| match item {
            Value::Document(doc) => Query::parse(doc),
            other => {
                log::error!("{} expects queries, found {}", key, other);
                Err(LokiError::new(
                    &format!("{} expects queries, found {}", key, other),
                    ErrorKind::InvalidQuery,
                ))
            }
        })
        .collect()
}

fn parse_field(path: &str, value: &Value) -> LokiResult<Query> {
    if let Value::Document(ops) = value {
        if is_operator_document(ops)? {
            let mut clauses = ops
                .iter()
                .map(|(name, operand)| {
                    Ok(Query::Field {
                        path: path.to_string(),
                        op: Operator::parse(name, operand)?,
                    })
                })
                .collect::<LokiResult<Vec<_>>>()?;
            return Ok(if clauses.len() == 1 {
                clauses.remove(0)
            } else {
                Query::And(clauses)
            });
        }
    }

    Ok(Query::Field {
        path: path.to_string(),
        op: Operator::Eq(value.clone()),
    })
}

/// Anything a find operation accepts as a query.
pub trait IntoQuery {
    fn into_query(self) -> LokiResult<Query>;
}

impl IntoQuery for Query {
    fn into_query(self) -> LokiResult<Query> {
        Ok(self)
    }
}

impl IntoQuery for &Query {
    fn into_query(self) -> LokiResult<Query> {
        Ok(self.clone())
    }
}

impl IntoQuery for Document {
    fn into_query(self) -> LokiResult<Query> {
        Query::parse(&self)
    }
}

impl IntoQuery for &Document {
    fn into_query(self) -> LokiResult<Query> {
        Query::parse(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_empty_document_is_all() {
        assert!(Query::parse(&doc! {}).unwrap().is_all());
    }

    #[test]
    fn test_shorthand_equality() {
        let query = Query::parse(&doc! { owner: "odin" }).unwrap();
        assert!(matches!(query, Query::Field { ref path, op: Operator::Eq(_) } if path == "owner"));
    }

    #[test]
    fn test_implicit_and_across_fields_and_operators() {
        let query = Query::parse(&doc! { owner: "odin", age: { "$gt": 1, "$lt": 9 } }).unwrap();
        match query {
            Query::And(clauses) => assert_eq!(clauses.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_or_clause() {
        let query = Query::parse(&doc! { "$or": [{ owner: "thor" }, { owner: "odin" }] }).unwrap();
        assert!(matches!(query, Query::Or(ref clauses) if clauses.len() == 2));
    }

    #[test]
    fn test_unknown_top_level_operator() {
        let err = Query::parse(&doc! { "$nor": [] }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperator);
    }

    #[test]
    fn test_plain_document_value_is_equality() {
        let query = Query::parse(&doc! { maker: { name: "Eitri" } }).unwrap();
        assert!(matches!(query, Query::Field { op: Operator::Eq(Value::Document(_)), .. }));
    }

    #[test]
    fn test_index_candidate() {
        let query = Query::parse(&doc! { age: { "$gte": 3 } }).unwrap();
        assert_eq!(query.index_candidate().map(|(f, _)| f), Some("age"));

        let dotted = Query::parse(&doc! { "owner.age": { "$gte": 3 } }).unwrap();
        assert!(dotted.index_candidate().is_none());

        let ne = Query::parse(&doc! { age: { "$ne": 3 } }).unwrap();
        assert!(ne.index_candidate().is_none());
    }

    #[test]
    fn test_to_document_reparses() {
        let original = doc! { "owner.realm": "asgard", "$or": [{ age: { "$lt": 3 } }, { age: { "$in": [7, 8] } }] };
        let query = Query::parse(&original).unwrap();
        let reparsed = Query::parse(&query.to_document()).unwrap();
        assert!(matches!(reparsed, Query::And(ref clauses) if clauses.len() == 2));
    }

    #[test]
    fn test_combinators() {
        let q = Query::All.and(Query::parse(&doc! { a: 1 }).unwrap());
        assert!(matches!(q, Query::Field { .. }));
        let q = q.and(Query::parse(&doc! { b: 2 }).unwrap()).or(Query::All);
        assert!(matches!(q, Query::Or(_)));
    }
}
