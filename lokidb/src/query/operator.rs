use crate::collection::Document;
use crate::common::Value;
use crate::errors::{ErrorKind, LokiError, LokiResult};
use crate::index::RangeBound;
use crate::query::Query;
use regex::{Regex, RegexBuilder};
use std::fmt::{Debug, Formatter};

/// A compiled `$regex` operand, keeping its source so it can be serialized.
#[derive(Clone)]
pub struct Pattern {
    regex: Regex,
    source: String,
    flags: String,
}

impl Pattern {
    /// Compiles `source` with JavaScript style flags (`i`, `m`, `s`, `x`;
    /// `g` and `u` are accepted and ignored).
    pub fn new(source: &str, flags: &str) -> LokiResult<Self> {
        let mut builder = RegexBuilder::new(source);
        for flag in flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                'g' | 'u' => &mut builder,
                other => {
                    log::error!("Unsupported regex flag '{}'", other);
                    return Err(LokiError::new(
                        &format!("Unsupported regex flag '{}'", other),
                        ErrorKind::InvalidQuery,
                    ));
                }
            };
        }

        Ok(Pattern {
            regex: builder.build()?,
            source: source.to_string(),
            flags: flags.to_string(),
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn flags(&self) -> &str {
        &self.flags
    }
}

impl Debug for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

/// A predicate applied to the value found at a field path.
///
/// Comparisons marked "loose" use the same total order as binary indices;
/// the others use strict [Value] equality.
#[derive(Debug, Clone)]
pub enum Operator {
    /// Strict equality.
    Eq(Value),
    /// Loose equality (`"5"` equals `5`).
    Aeq(Value),
    /// Strict inequality. Matches missing fields.
    Ne(Value),
    /// Date equality by instant; loose.
    Dteq(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    /// Inclusive loose range. Never matches `null` or missing fields.
    Between(Value, Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    /// The value is a key of the given document.
    KeyIn(Document),
    NKeyIn(Document),
    Regex(Pattern),
    ContainsString(String),
    /// Array holds every item, string holds every substring, or document
    /// holds every key.
    Contains(Vec<Value>),
    ContainsAny(Vec<Value>),
    ContainsNone(Vec<Value>),
    /// Applies the inner operator to an array's length.
    Size(Box<Operator>),
    /// Applies the inner operator to a string's length in characters.
    Len(Box<Operator>),
    /// Applies the inner operator to the value's type name.
    Type(Box<Operator>),
    Finite(bool),
    Exists(bool),
    /// Some element of the array is a document matching the query.
    ElemMatch(Box<Query>),
    Not(Box<Operator>),
    And(Vec<Operator>),
    Or(Vec<Operator>),
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq(_) => "$eq",
            Operator::Aeq(_) => "$aeq",
            Operator::Ne(_) => "$ne",
            Operator::Dteq(_) => "$dteq",
            Operator::Gt(_) => "$gt",
            Operator::Gte(_) => "$gte",
            Operator::Lt(_) => "$lt",
            Operator::Lte(_) => "$lte",
            Operator::Between(_, _) => "$between",
            Operator::In(_) => "$in",
            Operator::Nin(_) => "$nin",
            Operator::KeyIn(_) => "$keyin",
            Operator::NKeyIn(_) => "$nkeyin",
            Operator::Regex(_) => "$regex",
            Operator::ContainsString(_) => "$containsString",
            Operator::Contains(_) => "$contains",
            Operator::ContainsAny(_) => "$containsAny",
            Operator::ContainsNone(_) => "$containsNone",
            Operator::Size(_) => "$size",
            Operator::Len(_) => "$len",
            Operator::Type(_) => "$type",
            Operator::Finite(_) => "$finite",
            Operator::Exists(_) => "$exists",
            Operator::ElemMatch(_) => "$elemMatch",
            Operator::Not(_) => "$not",
            Operator::And(_) => "$and",
            Operator::Or(_) => "$or",
        }
    }

    /// Index ranges whose union covers every value this operator can match,
    /// or `None` if a binary index cannot answer it.
    pub fn index_bounds(&self) -> Option<Vec<RangeBound<'_>>> {
        let bounds = match self {
            Operator::Eq(v) | Operator::Aeq(v) | Operator::Dteq(v) => vec![RangeBound::Eq(v)],
            Operator::Gt(v) => vec![RangeBound::Gt(v)],
            Operator::Gte(v) => vec![RangeBound::Gte(v)],
            Operator::Lt(v) => vec![RangeBound::Lt(v)],
            Operator::Lte(v) => vec![RangeBound::Lte(v)],
            Operator::Between(lo, hi) => vec![RangeBound::Between(lo, hi)],
            Operator::In(values) => values.iter().map(RangeBound::Eq).collect(),
            _ => return None,
        };
        Some(bounds)
    }

    /// The operand as it appears in the query language.
    pub fn operand(&self) -> Value {
        match self {
            Operator::Eq(v)
            | Operator::Aeq(v)
            | Operator::Ne(v)
            | Operator::Dteq(v)
            | Operator::Gt(v)
            | Operator::Gte(v)
            | Operator::Lt(v)
            | Operator::Lte(v) => v.clone(),
            Operator::Between(lo, hi) => Value::Array(vec![lo.clone(), hi.clone()]),
            Operator::In(values)
            | Operator::Nin(values)
            | Operator::Contains(values)
            | Operator::ContainsAny(values)
            | Operator::ContainsNone(values) => Value::Array(values.clone()),
            Operator::KeyIn(doc) | Operator::NKeyIn(doc) => Value::Document(doc.clone()),
            Operator::Regex(pattern) => Value::Array(vec![
                Value::from(pattern.source()),
                Value::from(pattern.flags()),
            ]),
            Operator::ContainsString(s) => Value::from(s.as_str()),
            Operator::Size(inner) | Operator::Len(inner) | Operator::Type(inner) | Operator::Not(inner) => {
                Value::Document(inner.to_document())
            }
            Operator::Finite(b) | Operator::Exists(b) => Value::Bool(*b),
            Operator::ElemMatch(query) => Value::Document(query.to_document()),
            Operator::And(ops) | Operator::Or(ops) => {
                Value::Array(ops.iter().map(|op| Value::Document(op.to_document())).collect())
            }
        }
    }

    /// `{"$op": operand}`
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(self.name().to_string(), self.operand());
        doc
    }

    /// Parses a single `$op: operand` pair.
    pub fn parse(name: &str, operand: &Value) -> LokiResult<Operator> {
        let op = match name {
            "$eq" => Operator::Eq(operand.clone()),
            "$aeq" => Operator::Aeq(operand.clone()),
            "$ne" => Operator::Ne(operand.clone()),
            "$dteq" => Operator::Dteq(operand.clone()),
            "$gt" => Operator::Gt(operand.clone()),
            "$gte" => Operator::Gte(operand.clone()),
            "$lt" => Operator::Lt(operand.clone()),
            "$lte" => Operator::Lte(operand.clone()),
            "$between" => match operand.as_array().map(Vec::as_slice) {
                Some([lo, hi]) => Operator::Between(lo.clone(), hi.clone()),
                _ => return Err(invalid_operand(name, "a two element array")),
            },
            "$in" => Operator::In(require_array(name, operand)?),
            "$nin" => Operator::Nin(require_array(name, operand)?),
            "$keyin" => Operator::KeyIn(require_document(name, operand)?),
            "$nkeyin" => Operator::NKeyIn(require_document(name, operand)?),
            "$regex" => Operator::Regex(parse_pattern(operand)?),
            "$containsString" => match operand.as_str() {
                Some(s) => Operator::ContainsString(s.to_string()),
                None => return Err(invalid_operand(name, "a string")),
            },
            "$contains" => Operator::Contains(as_items(operand)),
            "$containsAny" => Operator::ContainsAny(as_items(operand)),
            "$containsNone" => Operator::ContainsNone(as_items(operand)),
            "$size" => Operator::Size(Box::new(Operator::parse_nested(operand)?)),
            "$len" => Operator::Len(Box::new(Operator::parse_nested(operand)?)),
            "$type" => Operator::Type(Box::new(Operator::parse_nested(operand)?)),
            "$finite" => Operator::Finite(require_bool(name, operand)?),
            "$exists" => Operator::Exists(require_bool(name, operand)?),
            "$elemMatch" => Operator::ElemMatch(Box::new(Query::parse(&require_document(name, operand)?)?)),
            "$not" => Operator::Not(Box::new(Operator::parse_nested(operand)?)),
            "$and" | "$or" => {
                let ops = require_array(name, operand)?
                    .iter()
                    .map(Operator::parse_nested)
                    .collect::<LokiResult<Vec<_>>>()?;
                if name == "$and" {
                    Operator::And(ops)
                } else {
                    Operator::Or(ops)
                }
            }
            _ => {
                log::error!("Unknown query operator {}", name);
                return Err(LokiError::new(
                    &format!("Unknown query operator {}", name),
                    ErrorKind::InvalidOperator,
                ));
            }
        };
        Ok(op)
    }

    /// An operator document (`{$gt: 1, $lt: 5}`) or a bare value, which
    /// means strict equality.
    pub fn parse_nested(operand: &Value) -> LokiResult<Operator> {
        match operand {
            Value::Document(doc) if is_operator_document(doc)? => {
                let mut ops = doc
                    .iter()
                    .map(|(name, value)| Operator::parse(name, value))
                    .collect::<LokiResult<Vec<_>>>()?;
                if ops.len() == 1 {
                    Ok(ops.remove(0))
                } else {
                    Ok(Operator::And(ops))
                }
            }
            other => Ok(Operator::Eq(other.clone())),
        }
    }
}

/// True when every key is an operator, false when none is. Mixing the two
/// is rejected.
pub(crate) fn is_operator_document(doc: &Document) -> LokiResult<bool> {
    let operators = doc.iter().filter(|(key, _)| key.starts_with('$')).count();
    if operators == 0 {
        return Ok(false);
    }
    if operators != doc.size() {
        log::error!("Query mixes operators and plain fields: {}", doc);
        return Err(LokiError::new(
            &format!("Query mixes operators and plain fields: {}", doc),
            ErrorKind::InvalidQuery,
        ));
    }
    Ok(true)
}

fn invalid_operand(name: &str, expected: &str) -> LokiError {
    log::error!("Operator {} expects {}", name, expected);
    LokiError::new(
        &format!("Operator {} expects {}", name, expected),
        ErrorKind::InvalidQuery,
    )
}

fn require_array(name: &str, operand: &Value) -> LokiResult<Vec<Value>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| invalid_operand(name, "an array"))
}

fn require_document(name: &str, operand: &Value) -> LokiResult<Document> {
    operand
        .as_document()
        .cloned()
        .ok_or_else(|| invalid_operand(name, "a document"))
}

fn require_bool(name: &str, operand: &Value) -> LokiResult<bool> {
    operand.as_bool().ok_or_else(|| invalid_operand(name, "a boolean"))
}

fn as_items(operand: &Value) -> Vec<Value> {
    match operand {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn parse_pattern(operand: &Value) -> LokiResult<Pattern> {
    match operand {
        Value::String(source) => Pattern::new(source, ""),
        Value::Array(parts) => match parts.as_slice() {
            [Value::String(source)] => Pattern::new(source, ""),
            [Value::String(source), Value::String(flags)] => Pattern::new(source, flags),
            _ => Err(invalid_operand("$regex", "a pattern or a [pattern, flags] pair")),
        },
        _ => Err(invalid_operand("$regex", "a pattern or a [pattern, flags] pair")),
    }
}
