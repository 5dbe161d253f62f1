use crate::common::Value;
use crate::errors::LokiResult;
use crate::query::{Operator, Pattern, Query};

/// Starts a fluent predicate on `field_name`.
///
/// ```text
/// let adults = collection.find(field("age").gte(18).and(field("active").eq(true)))?;
/// ```
pub fn field(field_name: &str) -> FluentQuery {
    FluentQuery {
        field_name: field_name.to_string(),
    }
}

/// Matches every document.
pub fn all() -> Query {
    Query::All
}

pub fn and(queries: Vec<Query>) -> Query {
    Query::And(queries)
}

pub fn or(queries: Vec<Query>) -> Query {
    Query::Or(queries)
}

/// Builder for a single field clause.
pub struct FluentQuery {
    field_name: String,
}

impl FluentQuery {
    #[inline]
    fn with(self, op: Operator) -> Query {
        Query::Field {
            path: self.field_name,
            op,
        }
    }

    pub fn eq<T: Into<Value>>(self, value: T) -> Query {
        self.with(Operator::Eq(value.into()))
    }

    pub fn aeq<T: Into<Value>>(self, value: T) -> Query {
        self.with(Operator::Aeq(value.into()))
    }

    pub fn ne<T: Into<Value>>(self, value: T) -> Query {
        self.with(Operator::Ne(value.into()))
    }

    pub fn dteq<T: Into<Value>>(self, value: T) -> Query {
        self.with(Operator::Dteq(value.into()))
    }

    pub fn gt<T: Into<Value>>(self, value: T) -> Query {
        self.with(Operator::Gt(value.into()))
    }

    pub fn gte<T: Into<Value>>(self, value: T) -> Query {
        self.with(Operator::Gte(value.into()))
    }

    pub fn lt<T: Into<Value>>(self, value: T) -> Query {
        self.with(Operator::Lt(value.into()))
    }

    pub fn lte<T: Into<Value>>(self, value: T) -> Query {
        self.with(Operator::Lte(value.into()))
    }

    /// Inclusive on both ends.
    pub fn between<T: Into<Value>>(self, low: T, high: T) -> Query {
        self.with(Operator::Between(low.into(), high.into()))
    }

    pub fn in_array<T: Into<Value>>(self, values: Vec<T>) -> Query {
        self.with(Operator::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn not_in_array<T: Into<Value>>(self, values: Vec<T>) -> Query {
        self.with(Operator::Nin(values.into_iter().map(Into::into).collect()))
    }

    /// Fails when `pattern` does not compile.
    pub fn regex(self, pattern: &str, flags: &str) -> LokiResult<Query> {
        Ok(self.with(Operator::Regex(Pattern::new(pattern, flags)?)))
    }

    pub fn contains_string(self, needle: &str) -> Query {
        self.with(Operator::ContainsString(needle.to_string()))
    }

    pub fn contains<T: Into<Value>>(self, items: Vec<T>) -> Query {
        self.with(Operator::Contains(items.into_iter().map(Into::into).collect()))
    }

    pub fn contains_any<T: Into<Value>>(self, items: Vec<T>) -> Query {
        self.with(Operator::ContainsAny(items.into_iter().map(Into::into).collect()))
    }

    pub fn contains_none<T: Into<Value>>(self, items: Vec<T>) -> Query {
        self.with(Operator::ContainsNone(items.into_iter().map(Into::into).collect()))
    }

    /// Array length equals `size`.
    pub fn size(self, size: usize) -> Query {
        self.with(Operator::Size(Box::new(Operator::Eq(Value::from(size)))))
    }

    pub fn exists(self, exists: bool) -> Query {
        self.with(Operator::Exists(exists))
    }

    pub fn type_of(self, type_name: &str) -> Query {
        self.with(Operator::Type(Box::new(Operator::Eq(Value::from(type_name)))))
    }

    pub fn finite(self, finite: bool) -> Query {
        self.with(Operator::Finite(finite))
    }

    pub fn elem_match(self, query: Query) -> Query {
        self.with(Operator::ElemMatch(Box::new(query)))
    }

    /// Any operator, including nested ones built by hand.
    pub fn op(self, op: Operator) -> Query {
        self.with(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_fluent_matches_like_dsl() {
        let doc = doc! { age: 30, tags: ["a", "b"], name: "Alice" };
        assert!(field("age").between(18, 65).matches(&doc));
        assert!(field("age").gte(18).and(field("name").eq("Alice")).matches(&doc));
        assert!(!field("age").lt(18).matches(&doc));
        assert!(field("tags").size(2).matches(&doc));
        assert!(field("name").regex("^al", "i").unwrap().matches(&doc));
        assert!(or(vec![field("age").eq(1), field("age").eq(30)]).matches(&doc));
        assert!(all().matches(&doc));
    }

    #[test]
    fn test_fluent_query_serializes() {
        let query = field("age").in_array(vec![1, 2]);
        let doc = query.to_document();
        assert!(doc.get_field("age").is_some());
    }
}
