use crate::resultset::{Comparator, Predicate, SimpleSortOptions, SortCriterion};
use crate::query::Query;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};

/// When a dirty view sort is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortPriority {
    /// On the next read.
    #[default]
    Passive,
    /// Right after the write that dirtied it.
    Active,
}

/// Per-view configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DynamicViewOptions {
    persistent: bool,
    sort_priority: SortPriority,
}

impl DynamicViewOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep a materialized copy of the result documents.
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn sort_priority(mut self, priority: SortPriority) -> Self {
        self.sort_priority = priority;
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn priority(&self) -> SortPriority {
        self.sort_priority
    }
}

/// Options for [crate::view::DynamicViewHandle::rematerialize].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RematerializeOptions {
    /// Drop every `where` step before rebuilding.
    pub remove_where_filters: bool,
}

/// One step of a view's filter pipeline.
#[derive(Clone)]
pub enum FilterKind {
    Find(Query),
    Where(Predicate),
}

#[derive(Clone)]
pub struct FilterStep {
    pub(crate) uid: String,
    pub(crate) kind: FilterKind,
}

impl FilterStep {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    pub fn is_where(&self) -> bool {
        matches!(self.kind, FilterKind::Where(_))
    }
}

impl Debug for FilterStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            FilterKind::Find(query) => write!(f, "Find[{}]({})", self.uid, query.to_document()),
            FilterKind::Where(_) => write!(f, "Where[{}](<fn>)", self.uid),
        }
    }
}

/// The sort a view keeps its rows in.
#[derive(Clone)]
pub enum ViewSort {
    Simple {
        field: String,
        options: SimpleSortOptions,
    },
    Compound(Vec<SortCriterion>),
    Comparator(Comparator),
}

impl Debug for ViewSort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewSort::Simple { field, options } => write!(f, "Simple({}, {:?})", field, options),
            ViewSort::Compound(criteria) => write!(f, "Compound({:?})", criteria),
            ViewSort::Comparator(_) => write!(f, "Comparator(<fn>)"),
        }
    }
}
