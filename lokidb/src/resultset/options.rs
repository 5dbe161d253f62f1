use serde::{Deserialize, Serialize};

/// Options for [crate::resultset::Resultset::simplesort].
///
/// By default a clean binary index on the sort field is used: directly when
/// the resultset is unfiltered, and through an intersection pass over the
/// index when the filtered rows are a large enough share of the collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleSortOptions {
    desc: bool,
    disable_index: bool,
    disable_index_intersect: bool,
    force_index_intersect: bool,
}

impl SimpleSortOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn desc(mut self, desc: bool) -> Self {
        self.desc = desc;
        self
    }

    /// Always sort with the comparator, ignoring any index.
    pub fn disable_index(mut self, disable: bool) -> Self {
        self.disable_index = disable;
        self
    }

    pub fn disable_index_intersect(mut self, disable: bool) -> Self {
        self.disable_index_intersect = disable;
        self
    }

    pub fn force_index_intersect(mut self, force: bool) -> Self {
        self.force_index_intersect = force;
        self
    }

    pub fn is_desc(&self) -> bool {
        self.desc
    }

    pub fn is_index_disabled(&self) -> bool {
        self.disable_index
    }

    pub fn is_index_intersect_disabled(&self) -> bool {
        self.disable_index_intersect
    }

    pub fn is_index_intersect_forced(&self) -> bool {
        self.force_index_intersect
    }
}

impl From<bool> for SimpleSortOptions {
    fn from(desc: bool) -> Self {
        SimpleSortOptions::new().desc(desc)
    }
}

/// One key of a compound sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortCriterion {
    pub field: String,
    pub desc: bool,
}

impl SortCriterion {
    pub fn asc(field: &str) -> Self {
        SortCriterion {
            field: field.to_string(),
            desc: false,
        }
    }

    pub fn desc(field: &str) -> Self {
        SortCriterion {
            field: field.to_string(),
            desc: true,
        }
    }
}

/// Options for materializing documents out of a resultset or view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataOptions {
    /// Strip `$loki` and `meta` from the returned documents.
    pub remove_meta: bool,
}

impl DataOptions {
    pub fn without_meta() -> Self {
        DataOptions { remove_meta: true }
    }
}
