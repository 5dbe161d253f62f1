use serde::{Deserialize, Serialize};

/// Per-collection configuration.
///
/// ```text
/// let options = CollectionOptions::new()
///     .unique("name")
///     .index("owner")
///     .adaptive_binary_indices(false);
/// let weapons = db.add_collection("weapons", options)?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionOptions {
    unique: Vec<String>,
    indices: Vec<String>,
    adaptive_binary_indices: bool,
    disable_meta: bool,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        CollectionOptions {
            unique: Vec::new(),
            indices: Vec::new(),
            adaptive_binary_indices: true,
            disable_meta: false,
        }
    }
}

impl CollectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unique index on `field`.
    pub fn unique(mut self, field: &str) -> Self {
        if !self.unique.iter().any(|f| f == field) {
            self.unique.push(field.to_string());
        }
        self
    }

    /// Adds a binary index on `field`.
    pub fn index(mut self, field: &str) -> Self {
        if !self.indices.iter().any(|f| f == field) {
            self.indices.push(field.to_string());
        }
        self
    }

    /// When enabled (the default) binary indices are patched on every write.
    /// When disabled every write marks them dirty. Reads never rebuild a
    /// dirty index: queries scan until the caller rebuilds it with
    /// `ensure_index` or `ensure_all_indexes`.
    pub fn adaptive_binary_indices(mut self, adaptive: bool) -> Self {
        self.adaptive_binary_indices = adaptive;
        self
    }

    /// Skips the `meta` bookkeeping field on inserted documents.
    pub fn disable_meta(mut self, disable: bool) -> Self {
        self.disable_meta = disable;
        self
    }

    pub fn unique_fields(&self) -> &[String] {
        &self.unique
    }

    pub fn indexed_fields(&self) -> &[String] {
        &self.indices
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive_binary_indices
    }

    pub fn is_meta_disabled(&self) -> bool {
        self.disable_meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CollectionOptions::new();
        assert!(options.is_adaptive());
        assert!(!options.is_meta_disabled());
        assert!(options.unique_fields().is_empty());
    }

    #[test]
    fn test_builder_dedups_fields() {
        let options = CollectionOptions::new().index("a").index("a").unique("b");
        assert_eq!(options.indexed_fields(), &["a".to_string()]);
        assert_eq!(options.unique_fields(), &["b".to_string()]);
    }
}
