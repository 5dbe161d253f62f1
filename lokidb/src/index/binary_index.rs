use crate::collection::Document;
use crate::common::{loose_cmp, RemovalMap, Value, NULL_VALUE};
use crate::errors::{ErrorKind, LokiError, LokiResult};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// Why an index was marked stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyReason {
    /// Declared but never built.
    Created,
    /// Restored from a snapshot, which does not carry index contents.
    Loaded,
    /// A write happened while adaptive maintenance was disabled.
    Write,
    /// An integrity check or an adaptive patch found the index inconsistent.
    Repair,
}

impl Display for DirtyReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DirtyReason::Created => write!(f, "created"),
            DirtyReason::Loaded => write!(f, "loaded"),
            DirtyReason::Write => write!(f, "write"),
            DirtyReason::Repair => write!(f, "repair"),
        }
    }
}

/// An index only leaves `Dirty` through [BinaryIndex::rebuild].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Clean,
    Dirty(DirtyReason),
}

/// Inclusive range of slots in an index's `values` array.
///
/// An empty range is `start > end`; [IndexRange::EMPTY] is the canonical
/// `(0, -1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub start: isize,
    pub end: isize,
}

impl IndexRange {
    pub const EMPTY: IndexRange = IndexRange { start: 0, end: -1 };

    fn new(start: usize, end_exclusive: usize) -> Self {
        if start >= end_exclusive {
            IndexRange::EMPTY
        } else {
            IndexRange {
                start: start as isize,
                end: end_exclusive as isize - 1,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start + 1) as usize
        }
    }
}

/// A range predicate that a binary index can answer.
#[derive(Debug, Clone, Copy)]
pub enum RangeBound<'a> {
    Eq(&'a Value),
    Lt(&'a Value),
    Lte(&'a Value),
    Gt(&'a Value),
    Gte(&'a Value),
    /// Inclusive on both ends.
    Between(&'a Value, &'a Value),
}

/// A per-field index over the positions of a collection's data array.
///
/// Implementations receive the data array on every call; they never own
/// documents.
pub trait IndexStrategy {
    fn field(&self) -> &str;

    /// Rebuilds when dirty, or unconditionally when `force` is set.
    fn ensure(&mut self, data: &[Document], force: bool);

    /// `data[position]` was just appended.
    fn insert(&mut self, position: usize, data: &[Document]);

    /// `data[position]` still holds the old document and is about to be
    /// replaced by `replacement`.
    fn update(&mut self, position: usize, replacement: &Document, data: &[Document]);

    /// `data[position]` is about to be removed.
    fn remove(&mut self, position: usize, data: &[Document]);

    fn range_for(&self, bound: RangeBound, data: &[Document]) -> LokiResult<IndexRange>;
}

/// Sorted array of data positions for one field.
///
/// Entries are kept in `(field value, position)` order under the loose
/// comparator, so a stable rebuild and adaptive maintenance always produce
/// the same array for the same data.
#[derive(Debug, Clone)]
pub struct BinaryIndex {
    field: String,
    values: Vec<usize>,
    state: IndexState,
    adaptive: bool,
}

impl BinaryIndex {
    pub fn new(field: &str, adaptive: bool) -> Self {
        BinaryIndex {
            field: field.to_string(),
            values: Vec::new(),
            state: IndexState::Dirty(DirtyReason::Created),
            adaptive,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn values(&self) -> &[usize] {
        &self.values
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.state, IndexState::Dirty(_))
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    pub(crate) fn set_adaptive(&mut self, adaptive: bool) {
        self.adaptive = adaptive;
    }

    pub fn mark_dirty(&mut self, reason: DirtyReason) {
        if !self.is_dirty() {
            log::debug!("Binary index on '{}' marked dirty ({})", self.field, reason);
        }
        self.state = IndexState::Dirty(reason);
    }

    /// Full rebuild: positions `0..n` stably sorted by field value.
    pub fn rebuild(&mut self, data: &[Document]) {
        let field = self.field.as_str();
        let mut values: Vec<usize> = (0..data.len()).collect();
        values.sort_by(|&a, &b| loose_cmp(data[a].resolve(field), data[b].resolve(field)));

        if let IndexState::Dirty(reason) = self.state {
            log::debug!(
                "Rebuilt binary index on '{}' over {} documents ({})",
                field,
                values.len(),
                reason
            );
        }
        self.values = values;
        self.state = IndexState::Clean;
    }

    #[inline]
    fn key<'a>(&self, data: &'a [Document], position: usize) -> &'a Value {
        data.get(position)
            .map(|doc| doc.resolve(&self.field))
            .unwrap_or(&NULL_VALUE)
    }

    #[inline]
    fn entry_cmp(&self, data: &[Document], entry: usize, key: &Value, position: usize) -> Ordering {
        loose_cmp(self.key(data, entry), key).then(entry.cmp(&position))
    }

    fn lower_bound(&self, value: &Value, data: &[Document]) -> usize {
        self.values
            .partition_point(|&p| loose_cmp(self.key(data, p), value) == Ordering::Less)
    }

    fn upper_bound(&self, value: &Value, data: &[Document]) -> usize {
        self.values
            .partition_point(|&p| loose_cmp(self.key(data, p), value) != Ordering::Greater)
    }

    fn require_clean(&self) -> LokiResult<()> {
        if let IndexState::Dirty(reason) = self.state {
            log::error!("Binary index on '{}' is dirty ({})", self.field, reason);
            return Err(LokiError::new(
                &format!("Binary index on '{}' must be rebuilt before use ({})", self.field, reason),
                ErrorKind::DirtyIndex,
            ));
        }
        Ok(())
    }

    /// First slot whose value is not less than `value`.
    pub fn calculate_range_start(&self, value: &Value, data: &[Document]) -> LokiResult<usize> {
        self.require_clean()?;
        Ok(self.lower_bound(value, data))
    }

    /// Slots whose values satisfy `bound`, or [IndexRange::EMPTY].
    pub fn calculate_range(&self, bound: RangeBound, data: &[Document]) -> LokiResult<IndexRange> {
        self.require_clean()?;
        let n = self.values.len();
        let range = match bound {
            RangeBound::Eq(v) => IndexRange::new(self.lower_bound(v, data), self.upper_bound(v, data)),
            RangeBound::Lt(v) => IndexRange::new(0, self.lower_bound(v, data)),
            RangeBound::Lte(v) => IndexRange::new(0, self.upper_bound(v, data)),
            RangeBound::Gt(v) => IndexRange::new(self.upper_bound(v, data), n),
            RangeBound::Gte(v) => IndexRange::new(self.lower_bound(v, data), n),
            RangeBound::Between(lo, hi) => {
                IndexRange::new(self.lower_bound(lo, data), self.upper_bound(hi, data))
            }
        };
        Ok(range)
    }

    /// Data positions covered by `range`, in index order.
    pub fn positions(&self, range: IndexRange) -> &[usize] {
        if range.is_empty() {
            return &[];
        }
        let start = range.start as usize;
        let end = (range.end as usize + 1).min(self.values.len());
        self.values.get(start..end).unwrap_or(&[])
    }

    /// Slot holding `position`, located by binary search on the value of
    /// `data[position]`.
    pub fn get_binary_index_position(&self, position: usize, data: &[Document]) -> Option<usize> {
        let key = self.key(data, position);
        let slot = self
            .values
            .partition_point(|&p| self.entry_cmp(data, p, key, position) == Ordering::Less);
        if self.values.get(slot) == Some(&position) {
            return Some(slot);
        }

        log::warn!(
            "Binary index on '{}' out of order around position {}, scanning",
            self.field,
            position
        );
        self.values.iter().position(|&p| p == position)
    }

    fn insertion_slot(&self, key: &Value, position: usize, data: &[Document]) -> usize {
        self.values
            .partition_point(|&p| self.entry_cmp(data, p, key, position) == Ordering::Less)
    }

    /// Returns false when the index is not maintained adaptively, after
    /// marking it dirty.
    fn accepts_patch(&mut self) -> bool {
        if self.is_dirty() {
            return false;
        }
        if !self.adaptive {
            self.mark_dirty(DirtyReason::Write);
            return false;
        }
        true
    }

    pub fn adaptive_insert(&mut self, position: usize, data: &[Document]) {
        if !self.accepts_patch() {
            return;
        }
        let slot = self.insertion_slot(self.key(data, position), position, data);
        self.values.insert(slot, position);
        debug_assert!(self.values.len() == data.len());
    }

    pub fn adaptive_update(&mut self, position: usize, replacement: &Document, data: &[Document]) {
        if !self.accepts_patch() {
            return;
        }
        let Some(slot) = self.get_binary_index_position(position, data) else {
            log::warn!("Binary index on '{}' lost position {}", self.field, position);
            self.mark_dirty(DirtyReason::Repair);
            return;
        };
        self.values.remove(slot);

        let slot = self.insertion_slot(replacement.resolve(&self.field), position, data);
        self.values.insert(slot, position);
    }

    pub fn adaptive_remove(&mut self, position: usize, data: &[Document]) {
        if !self.accepts_patch() {
            return;
        }
        let Some(slot) = self.get_binary_index_position(position, data) else {
            log::warn!("Binary index on '{}' lost position {}", self.field, position);
            self.mark_dirty(DirtyReason::Repair);
            return;
        };
        self.values.remove(slot);
        for value in self.values.iter_mut() {
            if *value > position {
                *value -= 1;
            }
        }
    }

    /// Drops every removed position and renumbers the survivors in one pass.
    pub(crate) fn adaptive_batch_remove(&mut self, removals: &RemovalMap) {
        if !self.accepts_patch() {
            return;
        }
        self.values = self.values.iter().filter_map(|&p| removals.remap(p)).collect();
    }

    /// Verifies that `values` is a permutation of `0..n` sorted by field value.
    pub fn check(&self, data: &[Document]) -> bool {
        if self.values.len() != data.len() {
            return false;
        }

        let mut seen = vec![false; data.len()];
        for &p in &self.values {
            match seen.get_mut(p) {
                Some(flag) if !*flag => *flag = true,
                _ => return false,
            }
        }

        self.values
            .windows(2)
            .all(|w| loose_cmp(self.key(data, w[0]), self.key(data, w[1])) != Ordering::Greater)
    }
}

impl IndexStrategy for BinaryIndex {
    fn field(&self) -> &str {
        &self.field
    }

    fn ensure(&mut self, data: &[Document], force: bool) {
        if force || self.is_dirty() {
            self.rebuild(data);
        }
    }

    fn insert(&mut self, position: usize, data: &[Document]) {
        self.adaptive_insert(position, data)
    }

    fn update(&mut self, position: usize, replacement: &Document, data: &[Document]) {
        self.adaptive_update(position, replacement, data)
    }

    fn remove(&mut self, position: usize, data: &[Document]) {
        self.adaptive_remove(position, data)
    }

    fn range_for(&self, bound: RangeBound, data: &[Document]) -> LokiResult<IndexRange> {
        self.calculate_range(bound, data)
    }
}
