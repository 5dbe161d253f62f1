use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub type Atomic<T> = Arc<RwLock<T>>;

#[inline]
pub fn atomic<T>(t: T) -> Atomic<T> {
    Arc::new(RwLock::new(t))
}

pub trait ReadExecutor<T: ?Sized> {
    fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R;
}

impl<T> ReadExecutor<T> for Atomic<T> {
    #[inline]
    fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let read_guard = self.read();
        f(&*read_guard)
    }
}

pub trait WriteExecutor<T: ?Sized> {
    fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

impl<T> WriteExecutor<T> for Atomic<T> {
    #[inline]
    fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut write_guard = self.write();
        f(&mut *write_guard)
    }
}

/// Milliseconds since the unix epoch, or zero if the clock is before it.
pub fn current_time_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Position renumbering for a batch removal.
///
/// Removing the slots in `removed` from an array of length `len` shifts every
/// surviving position down by the number of removed slots below it. The map
/// is computed once and shared by the data array, every binary index and
/// every dynamic view so all of them move to the same position space in a
/// single pass.
pub(crate) struct RemovalMap {
    removed: Vec<bool>,
    shift: Vec<usize>,
}

impl RemovalMap {
    /// `positions` may be unsorted and may contain duplicates; out of range
    /// entries are ignored.
    pub(crate) fn new(len: usize, positions: &[usize]) -> Self {
        let mut removed = vec![false; len];
        for &p in positions {
            if p < len {
                removed[p] = true;
            }
        }

        let mut shift = Vec::with_capacity(len);
        let mut count = 0;
        for flag in &removed {
            shift.push(count);
            if *flag {
                count += 1;
            }
        }
        RemovalMap { removed, shift }
    }

    #[inline]
    pub(crate) fn is_removed(&self, position: usize) -> bool {
        self.removed.get(position).copied().unwrap_or(false)
    }

    /// New position of a surviving slot, `None` if it was removed.
    #[inline]
    pub(crate) fn remap(&self, position: usize) -> Option<usize> {
        if self.is_removed(position) {
            None
        } else {
            self.shift.get(position).map(|s| position - s)
        }
    }

    pub(crate) fn removed_count(&self) -> usize {
        self.removed.iter().filter(|r| **r).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_time_positive() {
        assert!(current_time_millis() > 0);
    }

    #[test]
    fn test_atomic_read_write() {
        let value = atomic(1);
        value.write_with(|v| *v += 1);
        assert_eq!(value.read_with(|v| *v), 2);
    }

    #[test]
    fn test_removal_map_shifts_survivors() {
        let map = RemovalMap::new(6, &[4, 1, 1]);
        assert_eq!(map.removed_count(), 2);
        assert_eq!(map.remap(0), Some(0));
        assert_eq!(map.remap(1), None);
        assert_eq!(map.remap(2), Some(1));
        assert_eq!(map.remap(3), Some(2));
        assert_eq!(map.remap(4), None);
        assert_eq!(map.remap(5), Some(3));
    }

    #[test]
    fn test_removal_map_ignores_out_of_range() {
        let map = RemovalMap::new(2, &[7]);
        assert_eq!(map.removed_count(), 0);
        assert_eq!(map.remap(1), Some(1));
    }
}
