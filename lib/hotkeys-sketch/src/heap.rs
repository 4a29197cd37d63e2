use std::fmt;

use fnv::FnvHashMap;

/// A key and its estimated count.
///
/// Entries handed out by [`TopKHeap`] are owned copies, independent of the heap they came from.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TopEntry {
    /// The key.
    pub key: String,

    /// Estimated number of times the key has been seen.
    pub count: u64,
}

impl TopEntry {
    /// Creates a new `TopEntry`.
    pub fn new<K: Into<String>>(key: K, count: u64) -> Self {
        Self { key: key.into(), count }
    }
}

impl fmt::Display for TopEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.count)
    }
}

impl<K: Into<String>> From<(K, u64)> for TopEntry {
    fn from((key, count): (K, u64)) -> Self {
        Self::new(key, count)
    }
}

/// A fixed-capacity min-heap of [`TopEntry`] values, ordered by count.
///
/// The heap holds at most `capacity` entries and at most one entry per key. Once full, a new key is only admitted if
/// its count is at least the count of the current minimum, in which case it replaces that minimum. Repeatedly calling
/// [`pop`][Self::pop] yields entries in ascending order of count.
///
/// Sift operations use strict comparisons, so entries with equal counts are never swapped with each other, and the
/// relative order of ties depends on insertion order.
///
/// # Example
///
/// ```
/// use hotkeys_sketch::{TopEntry, TopKHeap};
///
/// let mut heap = TopKHeap::new(2);
/// heap.push(TopEntry::new("a", 5));
/// heap.push(TopEntry::new("b", 1));
/// heap.push(TopEntry::new("c", 3));
///
/// assert_eq!(heap.pop(), Some(TopEntry::new("c", 3)));
/// assert_eq!(heap.pop(), Some(TopEntry::new("a", 5)));
/// assert_eq!(heap.pop(), None);
/// ```
#[derive(Clone, Debug)]
pub struct TopKHeap {
    entries: Vec<TopEntry>,
    capacity: usize,
}

impl TopKHeap {
    /// Creates a new, empty `TopKHeap` that holds at most `capacity` entries.
    ///
    /// A heap with a capacity of zero never holds anything.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns the maximum number of entries the heap can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of entries currently in the heap.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the heap holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if the heap holds `capacity` entries.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Returns the entry with the smallest count, or `None` if the heap is empty.
    pub fn min(&self) -> Option<&TopEntry> {
        self.entries.first()
    }

    /// Finds the entry for `key`, returning its index in the heap along with the entry itself.
    ///
    /// This is a linear scan.
    pub fn find(&self, key: &str) -> Option<(usize, &TopEntry)> {
        self.entries.iter().enumerate().find(|(_, entry)| entry.key == key)
    }

    /// Returns an iterator over the entries, in heap order rather than sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &TopEntry> {
        self.entries.iter()
    }

    /// Replaces the contents of the heap with the given entries.
    ///
    /// The entries are heapified bottom-up in linear time. Duplicate keys are collapsed into a single entry holding the
    /// largest of their counts, and if more than `capacity` entries remain, only the `capacity` largest are kept.
    pub fn build_from_entries<I, E>(&mut self, entries: I)
    where
        I: IntoIterator<Item = E>,
        E: Into<TopEntry>,
    {
        let mut entries = entries.into_iter().map(Into::into).collect::<Vec<TopEntry>>();

        // Collapse duplicates, keeping the first occurrence of the largest count for each key.
        let mut largest = FnvHashMap::<&str, usize>::default();
        for (index, entry) in entries.iter().enumerate() {
            largest
                .entry(entry.key.as_str())
                .and_modify(|best| {
                    if entry.count > entries[*best].count {
                        *best = index;
                    }
                })
                .or_insert(index);
        }

        if largest.len() < entries.len() {
            let mut keep = vec![false; entries.len()];
            for index in largest.into_values() {
                keep[index] = true;
            }

            let mut keep = keep.into_iter();
            entries.retain(|_| keep.next().unwrap_or(false));
        }

        self.entries = entries;
        let len = self.entries.len();
        for index in (0..len / 2).rev() {
            self.sift_down(index, len);
        }

        while self.entries.len() > self.capacity {
            self.pop();
        }
    }

    /// Pushes an entry onto the heap.
    ///
    /// If the heap already holds an entry for the same key, that entry's count is replaced instead. Otherwise, when the
    /// heap is not full, the entry is added. When the heap is full, the entry replaces the current minimum unless its
    /// count is strictly smaller than the minimum's count, in which case it is discarded.
    ///
    /// Returns `true` if the entry is held by the heap afterwards.
    pub fn push(&mut self, entry: TopEntry) -> bool {
        if let Some((index, _)) = self.find(&entry.key) {
            self.set_count(index, entry.count);
            return true;
        }

        if !self.is_full() {
            self.entries.push(entry);
            self.sift_up(self.entries.len() - 1);
            return true;
        }

        match self.entries.first_mut() {
            Some(root) if entry.count >= root.count => {
                *root = entry;
                self.fix(0);
                true
            }
            _ => false,
        }
    }

    /// Updates the count of the entry at `index` and restores heap order.
    ///
    /// Does nothing if `index` is out of bounds.
    pub fn set_count(&mut self, index: usize, count: u64) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.count = count;
            self.fix(index);
        }
    }

    /// Restores heap order after the count of the entry at `index` has changed.
    ///
    /// The entry is first sifted down, and if it did not move, sifted up, since the count may have either grown or
    /// shrunk.
    pub fn fix(&mut self, index: usize) {
        let len = self.entries.len();
        if index >= len {
            return;
        }

        if !self.sift_down(index, len) {
            self.sift_up(index);
        }
    }

    /// Removes and returns the entry with the smallest count, or `None` if the heap is empty.
    pub fn pop(&mut self) -> Option<TopEntry> {
        let last = self.entries.len().checked_sub(1)?;
        self.entries.swap(0, last);
        self.sift_down(0, last);
        self.entries.pop()
    }

    /// Removes every entry from the heap, returning them in ascending order of count.
    pub fn drain_ascending(&mut self) -> Vec<TopEntry> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some(entry) = self.pop() {
            drained.push(entry);
        }
        drained
    }

    /// Removes every entry from the heap.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Moves the entry at `index` towards the leaves, considering only the first `len` entries.
    ///
    /// Returns `true` if the entry moved.
    fn sift_down(&mut self, index: usize, len: usize) -> bool {
        let mut current = index;
        loop {
            let left = 2 * current + 1;
            if left >= len {
                break;
            }

            let right = left + 1;
            let child = if right < len && self.entries[right].count < self.entries[left].count {
                right
            } else {
                left
            };

            if self.entries[child].count >= self.entries[current].count {
                break;
            }

            self.entries.swap(current, child);
            current = child;
        }

        current > index
    }

    fn sift_up(&mut self, index: usize) {
        let mut current = index;
        while current > 0 {
            let parent = (current - 1) / 2;
            if self.entries[current].count >= self.entries[parent].count {
                break;
            }

            self.entries.swap(current, parent);
            current = parent;
        }
    }
}
