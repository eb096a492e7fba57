use rustc_hash::FxHashMap;

/// A bounded key-value store with approximate LRU eviction.
///
/// Items are inserted into the `current` generation. Once `max_entries` insertions happened,
/// `current` becomes `previous`, and whatever was in `previous` before is dropped. Items that are
/// read from `previous` are promoted back into `current`, so frequently accessed items survive
/// rotations, while items that are not accessed for two rotations are evicted.
///
/// This needs no per-item recency tracking, and all operations are O(1) amortized.
#[derive(Debug)]
pub(crate) struct Generations<T> {
    max_entries: usize,
    /// Insertions into `current` since the last rotation.
    inserted: usize,
    rotations: u64,
    current: FxHashMap<String, T>,
    previous: FxHashMap<String, T>,
}

impl<T: Clone> Generations<T> {
    /// Creates an empty store. A `max_entries` of `0` disables storage.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            inserted: 0,
            rotations: 0,
            current: Default::default(),
            previous: Default::default(),
        }
    }

    /// Inserts `value` into the current generation, rotating if that fills it up.
    pub fn insert(&mut self, key: &str, value: T) {
        if self.max_entries == 0 {
            return;
        }

        self.current.insert(key.to_owned(), value);
        self.inserted += 1;
        if self.inserted >= self.max_entries {
            self.rotate();
        }
    }

    /// Looks up `key`, promoting it into the current generation if it is only found in the
    /// previous one.
    pub fn get(&mut self, key: &str) -> Option<T> {
        if let Some(value) = self.current.get(key) {
            return Some(value.clone());
        }

        let value = self.previous.get(key)?.clone();
        self.insert(key, value.clone());
        Some(value)
    }

    /// Removes `key` from both generations.
    pub fn remove(&mut self, key: &str) {
        self.current.remove(key);
        self.previous.remove(key);
    }

    /// Removes `key` from both generations, but only where `predicate` matches its value.
    pub fn remove_if(&mut self, key: &str, predicate: impl Fn(&T) -> bool) {
        if self.current.get(key).is_some_and(&predicate) {
            self.current.remove(key);
        }
        if self.previous.get(key).is_some_and(&predicate) {
            self.previous.remove(key);
        }
    }

    /// Drops both generations.
    ///
    /// The insertion counter keeps going, so the next rotation happens on the same schedule.
    pub fn clear(&mut self) {
        self.current = Default::default();
        self.previous = Default::default();
    }

    /// The number of distinct keys that can be looked up.
    pub fn len(&self) -> usize {
        let only_previous = self
            .previous
            .keys()
            .filter(|key| !self.current.contains_key(*key))
            .count();
        self.current.len() + only_previous
    }

    /// The number of rotations that happened so far.
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    fn rotate(&mut self) {
        tracing::trace!(evicted = self.previous.len(), "Rotating cache generations");
        self.inserted = 0;
        self.rotations += 1;
        self.previous = std::mem::take(&mut self.current);
    }
}
