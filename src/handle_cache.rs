//! Bounded FIFO cache of open random-access file handles (§4.5, §9 Design
//! Notes). Insertion order determines eviction order regardless of how
//! recently a handle was last used — deliberately *not* the access-ordered
//! policy the `lru` crate implements, since the source format's own
//! eviction rule is first-in-first-out.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::SldyError;

/// Default capacity mandated by §4.5 / invariant 6 (`|open_streams| <= 100`).
pub const DEFAULT_CAPACITY: usize = 100;

/// A bounded `path -> File` cache with FIFO eviction on overflow.
#[derive(Debug)]
pub struct HandleCache {
    capacity: usize,
    streams: HashMap<PathBuf, File>,
    insertion_order: VecDeque<PathBuf>,
}

impl HandleCache {
    /// Builds a cache bounded at `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        HandleCache {
            capacity,
            streams: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    /// Returns a mutable reference to the open stream for `path`, opening
    /// it (and evicting the oldest entry if the cache is full) on a miss.
    pub fn get_or_open(&mut self, path: &Path) -> Result<&mut File, SldyError> {
        if !self.streams.contains_key(path) {
            if self.streams.len() >= self.capacity {
                if let Some(oldest) = self.insertion_order.pop_front() {
                    // Dropping the File closes its underlying descriptor.
                    self.streams.remove(&oldest);
                }
            }

            let file = File::open(path)?;
            self.streams.insert(path.to_path_buf(), file);
            self.insertion_order.push_back(path.to_path_buf());
        }

        Ok(self.streams.get_mut(path).expect("just inserted or already present"))
    }

    /// Number of currently open streams.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Closes every open stream, matching §5 "callers abort by closing the
    /// reader, which MUST close every stream in the LRU".
    pub fn close_all(&mut self) {
        self.streams.clear();
        self.insertion_order.clear();
    }
}

impl Default for HandleCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn evicts_oldest_on_overflow() {
        let dir = tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..5 {
            let path = dir.path().join(format!("f{}.bin", i));
            let mut f = File::create(&path).unwrap();
            writeln!(f, "{}", i).unwrap();
            paths.push(path);
        }

        let mut cache = HandleCache::with_capacity(3);
        for path in &paths {
            cache.get_or_open(path).unwrap();
        }

        assert_eq!(cache.len(), 3);
        // first two evicted, last three (2,3,4) remain
        assert!(!cache.streams.contains_key(&paths[0]));
        assert!(!cache.streams.contains_key(&paths[1]));
        assert!(cache.streams.contains_key(&paths[4]));
    }

    #[test]
    fn opening_101_distinct_files_leaves_exactly_100_open() {
        let dir = tempdir().unwrap();
        let mut cache = HandleCache::default();

        let mut paths = Vec::new();
        for i in 0..101 {
            let path = dir.path().join(format!("plane_{}.npy", i));
            File::create(&path).unwrap();
            paths.push(path);
        }

        for path in &paths {
            cache.get_or_open(path).unwrap();
        }

        assert_eq!(cache.len(), 100);
        assert!(!cache.streams.contains_key(&paths[0]));
        assert!(cache.streams.contains_key(&paths[1]));
        assert!(cache.streams.contains_key(&paths[100]));
    }

    #[test]
    fn close_all_empties_the_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        File::create(&path).unwrap();

        let mut cache = HandleCache::with_capacity(10);
        cache.get_or_open(&path).unwrap();
        assert_eq!(cache.len(), 1);

        cache.close_all();
        assert!(cache.is_empty());
    }
}
