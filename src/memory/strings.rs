//! Interning pool for strings handed to the instrumenter.
//!
//! Strings the instrumenter wants to embed in probe calls (method names, diagnostics)
//! are interned here and referenced by a dense index, which is what travels through the
//! probes and over the wire. Compilation callbacks can arrive on any host thread, so the
//! pool is safe to share.

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;

/// Concurrent string interning pool with dense, monotonically increasing indices.
#[derive(Debug, Default)]
pub struct StringPool {
    strings: DashMap<u32, String>,
    next: AtomicU32,
}

impl StringPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `s` into the pool and returns its index.
    ///
    /// Every call allocates a new index, even for a string seen before.
    pub fn allocate(&self, s: impl Into<String>) -> u32 {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        self.strings.insert(index, s.into());
        index
    }

    /// The string stored at `index`.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<String> {
        self.strings.get(&index).map(|entry| entry.value().clone())
    }

    /// Number of strings in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns `true` if nothing has been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn indices_are_dense() {
        let pool = StringPool::new();
        assert_eq!(pool.allocate("Main"), 0);
        assert_eq!(pool.allocate("Main"), 1);
        assert_eq!(pool.get(0).as_deref(), Some("Main"));
        assert_eq!(pool.get(2), None);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn concurrent_allocation() {
        let pool = Arc::new(StringPool::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for i in 0..100 {
                        pool.allocate(format!("{t}:{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.len(), 400);
        for index in 0..400 {
            assert!(pool.get(index).is_some());
        }
    }
}
