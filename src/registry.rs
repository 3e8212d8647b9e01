//! Shared per-key state registry used by every strategy.
//!
//! Wraps a sharded concurrent map ([`DashMap`]) and encodes the one
//! admission pattern all five algorithms share: a shared-lock peek to
//! classify the entry, then an exclusive-lock pass that re-validates
//! before mutating or seeding. Re-validation is required because the
//! entry can expire or be reaped between the two steps; without it two
//! racing callers could double-initialize a key or mutate a window that
//! has already rolled over.

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;

use crate::strategy::Decision;

/// A registry mapping sanitized client keys to per-strategy entries.
///
/// Owned by exactly one strategy instance; entries are never shared
/// across strategies. Calls for different keys proceed in parallel on
/// independent shards, while two concurrent calls for the same key are
/// serialized by that key's shard lock.
#[derive(Debug)]
pub(crate) struct KeyedRegistry<E> {
    entries: DashMap<String, E>,
}

impl<E> KeyedRegistry<E> {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of keys currently tracked.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Runs one admission for `key`.
    ///
    /// `expired` classifies an entry as stale-on-access; stale and
    /// absent entries are replaced via `seed`, which produces the
    /// "first unit already consumed" state, and the call is admitted
    /// with zero wait. Live entries are handed to `mutate` under the
    /// exclusive shard lock to produce the decision.
    pub(crate) fn admit(
        &self,
        key: &str,
        expired: impl Fn(&E) -> bool,
        seed: impl Fn() -> E,
        mutate: impl Fn(&mut E) -> Decision,
    ) -> Decision {
        // Shared-lock peek: the common case is a live entry, and the
        // read guard keeps other readers of the shard unblocked.
        let live = self.entries.get(key).is_some_and(|e| !expired(&e));

        if live {
            if let Some(mut entry) = self.entries.get_mut(key) {
                if expired(&entry) {
                    *entry = seed();
                    return Decision::admit();
                }
                return mutate(&mut entry);
            }
            // Reaped between the peek and the upgrade; fall through.
        }

        match self.entries.entry(key.to_owned()) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if expired(entry) {
                    *entry = seed();
                    Decision::admit()
                } else {
                    mutate(entry)
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(seed());
                Decision::admit()
            }
        }
    }

    /// Applies `update` to the entry for `key`, seeding one first if
    /// absent. Used by side channels (adaptive feedback) that adjust
    /// state without admitting a request.
    pub(crate) fn update(&self, key: &str, seed: impl Fn() -> E, update: impl Fn(&mut E)) {
        let mut entry = self.entries.entry(key.to_owned()).or_insert_with(seed);
        update(&mut entry);
    }

    /// Reads the entry for `key` through `read`, if present.
    pub(crate) fn peek<T>(&self, key: &str, read: impl FnOnce(&E) -> T) -> Option<T> {
        self.entries.get(key).map(|e| read(&e))
    }

    /// One cleanup pass: collect stale candidates under shared locks,
    /// then re-validate and delete each under the exclusive lock.
    /// Entries touched between the passes survive. Returns the number
    /// of entries removed.
    pub(crate) fn sweep(&self, stale: impl Fn(&E) -> bool) -> usize {
        let candidates: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| stale(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        candidates
            .into_iter()
            .filter(|key| self.entries.remove_if(key, |_, e| stale(e)).is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Counter {
        count: u32,
        dead: bool,
    }

    fn registry() -> KeyedRegistry<Counter> {
        KeyedRegistry::new()
    }

    fn admit_counting(reg: &KeyedRegistry<Counter>, key: &str, limit: u32) -> Decision {
        reg.admit(
            key,
            |e| e.dead,
            || Counter {
                count: 1,
                dead: false,
            },
            |e| {
                if e.count < limit {
                    e.count += 1;
                    Decision::admit()
                } else {
                    Decision::reject(std::time::Duration::from_secs(1))
                }
            },
        )
    }

    #[test]
    fn first_admission_seeds_and_allows() {
        let reg = registry();
        assert!(admit_counting(&reg, "a", 3).allowed);
        assert_eq!(reg.peek("a", |e| e.count), Some(1));
    }

    #[test]
    fn mutation_path_enforces_limit() {
        let reg = registry();
        for _ in 0..3 {
            assert!(admit_counting(&reg, "a", 3).allowed);
        }
        assert!(!admit_counting(&reg, "a", 3).allowed);
    }

    #[test]
    fn expired_entry_is_reseeded() {
        let reg = registry();
        for _ in 0..3 {
            admit_counting(&reg, "a", 3);
        }
        reg.update(
            "a",
            || Counter {
                count: 1,
                dead: false,
            },
            |e| e.dead = true,
        );
        assert!(admit_counting(&reg, "a", 3).allowed);
        assert_eq!(reg.peek("a", |e| e.count), Some(1));
    }

    #[test]
    fn sweep_removes_only_stale_entries() {
        let reg = registry();
        admit_counting(&reg, "live", 3);
        admit_counting(&reg, "stale", 3);
        reg.update(
            "stale",
            || Counter {
                count: 1,
                dead: false,
            },
            |e| e.dead = true,
        );

        let removed = reg.sweep(|e| e.dead);
        assert_eq!(removed, 1);
        assert_eq!(reg.len(), 1);
        assert!(reg.peek("live", |_| ()).is_some());
    }

    #[test]
    fn keys_are_independent() {
        let reg = registry();
        for _ in 0..3 {
            assert!(admit_counting(&reg, "a", 3).allowed);
        }
        assert!(!admit_counting(&reg, "a", 3).allowed);
        assert!(admit_counting(&reg, "b", 3).allowed);
    }

    #[test]
    fn concurrent_same_key_never_over_admits() {
        use std::sync::Arc;

        let reg = Arc::new(registry());
        let limit = 50u32;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let reg = Arc::clone(&reg);
            handles.push(std::thread::spawn(move || {
                (0..25)
                    .filter(|_| admit_counting(&reg, "hot", limit).allowed)
                    .count()
            }));
        }

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, limit as usize);
    }
}
