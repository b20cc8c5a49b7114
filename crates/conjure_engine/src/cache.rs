//! Generation-checked build caches.
//!
//! [`BuildCache`] memoizes the result of an expensive build per key. Each
//! key owns a slot guarded by its own [`Mutex`], so concurrent requests for
//! the same key wait for one build instead of racing. Failed builds are not
//! stored.
//!
//! [`clear`](BuildCache::clear) empties the cache and bumps its generation.
//! A build that started before a clear finishes normally but its result is
//! not stored, so a registration racing a build never leaves a stale entry.

use core::hash::Hash;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;

struct Slot<V> {
    generation: u64,
    value: Option<V>,
}

/// A keyed cache of built values.
pub struct BuildCache<K, V> {
    label: &'static str,
    enabled: bool,
    generation: AtomicU64,
    slots: Mutex<HashMap<K, Arc<Mutex<Slot<V>>>>>,
}

impl<K, V> BuildCache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Creates an empty cache. `label` names the cache in trace events.
    ///
    /// A disabled cache runs every build and stores nothing.
    #[must_use]
    pub fn new(label: &'static str, enabled: bool) -> Self {
        Self {
            label,
            enabled,
            generation: AtomicU64::new(0),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value for `key`, building it on a miss.
    ///
    /// # Errors
    ///
    /// Returns the error of `build`; nothing is cached in that case.
    pub fn get_or_build<E>(&self, key: K, build: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        if !self.enabled {
            return build();
        }

        let generation = self.generation.load(Ordering::Acquire);
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key).or_insert_with(|| {
                Arc::new(Mutex::new(Slot {
                    generation,
                    value: None,
                }))
            }))
        };

        let mut slot = slot.lock();
        if slot.generation == generation
            && let Some(value) = &slot.value
        {
            tracing::trace!(cache = self.label, generation, "cache hit");
            return Ok(value.clone());
        }

        tracing::trace!(cache = self.label, generation, "cache miss");
        let value = build()?;
        if self.generation.load(Ordering::Acquire) == generation {
            slot.generation = generation;
            slot.value = Some(value.clone());
        } else {
            tracing::trace!(cache = self.label, generation, "discarding stale build");
        }
        Ok(value)
    }

    /// Drops every entry and invalidates builds in flight.
    pub fn clear(&self) {
        let mut slots = self.slots.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        slots.clear();
    }

    /// Returns the number of stored values. Slots with a build in flight
    /// are not counted.
    #[must_use]
    pub fn len(&self) -> usize {
        let slots: Vec<_> = self.slots.lock().values().cloned().collect();
        slots
            .iter()
            .filter(|slot| slot.try_lock().is_some_and(|slot| slot.value.is_some()))
            .count()
    }

    /// Returns `true` if no values are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the cache stores values.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
