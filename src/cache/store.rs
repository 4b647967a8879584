//! Instruction cache.
//!
//! Compiled instruction streams of included pages, keyed by page id. An entry
//! is only served while the page's modification time matches the one it was
//! stored with, so an edited page is recompiled on its next inclusion.

use std::sync::{Arc, RwLock};

use lru::LruCache;
use metrics::counter;
use time::OffsetDateTime;

use crate::domain::instructions::Instruction;
use crate::domain::page_id::PageId;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_HIT: &str = "wikiweave_instruction_cache_hit_total";
pub(crate) const METRIC_MISS: &str = "wikiweave_instruction_cache_miss_total";
pub(crate) const METRIC_EVICT: &str = "wikiweave_instruction_cache_evict_total";

#[derive(Clone)]
struct CachedInstructions {
    modified: Option<OffsetDateTime>,
    instructions: Arc<Vec<Instruction>>,
}

/// LRU of compiled pages shared across renders.
pub struct InstructionCache {
    entries: RwLock<LruCache<PageId, CachedInstructions>>,
}

impl InstructionCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.instruction_cache_limit_non_zero())),
        }
    }

    /// Cached stream for `page`, if it was stored for the same `modified` time.
    pub fn get(
        &self,
        page: &PageId,
        modified: Option<OffsetDateTime>,
    ) -> Option<Arc<Vec<Instruction>>> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let hit = match entries.get(page) {
            Some(entry) if entry.modified == modified => Some(entry.instructions.clone()),
            Some(_) => {
                entries.pop(page);
                None
            }
            None => None,
        };

        if hit.is_some() {
            counter!(METRIC_HIT).increment(1);
        } else {
            counter!(METRIC_MISS).increment(1);
        }
        hit
    }

    pub fn put(
        &self,
        page: PageId,
        modified: Option<OffsetDateTime>,
        instructions: Vec<Instruction>,
    ) -> Arc<Vec<Instruction>> {
        let instructions = Arc::new(instructions);
        let entry = CachedInstructions {
            modified,
            instructions: instructions.clone(),
        };

        let evicted = rw_write(&self.entries, SOURCE, "put").push(page.clone(), entry);
        // `push` also returns the replaced entry when the key was present
        if evicted.is_some_and(|(evicted_page, _)| evicted_page != page) {
            counter!(METRIC_EVICT).increment(1);
        }
        instructions
    }

    pub fn invalidate(&self, page: &PageId) {
        rw_write(&self.entries, SOURCE, "invalidate").pop(page);
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use time::macros::datetime;

    use super::*;

    fn page(id: &str) -> PageId {
        PageId::new(id)
    }

    #[test]
    fn entries_are_served_for_matching_modification_time() {
        let cache = InstructionCache::new(&CacheConfig::default());
        let modified = Some(datetime!(2024-05-01 10:00 UTC));

        assert!(cache.get(&page("a"), modified).is_none());
        cache.put(page("a"), modified, vec![Instruction::text("hello")]);

        let cached = cache.get(&page("a"), modified).expect("cached stream");
        assert_eq!(cached.len(), 1);
    }

    #[test]
    fn stale_entries_are_dropped() {
        let cache = InstructionCache::new(&CacheConfig::default());
        cache.put(
            page("a"),
            Some(datetime!(2024-05-01 10:00 UTC)),
            vec![Instruction::text("old")],
        );

        assert!(
            cache
                .get(&page("a"), Some(datetime!(2024-05-02 10:00 UTC)))
                .is_none()
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn lru_eviction() {
        let config = CacheConfig {
            instruction_cache_limit: 2,
            ..Default::default()
        };
        let cache = InstructionCache::new(&config);

        cache.put(page("one"), None, Vec::new());
        cache.put(page("two"), None, Vec::new());
        cache.put(page("three"), None, Vec::new());

        assert!(cache.get(&page("one"), None).is_none());
        assert!(cache.get(&page("two"), None).is_some());
        assert!(cache.get(&page("three"), None).is_some());
    }

    #[test]
    fn recovers_from_poisoned_lock() {
        let cache = InstructionCache::new(&CacheConfig::default());

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = cache
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        cache.put(page("a"), None, Vec::new());
        assert_eq!(cache.len(), 1);
    }
}
