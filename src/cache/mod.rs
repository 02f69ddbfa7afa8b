//! The correlation buffer between `PromptPaid` and `PromptConsumed` (spec
//! §3/§4.D): bounded by entry count (LRU) and by age (TTL), keyed by
//! `(agentAddress, promptId)` with the address always hex-encoded explicitly
//! — this is the fix for the non-canonical-key anomaly spec §9 calls out.

use crate::core::types::Address;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PromptKey {
    agent_hex: String,
    prompt_id: u64,
}

impl PromptKey {
    pub fn new(agent: Address, prompt_id: u64) -> Self {
        Self {
            agent_hex: agent.to_hex(),
            prompt_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptCacheEntry {
    pub tweet_id: u64,
    pub prompt: String,
}

struct Stamped {
    entry: PromptCacheEntry,
    inserted_at: Instant,
}

/// Bounded, TTL'd correlation cache. Default capacity 10 000, default TTL 30
/// minutes, per spec §3.
pub struct PromptCache {
    inner: LruCache<PromptKey, Stamped>,
    ttl: Duration,
}

impl PromptCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
            ttl,
        }
    }

    pub fn insert(&mut self, agent: Address, prompt_id: u64, entry: PromptCacheEntry) {
        let key = PromptKey::new(agent, prompt_id);
        self.inner.put(
            key,
            Stamped {
                entry,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove and return the entry for `(agent, prompt_id)` if present and
    /// not expired. A present-but-expired entry is treated as a miss (and
    /// evicted), matching the spec's "TTL upper-bounds the correlation
    /// window" rule.
    pub fn take(&mut self, agent: Address, prompt_id: u64) -> Option<PromptCacheEntry> {
        let key = PromptKey::new(agent, prompt_id);
        let stamped = self.inner.pop(&key)?;
        if stamped.inserted_at.elapsed() > self.ttl {
            None
        } else {
            Some(stamped.entry)
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    #[test]
    fn hit_then_gone() {
        let mut cache = PromptCache::new(10, Duration::from_secs(60));
        cache.insert(
            addr(1),
            42,
            PromptCacheEntry {
                tweet_id: 555,
                prompt: "hi".into(),
            },
        );
        let hit = cache.take(addr(1), 42).expect("present");
        assert_eq!(hit.tweet_id, 555);
        assert!(cache.take(addr(1), 42).is_none());
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let mut cache = PromptCache::new(10, Duration::from_millis(0));
        cache.insert(
            addr(1),
            1,
            PromptCacheEntry {
                tweet_id: 1,
                prompt: "x".into(),
            },
        );
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.take(addr(1), 1).is_none());
    }

    #[test]
    fn distinct_agents_do_not_collide() {
        let mut cache = PromptCache::new(10, Duration::from_secs(60));
        cache.insert(
            addr(1),
            1,
            PromptCacheEntry {
                tweet_id: 1,
                prompt: "a".into(),
            },
        );
        cache.insert(
            addr(2),
            1,
            PromptCacheEntry {
                tweet_id: 2,
                prompt: "b".into(),
            },
        );
        assert_eq!(cache.take(addr(1), 1).unwrap().tweet_id, 1);
        assert_eq!(cache.take(addr(2), 1).unwrap().tweet_id, 2);
    }
}
