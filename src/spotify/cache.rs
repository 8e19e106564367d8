//! Short-TTL cache for read-heavy gateway projections.
//!
//! The clock is injected so expiry is testable without sleeping. The cache
//! belongs to the gateway adapter: business logic never sees it.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

pub struct TtlCache<T: Clone> {
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
    slot: Mutex<Option<(u64, T)>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl_ms,
            clock,
            slot: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Option<T> {
        let slot = self.slot.lock().unwrap();
        match slot.as_ref() {
            Some((stored_at, value))
                if self.clock.now_millis().saturating_sub(*stored_at) < self.ttl_ms =>
            {
                Some(value.clone())
            }
            _ => None,
        }
    }

    pub fn put(&self, value: T) {
        let mut slot = self.slot.lock().unwrap();
        *slot = Some((self.clock.now_millis(), value));
    }

    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap();
        *slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct ManualClock {
        now: AtomicU64,
    }

    impl ManualClock {
        fn new(start: u64) -> Arc<Self> {
            Arc::new(Self {
                now: AtomicU64::new(start),
            })
        }

        fn advance(&self, ms: u64) {
            self.now.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.now.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_empty_cache_misses() {
        let clock = ManualClock::new(0);
        let cache: TtlCache<String> = TtlCache::new(1000, clock);
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn test_hit_within_ttl() {
        let clock = ManualClock::new(0);
        let cache = TtlCache::new(1000, clock.clone());

        cache.put("snapshot".to_string());
        assert_eq!(cache.get(), Some("snapshot".to_string()));

        clock.advance(999);
        assert_eq!(cache.get(), Some("snapshot".to_string()));
    }

    #[test]
    fn test_expires_at_ttl() {
        let clock = ManualClock::new(0);
        let cache = TtlCache::new(1000, clock.clone());

        cache.put("snapshot".to_string());
        clock.advance(1000);
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn test_put_refreshes_expiry() {
        let clock = ManualClock::new(0);
        let cache = TtlCache::new(1000, clock.clone());

        cache.put("first".to_string());
        clock.advance(800);
        cache.put("second".to_string());
        clock.advance(800);
        assert_eq!(cache.get(), Some("second".to_string()));
    }

    #[test]
    fn test_invalidate_clears_immediately() {
        let clock = ManualClock::new(0);
        let cache = TtlCache::new(1000, clock);

        cache.put("snapshot".to_string());
        cache.invalidate();
        assert_eq!(cache.get(), None);
    }
}
