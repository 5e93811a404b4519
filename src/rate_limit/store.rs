use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Counter state for one (principal, action) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitWindow {
    /// Requests admitted in this window.
    pub count: u32,
    /// Epoch millis when the window opened.
    pub window_start_ms: u64,
    /// Window length, copied from the policy so sweeps need no lookup.
    pub window_ms: u64,
}

impl RateLimitWindow {
    /// Empty window opening at `now_ms`.
    pub fn fresh(now_ms: u64, window_ms: u64) -> Self {
        Self { count: 0, window_start_ms: now_ms, window_ms }
    }

    /// Expired windows are treated as absent. The boundary instant counts as expired.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.window_start_ms) >= self.window_ms
    }

    /// Epoch millis when this window closes.
    pub fn reset_at_ms(&self) -> u64 {
        self.window_start_ms.saturating_add(self.window_ms)
    }

    /// Copy with one more admitted request.
    pub fn incremented(self) -> Self {
        Self { count: self.count.saturating_add(1), ..self }
    }
}

/// Abstract storage interface for rate limit windows.
///
/// This trait is designed to support both in-memory and shared backends (an external counter
/// store with increment-with-expiry semantics maps onto `compare_and_set`).
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the current window for a key.
    async fn get(&self, key: &str) -> Result<Option<RateLimitWindow>, Self::Error>;

    /// Replace the window for `key` with `next`, but only if the stored value still equals
    /// `expected` (`None` meaning "no entry").
    ///
    /// Returns `Ok(true)` if the write happened, `Ok(false)` if a concurrent writer got there
    /// first (caller should re-read and retry).
    async fn compare_and_set(
        &self,
        key: &str,
        next: RateLimitWindow,
        expected: Option<RateLimitWindow>,
    ) -> Result<bool, Self::Error>;

    /// Delete the window for `key`. Returns whether one existed.
    async fn remove(&self, key: &str) -> Result<bool, Self::Error>;

    /// Drop every window that has expired at `now_ms`. Returns how many were removed.
    async fn sweep_expired(&self, now_ms: u64) -> Result<usize, Self::Error>;
}

/// Process-local window store: one mutex over the whole map.
///
/// State is lost on restart and not shared between processes.
#[derive(Default, Clone, Debug)]
pub struct InMemoryWindowStore {
    data: Arc<Mutex<HashMap<String, RateLimitWindow>>>,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, RateLimitWindow>> {
        // Entries are plain Copy data, so a poisoned map is still consistent.
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of physically stored windows, expired or not.
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Whether a window exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.guard().contains_key(key)
    }
}

#[async_trait]
impl WindowStore for InMemoryWindowStore {
    type Error = std::convert::Infallible;

    async fn get(&self, key: &str) -> Result<Option<RateLimitWindow>, Self::Error> {
        Ok(self.guard().get(key).copied())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        next: RateLimitWindow,
        expected: Option<RateLimitWindow>,
    ) -> Result<bool, Self::Error> {
        let mut guard = self.guard();
        if guard.get(key).copied() != expected {
            return Ok(false); // Race detected
        }
        guard.insert(key.to_string(), next);
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<bool, Self::Error> {
        Ok(self.guard().remove(key).is_some())
    }

    async fn sweep_expired(&self, now_ms: u64) -> Result<usize, Self::Error> {
        let mut guard = self.guard();
        let before = guard.len();
        guard.retain(|_, w| !w.is_expired(now_ms));
        Ok(before - guard.len())
    }
}
