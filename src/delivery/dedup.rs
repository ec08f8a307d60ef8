use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// In-memory cache for absorbing duplicate message submissions.
///
/// Keys are `user:session:text` fingerprints. Entries expire after the TTL
/// and the cache is bounded; at capacity the oldest entry is evicted, so a
/// burst of distinct messages can never grow it without limit.
pub struct DedupCache {
    entries: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
    max_entries: usize,
}

impl DedupCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    /// Build the fingerprint for one submission.
    pub fn fingerprint(user_id: &str, session_id: &str, text: &str) -> String {
        format!("{}:{}:{}", user_id, session_id, text)
    }

    /// Check if the key is new. Returns true if new (process it),
    /// false if duplicate (skip it). Records the key if new.
    pub fn check_and_record(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        // Check for existing non-expired entry
        if let Some(&recorded_at) = entries.get(key) {
            if now.duration_since(recorded_at) < self.ttl {
                return false; // duplicate
            }
        }

        // Evict expired entries first
        let cutoff = now - self.ttl;
        entries.retain(|_, &mut recorded_at| recorded_at > cutoff);

        // Evict oldest if at capacity
        if entries.len() >= self.max_entries {
            if let Some(oldest_key) = entries
                .iter()
                .min_by_key(|(_, t)| *t)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest_key);
            }
        }

        entries.insert(key.to_string(), now);
        true
    }

    /// Whether a non-expired entry exists, without recording anything.
    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .is_some_and(|&recorded_at| recorded_at.elapsed() < self.ttl)
    }

    /// Number of tracked entries (for testing/metrics).
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
