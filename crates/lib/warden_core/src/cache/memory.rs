//! In-process cache store with lazy expiry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{CacheResult, CacheStore};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Concurrent map-backed [`CacheStore`]. Expired entries are dropped on read.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Glob match supporting `*` (any run, possibly empty) and `?` (one char).
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<()> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<()> {
        self.entries.retain(|k, _| !glob_match(pattern, k));
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.expires_at > now && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
