use std::collections::HashMap;

use parking_lot::Mutex;

use crate::domain::Verdict;

/// Last-known verdict per full page URL (path and query included).
///
/// Unbounded and process-lifetime only; entries are cheap and the cache
/// resets with the background process, so no eviction is applied.
#[derive(Debug, Default)]
pub struct VerdictCache {
    inner: Mutex<HashMap<String, Verdict>>,
}

impl VerdictCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<Verdict> {
        self.inner.lock().get(url).copied()
    }

    pub fn set(&self, url: &str, verdict: Verdict) {
        self.inner.lock().insert(url.to_string(), verdict);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_previous_verdict() {
        let cache = VerdictCache::new();
        cache.set("https://example.com/login", Verdict::Safe);
        cache.set("https://example.com/login", Verdict::Dangerous);
        assert_eq!(
            cache.get("https://example.com/login"),
            Some(Verdict::Dangerous)
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn keys_are_full_urls_not_hostnames() {
        let cache = VerdictCache::new();
        cache.set("https://example.com/a", Verdict::Safe);
        assert_eq!(cache.get("https://example.com/b"), None);
    }
}
