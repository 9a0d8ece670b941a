//! Short-lived in-memory cache of imported private keys, keyed by keyid
//! (spec §2 "Secret-key cache"). Process-local; no locking needed under the
//! single-threaded cooperative model (spec §5). Cleared at each midnight
//! tick and again as part of `KeyDirectory::daily_events`.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SecretKeyCache {
    entries: HashMap<String, Option<String>>,
}

impl SecretKeyCache {
    pub fn new() -> Self {
        SecretKeyCache {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, keyid: &str) -> Option<&Option<String>> {
        self.entries.get(keyid)
    }

    pub fn insert(&mut self, keyid: String, secret: Option<String>) {
        self.entries.insert(keyid, secret);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memoises_both_hits_and_misses() {
        let mut cache = SecretKeyCache::new();
        assert!(cache.get("k1").is_none());

        cache.insert("k1".to_owned(), Some("secret-pem".to_owned()));
        cache.insert("k2".to_owned(), None);

        assert_eq!(cache.get("k1").unwrap().as_deref(), Some("secret-pem"));
        assert_eq!(cache.get("k2").unwrap(), &None);
    }

    #[test]
    fn clear_removes_all_entries() {
        let mut cache = SecretKeyCache::new();
        cache.insert("k1".to_owned(), Some("secret-pem".to_owned()));
        cache.clear();
        assert!(cache.get("k1").is_none());
    }
}
