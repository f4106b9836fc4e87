//! Probe endpoint store with a flat-file cache surviving restarts

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Default probe endpoints used when neither the cache nor external
/// configuration supplies any
pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "http://clients3.google.com/generate_204",
    "http://connectivitycheck.gstatic.com/generate_204",
];

/// Minimum endpoint length: room for "http://" plus at least one character
pub const MIN_ENDPOINT_LEN: usize = 8;

/// Ordered probe endpoint set, replaced only as a whole, mirrored to a
/// one-URL-per-line cache file so configuration survives process restart
pub struct EndpointStore {
    endpoints: Mutex<Vec<String>>,
    cache_path: PathBuf,
}

impl EndpointStore {
    /// Open the store, adopting the cache file if present and non-empty.
    /// A missing or unreadable cache just means "no cached endpoints".
    pub fn open(cache_path: impl Into<PathBuf>) -> Self {
        let cache_path = cache_path.into();
        let endpoints = match fs::read_to_string(&cache_path) {
            Ok(text) => {
                let urls: Vec<String> = text
                    .lines()
                    .map(str::trim)
                    .filter(|l| is_valid_endpoint(l))
                    .map(str::to_string)
                    .collect();
                if !urls.is_empty() {
                    tracing::info!(
                        "Loaded {} probe endpoint(s) from cache {}",
                        urls.len(),
                        cache_path.display()
                    );
                }
                urls
            }
            Err(e) => {
                tracing::debug!(
                    "No endpoint cache at {}: {}",
                    cache_path.display(),
                    e
                );
                Vec::new()
            }
        };
        Self {
            endpoints: Mutex::new(endpoints),
            cache_path,
        }
    }

    /// Snapshot copy of the current endpoint set
    pub fn get(&self) -> Vec<String> {
        self.endpoints.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.lock().unwrap().is_empty()
    }

    /// Replace the whole endpoint set. Candidates failing validation are
    /// dropped with a warning; if nothing survives the stored set is left
    /// untouched. Returns whether a replacement was committed.
    pub fn set(&self, candidates: &[String]) -> bool {
        let mut accepted = Vec::with_capacity(candidates.len());
        for url in candidates {
            let url = url.trim();
            if is_valid_endpoint(url) {
                accepted.push(url.to_string());
            } else {
                tracing::warn!("Dropping invalid probe endpoint: {:?}", url);
            }
        }
        if accepted.is_empty() {
            tracing::warn!("No valid probe endpoints in replacement, keeping current set");
            return false;
        }

        {
            let mut guard = self.endpoints.lock().unwrap();
            *guard = accepted.clone();
        }
        self.persist(&accepted);
        true
    }

    /// Startup fallback: adopt externally configured endpoints only when
    /// the cache produced nothing
    pub fn set_if_empty(&self, candidates: &[String]) -> bool {
        if self.is_empty() {
            self.set(candidates)
        } else {
            false
        }
    }

    fn persist(&self, endpoints: &[String]) {
        let mut text = endpoints.join("\n");
        text.push('\n');
        if let Err(e) = fs::write(&self.cache_path, text) {
            tracing::warn!(
                "Failed to write endpoint cache {}: {}",
                self.cache_path.display(),
                e
            );
        }
    }
}

fn is_valid_endpoint(url: &str) -> bool {
    url.len() >= MIN_ENDPOINT_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "reach-monitor-test-{}-{}.txt",
            tag,
            std::process::id()
        ))
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn set_replaces_whole_set_and_persists() {
        let path = temp_cache("replace");
        let _ = fs::remove_file(&path);
        let store = EndpointStore::open(&path);
        assert!(store.get().is_empty());

        let first = urls(&["http://a.example/gen204", "http://b.example/gen204"]);
        assert!(store.set(&first));
        assert_eq!(store.get(), first);

        let second = urls(&["http://c.example/gen204"]);
        assert!(store.set(&second));
        assert_eq!(store.get(), second);

        let on_disk = fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, "http://c.example/gen204\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn set_is_idempotent_including_cache_bytes() {
        let path = temp_cache("idempotent");
        let _ = fs::remove_file(&path);
        let store = EndpointStore::open(&path);
        let set = urls(&["http://clients3.google.com/generate_204"]);

        assert!(store.set(&set));
        let bytes_a = fs::read(&path).unwrap();
        assert!(store.set(&set));
        let bytes_b = fs::read(&path).unwrap();

        assert_eq!(store.get(), set);
        assert_eq!(bytes_a, bytes_b);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn invalid_candidates_are_dropped_not_fatal() {
        let path = temp_cache("partial");
        let _ = fs::remove_file(&path);
        let store = EndpointStore::open(&path);

        let mixed = urls(&["ab", "http://ok.example/x", "htt"]);
        assert!(store.set(&mixed));
        assert_eq!(store.get(), urls(&["http://ok.example/x"]));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn all_invalid_replacement_is_a_no_op() {
        let path = temp_cache("noop");
        let _ = fs::remove_file(&path);
        let store = EndpointStore::open(&path);

        // Empty store stays empty
        assert!(!store.set(&urls(&["ab", "htt", "xyz"])));
        assert!(store.get().is_empty());

        // Populated store keeps its previous set
        let good = urls(&["http://keep.example/gen204"]);
        assert!(store.set(&good));
        assert!(!store.set(&urls(&["http://", "x"])));
        assert_eq!(store.get(), good);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn open_adopts_persisted_cache() {
        let path = temp_cache("restore");
        let _ = fs::remove_file(&path);
        {
            let store = EndpointStore::open(&path);
            store.set(&urls(&["http://cached.example/gen204"]));
        }
        let reopened = EndpointStore::open(&path);
        assert_eq!(reopened.get(), urls(&["http://cached.example/gen204"]));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn set_if_empty_only_applies_to_empty_store() {
        let path = temp_cache("fallback");
        let _ = fs::remove_file(&path);
        let store = EndpointStore::open(&path);

        assert!(store.set_if_empty(&urls(&["http://first.example/a"])));
        assert!(!store.set_if_empty(&urls(&["http://second.example/b"])));
        assert_eq!(store.get(), urls(&["http://first.example/a"]));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn duplicates_are_permitted() {
        let path = temp_cache("dups");
        let _ = fs::remove_file(&path);
        let store = EndpointStore::open(&path);
        let dup = urls(&["http://dup.example/a", "http://dup.example/a"]);
        assert!(store.set(&dup));
        assert_eq!(store.get(), dup);
        let _ = fs::remove_file(&path);
    }
}
