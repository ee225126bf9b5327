use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::{Result, TrackerError};
use crate::model::Streamer;
use crate::platform::UsersApi;

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    pub streamer: Streamer,
    pub resolved_at: Instant,
}

/// Name -> streamer records. Entries are never evicted, a stale entry
/// stays until a newer resolution replaces it.
#[derive(Debug)]
pub struct ResolvedCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, ResolvedEntry>>,
}

impl ResolvedCache {
    pub fn new(ttl: Duration) -> Self {
        ResolvedCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The cached record for `name` if it is younger than the ttl.
    pub fn get_fresh(&self, name: &str) -> Option<Streamer> {
        let entries = self.entries.lock();
        entries
            .get(&name.to_lowercase())
            .filter(|e| e.resolved_at.elapsed() < self.ttl)
            .map(|e| e.streamer.clone())
    }

    pub fn insert(&self, streamer: Streamer, resolved_at: Instant) {
        self.entries.lock().insert(
            streamer.name.to_lowercase(),
            ResolvedEntry {
                streamer,
                resolved_at,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves login names through a cache, with a single upstream
/// call per lookup for everything missing or stale.
pub struct StreamerResolver {
    label: String,
    api: Arc<dyn UsersApi>,
    cache: ResolvedCache,
}

impl StreamerResolver {
    pub fn new<S: Into<String>>(label: S, api: Arc<dyn UsersApi>, ttl: Duration) -> Self {
        StreamerResolver {
            label: label.into(),
            api,
            cache: ResolvedCache::new(ttl),
        }
    }

    /// Result is aligned with `names`, None for names the platform doesn't know.
    /// If the upstream call fails nothing is returned, callers should retry later.
    pub async fn resolve(&self, names: &[String]) -> Result<Vec<Option<Streamer>>> {
        let keys: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();

        let mut found: HashMap<String, Streamer> = HashMap::new();
        let mut missing: Vec<String> = Vec::new();
        for key in &keys {
            match self.cache.get_fresh(key) {
                Some(streamer) => {
                    found.insert(key.clone(), streamer);
                }
                None if !missing.contains(key) => missing.push(key.clone()),
                None => {}
            }
        }

        if !missing.is_empty() {
            log::debug!("{}: resolving {:?}", self.label, missing);
            let resolved = self.api.resolve_streamers(&missing).await.map_err(|err| {
                log::error!("{}: Error while resolving {:?}: {:?}", self.label, missing, err);
                TrackerError::Upstream(err)
            })?;

            let resolved_at = Instant::now();
            for streamer in resolved {
                self.cache.insert(streamer.clone(), resolved_at);
                found.insert(streamer.name.to_lowercase(), streamer);
            }
        }

        Ok(keys.iter().map(|k| found.get(k).cloned()).collect())
    }

    pub async fn resolve_one(&self, name: &str) -> Result<Option<Streamer>> {
        let mut resolved = self.resolve(&[name.to_string()]).await?;
        Ok(resolved.pop().flatten())
    }

    pub fn cache(&self) -> &ResolvedCache {
        &self.cache
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::Platform;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeUsers {
        calls: Mutex<Vec<Vec<String>>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl UsersApi for FakeUsers {
        async fn resolve_streamers(&self, names: &[String]) -> anyhow::Result<Vec<Streamer>> {
            self.calls.lock().push(names.to_vec());
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("helix is down");
            }
            Ok(names
                .iter()
                .filter(|n| n.as_str() != "ghost")
                .map(|n| streamer(n))
                .collect())
        }
    }

    fn streamer(name: &str) -> Streamer {
        Streamer {
            platform: Platform::Twitch,
            id: format!("id-{name}"),
            name: name.to_string(),
            display_name: name.to_uppercase(),
        }
    }

    fn names(ns: &[&str]) -> Vec<String> {
        ns.iter().map(|n| n.to_string()).collect()
    }

    fn resolver(api: Arc<FakeUsers>) -> StreamerResolver {
        StreamerResolver::new("test resolver", api, DEFAULT_TTL)
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_keeps_request_order() {
        let api = Arc::new(FakeUsers::default());
        let resolver = resolver(api.clone());

        let got = resolver.resolve(&names(&["b", "ghost", "a"])).await.unwrap();
        assert_eq!(got, vec![Some(streamer("b")), None, Some(streamer("a"))]);
        assert_eq!(*api.calls.lock(), vec![names(&["b", "ghost", "a"])]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_stale_and_missing_are_resolved() {
        let api = Arc::new(FakeUsers::default());
        let resolver = resolver(api.clone());

        resolver.resolve(&names(&["a"])).await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;

        let got = resolver.resolve(&names(&["A", "b"])).await.unwrap();
        assert_eq!(got, vec![Some(streamer("a")), Some(streamer("b"))]);
        assert_eq!(
            *api.calls.lock(),
            vec![names(&["a"]), names(&["b"])],
            "a is still fresh, only b goes upstream"
        );

        // everything fresh: no upstream call at all
        resolver.resolve(&names(&["a", "b"])).await.unwrap();
        assert_eq!(api.calls.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_go_stale_after_ttl() {
        let api = Arc::new(FakeUsers::default());
        let resolver = resolver(api.clone());

        resolver.resolve_one("a").await.unwrap();
        tokio::time::advance(DEFAULT_TTL).await;
        assert_eq!(resolver.cache().get_fresh("a"), None);
        assert_eq!(resolver.cache().len(), 1, "stale entries are not evicted");

        resolver.resolve_one("a").await.unwrap();
        assert_eq!(*api.calls.lock(), vec![names(&["a"]), names(&["a"])]);
        assert!(resolver.cache().get_fresh("a").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_fails_the_whole_call() {
        let api = Arc::new(FakeUsers::default());
        let resolver = resolver(api.clone());
        resolver.resolve_one("a").await.unwrap();

        api.fail.store(true, Ordering::SeqCst);
        let err = resolver.resolve(&names(&["a", "b"])).await.unwrap_err();
        assert!(matches!(err, TrackerError::Upstream(_)));

        // the fresh entry survived the failure
        assert_eq!(resolver.cache().get_fresh("a"), Some(streamer("a")));
        assert_eq!(resolver.resolve_one("a").await.unwrap(), Some(streamer("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_resolved_once() {
        let api = Arc::new(FakeUsers::default());
        let resolver = resolver(api.clone());
        let got = resolver.resolve(&names(&["a", "A"])).await.unwrap();
        assert_eq!(got, vec![Some(streamer("a")), Some(streamer("a"))]);
        assert_eq!(*api.calls.lock(), vec![names(&["a"])]);
    }
}
