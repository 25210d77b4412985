//! Process-wide bundle state with cached loads and atomic refresh

use crate::error::ArtifactLoadError;
use crate::models::bundle::{LoadOptions, ModelBundle};
use crate::models::source::ArtifactSource;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

/// Owner of the active [`ModelBundle`].
///
/// Created once at startup and injected into the pipeline. Loads are
/// serialized through the cache mutex, so at most one is in flight. Readers
/// take an `Arc` snapshot and see either the old or the new bundle, never a
/// partially built one.
#[derive(Debug)]
pub struct BundleStore {
    options: LoadOptions,
    /// Loaded bundles keyed by source identity; the lock is the load critical section
    cache: Mutex<HashMap<String, Arc<ModelBundle>>>,
    current: RwLock<Arc<ModelBundle>>,
}

impl BundleStore {
    /// Load the initial bundle and make it current
    pub fn open(
        source: &dyn ArtifactSource,
        options: LoadOptions,
    ) -> Result<Self, ArtifactLoadError> {
        let bundle = Arc::new(ModelBundle::load_with(source, &options)?);

        let mut cache = HashMap::new();
        cache.insert(source.identity(), bundle.clone());

        Ok(Self {
            options,
            cache: Mutex::new(cache),
            current: RwLock::new(bundle),
        })
    }

    /// Snapshot of the active bundle
    pub fn current(&self) -> Arc<ModelBundle> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Return the cached bundle for `source`, loading it on first use.
    ///
    /// Does not change which bundle is current.
    pub fn load(&self, source: &dyn ArtifactSource) -> Result<Arc<ModelBundle>, ArtifactLoadError> {
        let identity = source.identity();
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(bundle) = cache.get(&identity) {
            debug!(source = %identity, "Model bundle served from cache");
            return Ok(bundle.clone());
        }

        let bundle = Arc::new(ModelBundle::load_with(source, &self.options)?);
        cache.insert(identity, bundle.clone());
        Ok(bundle)
    }

    /// Reload `source` wholesale, bypassing the cache, and make it current.
    ///
    /// On failure the current bundle and the cache are left untouched.
    pub fn refresh(
        &self,
        source: &dyn ArtifactSource,
    ) -> Result<Arc<ModelBundle>, ArtifactLoadError> {
        let identity = source.identity();
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        let bundle = Arc::new(ModelBundle::load_with(source, &self.options)?);
        cache.insert(identity.clone(), bundle.clone());

        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = bundle.clone();

        info!(
            source = %identity,
            version = ?bundle.metadata().version,
            "Model bundle refreshed"
        );

        Ok(bundle)
    }

    /// Number of distinct sources loaded so far
    pub fn cached_sources(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source::InMemorySource;
    use serde_json::json;

    fn source(identity: &str, version: &str) -> InMemorySource {
        InMemorySource::from_json(
            identity,
            &json!({
                "version": version,
                "selected_features": ["amt"],
                "encoders": {},
                "scaler": {"mean": [0.0], "scale": [1.0]},
                "classifier": {"kind": "logistic", "coefficients": [1.0], "intercept": 0.0}
            }),
        )
    }

    #[test]
    fn test_load_is_cached_by_identity() {
        let store = BundleStore::open(&source("mem://a", "1"), LoadOptions::default()).unwrap();

        let first = store.load(&source("mem://b", "1")).unwrap();
        // same identity, different content: served from cache
        let second = store.load(&source("mem://b", "2")).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.metadata().version.as_deref(), Some("1"));
        assert_eq!(store.cached_sources(), 2);
        assert_eq!(store.current().metadata().source_id, "mem://a");
    }

    #[test]
    fn test_open_populates_cache() {
        let store = BundleStore::open(&source("mem://a", "1"), LoadOptions::default()).unwrap();
        let loaded = store.load(&source("mem://a", "9")).unwrap();
        assert!(Arc::ptr_eq(&loaded, &store.current()));
    }

    #[test]
    fn test_refresh_swaps_current() {
        let store = BundleStore::open(&source("mem://a", "1"), LoadOptions::default()).unwrap();
        let before = store.current();

        store.refresh(&source("mem://a", "2")).unwrap();

        assert_eq!(before.metadata().version.as_deref(), Some("1"));
        assert_eq!(store.current().metadata().version.as_deref(), Some("2"));
        // the refreshed bundle replaces the cache entry too
        let cached = store.load(&source("mem://a", "3")).unwrap();
        assert_eq!(cached.metadata().version.as_deref(), Some("2"));
    }

    #[test]
    fn test_failed_refresh_keeps_current() {
        let store = BundleStore::open(&source("mem://a", "1"), LoadOptions::default()).unwrap();

        let broken = InMemorySource::new("mem://a", b"{}".to_vec());
        assert!(store.refresh(&broken).is_err());

        assert_eq!(store.current().metadata().version.as_deref(), Some("1"));
    }
}
