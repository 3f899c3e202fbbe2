use carbon::capabilities::{Capabilities, MaxKeyLength};
use carbon::domain::{CacheValue, CasToken};
use carbon::options::{AdapterOptions, StorageOptions};
use carbon::ports::{
    ClearByNamespace, ClearByPrefix, Flushable, Iterable, Optimizable, Storage, require_non_empty,
};
use moka::Expiry;
use moka::sync::Cache;
use shared::Result;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use uuid::Uuid;

/// Keys longer than this are rejected
pub const MOKA_MAX_KEY_LENGTH: usize = 250;

type EntryKey = (String, String);

#[derive(Clone, Debug)]
struct MokaEntry {
    value: CacheValue,
    ttl: Option<Duration>,
    version: Uuid,
}

/// Per-entry TTL, restarted on every write
struct EntryExpiry;

impl Expiry<EntryKey, MokaEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &EntryKey,
        value: &MokaEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &EntryKey,
        value: &MokaEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Moka-based adapter with per-entry TTL driven by real time.
/// Keys are scoped by the namespace active at the time of the call.
pub struct MokaAdapter {
    cache: Cache<EntryKey, MokaEntry>,
    options: AdapterOptions,
    capabilities: Capabilities,
}

impl MokaAdapter {
    /// Create an unbounded Moka cache
    pub fn new(name: &str) -> Self {
        Self::build(name, None)
    }

    /// Create a Moka cache holding at most `max_entries` items
    pub fn new_bounded(name: &str, max_entries: u64) -> Self {
        Self::build(name, Some(max_entries))
    }

    fn build(name: &str, max_entries: Option<u64>) -> Self {
        let mut builder = Cache::builder().name(name).expire_after(EntryExpiry);

        if let Some(capacity) = max_entries {
            builder = builder.max_capacity(capacity);
        }

        Self {
            cache: builder.build(),
            options: AdapterOptions::new(),
            capabilities: Capabilities::new()
                .with_ttl(1.0)
                .with_max_key_length(MaxKeyLength::Limited(MOKA_MAX_KEY_LENGTH)),
        }
    }

    fn entry_key(&self, key: &str) -> EntryKey {
        (self.options.namespace(), key.to_string())
    }

    fn ttl(&self) -> Option<Duration> {
        let ttl = self.options.ttl();
        if ttl > 0.0 {
            Duration::try_from_secs_f64(ttl).ok()
        } else {
            None
        }
    }

    fn invalidate_matching<F>(&self, matches: F) -> usize
    where
        F: Fn(&EntryKey) -> bool,
    {
        let keys: Vec<EntryKey> = self
            .cache
            .iter()
            .filter(|(key, _)| matches(&**key))
            .map(|(key, _)| (*key).clone())
            .collect();
        for key in &keys {
            self.cache.invalidate(key);
        }
        keys.len()
    }
}

impl Storage for MokaAdapter {
    type Options = AdapterOptions;

    fn options(&self) -> &AdapterOptions {
        &self.options
    }

    fn set_options(&mut self, options: AdapterOptions) -> &mut Self {
        if !self.options.same_instance(&options) {
            self.options = options;
        }
        self
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn internal_get_item(&self, normalized_key: &str) -> Result<Option<(CacheValue, CasToken)>> {
        // Either doesn't exist or TTL expired
        Ok(self
            .cache
            .get(&self.entry_key(normalized_key))
            .map(|entry| (entry.value, CasToken::of_version(entry.version))))
    }

    fn internal_set_item(&mut self, normalized_key: &str, value: CacheValue) -> Result<bool> {
        let entry = MokaEntry {
            value,
            ttl: self.ttl(),
            version: Uuid::new_v4(),
        };
        trace!("Inserting '{}' with ttl {:?}", normalized_key, entry.ttl);
        self.cache.insert(self.entry_key(normalized_key), entry);
        Ok(true)
    }

    fn internal_remove_item(&mut self, normalized_key: &str) -> Result<bool> {
        Ok(self.cache.remove(&self.entry_key(normalized_key)).is_some())
    }

    fn internal_touch_item(&mut self, normalized_key: &str) -> Result<bool> {
        let key = self.entry_key(normalized_key);
        match self.cache.get(&key) {
            Some(entry) => {
                let ttl = self.ttl();
                self.cache.insert(key, MokaEntry { ttl, ..entry });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn as_iterable(&self) -> Option<&dyn Iterable> {
        Some(self)
    }

    fn as_flushable(&mut self) -> Option<&mut dyn Flushable> {
        Some(self)
    }

    fn as_optimizable(&mut self) -> Option<&mut dyn Optimizable> {
        Some(self)
    }

    fn as_clear_by_prefix(&mut self) -> Option<&mut dyn ClearByPrefix> {
        Some(self)
    }

    fn as_clear_by_namespace(&mut self) -> Option<&mut dyn ClearByNamespace> {
        Some(self)
    }
}

impl Iterable for MokaAdapter {
    fn iter_keys(&self) -> Result<Vec<String>> {
        let namespace = self.options.namespace();
        let mut keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| key.0 == namespace)
            .map(|(key, _)| key.1.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

impl Flushable for MokaAdapter {
    fn flush(&mut self) -> Result<bool> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        Ok(true)
    }
}

impl Optimizable for MokaAdapter {
    fn optimize(&mut self) -> Result<bool> {
        self.cache.run_pending_tasks();
        Ok(true)
    }
}

impl ClearByPrefix for MokaAdapter {
    fn clear_by_prefix(&mut self, prefix: &str) -> Result<bool> {
        require_non_empty("prefix", prefix)?;
        let namespace = self.options.namespace();
        let cleared = self.invalidate_matching(|key| key.0 == namespace && key.1.starts_with(prefix));
        debug!("Cleared {} items with prefix '{}'", cleared, prefix);
        Ok(true)
    }
}

impl ClearByNamespace for MokaAdapter {
    fn clear_by_namespace(&mut self, namespace: &str) -> Result<bool> {
        require_non_empty("namespace", namespace)?;
        let cleared = self.invalidate_matching(|key| key.0 == namespace);
        debug!("Cleared {} items in namespace '{}'", cleared, namespace);
        Ok(true)
    }
}

impl std::fmt::Debug for MokaAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaAdapter")
            .field("entry_count", &self.cache.entry_count())
            .field("weighted_size", &self.cache.weighted_size())
            .field("options", &self.options)
            .finish()
    }
}
