use crate::options::MemoryOptions;
use carbon::capabilities::{Capabilities, MaxKeyLength};
use carbon::clock::{Clock, RequestTime, SystemClock};
use carbon::domain::{CacheValue, CasToken, Metadata};
use carbon::options::StorageOptions;
use carbon::ports::{
    AvailableSpaceCapable, ClearByNamespace, ClearByPrefix, ClearExpired, Flushable, Iterable,
    MetadataCapable, Optimizable, Storage, TagMatch, Taggable, TotalSpaceCapable,
    require_non_empty,
};
use chrono::{DateTime, FixedOffset, TimeDelta};
use dashmap::DashMap;
use shared::{Error, ErrorTrap, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ItemKey {
    namespace: String,
    key: String,
}

#[derive(Clone, Debug)]
struct StoredItem {
    value: CacheValue,
    modified_at: DateTime<FixedOffset>,
    ttl: f64,
    tags: BTreeSet<String>,
    version: Uuid,
    size: u64,
}

impl StoredItem {
    /// Fails when the TTL reaches past the range of representable instants
    fn checked_expires_at(&self) -> Result<Option<DateTime<FixedOffset>>> {
        if self.ttl <= 0.0 {
            return Ok(None);
        }
        let millis = (self.ttl * 1000.0).round();
        let expires_at = if millis < i64::MAX as f64 {
            TimeDelta::try_milliseconds(millis as i64)
                .and_then(|ttl| self.modified_at.checked_add_signed(ttl))
        } else {
            None
        };
        expires_at
            .map(Some)
            .ok_or_else(|| Error::invalid_argument(format!("ttl of {}s is out of range", self.ttl)))
    }

    fn expires_at(&self) -> Option<DateTime<FixedOffset>> {
        self.checked_expires_at().ok().flatten()
    }

    fn is_expired(&self, now: DateTime<FixedOffset>) -> bool {
        self.expires_at().is_some_and(|expires_at| now >= expires_at)
    }
}

/// In-process adapter backed by a concurrent map.
///
/// Expiry is evaluated against an injected [`Clock`], so tests can drive it with a
/// [`carbon::clock::ModifiableClock`] instead of sleeping.
pub struct MemoryAdapter {
    items: DashMap<ItemKey, StoredItem>,
    options: MemoryOptions,
    capabilities: Capabilities,
    clock: Arc<dyn Clock>,
    error_trap: ErrorTrap,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::with_options(MemoryOptions::new())
    }

    pub fn with_options(options: MemoryOptions) -> Self {
        Self {
            items: DashMap::new(),
            options,
            capabilities: Capabilities::new()
                .with_ttl(1.0)
                .with_max_key_length(MaxKeyLength::Unlimited),
            clock: Arc::new(SystemClock),
            error_trap: ErrorTrap::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report a finer TTL precision. Expiry itself resolves milliseconds.
    pub fn with_ttl_precision(mut self, precision: f64) -> Self {
        self.capabilities = self.capabilities.with_ttl(precision);
        self
    }

    /// Pin expiry evaluation to the current time of the configured clock
    pub fn with_request_time(mut self) -> Self {
        self.clock = Arc::new(RequestTime::capture(self.clock.as_ref()));
        self.capabilities = self.capabilities.with_request_time(true);
        self
    }

    /// Share an error trap with the owner of the adapter
    pub fn with_error_trap(mut self, error_trap: ErrorTrap) -> Self {
        self.error_trap = error_trap;
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn namespace(&self) -> String {
        self.options.adapter_options().namespace()
    }

    fn item_key(&self, key: &str) -> ItemKey {
        ItemKey {
            namespace: self.namespace(),
            key: key.to_string(),
        }
    }

    /// Bytes held by items that haven't expired yet
    fn used_space(&self) -> u64 {
        let now = self.clock.now();
        self.items
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .map(|entry| entry.value().size)
            .sum()
    }

    /// Items whose expiry can't be represented are stored without one
    fn check_expiry(&self, key: &str, item: &StoredItem) {
        let mut region = self.error_trap.start();
        region.capture(item.checked_expires_at());
        for error in region.stop_collecting() {
            warn!("Item '{}' will never expire: {}", key, error);
        }
    }

    fn live_item(&self, key: &str) -> Option<StoredItem> {
        let now = self.clock.now();
        self.items
            .get(&self.item_key(key))
            .filter(|entry| !entry.value().is_expired(now))
            .map(|entry| entry.value().clone())
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAdapter")
            .field("entry_count", &self.items.len())
            .field("used_space", &self.used_space())
            .field("options", &self.options)
            .finish()
    }
}

fn approximate_size(value: &CacheValue) -> u64 {
    serde_json::to_vec(value).map_or(0, |bytes| bytes.len() as u64)
}

impl Storage for MemoryAdapter {
    type Options = MemoryOptions;

    fn options(&self) -> &MemoryOptions {
        &self.options
    }

    fn set_options(&mut self, options: MemoryOptions) -> &mut Self {
        if !self.options.same_instance(&options) {
            self.options = options;
        }
        self
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn internal_get_item(&self, normalized_key: &str) -> Result<Option<(CacheValue, CasToken)>> {
        Ok(self
            .live_item(normalized_key)
            .map(|item| (item.value, CasToken::of_version(item.version))))
    }

    fn internal_set_item(&mut self, normalized_key: &str, value: CacheValue) -> Result<bool> {
        let item_key = self.item_key(normalized_key);
        let size = approximate_size(&value);
        let replaced = self.live_item(normalized_key).map_or(0, |item| item.size);
        let needed = self.used_space().saturating_sub(replaced) + size;
        let limit = self.options.memory_limit();
        if needed > limit {
            warn!(
                "Memory limit of {} bytes reached, refusing '{}' ({} bytes)",
                limit, normalized_key, size
            );
            return Err(Error::OutOfSpace(format!(
                "storing '{}' needs {} bytes, limit is {}",
                normalized_key, needed, limit
            )));
        }

        let item = StoredItem {
            value,
            modified_at: self.clock.now(),
            ttl: self.options.adapter_options().ttl(),
            tags: BTreeSet::new(),
            version: Uuid::new_v4(),
            size,
        };
        self.check_expiry(normalized_key, &item);
        trace!("Storing '{}' in namespace '{}'", item_key.key, item_key.namespace);
        self.items.insert(item_key, item);
        Ok(true)
    }

    fn internal_remove_item(&mut self, normalized_key: &str) -> Result<bool> {
        let now = self.clock.now();
        let removed = self.items.remove(&self.item_key(normalized_key));
        Ok(removed.is_some_and(|(_, item)| !item.is_expired(now)))
    }

    fn internal_touch_item(&mut self, normalized_key: &str) -> Result<bool> {
        let now = self.clock.now();
        let ttl = self.options.adapter_options().ttl();
        match self.items.get_mut(&self.item_key(normalized_key)) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.modified_at = now;
                entry.ttl = ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn as_metadata_capable(&self) -> Option<&dyn MetadataCapable> {
        Some(self)
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

    fn as_clear_expired(&mut self) -> Option<&mut dyn ClearExpired> {
        Some(self)
    }

    fn as_taggable(&mut self) -> Option<&mut dyn Taggable> {
        Some(self)
    }

    fn as_total_space_capable(&self) -> Option<&dyn TotalSpaceCapable> {
        Some(self)
    }

    fn as_available_space_capable(&self) -> Option<&dyn AvailableSpaceCapable> {
        Some(self)
    }
}

impl MetadataCapable for MemoryAdapter {
    fn get_metadata(&self, key: &str) -> Result<Option<Metadata>> {
        if !self.is_readable() {
            return Ok(None);
        }
        self.validate_key(key)?;
        Ok(self.live_item(key).map(|item| Metadata {
            expires_at: item.expires_at(),
            modified_at: Some(item.modified_at),
            tags: item.tags,
            size: Some(item.size),
            ..Metadata::new(self.namespace(), key)
        }))
    }
}

impl Iterable for MemoryAdapter {
    fn iter_keys(&self) -> Result<Vec<String>> {
        let namespace = self.namespace();
        let now = self.clock.now();
        let mut keys: Vec<String> = self
            .items
            .iter()
            .filter(|entry| entry.key().namespace == namespace && !entry.value().is_expired(now))
            .map(|entry| entry.key().key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

impl Flushable for MemoryAdapter {
    fn flush(&mut self) -> Result<bool> {
        debug!("Flushing {} items", self.items.len());
        self.items.clear();
        Ok(true)
    }
}

impl Optimizable for MemoryAdapter {
    fn optimize(&mut self) -> Result<bool> {
        self.clear_expired()?;
        self.items.shrink_to_fit();
        Ok(true)
    }
}

impl ClearByPrefix for MemoryAdapter {
    fn clear_by_prefix(&mut self, prefix: &str) -> Result<bool> {
        require_non_empty("prefix", prefix)?;
        let namespace = self.namespace();
        self.items
            .retain(|item_key, _| !(item_key.namespace == namespace && item_key.key.starts_with(prefix)));
        debug!("Cleared prefix '{}' in namespace '{}'", prefix, namespace);
        Ok(true)
    }
}

impl ClearByNamespace for MemoryAdapter {
    fn clear_by_namespace(&mut self, namespace: &str) -> Result<bool> {
        require_non_empty("namespace", namespace)?;
        self.items.retain(|item_key, _| item_key.namespace != namespace);
        debug!("Cleared namespace '{}'", namespace);
        Ok(true)
    }
}

impl ClearExpired for MemoryAdapter {
    fn clear_expired(&mut self) -> Result<bool> {
        let now = self.clock.now();
        let before = self.items.len();
        self.items.retain(|_, item| !item.is_expired(now));
        debug!("Cleared {} expired items", before - self.items.len());
        Ok(true)
    }
}

impl Taggable for MemoryAdapter {
    fn set_tags(&mut self, key: &str, tags: &[&str]) -> Result<bool> {
        self.validate_key(key)?;
        if !self.is_writable() {
            return Ok(false);
        }
        let now = self.clock.now();
        match self.items.get_mut(&self.item_key(key)) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.tags = tags.iter().map(|tag| tag.to_string()).collect();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn get_tags(&self, key: &str) -> Result<Option<Vec<String>>> {
        self.validate_key(key)?;
        if !self.is_readable() {
            return Ok(None);
        }
        Ok(self
            .live_item(key)
            .map(|item| item.tags.into_iter().collect()))
    }

    fn clear_by_tags(&mut self, tags: &[&str], mode: TagMatch) -> Result<bool> {
        let namespace = self.namespace();
        self.items
            .retain(|item_key, item| !(item_key.namespace == namespace && mode.matches(&item.tags, tags)));
        debug!("Cleared tags {:?} ({:?}) in namespace '{}'", tags, mode, namespace);
        Ok(true)
    }
}

impl TotalSpaceCapable for MemoryAdapter {
    fn total_space(&self) -> Result<u64> {
        Ok(self.options.memory_limit())
    }
}

impl AvailableSpaceCapable for MemoryAdapter {
    fn available_space(&self) -> Result<u64> {
        Ok(self.options.memory_limit().saturating_sub(self.used_space()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbon::clock::ModifiableClock;
    use chrono::Utc;

    fn frozen_adapter() -> (MemoryAdapter, Arc<ModifiableClock>) {
        let clock = Arc::new(ModifiableClock::frozen_at(Utc::now().fixed_offset()));
        let adapter = MemoryAdapter::new().with_clock(clock.clone());
        (adapter, clock)
    }

    #[test]
    fn test_set_and_get() {
        let mut adapter = MemoryAdapter::new();
        assert!(adapter.set_item("key", "value").unwrap());

        let response = adapter.get_item("key").unwrap();
        assert!(response.found);
        assert_eq!(response.value, Some(CacheValue::from("value")));
    }

    #[test]
    fn test_item_expires_with_clock() {
        let (mut adapter, clock) = frozen_adapter();
        adapter.options().adapter_options().set_ttl(2.0).unwrap();
        adapter.set_item("key", 1i64).unwrap();

        clock.add_seconds(1);
        assert!(adapter.has_item("key").unwrap());
        clock.add_seconds(1);
        assert!(!adapter.has_item("key").unwrap());
        assert!(!adapter.remove_item("key").unwrap());
    }

    #[test]
    fn test_request_time_never_expires() {
        let (adapter, clock) = frozen_adapter();
        let mut adapter = adapter.with_request_time();
        assert!(adapter.capabilities().uses_request_time);

        adapter.options().adapter_options().set_ttl(1.0).unwrap();
        adapter.set_item("key", "value").unwrap();
        clock.add_seconds(10);
        assert!(adapter.has_item("key").unwrap());
    }

    #[test]
    fn test_touch_restarts_ttl() {
        let (mut adapter, clock) = frozen_adapter();
        adapter.options().adapter_options().set_ttl(2.0).unwrap();
        adapter.set_item("key", "value").unwrap();

        clock.add_seconds(1);
        assert!(adapter.touch_item("key").unwrap());
        clock.add_seconds(1);
        assert!(adapter.has_item("key").unwrap());
        clock.add_seconds(1);
        assert!(!adapter.has_item("key").unwrap());
    }

    #[test]
    fn test_cas_token_changes_on_write() {
        let mut adapter = MemoryAdapter::new();
        adapter.set_item("key", "one").unwrap();
        let token = adapter.get_item("key").unwrap().cas_token.unwrap();

        // same value, new version
        adapter.set_item("key", "one").unwrap();
        assert!(!adapter.check_and_set_item(&token, "key", "two").unwrap());
    }

    #[test]
    fn test_memory_limit() {
        let options = MemoryOptions::new();
        options.set_memory_limit(16);
        let mut adapter = MemoryAdapter::with_options(options);

        assert!(adapter.set_item("small", "a").unwrap());
        let err = adapter.set_item("large", "x".repeat(64)).unwrap_err();
        assert!(matches!(err, Error::OutOfSpace(_)));
        assert!(!adapter.has_item("large").unwrap());
        assert!(adapter.available_space().unwrap() < 16);
    }

    #[test]
    fn test_storing_releases_error_trap() {
        let trap = ErrorTrap::new();
        let mut adapter = MemoryAdapter::new().with_error_trap(trap.clone());
        adapter.set_item("key", "value").unwrap();
        assert!(!trap.is_started());
    }

    #[test]
    fn test_out_of_range_ttl_never_expires() {
        let trap = ErrorTrap::new();
        let (adapter, clock) = frozen_adapter();
        let mut adapter = adapter.with_error_trap(trap.clone());
        adapter.options().adapter_options().set_ttl(1e300).unwrap();

        assert!(adapter.set_item("key", "value").unwrap());
        assert!(!trap.is_started());
        clock.add_seconds(3600);
        assert!(adapter.has_item("key").unwrap());
        assert!(adapter.get_metadata("key").unwrap().unwrap().expires_at.is_none());
    }

    #[test]
    fn test_expired_items_free_space() {
        let options = MemoryOptions::new();
        options.set_memory_limit(40);
        let clock = Arc::new(ModifiableClock::frozen_at(Utc::now().fixed_offset()));
        let mut adapter = MemoryAdapter::with_options(options).with_clock(clock.clone());
        adapter.options().adapter_options().set_ttl(1.0).unwrap();

        adapter.set_item("a", "x".repeat(20)).unwrap();
        clock.add_seconds(10);
        assert!(!adapter.has_item("a").unwrap());
        assert_eq!(adapter.available_space().unwrap(), 40);

        assert!(adapter.set_item("b", "y".repeat(20)).unwrap());
        assert!(adapter.has_item("b").unwrap());
    }

    #[test]
    fn test_set_tags_respects_gates() {
        let mut adapter = MemoryAdapter::new();
        adapter.set_item("key", "value").unwrap();
        assert!(adapter.set_tags("key", &["a"]).unwrap());

        adapter.options().adapter_options().set_writable(false);
        assert!(!adapter.set_tags("key", &["b"]).unwrap());
        adapter.options().adapter_options().set_readable(false);
        assert_eq!(adapter.get_tags("key").unwrap(), None);

        adapter.options().adapter_options().set_readable(true);
        assert_eq!(adapter.get_tags("key").unwrap(), Some(vec!["a".to_string()]));
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let mut adapter = MemoryAdapter::new();
        adapter.set_item("key", "default").unwrap();
        adapter.options().adapter_options().set_namespace("other");
        assert!(!adapter.has_item("key").unwrap());
        adapter.set_item("key", "other").unwrap();

        adapter.clear_by_namespace("other").unwrap();
        assert!(!adapter.has_item("key").unwrap());
        adapter.options().adapter_options().set_namespace("");
        assert!(adapter.has_item("key").unwrap());
    }

    #[test]
    fn test_metadata_reports_expiry_and_tags() {
        let (mut adapter, _clock) = frozen_adapter();
        adapter.options().adapter_options().set_ttl(5.0).unwrap();
        adapter.set_item("key", "value").unwrap();
        adapter.set_tags("key", &["b", "a"]).unwrap();

        let metadata = adapter.get_metadata("key").unwrap().unwrap();
        let modified_at = metadata.modified_at.unwrap();
        assert_eq!(metadata.expires_at, Some(modified_at + TimeDelta::seconds(5)));
        assert_eq!(metadata.tags.len(), 2);
        assert_eq!(
            adapter.get_tags("key").unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_clear_expired_keeps_live_items() {
        let (mut adapter, clock) = frozen_adapter();
        adapter.options().adapter_options().set_ttl(1.0).unwrap();
        adapter.set_item("short", 1i64).unwrap();
        adapter.options().adapter_options().set_ttl(0.0).unwrap();
        adapter.set_item("forever", 2i64).unwrap();

        clock.add_seconds(2);
        adapter.clear_expired().unwrap();
        assert_eq!(adapter.len(), 1);
        assert!(adapter.has_item("forever").unwrap());
    }

    #[test]
    fn test_iter_keys_scoped_to_namespace() {
        let mut adapter = MemoryAdapter::new();
        adapter.set_item("b", 1i64).unwrap();
        adapter.set_item("a", 2i64).unwrap();
        adapter.options().adapter_options().set_namespace("other");
        adapter.set_item("c", 3i64).unwrap();

        assert_eq!(adapter.iter_keys().unwrap(), vec!["c".to_string()]);
        adapter.options().adapter_options().set_namespace("");
        assert_eq!(adapter.iter_keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }
}
