#![deny(clippy::all)]

use crate::capabilities::Capabilities;
use crate::domain::{CacheValue, CasToken, GetResponse, Metadata};
use crate::options::StorageOptions;
use shared::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

// Ports are the pluggable extension points for underlying cache implementations

/// Core storage contract every adapter implements.
///
/// Adapters supply the `internal_*` primitives; the public operations layer the
/// readable/writable gates and key validation on top of them. Optional behaviors are
/// discovered through the `as_*` accessors, which default to `None`.
pub trait Storage {
    type Options: StorageOptions;

    fn options(&self) -> &Self::Options;

    fn set_options(&mut self, options: Self::Options) -> &mut Self;

    fn capabilities(&self) -> &Capabilities;

    fn internal_get_item(&self, normalized_key: &str) -> Result<Option<(CacheValue, CasToken)>>;

    fn internal_set_item(&mut self, normalized_key: &str, value: CacheValue) -> Result<bool>;

    fn internal_remove_item(&mut self, normalized_key: &str) -> Result<bool>;

    fn internal_has_item(&self, normalized_key: &str) -> Result<bool> {
        Ok(self.internal_get_item(normalized_key)?.is_some())
    }

    fn internal_add_item(&mut self, normalized_key: &str, value: CacheValue) -> Result<bool> {
        if self.internal_has_item(normalized_key)? {
            return Ok(false);
        }
        self.internal_set_item(normalized_key, value)
    }

    fn internal_replace_item(&mut self, normalized_key: &str, value: CacheValue) -> Result<bool> {
        if !self.internal_has_item(normalized_key)? {
            return Ok(false);
        }
        self.internal_set_item(normalized_key, value)
    }

    fn internal_check_and_set_item(
        &mut self,
        token: &CasToken,
        normalized_key: &str,
        value: CacheValue,
    ) -> Result<bool> {
        match self.internal_get_item(normalized_key)? {
            Some((_, current)) if current == *token => self.internal_set_item(normalized_key, value),
            _ => Ok(false),
        }
    }

    /// Restart the TTL window by writing the current value back
    fn internal_touch_item(&mut self, normalized_key: &str) -> Result<bool> {
        match self.internal_get_item(normalized_key)? {
            Some((value, _)) => self.internal_set_item(normalized_key, value),
            None => Ok(false),
        }
    }

    fn validate_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_argument("an empty key isn't allowed"));
        }
        if !self.capabilities().max_key_length.allows(key) {
            return Err(Error::invalid_argument(format!(
                "key of {} bytes exceeds the maximum key length {:?}",
                key.len(),
                self.capabilities().max_key_length
            )));
        }
        Ok(())
    }

    fn is_readable(&self) -> bool {
        self.options().adapter_options().readable()
    }

    fn is_writable(&self) -> bool {
        self.options().adapter_options().writable()
    }

    fn has_item(&self, key: &str) -> Result<bool> {
        if !self.is_readable() {
            return Ok(false);
        }
        self.validate_key(key)?;
        self.internal_has_item(key)
    }

    /// Keys among `keys` that are present
    fn has_items(&self, keys: &[&str]) -> Result<Vec<String>> {
        if !self.is_readable() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for key in keys {
            self.validate_key(key)?;
            if self.internal_has_item(key)? {
                found.push(key.to_string());
            }
        }
        Ok(found)
    }

    fn get_item(&self, key: &str) -> Result<GetResponse> {
        if !self.is_readable() {
            return Ok(GetResponse::missing());
        }
        self.validate_key(key)?;
        Ok(match self.internal_get_item(key)? {
            Some((value, token)) => GetResponse::found(value, token),
            None => GetResponse::missing(),
        })
    }

    /// Values of the keys among `keys` that are present
    fn get_items(&self, keys: &[&str]) -> Result<BTreeMap<String, CacheValue>> {
        if !self.is_readable() {
            return Ok(BTreeMap::new());
        }
        let mut found = BTreeMap::new();
        for key in keys {
            self.validate_key(key)?;
            if let Some((value, _)) = self.internal_get_item(key)? {
                found.insert(key.to_string(), value);
            }
        }
        Ok(found)
    }

    fn set_item(&mut self, key: &str, value: impl Into<CacheValue>) -> Result<bool> {
        if !self.is_writable() {
            debug!("storage is not writable, rejecting set of '{}'", key);
            return Ok(false);
        }
        self.validate_key(key)?;
        self.internal_set_item(key, value.into())
    }

    /// Returns the keys that could not be stored
    fn set_items(&mut self, items: &[(&str, CacheValue)]) -> Result<Vec<String>> {
        self.write_each(items, |storage, key, value| storage.internal_set_item(key, value))
    }

    fn add_item(&mut self, key: &str, value: impl Into<CacheValue>) -> Result<bool> {
        if !self.is_writable() {
            return Ok(false);
        }
        self.validate_key(key)?;
        self.internal_add_item(key, value.into())
    }

    fn add_items(&mut self, items: &[(&str, CacheValue)]) -> Result<Vec<String>> {
        self.write_each(items, |storage, key, value| storage.internal_add_item(key, value))
    }

    fn replace_item(&mut self, key: &str, value: impl Into<CacheValue>) -> Result<bool> {
        if !self.is_writable() {
            return Ok(false);
        }
        self.validate_key(key)?;
        self.internal_replace_item(key, value.into())
    }

    fn replace_items(&mut self, items: &[(&str, CacheValue)]) -> Result<Vec<String>> {
        self.write_each(items, |storage, key, value| {
            storage.internal_replace_item(key, value)
        })
    }

    fn remove_item(&mut self, key: &str) -> Result<bool> {
        if !self.is_writable() {
            return Ok(false);
        }
        self.validate_key(key)?;
        self.internal_remove_item(key)
    }

    /// Returns the keys that were not present
    fn remove_items(&mut self, keys: &[&str]) -> Result<Vec<String>> {
        if !self.is_writable() {
            return Ok(keys.iter().map(|key| key.to_string()).collect());
        }
        let mut missing = Vec::new();
        for key in keys {
            self.validate_key(key)?;
            if !self.internal_remove_item(key)? {
                missing.push(key.to_string());
            }
        }
        Ok(missing)
    }

    /// Write `value` only if the item still carries `token`
    fn check_and_set_item(
        &mut self,
        token: &CasToken,
        key: &str,
        value: impl Into<CacheValue>,
    ) -> Result<bool> {
        if !self.is_writable() {
            return Ok(false);
        }
        self.validate_key(key)?;
        self.internal_check_and_set_item(token, key, value.into())
    }

    fn touch_item(&mut self, key: &str) -> Result<bool> {
        if !self.is_writable() {
            return Ok(false);
        }
        self.validate_key(key)?;
        self.internal_touch_item(key)
    }

    /// Returns the keys that could not be touched
    fn touch_items(&mut self, keys: &[&str]) -> Result<Vec<String>> {
        if !self.is_writable() {
            return Ok(keys.iter().map(|key| key.to_string()).collect());
        }
        let mut failed = Vec::new();
        for key in keys {
            self.validate_key(key)?;
            if !self.internal_touch_item(key)? {
                failed.push(key.to_string());
            }
        }
        Ok(failed)
    }

    #[doc(hidden)]
    fn write_each<F>(&mut self, items: &[(&str, CacheValue)], mut write: F) -> Result<Vec<String>>
    where
        F: FnMut(&mut Self, &str, CacheValue) -> Result<bool>,
    {
        if !self.is_writable() {
            return Ok(items.iter().map(|(key, _)| key.to_string()).collect());
        }
        let mut failed = Vec::new();
        for (key, value) in items {
            self.validate_key(key)?;
            if !write(self, *key, value.clone())? {
                failed.push(key.to_string());
            }
        }
        Ok(failed)
    }

    fn as_metadata_capable(&self) -> Option<&dyn MetadataCapable> {
        None
    }

    fn as_iterable(&self) -> Option<&dyn Iterable> {
        None
    }

    fn as_flushable(&mut self) -> Option<&mut dyn Flushable> {
        None
    }

    fn as_optimizable(&mut self) -> Option<&mut dyn Optimizable> {
        None
    }

    fn as_clear_by_prefix(&mut self) -> Option<&mut dyn ClearByPrefix> {
        None
    }

    fn as_clear_by_namespace(&mut self) -> Option<&mut dyn ClearByNamespace> {
        None
    }

    fn as_clear_expired(&mut self) -> Option<&mut dyn ClearExpired> {
        None
    }

    fn as_taggable(&mut self) -> Option<&mut dyn Taggable> {
        None
    }

    fn as_total_space_capable(&self) -> Option<&dyn TotalSpaceCapable> {
        None
    }

    fn as_available_space_capable(&self) -> Option<&dyn AvailableSpaceCapable> {
        None
    }
}

pub trait MetadataCapable {
    /// `None` for missing items and for non-readable storage
    fn get_metadata(&self, key: &str) -> Result<Option<Metadata>>;

    fn get_metadatas(&self, keys: &[&str]) -> Result<BTreeMap<String, Metadata>> {
        let mut found = BTreeMap::new();
        for key in keys {
            if let Some(metadata) = self.get_metadata(key)? {
                found.insert(key.to_string(), metadata);
            }
        }
        Ok(found)
    }
}

pub trait Iterable {
    /// Keys stored under the active namespace
    fn iter_keys(&self) -> Result<Vec<String>>;
}

pub trait Flushable {
    /// Remove every item of every namespace
    fn flush(&mut self) -> Result<bool>;
}

pub trait Optimizable {
    fn optimize(&mut self) -> Result<bool>;
}

pub trait ClearByPrefix {
    /// Remove items of the active namespace whose key starts with `prefix`.
    /// An empty prefix is an invalid argument.
    fn clear_by_prefix(&mut self, prefix: &str) -> Result<bool>;
}

pub trait ClearByNamespace {
    /// Remove every item stored under `namespace`.
    /// An empty namespace is an invalid argument.
    fn clear_by_namespace(&mut self, namespace: &str) -> Result<bool>;
}

pub trait ClearExpired {
    fn clear_expired(&mut self) -> Result<bool>;
}

/// How a tag list selects items for clearing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagMatch {
    /// Items carrying at least one of the tags
    Any,
    /// Items carrying every one of the tags
    All,
}

impl TagMatch {
    pub fn matches(self, item_tags: &BTreeSet<String>, tags: &[&str]) -> bool {
        match self {
            TagMatch::Any => tags.iter().any(|tag| item_tags.contains(*tag)),
            TagMatch::All => !tags.is_empty() && tags.iter().all(|tag| item_tags.contains(*tag)),
        }
    }
}

pub trait Taggable {
    /// Replace the tag set of an existing item
    fn set_tags(&mut self, key: &str, tags: &[&str]) -> Result<bool>;

    /// Sorted tags of an item, `None` when the item is missing
    fn get_tags(&self, key: &str) -> Result<Option<Vec<String>>>;

    fn clear_by_tags(&mut self, tags: &[&str], mode: TagMatch) -> Result<bool>;
}

pub trait TotalSpaceCapable {
    /// Total capacity in bytes
    fn total_space(&self) -> Result<u64>;
}

pub trait AvailableSpaceCapable {
    /// Remaining capacity in bytes
    fn available_space(&self) -> Result<u64>;
}

/// Reject an empty prefix or namespace argument
pub fn require_non_empty(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid_argument(format!("an empty {} isn't allowed", what)));
    }
    Ok(())
}
