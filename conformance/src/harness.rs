//! The behaviors every storage adapter has to show.
//!
//! Each behavior is a method on [`CommonAdapterTest`] returning an [`Outcome`]: a
//! behavior whose capability the adapter lacks reports [`Outcome::Skipped`], a broken
//! expectation panics, and adapter errors propagate as `Err`.

use crate::logging::init_test_logging;
use crate::time::TimeControl;
use carbon::capabilities::{Capabilities, MaxKeyLength, TypeSupport};
use carbon::domain::{CacheValue, DataKind};
use carbon::iterator::{IteratorEntry, IteratorMode, KeyListIterator};
use carbon::options::{AdapterOptions, StorageOptions};
use carbon::ports::{Storage, TagMatch};
use rand::Rng;
use serde_json::{Map, Value};
use shared::config::HarnessConfig;
use shared::{Error, ErrorTrap, Result};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Skipped(String),
}

fn skip(reason: impl Into<String>) -> Result<Outcome> {
    Ok(Outcome::Skipped(reason.into()))
}

/// Re-borrow a capability that was already checked to be present
fn require<C>(capability: Option<C>, name: &str) -> Result<C> {
    capability.ok_or_else(|| Error::Internal(format!("adapter stopped being {}", name)))
}

fn items(pairs: &[(&'static str, &'static str)]) -> Vec<(&'static str, CacheValue)> {
    pairs
        .iter()
        .map(|(key, value)| (*key, CacheValue::from(*value)))
        .collect()
}

fn value_map(pairs: &[(&str, &str)]) -> BTreeMap<String, CacheValue> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), CacheValue::from(*value)))
        .collect()
}

fn key_list<'a>(items: &[(&'a str, CacheValue)]) -> Vec<&'a str> {
    items.iter().map(|(key, _)| *key).collect()
}

/// Seconds as a duration, saturating on out of range input
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

fn string(value: &str) -> Option<CacheValue> {
    Some(CacheValue::from(value))
}

/// A representative value of every kind
pub fn sample_value(kind: DataKind) -> CacheValue {
    match kind {
        DataKind::Null => CacheValue::Null,
        DataKind::Bool => CacheValue::Bool(true),
        DataKind::Int => CacheValue::Int(12345),
        DataKind::Float => CacheValue::Float(123.45),
        DataKind::Str => CacheValue::from("string"),
        DataKind::Seq => CacheValue::Seq(vec![
            CacheValue::from("one"),
            CacheValue::from("two"),
            CacheValue::Seq(vec![CacheValue::from("four")]),
        ]),
        DataKind::Record => {
            let mut two = BTreeMap::new();
            two.insert("three".to_string(), CacheValue::from("three"));
            let mut record = BTreeMap::new();
            record.insert("one".to_string(), CacheValue::from("one"));
            record.insert("two".to_string(), CacheValue::Record(two));
            CacheValue::Record(record)
        }
        DataKind::Binary => CacheValue::Binary(b"binary".to_vec()),
    }
}

/// Fixture around one adapter instance, living for exactly one behavior.
///
/// `options` is a handle on the adapter's own options, so changes made through it
/// apply to the adapter immediately.
pub struct CommonAdapterTest<S: Storage, T: TimeControl> {
    pub storage: S,
    pub options: S::Options,
    pub time: T,
    pub config: HarnessConfig,
    pub error_trap: ErrorTrap,
}

impl<S: Storage, T: TimeControl> CommonAdapterTest<S, T> {
    pub fn new(storage: S, time: T) -> Self {
        let options = storage.options().clone();
        Self {
            storage,
            options,
            time,
            config: HarnessConfig::from_env(),
            error_trap: ErrorTrap::new(),
        }
    }

    /// Use a trap the adapter was built with
    pub fn with_error_trap(mut self, error_trap: ErrorTrap) -> Self {
        self.error_trap = error_trap;
        self
    }

    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// Fails when an error trapping region was left open, then flushes the storage
    pub fn tear_down(&mut self) -> Result<()> {
        if self.error_trap.is_started() {
            let open = self.error_trap.release_all();
            panic!("Error trap not stopped ({} region(s) left open)", open);
        }

        if let Some(flushable) = self.storage.as_flushable() {
            flushable.flush()?;
        }
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        self.storage.capabilities().clone()
    }

    fn adapter_options(&self) -> &AdapterOptions {
        self.options.adapter_options()
    }

    /// Wait long enough for an item with `ttl` to be gone
    fn wait_for_expiry(&self, ttl: f64, precision: f64) {
        self.time
            .advance_time(seconds(ttl + precision * self.config.expiry_margin));
    }

    fn wait_for_full_second(&self) {
        self.time.align_to_full_second();
    }

    fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        Ok(self.storage.get_item(key)?.into_value())
    }

    fn option_fields(&self) -> Result<Map<String, Value>> {
        match self.storage.options().to_value()? {
            Value::Object(fields) => Ok(fields),
            other => Err(Error::Internal(format!(
                "options must serialize to an object, got {}",
                other
            ))),
        }
    }

    pub fn getters_and_setters_of_options_exist(&mut self) -> Result<Outcome> {
        let options = self.storage.options();
        for (name, current) in self.option_fields()? {
            let Some(accessor) = S::Options::accessor(&name) else {
                panic!("Missing accessor for option '{}'", name);
            };
            assert_eq!(
                (accessor.get)(options),
                current,
                "Getter of '{}' disagrees with the serialized options",
                name
            );
        }
        Ok(Outcome::Passed)
    }

    pub fn options_get_and_set_default(&mut self) -> Result<Outcome> {
        let options = self.storage.options().clone();
        self.storage.set_options(options.clone());
        assert!(self.storage.options().same_instance(&options));
        Ok(Outcome::Passed)
    }

    pub fn options_fluent_interface(&mut self) -> Result<Outcome> {
        let options = self.storage.options().clone();
        for (name, current) in self.option_fields()? {
            let Some(accessor) = S::Options::accessor(&name) else {
                panic!("Missing accessor for option '{}'", name);
            };
            let returned = (accessor.set)(&options, current)?;
            assert!(
                std::ptr::eq(returned, &options),
                "Setter of '{}' doesn't implement the fluent interface",
                name
            );
        }

        let storage: *const S = &self.storage;
        let returned: *const S = self.storage.set_options(options);
        assert!(
            std::ptr::eq(returned, storage),
            "set_options doesn't implement the fluent interface"
        );
        Ok(Outcome::Passed)
    }

    pub fn data_types_capability(&mut self) -> Result<Outcome> {
        let capabilities = self.capabilities();
        for (source, support) in &capabilities.supported_data_types {
            assert!(
                DataKind::ALL.contains(source),
                "Unknown source type '{}'",
                source
            );
            if let TypeSupport::Coerced(target) = support {
                assert!(
                    DataKind::ALL.contains(target),
                    "Unknown target type '{}'",
                    target
                );
                assert_ne!(
                    target, source,
                    "'{}' coerced into itself should be reported as exact",
                    source
                );
            }
        }
        Ok(Outcome::Passed)
    }

    pub fn ttl_capabilities(&mut self) -> Result<Outcome> {
        let precision = self.capabilities().ttl_precision;
        assert!(precision.is_finite() && precision > 0.0);
        Ok(Outcome::Passed)
    }

    pub fn key_capabilities(&mut self) -> Result<Outcome> {
        if let MaxKeyLength::Limited(max) = self.capabilities().max_key_length {
            assert!(max >= 1, "A limited key length must allow at least one byte");
        }
        Ok(Outcome::Passed)
    }

    pub fn has_item_returns_true_on_valid_item(&mut self) -> Result<Outcome> {
        assert!(self.storage.set_item("key", "value")?);
        assert!(self.storage.has_item("key")?);
        Ok(Outcome::Passed)
    }

    pub fn has_item_returns_false_on_missing_item(&mut self) -> Result<Outcome> {
        assert!(!self.storage.has_item("key")?);
        Ok(Outcome::Passed)
    }

    pub fn has_item_returns_false_on_expired_item(&mut self) -> Result<Outcome> {
        let capabilities = self.capabilities();
        if !capabilities.ttl_supported {
            return skip("Adapter doesn't support item expiration");
        }

        let ttl = capabilities.ttl_precision;
        self.adapter_options().set_ttl(ttl)?;

        self.wait_for_full_second();
        assert!(self.storage.set_item("key", "value")?);

        self.wait_for_expiry(ttl, capabilities.ttl_precision);
        if !capabilities.uses_request_time {
            assert!(!self.storage.has_item("key")?);
        } else {
            assert!(self.storage.has_item("key")?);
        }
        Ok(Outcome::Passed)
    }

    pub fn has_item_non_readable(&mut self) -> Result<Outcome> {
        assert!(self.storage.set_item("key", "value")?);

        self.adapter_options().set_readable(false);
        assert!(!self.storage.has_item("key")?);
        Ok(Outcome::Passed)
    }

    pub fn has_items_returns_keys_of_found_items(&mut self) -> Result<Outcome> {
        assert!(self.storage.set_item("key1", "value1")?);
        assert!(self.storage.set_item("key2", "value2")?);

        let mut found = self.storage.has_items(&["missing", "key1", "key2"])?;
        found.sort();
        assert_eq!(found, vec!["key1", "key2"]);
        Ok(Outcome::Passed)
    }

    pub fn has_items_returns_empty_array_if_non_readable(&mut self) -> Result<Outcome> {
        assert!(self.storage.set_item("key", "value")?);

        self.adapter_options().set_readable(false);
        assert!(self.storage.has_items(&["key"])?.is_empty());
        Ok(Outcome::Passed)
    }

    pub fn get_item_returns_absent_on_missing_item(&mut self) -> Result<Outcome> {
        assert_eq!(self.get("unknown")?, None);
        Ok(Outcome::Passed)
    }

    pub fn get_item_reports_found_flag(&mut self) -> Result<Outcome> {
        let missing = self.storage.get_item("unknown")?;
        assert!(!missing.found);
        assert!(missing.cas_token.is_none());

        // a stored null is still found
        if self.capabilities().support_for(DataKind::Null) == TypeSupport::Exact {
            assert!(self.storage.set_item("null", CacheValue::Null)?);
            let null = self.storage.get_item("null")?;
            assert!(null.found);
            assert_eq!(null.value, Some(CacheValue::Null));
        }

        self.storage.set_item("test", "test")?;
        assert!(self.storage.get_item("test")?.found);
        Ok(Outcome::Passed)
    }

    pub fn get_item_returns_absent_on_expired_item(&mut self) -> Result<Outcome> {
        let capabilities = self.capabilities();
        if !capabilities.ttl_supported {
            return skip("Adapter doesn't support item expiration");
        }
        if capabilities.uses_request_time {
            return skip("Can't test get expired item if request time will be used");
        }

        let ttl = capabilities.ttl_precision;
        self.adapter_options().set_ttl(ttl)?;

        self.wait_for_full_second();
        self.storage.set_item("key", "value")?;

        self.wait_for_expiry(ttl, capabilities.ttl_precision);
        let response = self.storage.get_item("key")?;
        assert!(!response.found);
        assert_eq!(response.value, None);
        Ok(Outcome::Passed)
    }

    pub fn get_item_returns_absent_if_non_readable(&mut self) -> Result<Outcome> {
        self.adapter_options().set_readable(false);

        assert!(self.storage.set_item("key", "value")?);
        assert_eq!(self.get("key")?, None);
        Ok(Outcome::Passed)
    }

    pub fn get_items_returns_key_value_pairs_of_found_items(&mut self) -> Result<Outcome> {
        assert!(self.storage.set_item("key1", "value1")?);
        assert!(self.storage.set_item("key2", "value2")?);

        let found = self.storage.get_items(&["missing", "key1", "key2"])?;
        assert_eq!(found, value_map(&[("key1", "value1"), ("key2", "value2")]));
        Ok(Outcome::Passed)
    }

    pub fn get_items_returns_empty_map_if_non_readable(&mut self) -> Result<Outcome> {
        self.adapter_options().set_readable(false);

        assert!(self.storage.set_item("key", "value")?);
        assert!(self.storage.get_items(&["key"])?.is_empty());
        Ok(Outcome::Passed)
    }

    pub fn get_metadata(&mut self) -> Result<Outcome> {
        if self.storage.as_metadata_capable().is_none() {
            return skip("Storage doesn't implement the metadata capability");
        }

        assert!(self.storage.set_item("key", "value")?);
        let metadata = require(self.storage.as_metadata_capable(), "metadata capable")?
            .get_metadata("key")?;
        assert!(metadata.is_some());
        Ok(Outcome::Passed)
    }

    pub fn get_metadata_returns_none_on_missing_item(&mut self) -> Result<Outcome> {
        let Some(metadata) = self.storage.as_metadata_capable() else {
            return skip("Storage doesn't implement the metadata capability");
        };
        assert!(metadata.get_metadata("unknown")?.is_none());
        Ok(Outcome::Passed)
    }

    pub fn get_metadata_returns_none_if_non_readable(&mut self) -> Result<Outcome> {
        if self.storage.as_metadata_capable().is_none() {
            return skip("Storage doesn't implement the metadata capability");
        }
        self.adapter_options().set_readable(false);

        assert!(self.storage.set_item("key", "value")?);
        let metadata = require(self.storage.as_metadata_capable(), "metadata capable")?
            .get_metadata("key")?;
        assert!(metadata.is_none());
        Ok(Outcome::Passed)
    }

    pub fn get_metadatas(&mut self) -> Result<Outcome> {
        if self.storage.as_metadata_capable().is_none() {
            return skip("Storage doesn't implement the metadata capability");
        }

        let stored = items(&[("key1", "value1"), ("key2", "value2")]);
        assert!(self.storage.set_items(&stored)?.is_empty());

        let metadatas = require(self.storage.as_metadata_capable(), "metadata capable")?
            .get_metadatas(&key_list(&stored))?;
        assert_eq!(metadatas.len(), stored.len());
        Ok(Outcome::Passed)
    }

    pub fn get_metadatas_with_empty_namespace(&mut self) -> Result<Outcome> {
        self.adapter_options().set_namespace("");
        self.get_metadatas()
    }

    pub fn get_metadatas_returns_empty_map_if_non_readable(&mut self) -> Result<Outcome> {
        if self.storage.as_metadata_capable().is_none() {
            return skip("Storage doesn't implement the metadata capability");
        }
        self.adapter_options().set_readable(false);

        assert!(self.storage.set_item("key", "value")?);
        let metadatas = require(self.storage.as_metadata_capable(), "metadata capable")?
            .get_metadatas(&["key"])?;
        assert!(metadatas.is_empty());
        Ok(Outcome::Passed)
    }

    pub fn set_get_has_and_remove_item_without_namespace(&mut self) -> Result<Outcome> {
        self.storage.options().adapter_options().set_namespace("");

        assert!(self.storage.set_item("key", "value")?);
        assert_eq!(self.get("key")?, string("value"));
        assert!(self.storage.has_item("key")?);

        assert!(self.storage.remove_item("key")?);
        assert!(!self.storage.has_item("key")?);
        assert_eq!(self.get("key")?, None);
        Ok(Outcome::Passed)
    }

    pub fn set_get_has_and_remove_items_without_namespace(&mut self) -> Result<Outcome> {
        self.storage.options().adapter_options().set_namespace("");
        self.set_get_has_and_remove_items()
    }

    pub fn set_get_has_and_remove_item_with_namespace(&mut self) -> Result<Outcome> {
        self.adapter_options().set_namespace("defaultns1");
        assert!(self.storage.set_item("key", "defaultns1")?);

        self.adapter_options().set_namespace("defaultns2");
        assert!(self.storage.set_item("key", "defaultns2")?);

        assert!(self.storage.has_item("key")?);
        assert_eq!(self.get("key")?, string("defaultns2"));

        self.adapter_options().set_namespace("defaultns1");
        assert!(self.storage.has_item("key")?);
        assert_eq!(self.get("key")?, string("defaultns1"));

        assert!(self.storage.remove_item("key")?);
        assert!(!self.storage.has_item("key")?);

        self.adapter_options().set_namespace("defaultns2");
        assert!(self.storage.remove_item("key")?);
        assert!(!self.storage.has_item("key")?);
        Ok(Outcome::Passed)
    }

    pub fn set_get_has_and_remove_items_with_namespace(&mut self) -> Result<Outcome> {
        let all = items(&[("key1", "value1"), ("key2", "value2"), ("key3", "value3")]);

        self.adapter_options().set_namespace("defaultns1");
        assert!(self.storage.set_items(&all)?.is_empty());

        self.adapter_options().set_namespace("defaultns2");
        assert!(self.storage.has_items(&key_list(&all))?.is_empty());

        self.adapter_options().set_namespace("defaultns1");
        self.check_stored(&all)?;

        assert_eq!(
            self.storage.remove_items(&["missing", "key1", "key3"])?,
            vec!["missing"]
        );
        self.check_stored(&items(&[("key2", "value2")]))?;
        Ok(Outcome::Passed)
    }

    fn set_get_has_and_remove_items(&mut self) -> Result<Outcome> {
        let all = items(&[("key1", "value1"), ("key2", "value2"), ("key3", "value3")]);
        assert!(self.storage.set_items(&all)?.is_empty());
        self.check_stored(&all)?;

        assert_eq!(
            self.storage.remove_items(&["missing", "key1", "key3"])?,
            vec!["missing"]
        );
        self.check_stored(&items(&[("key2", "value2")]))?;
        Ok(Outcome::Passed)
    }

    /// Every item reads back and is reported present
    fn check_stored(&self, expected: &[(&str, CacheValue)]) -> Result<()> {
        let keys = key_list(expected);
        let found = self.storage.get_items(&keys)?;
        for (key, value) in expected {
            assert_eq!(found.get(*key), Some(value), "Unexpected value of '{}'", key);
        }

        let present = self.storage.has_items(&keys)?;
        assert_eq!(present.len(), expected.len());
        for key in &keys {
            assert!(present.iter().any(|found| found == key), "'{}' is missing", key);
        }
        Ok(())
    }

    pub fn set_and_get_expired_item(&mut self) -> Result<Outcome> {
        let capabilities = self.capabilities();
        if !capabilities.ttl_supported {
            return skip("Adapter doesn't support item expiration");
        }

        let ttl = capabilities.ttl_precision;
        self.adapter_options().set_ttl(ttl)?;

        self.wait_for_full_second();
        self.storage.set_item("key", "value")?;

        self.wait_for_expiry(ttl, capabilities.ttl_precision);
        if capabilities.uses_request_time {
            assert_eq!(self.get("key")?, string("value"));
            return Ok(Outcome::Passed);
        }

        assert_eq!(self.get("key")?, None);
        Ok(Outcome::Passed)
    }

    pub fn set_and_get_expired_items(&mut self) -> Result<Outcome> {
        let capabilities = self.capabilities();
        if !capabilities.ttl_supported {
            return skip("Adapter doesn't support item expiration");
        }

        let high = [
            ("keyHigh1", "valueHigh1"),
            ("keyHigh2", "valueHigh2"),
            ("keyHigh3", "valueHigh3"),
        ];
        let low = [
            ("keyLow1", "valueLow1"),
            ("keyLow2", "valueLow2"),
            ("keyLow3", "valueLow3"),
        ];
        let keys: Vec<&str> = high.iter().chain(low.iter()).map(|(key, _)| *key).collect();

        self.adapter_options().set_ttl(123456.0)?;
        assert!(self.storage.set_items(&items(&high))?.is_empty());

        let ttl = capabilities.ttl_precision;
        self.adapter_options().set_ttl(ttl)?;
        self.wait_for_full_second();
        assert!(self.storage.set_items(&items(&low))?.is_empty());

        self.wait_for_expiry(ttl, capabilities.ttl_precision);
        let found = self.storage.get_items(&keys)?;

        if capabilities.uses_request_time {
            let all: Vec<(&str, &str)> = high.iter().chain(low.iter()).copied().collect();
            assert_eq!(found, value_map(&all));
        } else {
            assert_eq!(found, value_map(&high));
            // a second read must not resurrect the expired items
            assert_eq!(self.storage.get_items(&keys)?, value_map(&high));
        }
        Ok(Outcome::Passed)
    }

    pub fn set_and_get_item_of_different_types(&mut self) -> Result<Outcome> {
        let capabilities = self.capabilities();
        for (kind, support) in &capabilities.supported_data_types {
            let value = sample_value(*kind);
            match support {
                TypeSupport::Unsupported => continue,
                TypeSupport::Exact => {
                    assert!(
                        self.storage.set_item("key", value.clone())?,
                        "Failed to set type '{}'",
                        kind
                    );
                    let stored = self.get("key")?;
                    assert!(
                        stored.as_ref().is_some_and(|stored| stored.is_identical(&value)),
                        "'{}' didn't round-trip identically, got {:?}",
                        kind,
                        stored
                    );
                }
                TypeSupport::Coerced(target) => {
                    assert!(
                        self.storage.set_item("key", value.clone())?,
                        "Failed to set type '{}'",
                        kind
                    );
                    assert_eq!(
                        self.get("key")?,
                        value.coerce_to(*target),
                        "'{}' didn't come back as '{}'",
                        kind,
                        target
                    );
                }
            }
        }
        Ok(Outcome::Passed)
    }

    pub fn set_item_returns_false_if_non_writable(&mut self) -> Result<Outcome> {
        self.adapter_options().set_writable(false);

        assert!(!self.storage.set_item("key", "value")?);
        assert!(!self.storage.has_item("key")?);
        Ok(Outcome::Passed)
    }

    pub fn add_new_item(&mut self) -> Result<Outcome> {
        assert!(self.storage.add_item("key", "value")?);
        assert!(self.storage.has_item("key")?);
        Ok(Outcome::Passed)
    }

    pub fn add_item_returns_false_if_item_already_exists(&mut self) -> Result<Outcome> {
        assert!(self.storage.set_item("key", "value")?);
        assert!(!self.storage.add_item("key", "newValue")?);
        assert_eq!(self.get("key")?, string("value"));
        Ok(Outcome::Passed)
    }

    pub fn add_item_returns_false_if_non_writable(&mut self) -> Result<Outcome> {
        self.adapter_options().set_writable(false);

        assert!(!self.storage.add_item("key", "value")?);
        assert!(!self.storage.has_item("key")?);
        Ok(Outcome::Passed)
    }

    pub fn add_items_returns_failed_keys(&mut self) -> Result<Outcome> {
        assert!(self.storage.set_item("key1", "value1")?);

        let failed = self
            .storage
            .add_items(&items(&[("key1", "XYZ"), ("key2", "value2")]))?;
        assert_eq!(failed, vec!["key1"]);
        assert_eq!(self.get("key1")?, string("value1"));
        assert!(self.storage.has_item("key2")?);
        Ok(Outcome::Passed)
    }

    pub fn add_item_sets_ttl(&mut self) -> Result<Outcome> {
        let capabilities = self.capabilities();
        if !capabilities.ttl_supported {
            return skip("Adapter doesn't support item expiration");
        }

        let ttl = capabilities.ttl_precision;
        self.adapter_options().set_ttl(ttl)?;

        self.wait_for_full_second();
        assert!(self.storage.add_item("key", "value")?);

        self.wait_for_expiry(ttl, capabilities.ttl_precision);
        if !capabilities.uses_request_time {
            assert!(!self.storage.has_item("key")?);
        } else {
            assert!(self.storage.has_item("key")?);
        }
        Ok(Outcome::Passed)
    }

    pub fn replace_existing_item(&mut self) -> Result<Outcome> {
        assert!(self.storage.set_item("key", "value")?);
        assert!(self.storage.replace_item("key", "anOtherValue")?);
        assert_eq!(self.get("key")?, string("anOtherValue"));
        Ok(Outcome::Passed)
    }

    pub fn replace_item_returns_false_on_missing_item(&mut self) -> Result<Outcome> {
        assert!(!self.storage.replace_item("missingKey", "value")?);
        assert!(!self.storage.has_item("missingKey")?);
        Ok(Outcome::Passed)
    }

    pub fn replace_item_returns_false_if_non_writable(&mut self) -> Result<Outcome> {
        self.storage.set_item("key", "value")?;
        self.adapter_options().set_writable(false);

        assert!(!self.storage.replace_item("key", "newvalue")?);
        assert_eq!(self.get("key")?, string("value"));
        Ok(Outcome::Passed)
    }

    pub fn replace_items_returns_failed_keys(&mut self) -> Result<Outcome> {
        assert!(self.storage.set_item("key1", "value1")?);

        let failed = self
            .storage
            .replace_items(&items(&[("key1", "XYZ"), ("key2", "value2")]))?;
        assert_eq!(failed, vec!["key2"]);
        assert_eq!(self.get("key1")?, string("XYZ"));
        assert!(!self.storage.has_item("key2")?);
        Ok(Outcome::Passed)
    }

    /// `add_item` fails exactly when `has_item` holds, `replace_item` exactly when it doesn't
    pub fn add_and_replace_are_complementary(&mut self) -> Result<Outcome> {
        for key in ["key1", "key2"] {
            let present = self.storage.has_item(key)?;
            assert!(!present);
            assert!(!self.storage.replace_item(key, "replaced")?);
            assert!(self.storage.add_item(key, "added")?);

            assert!(self.storage.has_item(key)?);
            assert!(!self.storage.add_item(key, "added again")?);
            assert!(self.storage.replace_item(key, "replaced")?);
            assert_eq!(self.get(key)?, string("replaced"));
        }
        Ok(Outcome::Passed)
    }

    pub fn remove_item_returns_false_on_missing_item(&mut self) -> Result<Outcome> {
        assert!(!self.storage.remove_item("missing")?);
        Ok(Outcome::Passed)
    }

    pub fn remove_items_returns_missing_keys(&mut self) -> Result<Outcome> {
        self.storage.set_item("key", "value")?;
        assert_eq!(self.storage.remove_items(&["key", "missing"])?, vec!["missing"]);
        Ok(Outcome::Passed)
    }

    pub fn check_and_set_item(&mut self) -> Result<Outcome> {
        assert!(self.storage.set_item("key", "value")?);

        let response = self.storage.get_item("key")?;
        assert_eq!(response.value, string("value"));
        let Some(token) = response.cas_token else {
            panic!("A found item must carry a CAS token");
        };

        assert!(self.storage.check_and_set_item(&token, "key", "newValue")?);
        assert!(!self.storage.check_and_set_item(&token, "key", "failedValue")?);
        assert_eq!(self.get("key")?, string("newValue"));
        Ok(Outcome::Passed)
    }

    pub fn touch_item(&mut self) -> Result<Outcome> {
        let capabilities = self.capabilities();
        if !capabilities.ttl_supported {
            return skip("Adapter doesn't support item expiration");
        }

        let precision = capabilities.ttl_precision;
        self.adapter_options().set_ttl(2.0 * precision)?;

        self.wait_for_full_second();
        let wait_initial = seconds(precision);

        assert!(self.storage.set_item("key", "value")?);

        // touch once before the item expires
        self.time.advance_time(wait_initial);
        assert!(self.storage.touch_item("key")?);

        self.time.advance_time(wait_initial);
        assert!(self.storage.has_item("key")?);

        if !capabilities.uses_request_time {
            let wait_extended = seconds(precision * self.config.expiry_margin);
            self.time.advance_time(wait_extended);
            assert!(!self.storage.has_item("key")?);
        }
        Ok(Outcome::Passed)
    }

    pub fn touch_item_returns_false_on_missing_item(&mut self) -> Result<Outcome> {
        assert!(!self.storage.touch_item("missing")?);
        Ok(Outcome::Passed)
    }

    pub fn touch_item_returns_false_if_non_writable(&mut self) -> Result<Outcome> {
        self.adapter_options().set_writable(false);

        assert!(!self.storage.touch_item("key")?);
        Ok(Outcome::Passed)
    }

    pub fn touch_items_returns_given_keys_if_non_writable(&mut self) -> Result<Outcome> {
        self.adapter_options().set_writable(false);
        assert_eq!(self.storage.touch_items(&["key"])?, vec!["key"]);
        Ok(Outcome::Passed)
    }

    pub fn optimize(&mut self) -> Result<Outcome> {
        let Some(optimizable) = self.storage.as_optimizable() else {
            return skip("Storage doesn't implement the optimize capability");
        };
        assert!(optimizable.optimize()?);
        Ok(Outcome::Passed)
    }

    pub fn iterator(&mut self) -> Result<Outcome> {
        if self.storage.as_iterable().is_none() {
            return skip("Storage doesn't implement the iteration capability");
        }

        let stored = [("key1", "value1"), ("key2", "value2")];
        assert!(self.storage.set_items(&items(&stored))?.is_empty());

        let mut listed = require(self.storage.as_iterable(), "iterable")?.iter_keys()?;
        listed.sort();
        assert_eq!(listed, vec!["key1", "key2"]);

        let mut iterator = KeyListIterator::new(&self.storage, listed);
        assert_eq!(iterator.mode(), IteratorMode::Key);

        let mut keys = Vec::new();
        for entry in iterator.by_ref() {
            keys.push(entry?.key().to_string());
        }
        keys.sort();
        assert_eq!(keys, vec!["key1", "key2"]);

        iterator.set_mode(IteratorMode::KeyValue);
        iterator.rewind();
        let mut pairs = BTreeMap::new();
        for entry in iterator {
            match entry? {
                IteratorEntry::KeyValue(key, value) => {
                    pairs.insert(key, value);
                }
                other => panic!("Expected a key-value entry, got {:?}", other),
            }
        }
        assert_eq!(pairs, value_map(&stored));
        Ok(Outcome::Passed)
    }

    pub fn flush(&mut self) -> Result<Outcome> {
        if self.storage.as_flushable().is_none() {
            return skip("Storage doesn't implement the flush capability");
        }

        let stored = items(&[("key1", "value1"), ("key2", "value2")]);
        assert!(self.storage.set_items(&stored)?.is_empty());

        assert!(require(self.storage.as_flushable(), "flushable")?.flush()?);
        assert!(!self.storage.has_item("key1")?);
        assert!(!self.storage.has_item("key2")?);
        Ok(Outcome::Passed)
    }

    pub fn clear_by_prefix(&mut self) -> Result<Outcome> {
        if self.storage.as_clear_by_prefix().is_none() {
            return skip("Storage doesn't implement the clear-by-prefix capability");
        }

        let stored = items(&[("key1", "value1"), ("key2", "value2"), ("test", "value")]);
        assert!(self.storage.set_items(&stored)?.is_empty());

        let clearable = require(self.storage.as_clear_by_prefix(), "clearable by prefix")?;
        assert!(clearable.clear_by_prefix("key")?);
        assert!(!self.storage.has_item("key1")?);
        assert!(!self.storage.has_item("key2")?);
        assert!(self.storage.has_item("test")?);
        Ok(Outcome::Passed)
    }

    pub fn clear_by_prefix_rejects_empty_prefix(&mut self) -> Result<Outcome> {
        let Some(clearable) = self.storage.as_clear_by_prefix() else {
            return skip("Storage doesn't implement the clear-by-prefix capability");
        };
        match clearable.clear_by_prefix("") {
            Err(err) => assert!(err.is_invalid_argument(), "Unexpected error {}", err),
            Ok(cleared) => panic!("Empty prefix was accepted ({})", cleared),
        }
        Ok(Outcome::Passed)
    }

    pub fn clear_by_namespace(&mut self) -> Result<Outcome> {
        if self.storage.as_clear_by_namespace().is_none() {
            return skip("Storage doesn't implement the clear-by-namespace capability");
        }

        self.adapter_options().set_namespace("ns1");
        assert!(self.storage.set_item("key1", "value1")?);
        self.adapter_options().set_namespace("ns2");
        assert!(self.storage.set_item("key2", "value2")?);

        // an unknown namespace clears nothing
        assert!(self.clear_namespace("unknown")?);
        self.assert_namespaced("ns1", "key1", true)?;
        self.assert_namespaced("ns2", "key2", true)?;

        assert!(self.clear_namespace("ns1")?);
        self.assert_namespaced("ns1", "key1", false)?;
        self.assert_namespaced("ns2", "key2", true)?;

        assert!(self.clear_namespace("ns2")?);
        self.assert_namespaced("ns1", "key1", false)?;
        self.assert_namespaced("ns2", "key2", false)?;
        Ok(Outcome::Passed)
    }

    fn clear_namespace(&mut self, namespace: &str) -> Result<bool> {
        require(self.storage.as_clear_by_namespace(), "clearable by namespace")?
            .clear_by_namespace(namespace)
    }

    fn assert_namespaced(&self, namespace: &str, key: &str, present: bool) -> Result<()> {
        self.adapter_options().set_namespace(namespace);
        assert_eq!(
            self.storage.has_item(key)?,
            present,
            "Presence of '{}' in namespace '{}'",
            key,
            namespace
        );
        Ok(())
    }

    pub fn clear_by_namespace_rejects_empty_namespace(&mut self) -> Result<Outcome> {
        let Some(clearable) = self.storage.as_clear_by_namespace() else {
            return skip("Storage doesn't implement the clear-by-namespace capability");
        };
        match clearable.clear_by_namespace("") {
            Err(err) => assert!(err.is_invalid_argument(), "Unexpected error {}", err),
            Ok(cleared) => panic!("Empty namespace was accepted ({})", cleared),
        }
        Ok(Outcome::Passed)
    }

    pub fn clear_expired(&mut self) -> Result<Outcome> {
        if self.storage.as_clear_expired().is_none() {
            return skip("Storage doesn't implement the clear-expired capability");
        }

        let capabilities = self.capabilities();
        let ttl = capabilities.ttl_precision;
        self.adapter_options().set_ttl(ttl)?;

        self.wait_for_full_second();
        assert!(self.storage.set_item("key1", "value1")?);

        self.wait_for_expiry(ttl, capabilities.ttl_precision);
        assert!(self.storage.set_item("key2", "value2")?);

        let clearable = require(self.storage.as_clear_expired(), "clearable of expired items")?;
        assert!(clearable.clear_expired()?);
        assert_eq!(self.storage.has_item("key1")?, capabilities.uses_request_time);
        assert!(self.storage.has_item("key2")?);
        Ok(Outcome::Passed)
    }

    pub fn taggable(&mut self) -> Result<Outcome> {
        if self.storage.as_taggable().is_none() {
            return skip("Storage doesn't implement the tagging capability");
        }

        let stored = items(&[("key1", "value1"), ("key2", "value2"), ("key3", "value3")]);
        assert!(self.storage.set_items(&stored)?.is_empty());

        let taggable = require(self.storage.as_taggable(), "taggable")?;
        assert!(taggable.set_tags("key1", &["tag1a", "tag1b"])?);
        assert!(taggable.set_tags("key2", &["tag2a", "tag2b"])?);
        assert!(taggable.set_tags("key3", &["tag3a", "tag3b"])?);
        assert!(!taggable.set_tags("missing", &["tag"])?);

        let tags = taggable.get_tags("key1")?;
        assert_eq!(tags, Some(vec!["tag1a".to_string(), "tag1b".to_string()]));

        // no item carries both
        assert!(taggable.clear_by_tags(&["tag1a", "tag2a"], TagMatch::All)?);
        self.assert_present(&[("key1", true), ("key2", true), ("key3", true)])?;

        let taggable = require(self.storage.as_taggable(), "taggable")?;
        assert!(taggable.clear_by_tags(&["tag1a", "tag2b"], TagMatch::Any)?);
        self.assert_present(&[("key1", false), ("key2", false), ("key3", true)])?;

        let taggable = require(self.storage.as_taggable(), "taggable")?;
        assert!(taggable.clear_by_tags(&["tag3a", "tag3b"], TagMatch::Any)?);
        self.assert_present(&[("key1", false), ("key2", false), ("key3", false)])?;
        Ok(Outcome::Passed)
    }

    pub fn taggable_functions_on_empty_storage(&mut self) -> Result<Outcome> {
        let Some(taggable) = self.storage.as_taggable() else {
            return skip("Storage doesn't implement the tagging capability");
        };

        assert!(!taggable.set_tags("unknown", &["no"])?);
        assert_eq!(taggable.get_tags("unknown")?, None);
        assert!(taggable.clear_by_tags(&["unknown"], TagMatch::Any)?);
        Ok(Outcome::Passed)
    }

    pub fn clear_by_tags_match_any_and_match_all(&mut self) -> Result<Outcome> {
        if self.storage.as_taggable().is_none() {
            return skip("Storage doesn't implement the tagging capability");
        }

        let stored = items(&[("key1", "value1"), ("key2", "value2"), ("key3", "value3")]);
        assert!(self.storage.set_items(&stored)?.is_empty());

        let taggable = require(self.storage.as_taggable(), "taggable")?;
        assert!(taggable.set_tags("key1", &["a", "b"])?);
        assert!(taggable.set_tags("key2", &["c", "d"])?);
        assert!(taggable.set_tags("key3", &["e", "f"])?);

        assert!(taggable.clear_by_tags(&["e", "x"], TagMatch::All)?);
        self.assert_present(&[("key1", true), ("key2", true), ("key3", true)])?;

        let taggable = require(self.storage.as_taggable(), "taggable")?;
        assert!(taggable.clear_by_tags(&["a", "c"], TagMatch::Any)?);
        self.assert_present(&[("key1", false), ("key2", false), ("key3", true)])?;

        let taggable = require(self.storage.as_taggable(), "taggable")?;
        assert!(taggable.clear_by_tags(&["e", "f"], TagMatch::All)?);
        self.assert_present(&[("key3", false)])?;
        Ok(Outcome::Passed)
    }

    fn assert_present(&self, expected: &[(&str, bool)]) -> Result<()> {
        for (key, present) in expected {
            assert_eq!(self.storage.has_item(key)?, *present, "Presence of '{}'", key);
        }
        Ok(())
    }

    pub fn get_total_space(&mut self) -> Result<Outcome> {
        let Some(total) = self.storage.as_total_space_capable() else {
            return skip("Storage doesn't implement the total-space capability");
        };
        let total_space = total.total_space()?;

        if let Some(available) = self.storage.as_available_space_capable() {
            assert!(available.available_space()? <= total_space);
        }
        Ok(Outcome::Passed)
    }

    pub fn get_available_space(&mut self) -> Result<Outcome> {
        let Some(available) = self.storage.as_available_space_capable() else {
            return skip("Storage doesn't implement the available-space capability");
        };
        let available_space = available.available_space()?;

        if let Some(total) = self.storage.as_total_space_capable() {
            assert!(available_space <= total.total_space()?);
        }
        Ok(Outcome::Passed)
    }

    pub fn can_store_values_with_cache_keys_up_to_the_maximum_key_length_limit(
        &mut self,
    ) -> Result<Outcome> {
        let ceiling = self.config.key_length_ceiling;
        let length = match self.capabilities().max_key_length {
            MaxKeyLength::Limited(max) if max > ceiling => {
                return skip(format!(
                    "Maximum key length {} is bigger than {}",
                    max, ceiling
                ));
            }
            MaxKeyLength::Unknown => panic!("Capabilities do not provide key length"),
            MaxKeyLength::Unlimited => return skip("Maximum key length is unlimited"),
            MaxKeyLength::Limited(1) => {
                return skip("The maximum key length of the storage adapter is 1");
            }
            MaxKeyLength::Limited(max) => max / 2,
        };
        assert!(length > 0);

        let key = random_hex(length);
        debug!("Storing a key of {} characters", key.len());
        assert!(self.storage.set_item(&key, "whatever")?);
        let stored = self.get(&key)?;
        assert!(stored.is_some_and(|stored| stored.is_identical(&CacheValue::from("whatever"))));
        Ok(Outcome::Passed)
    }
}

fn random_hex(length: usize) -> String {
    let mut rng = rand::rng();
    let mut hex: String = (0..length.div_ceil(2))
        .map(|_| format!("{:02x}", rng.random::<u8>()))
        .collect();
    hex.truncate(length);
    hex
}

/// Run one behavior against a fresh fixture, skipping it when the fixture excludes it
pub fn run_behavior<S, T, F, B>(name: &str, excluded: &[&str], set_up: F, behavior: B)
where
    S: Storage,
    T: TimeControl,
    F: FnOnce() -> CommonAdapterTest<S, T>,
    B: FnOnce(&mut CommonAdapterTest<S, T>) -> Result<Outcome>,
{
    init_test_logging();

    if excluded.contains(&name) {
        info!("Skipped '{}': excluded by the fixture", name);
        return;
    }

    let mut test = set_up();
    let outcome = behavior(&mut test);
    let tear_down = test.tear_down();

    match outcome {
        Ok(Outcome::Passed) => debug!("'{}' passed", name),
        Ok(Outcome::Skipped(reason)) => info!("Skipped '{}': {}", name, reason),
        Err(err) => panic!("'{}' failed: {}", name, err),
    }
    if let Err(err) = tear_down {
        panic!("Tear down after '{}' failed: {}", name, err);
    }
}
