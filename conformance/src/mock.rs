use carbon::capabilities::Capabilities;
use carbon::domain::{CacheValue, CasToken, Metadata};
use carbon::options::{AdapterOptions, StorageOptions};
use carbon::ports::{MetadataCapable, Storage};
use shared::Result;
use std::collections::HashMap;
use tracing::trace;

/// Minimal in-process adapter used to check the harness itself.
///
/// No expiry, tags or iteration; reads hand out value-snapshot CAS tokens.
#[derive(Debug, Default)]
pub struct MockAdapter {
    data: HashMap<String, HashMap<String, CacheValue>>,
    options: AdapterOptions,
    capabilities: Capabilities,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn namespace(&self) -> String {
        self.options.namespace()
    }
}

impl Storage for MockAdapter {
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
        Ok(self
            .data
            .get(&self.namespace())
            .and_then(|items| items.get(normalized_key))
            .map(|value| (value.clone(), CasToken::of_value(value))))
    }

    fn internal_set_item(&mut self, normalized_key: &str, value: CacheValue) -> Result<bool> {
        trace!("Mock set '{}'", normalized_key);
        let namespace = self.namespace();
        self.data
            .entry(namespace)
            .or_default()
            .insert(normalized_key.to_string(), value);
        Ok(true)
    }

    fn internal_remove_item(&mut self, normalized_key: &str) -> Result<bool> {
        let namespace = self.namespace();
        Ok(self
            .data
            .get_mut(&namespace)
            .and_then(|items| items.remove(normalized_key))
            .is_some())
    }

    fn as_metadata_capable(&self) -> Option<&dyn MetadataCapable> {
        Some(self)
    }
}

impl MetadataCapable for MockAdapter {
    fn get_metadata(&self, key: &str) -> Result<Option<Metadata>> {
        if !self.has_item(key)? {
            return Ok(None);
        }
        Ok(Some(Metadata::new(self.namespace(), key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_storage() {
        let mut mock = MockAdapter::new();
        mock.set_item("key", "default").unwrap();
        mock.options().set_namespace("other");
        assert!(!mock.has_item("key").unwrap());
        assert!(!mock.remove_item("key").unwrap());

        mock.options().set_namespace("");
        assert_eq!(
            mock.get_item("key").unwrap().into_value(),
            Some(CacheValue::from("default"))
        );
    }

    #[test]
    fn test_metadata_only_for_present_keys() {
        let mut mock = MockAdapter::new();
        mock.set_item("key", 1i64).unwrap();
        assert!(mock.get_metadata("key").unwrap().is_some());
        assert!(mock.get_metadata("missing").unwrap().is_none());

        mock.options().set_readable(false);
        assert!(mock.get_metadata("key").unwrap().is_none());
    }

    #[test]
    fn test_optional_capabilities_absent() {
        let mut mock = MockAdapter::new();
        assert!(!mock.capabilities().ttl_supported);
        assert!(mock.as_taggable().is_none());
        assert!(mock.as_iterable().is_none());
        assert!(mock.as_flushable().is_none());
    }
}
