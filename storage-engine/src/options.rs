use carbon::options::{AdapterOptions, OptionAccessor, StorageOptions, type_mismatch};
use serde_json::Value;
use shared::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 64 MiB
pub const DEFAULT_MEMORY_LIMIT: u64 = 64 * 1024 * 1024;

/// Options of [`crate::MemoryAdapter`]
#[derive(Clone, Debug)]
pub struct MemoryOptions {
    base: AdapterOptions,
    memory_limit: Arc<AtomicU64>,
}

impl MemoryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capacity in bytes of approximate item sizes
    pub fn memory_limit(&self) -> u64 {
        self.memory_limit.load(Ordering::SeqCst)
    }

    pub fn set_memory_limit(&self, bytes: u64) -> &Self {
        self.memory_limit.store(bytes, Ordering::SeqCst);
        self
    }
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            base: AdapterOptions::new(),
            memory_limit: Arc::new(AtomicU64::new(DEFAULT_MEMORY_LIMIT)),
        }
    }
}

static MEMORY_ACCESSORS: [OptionAccessor<MemoryOptions>; 5] = [
    OptionAccessor::<MemoryOptions>::NAMESPACE,
    OptionAccessor::<MemoryOptions>::TTL,
    OptionAccessor::<MemoryOptions>::READABLE,
    OptionAccessor::<MemoryOptions>::WRITABLE,
    OptionAccessor {
        name: "memory_limit",
        get: get_memory_limit,
        set: set_memory_limit,
    },
];

impl StorageOptions for MemoryOptions {
    fn adapter_options(&self) -> &AdapterOptions {
        &self.base
    }

    fn accessors() -> &'static [OptionAccessor<Self>] {
        &MEMORY_ACCESSORS
    }

    fn to_value(&self) -> Result<Value> {
        let mut value = self.base.to_value()?;
        if let Value::Object(fields) = &mut value {
            fields.insert("memory_limit".to_string(), Value::from(self.memory_limit()));
        }
        Ok(value)
    }

    fn same_instance(&self, other: &Self) -> bool {
        self.base.same_instance(&other.base) && Arc::ptr_eq(&self.memory_limit, &other.memory_limit)
    }
}

fn get_memory_limit(options: &MemoryOptions) -> Value {
    Value::from(options.memory_limit())
}

fn set_memory_limit(options: &MemoryOptions, value: Value) -> Result<&MemoryOptions> {
    let bytes = value
        .as_u64()
        .ok_or_else(|| type_mismatch("memory_limit", "a non-negative integer", &value))?;
    Ok(options.set_memory_limit(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_memory_limit() {
        assert_eq!(MemoryOptions::new().memory_limit(), DEFAULT_MEMORY_LIMIT);
    }

    #[test]
    fn test_accessors_cover_every_option() {
        let options = MemoryOptions::new();
        let value = options.to_value().unwrap();
        let fields = value.as_object().unwrap();

        assert_eq!(fields.len(), MemoryOptions::accessors().len());
        for name in fields.keys() {
            assert!(MemoryOptions::accessor(name).is_some(), "no accessor for {}", name);
        }
    }

    #[test]
    fn test_memory_limit_accessor() {
        let options = MemoryOptions::new();
        let accessor = MemoryOptions::accessor("memory_limit").unwrap();

        let returned = (accessor.set)(&options, Value::from(1024)).unwrap();
        assert!(std::ptr::eq(returned, &options));
        assert_eq!((accessor.get)(&options), Value::from(1024));
        assert!((accessor.set)(&options, Value::from(-1)).is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let options = MemoryOptions::new();
        let handle = options.clone();
        handle.set_memory_limit(10);
        handle.adapter_options().set_namespace("ns");

        assert_eq!(options.memory_limit(), 10);
        assert_eq!(options.adapter_options().namespace(), "ns");
        assert!(options.same_instance(&handle));
    }
}
