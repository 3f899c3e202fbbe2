//! Adapter options.
//!
//! Options objects are shared handles: the fixture that configures an adapter and the
//! adapter itself hold clones of the same handle, so changing the namespace or the
//! readable flag through one is seen by the other. Every options type publishes a
//! static table of `{ name, get, set }` accessors covering each serialized field.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{Error, Result};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub type OptionGetter<O> = fn(&O) -> Value;
pub type OptionSetter<O> = fn(&O, Value) -> Result<&O>;

/// Accessor pair for one named option
pub struct OptionAccessor<O> {
    pub name: &'static str,
    pub get: OptionGetter<O>,
    pub set: OptionSetter<O>,
}

impl<O> fmt::Debug for OptionAccessor<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionAccessor")
            .field("name", &self.name)
            .finish()
    }
}

/// Implemented by the options type of every adapter
pub trait StorageOptions: Clone + fmt::Debug + Send + Sync + 'static {
    /// The options every adapter shares
    fn adapter_options(&self) -> &AdapterOptions;

    fn accessors() -> &'static [OptionAccessor<Self>];

    /// Snapshot of every option, keyed by option name
    fn to_value(&self) -> Result<Value>;

    /// Identity, not equality
    fn same_instance(&self, other: &Self) -> bool;

    fn accessor(name: &str) -> Option<&'static OptionAccessor<Self>> {
        Self::accessors().iter().find(|accessor| accessor.name == name)
    }
}

impl<O: StorageOptions> OptionAccessor<O> {
    pub const NAMESPACE: Self = Self {
        name: "namespace",
        get: get_namespace::<O>,
        set: set_namespace::<O>,
    };
    pub const TTL: Self = Self {
        name: "ttl",
        get: get_ttl::<O>,
        set: set_ttl::<O>,
    };
    pub const READABLE: Self = Self {
        name: "readable",
        get: get_readable::<O>,
        set: set_readable::<O>,
    };
    pub const WRITABLE: Self = Self {
        name: "writable",
        get: get_writable::<O>,
        set: set_writable::<O>,
    };
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct AdapterState {
    namespace: String,
    ttl: f64,
    readable: bool,
    writable: bool,
}

impl Default for AdapterState {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            ttl: 0.0,
            readable: true,
            writable: true,
        }
    }
}

/// Options common to all adapters
#[derive(Clone, Default)]
pub struct AdapterOptions {
    state: Arc<RwLock<AdapterState>>,
}

impl AdapterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(&self) -> String {
        self.read().namespace.clone()
    }

    pub fn set_namespace(&self, namespace: impl Into<String>) -> &Self {
        self.write().namespace = namespace.into();
        self
    }

    /// Time to live in seconds, `0` meaning items never expire
    pub fn ttl(&self) -> f64 {
        self.read().ttl
    }

    pub fn set_ttl(&self, ttl: f64) -> Result<&Self> {
        if !ttl.is_finite() || ttl < 0.0 {
            return Err(Error::invalid_argument(format!(
                "TTL must be a non-negative number of seconds, got {}",
                ttl
            )));
        }
        self.write().ttl = ttl;
        Ok(self)
    }

    pub fn readable(&self) -> bool {
        self.read().readable
    }

    pub fn set_readable(&self, readable: bool) -> &Self {
        self.write().readable = readable;
        self
    }

    pub fn writable(&self) -> bool {
        self.read().writable
    }

    pub fn set_writable(&self, writable: bool) -> &Self {
        self.write().writable = writable;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, AdapterState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AdapterState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AdapterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("AdapterOptions")
            .field("namespace", &state.namespace)
            .field("ttl", &state.ttl)
            .field("readable", &state.readable)
            .field("writable", &state.writable)
            .finish()
    }
}

static ADAPTER_ACCESSORS: [OptionAccessor<AdapterOptions>; 4] = [
    OptionAccessor::<AdapterOptions>::NAMESPACE,
    OptionAccessor::<AdapterOptions>::TTL,
    OptionAccessor::<AdapterOptions>::READABLE,
    OptionAccessor::<AdapterOptions>::WRITABLE,
];

impl StorageOptions for AdapterOptions {
    fn adapter_options(&self) -> &AdapterOptions {
        self
    }

    fn accessors() -> &'static [OptionAccessor<Self>] {
        &ADAPTER_ACCESSORS
    }

    fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(&*self.read())?)
    }

    fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

fn get_namespace<O: StorageOptions>(options: &O) -> Value {
    Value::from(options.adapter_options().namespace())
}

fn set_namespace<O: StorageOptions>(options: &O, value: Value) -> Result<&O> {
    match value {
        Value::String(namespace) => {
            options.adapter_options().set_namespace(namespace);
            Ok(options)
        }
        other => Err(type_mismatch("namespace", "a string", &other)),
    }
}

fn get_ttl<O: StorageOptions>(options: &O) -> Value {
    Value::from(options.adapter_options().ttl())
}

fn set_ttl<O: StorageOptions>(options: &O, value: Value) -> Result<&O> {
    let ttl = value
        .as_f64()
        .ok_or_else(|| type_mismatch("ttl", "a number", &value))?;
    options.adapter_options().set_ttl(ttl)?;
    Ok(options)
}

fn get_readable<O: StorageOptions>(options: &O) -> Value {
    Value::from(options.adapter_options().readable())
}

fn set_readable<O: StorageOptions>(options: &O, value: Value) -> Result<&O> {
    let readable = value
        .as_bool()
        .ok_or_else(|| type_mismatch("readable", "a boolean", &value))?;
    options.adapter_options().set_readable(readable);
    Ok(options)
}

fn get_writable<O: StorageOptions>(options: &O) -> Value {
    Value::from(options.adapter_options().writable())
}

fn set_writable<O: StorageOptions>(options: &O, value: Value) -> Result<&O> {
    let writable = value
        .as_bool()
        .ok_or_else(|| type_mismatch("writable", "a boolean", &value))?;
    options.adapter_options().set_writable(writable);
    Ok(options)
}

pub fn type_mismatch(option: &str, expected: &str, got: &Value) -> Error {
    Error::invalid_argument(format!("option '{}' expects {}, got {}", option, expected, got))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = AdapterOptions::new();
        assert_eq!(options.namespace(), "");
        assert_eq!(options.ttl(), 0.0);
        assert!(options.readable());
        assert!(options.writable());
    }

    #[test]
    fn test_fluent_setters() {
        let options = AdapterOptions::new();
        let returned = options
            .set_namespace("ns")
            .set_readable(false)
            .set_writable(false)
            .set_ttl(5.0)
            .unwrap();

        assert!(std::ptr::eq(returned, &options));
        assert_eq!(options.namespace(), "ns");
        assert_eq!(options.ttl(), 5.0);
        assert!(!options.readable());
        assert!(!options.writable());
    }

    #[test]
    fn test_invalid_ttl_rejected() {
        let options = AdapterOptions::new();
        assert!(options.set_ttl(-1.0).unwrap_err().is_invalid_argument());
        assert!(options.set_ttl(f64::INFINITY).unwrap_err().is_invalid_argument());
        assert_eq!(options.ttl(), 0.0);
    }

    #[test]
    fn test_clones_share_state() {
        let options = AdapterOptions::new();
        let handle = options.clone();
        handle.set_namespace("shared");

        assert_eq!(options.namespace(), "shared");
        assert!(options.same_instance(&handle));
        assert!(!options.same_instance(&AdapterOptions::new()));
    }

    #[test]
    fn test_accessor_table_covers_serialized_options() {
        let options = AdapterOptions::new();
        let value = options.to_value().unwrap();
        let names: Vec<&String> = value.as_object().unwrap().keys().collect();

        assert_eq!(names.len(), AdapterOptions::accessors().len());
        for name in names {
            assert!(AdapterOptions::accessor(name).is_some(), "no accessor for {}", name);
        }
    }

    #[test]
    fn test_accessors_round_trip() {
        let options = AdapterOptions::new();

        let ttl = AdapterOptions::accessor("ttl").unwrap();
        (ttl.set)(&options, Value::from(3.5)).unwrap();
        assert_eq!((ttl.get)(&options), Value::from(3.5));

        let namespace = AdapterOptions::accessor("namespace").unwrap();
        let returned = (namespace.set)(&options, Value::from("abc")).unwrap();
        assert!(std::ptr::eq(returned, &options));
        assert_eq!(options.namespace(), "abc");
    }

    #[test]
    fn test_accessor_type_mismatch() {
        let options = AdapterOptions::new();
        let readable = AdapterOptions::accessor("readable").unwrap();
        let err = (readable.set)(&options, Value::from("yes")).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(options.readable());
    }
}
