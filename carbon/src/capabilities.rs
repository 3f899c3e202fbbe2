use crate::domain::DataKind;
use std::collections::BTreeMap;

/// How a stored value of some kind comes back out of an adapter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeSupport {
    Unsupported,
    /// Round-trips with the same kind and content
    Exact,
    /// Round-trips converted into another kind
    Coerced(DataKind),
}

/// Upper bound on key length an adapter accepts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaxKeyLength {
    Unknown,
    Unlimited,
    Limited(usize),
}

impl MaxKeyLength {
    /// Whether `key` fits. Unknown limits accept everything.
    pub fn allows(&self, key: &str) -> bool {
        match self {
            MaxKeyLength::Limited(max) => key.len() <= *max,
            MaxKeyLength::Unknown | MaxKeyLength::Unlimited => true,
        }
    }
}

/// What an adapter supports under its current configuration
#[derive(Clone, Debug, PartialEq)]
pub struct Capabilities {
    pub ttl_supported: bool,
    /// Smallest time unit, in seconds, the expiry mechanism resolves
    pub ttl_precision: f64,
    /// Expiry is evaluated against a time fixed once per process
    pub uses_request_time: bool,
    pub max_key_length: MaxKeyLength,
    pub supported_data_types: BTreeMap<DataKind, TypeSupport>,
}

impl Capabilities {
    /// Capabilities of a store without expiry that keeps every kind intact
    pub fn new() -> Self {
        Self {
            ttl_supported: false,
            ttl_precision: 1.0,
            uses_request_time: false,
            max_key_length: MaxKeyLength::Unknown,
            supported_data_types: DataKind::ALL
                .iter()
                .map(|kind| (*kind, TypeSupport::Exact))
                .collect(),
        }
    }

    pub fn with_ttl(mut self, precision: f64) -> Self {
        self.ttl_supported = true;
        self.ttl_precision = precision;
        self
    }

    pub fn with_request_time(mut self, uses_request_time: bool) -> Self {
        self.uses_request_time = uses_request_time;
        self
    }

    pub fn with_max_key_length(mut self, max_key_length: MaxKeyLength) -> Self {
        self.max_key_length = max_key_length;
        self
    }

    pub fn with_data_type(mut self, kind: DataKind, support: TypeSupport) -> Self {
        self.supported_data_types.insert(kind, support);
        self
    }

    pub fn support_for(&self, kind: DataKind) -> TypeSupport {
        self.supported_data_types
            .get(&kind)
            .copied()
            .unwrap_or(TypeSupport::Unsupported)
    }

    pub fn supports(&self, kind: DataKind) -> bool {
        self.support_for(kind) != TypeSupport::Unsupported
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let caps = Capabilities::new();
        assert!(!caps.ttl_supported);
        assert!(caps.ttl_precision > 0.0);
        assert_eq!(caps.max_key_length, MaxKeyLength::Unknown);
        for kind in DataKind::ALL {
            assert_eq!(caps.support_for(kind), TypeSupport::Exact);
        }
    }

    #[test]
    fn test_builder() {
        let caps = Capabilities::new()
            .with_ttl(0.5)
            .with_request_time(true)
            .with_max_key_length(MaxKeyLength::Limited(250))
            .with_data_type(DataKind::Binary, TypeSupport::Unsupported)
            .with_data_type(DataKind::Int, TypeSupport::Coerced(DataKind::Str));

        assert!(caps.ttl_supported);
        assert_eq!(caps.ttl_precision, 0.5);
        assert!(caps.uses_request_time);
        assert!(!caps.supports(DataKind::Binary));
        assert_eq!(
            caps.support_for(DataKind::Int),
            TypeSupport::Coerced(DataKind::Str)
        );
    }

    #[test]
    fn test_missing_kind_is_unsupported() {
        let mut caps = Capabilities::new();
        caps.supported_data_types.remove(&DataKind::Record);
        assert_eq!(caps.support_for(DataKind::Record), TypeSupport::Unsupported);
    }

    #[test]
    fn test_key_length_limits() {
        assert!(MaxKeyLength::Limited(3).allows("abc"));
        assert!(!MaxKeyLength::Limited(3).allows("abcd"));
        assert!(MaxKeyLength::Unlimited.allows(&"k".repeat(10_000)));
        assert!(MaxKeyLength::Unknown.allows("anything"));
    }
}
