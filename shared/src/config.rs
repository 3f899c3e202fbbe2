use std::str::FromStr;
use tracing::warn;

/// Knobs for the adapter conformance harness
#[derive(Clone, Debug, PartialEq)]
pub struct HarnessConfig {
    /// Multiple of the TTL precision waited on top of the TTL before asserting expiry
    pub expiry_margin: f64,
    /// Key length limits above this are not exercised
    pub key_length_ceiling: usize,
    /// `tracing` filter directive used by the test subscriber
    pub log_filter: String,
}

impl HarnessConfig {
    const DEFAULT_EXPIRY_MARGIN: f64 = 2.0;
    const DEFAULT_KEY_LENGTH_CEILING: usize = 1024;
    const DEFAULT_LOG_FILTER: &str = "warn";

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let expiry_margin = parse_or(
            &lookup,
            "CARBON_TEST_EXPIRY_MARGIN",
            Self::DEFAULT_EXPIRY_MARGIN,
        );
        let expiry_margin = if expiry_margin.is_finite() && expiry_margin >= 0.0 {
            expiry_margin
        } else {
            warn!(
                "CARBON_TEST_EXPIRY_MARGIN must be a non-negative number, using {}",
                Self::DEFAULT_EXPIRY_MARGIN
            );
            Self::DEFAULT_EXPIRY_MARGIN
        };

        Self {
            expiry_margin,
            key_length_ceiling: parse_or(
                &lookup,
                "CARBON_TEST_KEY_LENGTH_CEILING",
                Self::DEFAULT_KEY_LENGTH_CEILING,
            ),
            log_filter: lookup("CARBON_TEST_LOG")
                .filter(|filter| !filter.trim().is_empty())
                .unwrap_or_else(|| Self::DEFAULT_LOG_FILTER.to_string()),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            expiry_margin: Self::DEFAULT_EXPIRY_MARGIN,
            key_length_ceiling: Self::DEFAULT_KEY_LENGTH_CEILING,
            log_filter: Self::DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using {}", name, raw, default);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = HarnessConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.expiry_margin, 2.0);
        assert_eq!(config.key_length_ceiling, 1024);
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn test_values_are_read() {
        let config = HarnessConfig::from_lookup(lookup_from(&[
            ("CARBON_TEST_EXPIRY_MARGIN", "3.5"),
            ("CARBON_TEST_KEY_LENGTH_CEILING", " 512 "),
            ("CARBON_TEST_LOG", "debug"),
        ]));
        assert_eq!(config.expiry_margin, 3.5);
        assert_eq!(config.key_length_ceiling, 512);
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = HarnessConfig::from_lookup(lookup_from(&[
            ("CARBON_TEST_EXPIRY_MARGIN", "-1"),
            ("CARBON_TEST_KEY_LENGTH_CEILING", "lots"),
            ("CARBON_TEST_LOG", "  "),
        ]));
        assert_eq!(config, HarnessConfig::default());
    }
}
