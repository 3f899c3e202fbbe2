use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// The kinds of data a cache item can hold
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Seq,
    Record,
    Binary,
}

impl DataKind {
    pub const ALL: [DataKind; 8] = [
        DataKind::Null,
        DataKind::Bool,
        DataKind::Int,
        DataKind::Float,
        DataKind::Str,
        DataKind::Seq,
        DataKind::Record,
        DataKind::Binary,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DataKind::Null => "null",
            DataKind::Bool => "bool",
            DataKind::Int => "int",
            DataKind::Float => "float",
            DataKind::Str => "str",
            DataKind::Seq => "seq",
            DataKind::Record => "record",
            DataKind::Binary => "binary",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value stored under a cache key
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<CacheValue>),
    Record(BTreeMap<String, CacheValue>),
    Binary(#[serde(with = "serde_bytes")] Vec<u8>),
}

impl CacheValue {
    pub fn kind(&self) -> DataKind {
        match self {
            CacheValue::Null => DataKind::Null,
            CacheValue::Bool(_) => DataKind::Bool,
            CacheValue::Int(_) => DataKind::Int,
            CacheValue::Float(_) => DataKind::Float,
            CacheValue::Str(_) => DataKind::Str,
            CacheValue::Seq(_) => DataKind::Seq,
            CacheValue::Record(_) => DataKind::Record,
            CacheValue::Binary(_) => DataKind::Binary,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CacheValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Same kind and same content
    pub fn is_identical(&self, other: &CacheValue) -> bool {
        self.kind() == other.kind() && self == other
    }

    /// Convert into `target` the way a store that keeps another representation would.
    ///
    /// Returns `None` when there is no sensible conversion.
    pub fn coerce_to(&self, target: DataKind) -> Option<CacheValue> {
        if self.kind() == target {
            return Some(self.clone());
        }

        match (self, target) {
            (_, DataKind::Null) => None,

            (CacheValue::Null, DataKind::Bool) => Some(CacheValue::Bool(false)),
            (CacheValue::Int(i), DataKind::Bool) => Some(CacheValue::Bool(*i != 0)),
            (CacheValue::Float(f), DataKind::Bool) => Some(CacheValue::Bool(*f != 0.0)),
            (CacheValue::Str(s), DataKind::Bool) => {
                Some(CacheValue::Bool(!(s.is_empty() || s == "0" || s == "false")))
            }
            (CacheValue::Seq(items), DataKind::Bool) => Some(CacheValue::Bool(!items.is_empty())),
            (CacheValue::Record(fields), DataKind::Bool) => {
                Some(CacheValue::Bool(!fields.is_empty()))
            }
            (CacheValue::Binary(bytes), DataKind::Bool) => Some(CacheValue::Bool(!bytes.is_empty())),

            (CacheValue::Null, DataKind::Int) => Some(CacheValue::Int(0)),
            (CacheValue::Bool(b), DataKind::Int) => Some(CacheValue::Int(i64::from(*b))),
            (CacheValue::Float(f), DataKind::Int) if f.is_finite() => {
                Some(CacheValue::Int(f.trunc() as i64))
            }
            (CacheValue::Str(s), DataKind::Int) => s.trim().parse().ok().map(CacheValue::Int),

            (CacheValue::Null, DataKind::Float) => Some(CacheValue::Float(0.0)),
            (CacheValue::Bool(b), DataKind::Float) => {
                Some(CacheValue::Float(if *b { 1.0 } else { 0.0 }))
            }
            (CacheValue::Int(i), DataKind::Float) => Some(CacheValue::Float(*i as f64)),
            (CacheValue::Str(s), DataKind::Float) => s.trim().parse().ok().map(CacheValue::Float),

            (CacheValue::Null, DataKind::Str) => Some(CacheValue::Str(String::new())),
            (CacheValue::Bool(b), DataKind::Str) => Some(CacheValue::Str(b.to_string())),
            (CacheValue::Int(i), DataKind::Str) => Some(CacheValue::Str(i.to_string())),
            (CacheValue::Float(f), DataKind::Str) => Some(CacheValue::Str(f.to_string())),
            (CacheValue::Binary(bytes), DataKind::Str) => String::from_utf8(bytes.clone())
                .ok()
                .map(CacheValue::Str),

            (CacheValue::Record(fields), DataKind::Seq) => {
                Some(CacheValue::Seq(fields.values().cloned().collect()))
            }
            (CacheValue::Binary(bytes), DataKind::Seq) => Some(CacheValue::Seq(
                bytes.iter().map(|b| CacheValue::Int(i64::from(*b))).collect(),
            )),

            (CacheValue::Seq(items), DataKind::Record) => Some(CacheValue::Record(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (i.to_string(), item.clone()))
                    .collect(),
            )),

            (CacheValue::Str(s), DataKind::Binary) => Some(CacheValue::Binary(s.as_bytes().to_vec())),

            _ => None,
        }
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        CacheValue::Str(value.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        CacheValue::Str(value)
    }
}

impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        CacheValue::Bool(value)
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        CacheValue::Int(value)
    }
}

impl From<f64> for CacheValue {
    fn from(value: f64) -> Self {
        CacheValue::Float(value)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(value: Vec<u8>) -> Self {
        CacheValue::Binary(value)
    }
}

impl From<Vec<CacheValue>> for CacheValue {
    fn from(value: Vec<CacheValue>) -> Self {
        CacheValue::Seq(value)
    }
}

impl From<BTreeMap<String, CacheValue>> for CacheValue {
    fn from(value: BTreeMap<String, CacheValue>) -> Self {
        CacheValue::Record(value)
    }
}

/// Opaque token identifying the stored version of an item.
///
/// Handed out by reads and checked by conditional writes.
#[derive(Clone, Debug, PartialEq)]
pub struct CasToken(TokenRepr);

#[derive(Clone, Debug, PartialEq)]
enum TokenRepr {
    Snapshot(CacheValue),
    Version(Uuid),
}

impl CasToken {
    /// Token that matches as long as the stored value is unchanged
    pub fn of_value(value: &CacheValue) -> Self {
        CasToken(TokenRepr::Snapshot(value.clone()))
    }

    /// Token that matches one specific write
    pub fn of_version(version: Uuid) -> Self {
        CasToken(TokenRepr::Version(version))
    }
}

/// Result of a single-item read
#[derive(Clone, Debug, PartialEq)]
pub struct GetResponse {
    pub value: Option<CacheValue>,
    pub found: bool,
    pub cas_token: Option<CasToken>,
}

impl GetResponse {
    pub fn found(value: CacheValue, cas_token: CasToken) -> Self {
        Self {
            value: Some(value),
            found: true,
            cas_token: Some(cas_token),
        }
    }

    pub fn missing() -> Self {
        Self {
            value: None,
            found: false,
            cas_token: None,
        }
    }

    pub fn into_value(self) -> Option<CacheValue> {
        self.value
    }
}

/// Descriptor of a stored item, returned by metadata-capable adapters
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Metadata {
    pub namespace: String,
    pub key: String,
    pub modified_at: Option<DateTime<FixedOffset>>,
    pub expires_at: Option<DateTime<FixedOffset>>,
    pub tags: BTreeSet<String>,
    pub size: Option<u64>,
}

impl Metadata {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            modified_at: None,
            expires_at: None,
            tags: BTreeSet::new(),
            size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_of_every_variant() {
        let values = [
            CacheValue::Null,
            CacheValue::Bool(true),
            CacheValue::Int(1),
            CacheValue::Float(1.5),
            CacheValue::from("s"),
            CacheValue::Seq(vec![]),
            CacheValue::Record(BTreeMap::new()),
            CacheValue::Binary(vec![0]),
        ];
        let kinds: Vec<DataKind> = values.iter().map(CacheValue::kind).collect();
        assert_eq!(kinds, DataKind::ALL.to_vec());
    }

    #[test]
    fn test_identical_requires_same_kind() {
        assert!(CacheValue::Int(1).is_identical(&CacheValue::Int(1)));
        assert!(!CacheValue::Int(1).is_identical(&CacheValue::Float(1.0)));
        assert!(!CacheValue::from("1").is_identical(&CacheValue::Int(1)));
    }

    #[test]
    fn test_coerce_scalars_to_string() {
        assert_eq!(
            CacheValue::Null.coerce_to(DataKind::Str),
            Some(CacheValue::from(""))
        );
        assert_eq!(
            CacheValue::Bool(true).coerce_to(DataKind::Str),
            Some(CacheValue::from("true"))
        );
        assert_eq!(
            CacheValue::Int(12345).coerce_to(DataKind::Str),
            Some(CacheValue::from("12345"))
        );
        assert_eq!(
            CacheValue::Float(123.45).coerce_to(DataKind::Str),
            Some(CacheValue::from("123.45"))
        );
        assert_eq!(CacheValue::Seq(vec![]).coerce_to(DataKind::Str), None);
    }

    #[test]
    fn test_coerce_strings_to_numbers() {
        assert_eq!(
            CacheValue::from(" 42 ").coerce_to(DataKind::Int),
            Some(CacheValue::Int(42))
        );
        assert_eq!(
            CacheValue::from("1.25").coerce_to(DataKind::Float),
            Some(CacheValue::Float(1.25))
        );
        assert_eq!(CacheValue::from("abc").coerce_to(DataKind::Int), None);
        assert_eq!(
            CacheValue::Float(f64::NAN).coerce_to(DataKind::Int),
            None
        );
        assert_eq!(
            CacheValue::Float(-2.9).coerce_to(DataKind::Int),
            Some(CacheValue::Int(-2))
        );
    }

    #[test]
    fn test_coerce_truthiness() {
        assert_eq!(
            CacheValue::from("0").coerce_to(DataKind::Bool),
            Some(CacheValue::Bool(false))
        );
        assert_eq!(
            CacheValue::from("yes").coerce_to(DataKind::Bool),
            Some(CacheValue::Bool(true))
        );
        assert_eq!(
            CacheValue::Int(0).coerce_to(DataKind::Bool),
            Some(CacheValue::Bool(false))
        );
    }

    #[test]
    fn test_coerce_collections() {
        let seq = CacheValue::Seq(vec![CacheValue::from("a"), CacheValue::Int(2)]);
        let record = seq.coerce_to(DataKind::Record).unwrap();
        let CacheValue::Record(fields) = &record else {
            panic!("expected record, got {:?}", record);
        };
        assert_eq!(fields.get("0"), Some(&CacheValue::from("a")));
        assert_eq!(fields.get("1"), Some(&CacheValue::Int(2)));
        assert_eq!(record.coerce_to(DataKind::Seq), Some(seq));

        assert_eq!(
            CacheValue::Binary(vec![1, 2]).coerce_to(DataKind::Seq),
            Some(CacheValue::Seq(vec![CacheValue::Int(1), CacheValue::Int(2)]))
        );
    }

    #[test]
    fn test_coerce_string_and_binary() {
        assert_eq!(
            CacheValue::from("abc").coerce_to(DataKind::Binary),
            Some(CacheValue::Binary(b"abc".to_vec()))
        );
        assert_eq!(
            CacheValue::Binary(b"abc".to_vec()).coerce_to(DataKind::Str),
            Some(CacheValue::from("abc"))
        );
        assert_eq!(
            CacheValue::Binary(vec![0xff, 0xfe]).coerce_to(DataKind::Str),
            None
        );
    }

    #[test]
    fn test_nothing_coerces_to_null() {
        assert_eq!(CacheValue::Int(0).coerce_to(DataKind::Null), None);
        assert_eq!(
            CacheValue::Null.coerce_to(DataKind::Null),
            Some(CacheValue::Null)
        );
    }

    #[test]
    fn test_cas_tokens() {
        let value = CacheValue::from("value");
        assert_eq!(CasToken::of_value(&value), CasToken::of_value(&value));
        assert_ne!(
            CasToken::of_value(&value),
            CasToken::of_value(&CacheValue::from("other"))
        );

        let version = Uuid::new_v4();
        assert_eq!(CasToken::of_version(version), CasToken::of_version(version));
        assert_ne!(
            CasToken::of_version(version),
            CasToken::of_version(Uuid::new_v4())
        );
    }

    #[test]
    fn test_get_response() {
        let missing = GetResponse::missing();
        assert!(!missing.found);
        assert_eq!(missing.into_value(), None);

        let value = CacheValue::Null;
        let found = GetResponse::found(value.clone(), CasToken::of_value(&value));
        assert!(found.found);
        assert_eq!(found.into_value(), Some(CacheValue::Null));
    }
}
