pub mod capabilities;
pub mod clock;
pub mod domain;
pub mod iterator;
pub mod options;
pub mod ports;

pub use capabilities::{Capabilities, MaxKeyLength, TypeSupport};
pub use clock::{Clock, ModifiableClock, RequestTime, SystemClock};
pub use domain::{CacheValue, CasToken, DataKind, GetResponse, Metadata};
pub use iterator::{IteratorEntry, IteratorMode, KeyListIterator};
pub use options::{AdapterOptions, OptionAccessor, StorageOptions};
pub use ports::{
    AvailableSpaceCapable, ClearByNamespace, ClearByPrefix, ClearExpired, Flushable, Iterable,
    MetadataCapable, Optimizable, Storage, TagMatch, Taggable, TotalSpaceCapable,
};
