pub mod memory;
pub mod moka_cache;
pub mod options;

pub use memory::MemoryAdapter;
pub use moka_cache::{MOKA_MAX_KEY_LENGTH, MokaAdapter};
pub use options::{DEFAULT_MEMORY_LIMIT, MemoryOptions};
