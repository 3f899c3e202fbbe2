// shared/src/lib.rs

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("out of space: {0}")]
    OutOfSpace(String),
    #[error("unsupported data type: {0}")]
    UnsupportedDataType(String),
    #[error("trapped: {0}")]
    Trapped(String),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod config;
pub mod trap;

pub use trap::{ErrorTrap, TrapGuard};
