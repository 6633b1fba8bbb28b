//! Error types for memshare

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("shared memory region already exists: {0}")]
    AlreadyExists(String),

    #[error("shared memory region not found: {0}")]
    NotFound(String),

    #[error("variable already registered: {0}")]
    AlreadyRegistered(String),

    #[error("variable was not registered: {0}")]
    NotRegistered(String),

    #[error("tried to release variable {0} which is not owned by this registry")]
    ReleaseOfUnowned(String),

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error(
        "name {name} exceeds the {max} characters allowed on this platform; \
         choose a shorter namespace and variable name"
    )]
    NameTooLong { name: String, max: usize },

    #[error("region {name} maps {actual} bytes, expected at least {expected}")]
    SizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("access denied: region is read-only")]
    ReadOnly,

    #[error("backing shared object was disposed")]
    Disposed,

    #[error("shared memory error: {0}")]
    Platform(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error means "nobody created that region".
    pub fn is_missing(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::NotRegistered(_))
    }
}
