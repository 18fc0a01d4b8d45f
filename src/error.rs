//! Error types for seedbank-lookup

use thiserror::Error;

use crate::descriptor::DescriptorError;
use crate::registry::RegistryError;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Invalid content identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Record store error: {0}")]
    Store(String),

    #[error("Record store connection is not healthy")]
    Unhealthy,

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<mongodb::error::Error> for LookupError {
    fn from(e: mongodb::error::Error) -> Self {
        LookupError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LookupError>;
