use thiserror::Error;

use crate::bundle::BundleError;
use crate::filter::FilterError;
use crate::registry::RegistryError;

#[derive(Error, Debug)]
pub enum Error {
    // invalid argument: malformed filter
    #[error("Invalid argument: {0}")]
    InvalidFilter(#[from] FilterError),
    // invalid argument: cooperating bundle failed to start
    #[error("Invalid argument: {0}")]
    BundleActivation(#[from] BundleError),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Config error: {0}")]
    Config(String),
}

pub type LocatorResult<T> = Result<T, Error>;

impl Error {
    /// Filter syntax and bundle activation failures both surface as an
    /// invalid argument to the caller.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidFilter(_) | Error::BundleActivation(_))
    }
}
