//! Error types for the page allocation layer.

use std::io;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for page operations.
pub type Result<T> = std::result::Result<T, PageError>;

/// Errors that can occur in page operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PageError {
    /// The provider could not grant the requested memory
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// Requested order exceeds the supported maximum
    #[error("Invalid order {order}, maximum is {max}")]
    InvalidOrder {
        /// Order passed by the caller
        order: u32,
        /// Largest supported order
        max: u32,
    },

    /// Order passed to a free operation differs from the allocation order
    #[error("Order mismatch for {addr:#x}: allocated with order {allocated}, freed with order {requested}")]
    OrderMismatch {
        /// Base address of the allocation
        addr: u64,
        /// Order recorded at allocation time
        allocated: u32,
        /// Order passed to the free operation
        requested: u32,
    },

    /// No live descriptor is registered at the address
    #[error("Page not found: {0:#x}")]
    NotFound(u64),

    /// The translator has no mapping for the address
    #[error("Address not mapped: {0:#x}")]
    NotMapped(u64),

    /// The process-wide allocator was initialized twice
    #[error("Page allocator already initialized")]
    AlreadyInitialized,

    /// The process-wide allocator has not been initialized
    #[error("Page allocator not initialized")]
    NotInitialized,

    /// Unimplemented operation
    #[error("Unimplemented operation: {0}")]
    Unimplemented(&'static str),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PageError {
    /// Convert to a negative errno value for the C ABI
    #[inline]
    #[must_use]
    #[allow(clippy::wildcard_enum_match_arm)]
    pub fn to_errno(&self) -> i32 {
        let errno = match *self {
            PageError::OutOfMemory(_) => libc::ENOMEM,
            PageError::InvalidOrder { .. } | PageError::OrderMismatch { .. } => libc::EINVAL,
            PageError::NotFound(_) => libc::ENOENT,
            PageError::NotMapped(_) => libc::EFAULT,
            PageError::AlreadyInitialized => libc::EBUSY,
            PageError::NotInitialized => libc::ENODEV,
            PageError::Unimplemented(_) => libc::ENOSYS,
            PageError::IoError(ref e) => e.raw_os_error().unwrap_or(libc::EIO),
            _ => libc::EIO,
        };
        -errno
    }
}
