//! Storage abstraction.
//!
//! The node cache reads and writes whole pages through the `StorageManager`
//! trait, so production code runs against a file while tests run against an
//! in-memory store that can inject faults.

use crate::storage::page::{Page, PageIndex};

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error.
    Io(std::io::Error),
    /// Injected fault for simulation.
    InjectedFault(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InjectedFault(_) => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Raw fixed-size page access against a backing byte store.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `read_page` returns the last written content for a page
/// - `read_page` of a never-written page returns a zeroed page, not an error
/// - `write_page` overwrites the page in place
/// - errors are surfaced to the caller and not retried
pub trait StorageManager {
    /// Read exactly one page.
    fn read_page(&mut self, index: PageIndex) -> Result<Page, StorageError>;

    /// Write exactly one page at `index`.
    fn write_page(&mut self, index: PageIndex, page: &Page) -> Result<(), StorageError>;

    /// Make all previous writes durable.
    fn sync(&mut self) -> Result<(), StorageError>;
}
