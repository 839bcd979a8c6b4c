//! Page-oriented storage.
//!
//! The tree never touches bytes on disk directly. Every node lives in exactly
//! one 4KB page, and pages are read and written whole through a
//! [`StorageManager`]:
//!
//! - [`FileStorage`]: a flat file of pages, page `i` at byte offset `i * 4096`
//! - [`MemoryStorage`]: pages in a map, with seeded fault injection for tests
//!
//! # Usage
//!
//! ```
//! use idtree::storage::{MemoryStorage, Page, StorageManager};
//!
//! let mut storage = MemoryStorage::new(7);
//!
//! let mut page = Page::new();
//! page.write_u64(0, 42);
//! storage.write_page(3, &page).unwrap();
//!
//! assert_eq!(storage.read_page(3).unwrap().read_u64(0), 42);
//! // Never-written pages read back as zeros.
//! assert_eq!(storage.read_page(9).unwrap().read_u64(0), 0);
//! ```

mod file;
mod io;
mod memory;
mod page;

pub use file::FileStorage;
pub use io::{StorageError, StorageManager};
pub use memory::{FaultConfig, MemoryStorage, MemoryStorageStats};
pub use page::{PAGE_SIZE, PAGE_SIZE_U64, Page, PageIndex};
