mod buffer_manager;
mod error;
mod file_manager;
mod page;

pub use buffer_manager::BufferManager;
pub use error::{FileError, FileResult};
pub use file_manager::FileManager;
pub use page::PageHandle;

pub(crate) use page::PageRef;

/// Default page size in bytes (8KB)
pub const DEFAULT_PAGE_SIZE: usize = 8192;

/// Default number of frames in the buffer pool
pub const DEFAULT_POOL_SIZE: usize = 1024;

/// Page ID type (logical page index within a file)
pub type PageId = usize;
