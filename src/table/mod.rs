mod cursor;
mod error;
mod page_rw;
mod table_rw;

pub use cursor::{PageCursor, PageListCursor, RecordCursor, RecordIter, TableCursor};
pub use error::{TableError, TableResult};
pub use page_rw::{PageKind, PageReaderWriter, HEADER_SIZE};
pub use table_rw::TableReaderWriter;
