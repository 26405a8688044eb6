pub mod btree;
pub mod catalog;
pub mod file;
pub mod ops;
pub mod record;
pub mod sort;
pub mod table;

pub use btree::{BPlusTreeReaderWriter, BTreeError, BTreeRangeCursor, BTreeResult};
pub use catalog::{Catalog, CatalogError, CatalogResult, Table, TableRef};
pub use file::{
    BufferManager, FileError, FileManager, FileResult, PageHandle, PageId, DEFAULT_PAGE_SIZE,
    DEFAULT_POOL_SIZE,
};
pub use ops::{
    AggFunc, Aggregate, BPlusSelection, HashJoin, JoinPredicate, JoinProjection, KeyExtractor,
    Predicate, Projection, RegularSelection, SortMergeJoin,
};
pub use record::{
    compare_values, AttKind, ColumnDef, IndexKey, IndexRecord, PageRecord, Record, RecordError,
    RecordResult, Schema, Value,
};
pub use sort::{merge_into_list, merge_into_table, sort, RecordComparator};
pub use table::{
    PageCursor, PageKind, PageListCursor, PageReaderWriter, RecordCursor, RecordIter, TableCursor,
    TableError, TableResult, TableReaderWriter, HEADER_SIZE,
};
