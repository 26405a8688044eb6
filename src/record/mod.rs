mod error;
mod record;
mod schema;
mod value;

pub use error::{RecordError, RecordResult};
pub use record::{IndexKey, IndexRecord, PageRecord, Record};
pub use schema::{ColumnDef, Schema};
pub use value::{compare_values, AttKind, Value};
