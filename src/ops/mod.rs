mod aggregate;
mod join;
mod selection;

pub use aggregate::{AggFunc, Aggregate};
pub use join::{HashJoin, SortMergeJoin};
pub use selection::{BPlusSelection, RegularSelection};

use std::rc::Rc;

use crate::file::BufferManager;
use crate::record::{PageRecord, Record, Value};
use crate::table::{PageReaderWriter, TableError, TableResult, TableReaderWriter};

/// Row filter over a single input.
pub type Predicate = Box<dyn Fn(&Record) -> bool>;

/// Computes one output attribute from an input record.
pub type Projection = Box<dyn Fn(&Record) -> Value>;

/// Extracts the comparison key from a record. Shared between an operator and
/// the sort or hash machinery underneath it, hence the `Rc`.
pub type KeyExtractor = Rc<dyn Fn(&Record) -> Value>;

/// Row filter over a pair of join candidates (left, right).
pub type JoinPredicate = Box<dyn Fn(&Record, &Record) -> bool>;

/// Computes one output attribute from a matched (left, right) pair.
pub type JoinProjection = Box<dyn Fn(&Record, &Record) -> Value>;

/// Append a record to a growing list of scratch pages and report where it
/// landed as (page index in list, byte offset on page).
pub(crate) fn append_with_offset(
    buffer: &BufferManager,
    pages: &mut Vec<PageReaderWriter>,
    rec: &Record,
) -> TableResult<(usize, usize)> {
    if let Some(page) = pages.last()
        && let Some(offset) = page.append_and_return_offset(rec)?
    {
        return Ok((pages.len() - 1, offset));
    }
    let page = PageReaderWriter::new(buffer.get_scratch_page()?);
    page.clear()?;
    let offset =
        page.append_and_return_offset(rec)?
            .ok_or_else(|| TableError::RecordTooLarge {
                size: rec.binary_size(),
                page_size: page.page_size(),
            })?;
    pages.push(page);
    Ok((pages.len() - 1, offset))
}

/// Byte encoding of a value list, used as a hash key for grouping and hash
/// joins. Equal value lists encode identically.
pub(crate) fn encode_key(values: &[Value]) -> TableResult<Vec<u8>> {
    let size: usize = values.iter().map(Value::binary_size).sum();
    let mut buf = vec![0u8; size];
    let mut pos = 0;
    for v in values {
        pos += v.write(&mut buf[pos..]).map_err(TableError::Record)?;
    }
    Ok(buf)
}

/// Append one projected record built from a matched pair to the output.
pub(crate) fn emit_joined(
    output: &TableReaderWriter,
    projections: &[JoinProjection],
    left: &Record,
    right: &Record,
) -> TableResult<()> {
    let mut out = output.empty_record();
    for (i, proj) in projections.iter().enumerate() {
        out.set_at(i, proj(left, right));
    }
    output.append(&out)
}
