use std::path::Path;
use std::rc::Rc;

use super::cursor::{RecordIter, TableCursor};
use super::error::{TableError, TableResult};
use super::page_rw::PageReaderWriter;
use crate::catalog::TableRef;
use crate::file::BufferManager;
use crate::record::{AttKind, PageRecord, Record, Schema, Value};

/// Record-level view of one table.
///
/// Cheap to clone; all clones share the table metadata, so growth performed
/// through one is visible to the others. Pages are materialized on first
/// touch, and page 0 is cleared the first time a table is ever opened.
#[derive(Clone)]
pub struct TableReaderWriter {
    table: TableRef,
    buffer: BufferManager,
    schema: Rc<Schema>,
}

impl TableReaderWriter {
    pub fn new(table: TableRef, buffer: BufferManager) -> TableResult<Self> {
        let schema = Rc::new(table.borrow().schema().clone());
        let rw = Self {
            table,
            buffer,
            schema,
        };
        if rw.table.borrow().last_page() < 0 {
            rw.table.borrow_mut().set_last_page(0);
            rw.page(0)?.clear()?;
        }
        Ok(rw)
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn buffer(&self) -> &BufferManager {
        &self.buffer
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    /// Number of pages the table currently spans.
    pub fn num_pages(&self) -> usize {
        (self.table.borrow().last_page() + 1).max(1) as usize
    }

    /// View of page `i`. Asking past the end grows the table, clearing every
    /// page added on the way.
    pub fn page(&self, i: usize) -> TableResult<PageReaderWriter> {
        let mut last = self.table.borrow().last_page();
        while last < i as i64 {
            last += 1;
            let fresh = PageReaderWriter::new(self.buffer.get_page(&self.table, last as usize)?);
            fresh.clear()?;
            self.table.borrow_mut().set_last_page(last);
        }
        Ok(PageReaderWriter::new(self.buffer.get_page(&self.table, i)?))
    }

    /// View of the last page.
    pub fn last(&self) -> TableResult<PageReaderWriter> {
        let last = self.table.borrow().last_page().max(0) as usize;
        self.page(last)
    }

    /// Append a record to the end of the table, rolling over to a fresh page
    /// when the last one is full.
    pub fn append(&self, rec: &impl PageRecord) -> TableResult<()> {
        if self.last()?.append(rec)? {
            return Ok(());
        }

        let next = self.table.borrow().last_page() + 1;
        self.table.borrow_mut().set_last_page(next);
        let fresh = PageReaderWriter::new(self.buffer.get_page(&self.table, next as usize)?);
        fresh.clear()?;
        if fresh.append(rec)? {
            Ok(())
        } else {
            Err(TableError::RecordTooLarge {
                size: rec.binary_size(),
                page_size: fresh.page_size(),
            })
        }
    }

    /// A record matching this table's schema, for cursors to fill.
    pub fn empty_record(&self) -> Record {
        Record::new(self.schema.clone())
    }

    /// Cursor over every data record, in page order.
    pub fn cursor(&self) -> TableCursor {
        TableCursor::new(self.clone())
    }

    /// Iterator over every data record, in page order.
    pub fn iter(&self) -> RecordIter<TableCursor, Record> {
        RecordIter::new(self.cursor(), self.empty_record())
    }

    /// Replace the table's contents with the rows of a comma-separated text
    /// file, one record per line, fields in schema order.
    pub fn load_from_text_file(&self, path: impl AsRef<Path>) -> TableResult<()> {
        self.table.borrow_mut().set_last_page(0);
        self.page(0)?.clear()?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;

        for row in reader.records() {
            let row = row?;
            if row.len() != self.schema.num_atts() {
                return Err(TableError::MalformedRow(format!(
                    "expected {} fields, got {}",
                    self.schema.num_atts(),
                    row.len()
                )));
            }

            let mut rec = self.empty_record();
            for (i, field) in row.iter().enumerate() {
                rec.set_at(i, parse_field(field, self.schema.att_kind(i))?);
            }
            self.append(&rec)?;
        }
        Ok(())
    }

    /// Dump every record to a comma-separated text file, one per line.
    pub fn write_into_text_file(&self, path: impl AsRef<Path>) -> TableResult<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        for rec in self.iter() {
            let rec = rec?;
            let fields: Vec<String> = rec.values().iter().map(format_field).collect();
            writer.write_record(&fields)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn parse_field(field: &str, kind: AttKind) -> TableResult<Value> {
    let bad = |what: &str| TableError::MalformedRow(format!("bad {what} field: {field:?}"));
    Ok(match kind {
        AttKind::Int => Value::Int(field.parse().map_err(|_| bad("int"))?),
        AttKind::Double => Value::Double(field.parse().map_err(|_| bad("double"))?),
        AttKind::Varchar => Value::Varchar(field.to_string()),
        AttKind::Bool => Value::Bool(field.eq_ignore_ascii_case("true") || field == "1"),
    })
}

fn format_field(value: &Value) -> String {
    match value {
        Value::Int(i) => i.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Varchar(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Table;
    use crate::record::ColumnDef;
    use tempfile::TempDir;

    fn setup(page_size: usize, pool: usize) -> (TempDir, BufferManager, TableReaderWriter) {
        let dir = tempfile::tempdir().unwrap();
        let bm = BufferManager::new(page_size, pool, dir.path().join("tmp.dat")).unwrap();
        let schema = Schema::new(vec![
            ColumnDef::new("id", AttKind::Int),
            ColumnDef::new("name", AttKind::Varchar),
        ]);
        let table = Table::new("t", dir.path().join("t.tbl"), schema);
        let rw = TableReaderWriter::new(table, bm.clone()).unwrap();
        (dir, bm, rw)
    }

    fn make_rec(rw: &TableReaderWriter, id: i64, name: &str) -> Record {
        let mut rec = rw.empty_record();
        rec.set_at(0, Value::Int(id));
        rec.set_at(1, Value::Varchar(name.to_string()));
        rec
    }

    #[test]
    fn test_append_rolls_over_pages() {
        let (_dir, _bm, rw) = setup(128, 8);
        for i in 0..50 {
            rw.append(&make_rec(&rw, i, "some payload")).unwrap();
        }
        assert!(rw.num_pages() > 1);

        let ids: Vec<i64> = rw
            .iter()
            .map(|r| match r.unwrap().at(0) {
                Value::Int(i) => *i,
                _ => panic!("expected int"),
            })
            .collect();
        assert_eq!(ids, (0..50).collect::<Vec<i64>>());
    }

    #[test]
    fn test_record_too_large() {
        let (_dir, _bm, rw) = setup(64, 8);
        let rec = make_rec(&rw, 1, &"x".repeat(100));
        assert!(matches!(
            rw.append(&rec),
            Err(TableError::RecordTooLarge { .. })
        ));
    }

    #[test]
    fn test_clones_share_growth() {
        let (_dir, _bm, rw) = setup(128, 8);
        let other = rw.clone();
        for i in 0..30 {
            rw.append(&make_rec(&rw, i, "payload here")).unwrap();
        }
        assert_eq!(other.num_pages(), rw.num_pages());
        assert_eq!(other.iter().count(), 30);
    }

    #[test]
    fn test_contents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let schema = Schema::new(vec![
            ColumnDef::new("id", AttKind::Int),
            ColumnDef::new("name", AttKind::Varchar),
        ]);
        let loc = dir.path().join("t.tbl");
        let saved_last;

        {
            let bm = BufferManager::new(128, 4, dir.path().join("tmp.dat")).unwrap();
            let table = Table::new("t", &loc, schema.clone());
            let rw = TableReaderWriter::new(table.clone(), bm).unwrap();
            for i in 0..20 {
                rw.append(&make_rec(&rw, i, "persisted")).unwrap();
            }
            saved_last = table.borrow().last_page();
        }

        let bm = BufferManager::new(128, 4, dir.path().join("tmp2.dat")).unwrap();
        let table = Table::new("t", &loc, schema);
        table.borrow_mut().set_last_page(saved_last);
        let rw = TableReaderWriter::new(table, bm).unwrap();
        assert_eq!(rw.iter().count(), 20);
    }

    #[test]
    fn test_text_file_round_trip() {
        let (dir, _bm, rw) = setup(256, 8);
        let input = dir.path().join("in.csv");
        std::fs::write(&input, "1,alice\n2,bob\n3,carol\n").unwrap();

        rw.load_from_text_file(&input).unwrap();
        assert_eq!(rw.iter().count(), 3);

        let output = dir.path().join("out.csv");
        rw.write_into_text_file(&output).unwrap();
        let text = std::fs::read_to_string(&output).unwrap();
        assert_eq!(text, "1,alice\n2,bob\n3,carol\n");
    }

    #[test]
    fn test_load_replaces_contents() {
        let (dir, _bm, rw) = setup(256, 8);
        rw.append(&make_rec(&rw, 99, "old")).unwrap();

        let input = dir.path().join("in.csv");
        std::fs::write(&input, "1,alice\n").unwrap();
        rw.load_from_text_file(&input).unwrap();

        let recs: Vec<Record> = rw.iter().map(|r| r.unwrap()).collect();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].at(0), &Value::Int(1));
    }

    #[test]
    fn test_malformed_row() {
        let (dir, _bm, rw) = setup(256, 8);
        let input = dir.path().join("in.csv");
        std::fs::write(&input, "not_an_int,alice\n").unwrap();
        assert!(matches!(
            rw.load_from_text_file(&input),
            Err(TableError::MalformedRow(_))
        ));
    }
}
