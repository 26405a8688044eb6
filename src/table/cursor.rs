use super::error::TableResult;
use super::page_rw::{PageKind, PageReaderWriter, HEADER_SIZE};
use super::table_rw::TableReaderWriter;
use crate::record::PageRecord;

/// Pull-style iteration over packed records.
///
/// Usage is strictly `advance` then `get_current`, repeated: `advance`
/// reports whether a record is available, `get_current` deserializes it (and
/// learns its encoded size, which is what the next `advance` steps over).
/// Advancing twice without a `get_current` in between is a protocol bug and
/// panics.
pub trait RecordCursor<R: PageRecord> {
    fn advance(&mut self) -> TableResult<bool>;
    fn get_current(&mut self, rec: &mut R) -> TableResult<()>;
}

/// Cursor over the records of a single page.
pub struct PageCursor {
    page: PageReaderWriter,
    offset: usize,
    consumed: Option<usize>,
}

impl PageCursor {
    pub(crate) fn new(page: PageReaderWriter) -> Self {
        Self {
            page,
            offset: HEADER_SIZE,
            consumed: Some(0),
        }
    }

    pub fn advance(&mut self) -> TableResult<bool> {
        let step = self
            .consumed
            .take()
            .expect("get_current must be called before advancing the cursor");
        self.offset += step;
        Ok(self.offset < self.page.used_bytes()?)
    }

    pub fn get_current<R: PageRecord>(&mut self, rec: &mut R) -> TableResult<()> {
        let size = self.page.read_at(self.offset, rec)?;
        self.consumed = Some(size);
        Ok(())
    }
}

impl<R: PageRecord> RecordCursor<R> for PageCursor {
    fn advance(&mut self) -> TableResult<bool> {
        PageCursor::advance(self)
    }

    fn get_current(&mut self, rec: &mut R) -> TableResult<()> {
        PageCursor::get_current(self, rec)
    }
}

/// Cursor over an explicit list of pages, in list order.
pub struct PageListCursor {
    pages: Vec<PageReaderWriter>,
    next: usize,
    inner: Option<PageCursor>,
}

impl PageListCursor {
    pub fn new(pages: Vec<PageReaderWriter>) -> Self {
        Self {
            pages,
            next: 0,
            inner: None,
        }
    }

    pub fn advance(&mut self) -> TableResult<bool> {
        loop {
            if self.inner.is_none() {
                let Some(page) = self.pages.get(self.next) else {
                    return Ok(false);
                };
                self.next += 1;
                self.inner = Some(page.cursor());
            }
            if self.inner.as_mut().expect("just set").advance()? {
                return Ok(true);
            }
            self.inner = None;
        }
    }

    pub fn get_current<R: PageRecord>(&mut self, rec: &mut R) -> TableResult<()> {
        self.inner
            .as_mut()
            .expect("advance must be called before get_current")
            .get_current(rec)
    }
}

impl<R: PageRecord> RecordCursor<R> for PageListCursor {
    fn advance(&mut self) -> TableResult<bool> {
        PageListCursor::advance(self)
    }

    fn get_current(&mut self, rec: &mut R) -> TableResult<()> {
        PageListCursor::get_current(self, rec)
    }
}

/// Cursor over every data record of a table, in page order. Directory pages
/// are skipped, so scanning an indexed table yields only its leaf records.
pub struct TableCursor {
    table: TableReaderWriter,
    next_page: usize,
    inner: Option<PageCursor>,
}

impl TableCursor {
    pub(crate) fn new(table: TableReaderWriter) -> Self {
        Self {
            table,
            next_page: 0,
            inner: None,
        }
    }

    pub fn advance(&mut self) -> TableResult<bool> {
        loop {
            if self.inner.is_none() {
                if self.next_page >= self.table.num_pages() {
                    return Ok(false);
                }
                let page = self.table.page(self.next_page)?;
                self.next_page += 1;
                if page.kind()? == PageKind::Directory {
                    continue;
                }
                self.inner = Some(page.cursor());
            }
            if self.inner.as_mut().expect("just set").advance()? {
                return Ok(true);
            }
            self.inner = None;
        }
    }

    pub fn get_current<R: PageRecord>(&mut self, rec: &mut R) -> TableResult<()> {
        self.inner
            .as_mut()
            .expect("advance must be called before get_current")
            .get_current(rec)
    }
}

impl<R: PageRecord> RecordCursor<R> for TableCursor {
    fn advance(&mut self) -> TableResult<bool> {
        TableCursor::advance(self)
    }

    fn get_current(&mut self, rec: &mut R) -> TableResult<()> {
        TableCursor::get_current(self, rec)
    }
}

/// Adapter turning a cursor into an `Iterator` of owned records, cloning
/// `proto` as the deserialization template.
pub struct RecordIter<C, R> {
    cursor: C,
    proto: R,
}

impl<C, R> RecordIter<C, R> {
    pub fn new(cursor: C, proto: R) -> Self {
        Self { cursor, proto }
    }
}

impl<C, R> Iterator for RecordIter<C, R>
where
    C: RecordCursor<R>,
    R: PageRecord + Clone,
{
    type Item = TableResult<R>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.cursor.advance() {
            Ok(true) => {
                let mut rec = self.proto.clone();
                match self.cursor.get_current(&mut rec) {
                    Ok(()) => Some(Ok(rec)),
                    Err(e) => Some(Err(e)),
                }
            }
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
