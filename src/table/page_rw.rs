use std::cmp::Ordering;

use super::cursor::{PageCursor, RecordIter};
use super::error::{TableError, TableResult};
use crate::file::{BufferManager, PageHandle, PageId};
use crate::record::{PageRecord, Record};

/// On-page header: a four-byte counter of record bytes in use, a one-byte
/// page kind, and three bytes of padding. Records are packed immediately
/// after it.
pub const HEADER_SIZE: usize = 8;

const KIND_OFFSET: usize = 4;

/// What a page holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Packed data records.
    Regular,
    /// Packed B+-tree directory entries.
    Directory,
}

impl PageKind {
    fn to_byte(self) -> u8 {
        match self {
            PageKind::Regular => 0,
            PageKind::Directory => 1,
        }
    }

    fn from_byte(b: u8) -> Self {
        if b == 1 {
            PageKind::Directory
        } else {
            PageKind::Regular
        }
    }
}

/// Record-level view of one page.
///
/// All mutation goes through the page handle, so dirty tracking and eviction
/// behave the same whether the page belongs to a table or is anonymous
/// scratch space. A page read straight off disk full of zeroes parses as an
/// empty regular page.
#[derive(Clone)]
pub struct PageReaderWriter {
    handle: PageHandle,
    page_size: usize,
}

impl PageReaderWriter {
    pub fn new(handle: PageHandle) -> Self {
        let page_size = handle.page_size();
        Self { handle, page_size }
    }

    pub fn handle(&self) -> &PageHandle {
        &self.handle
    }

    pub fn page_index(&self) -> PageId {
        self.handle.page_index()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Reset to an empty regular page.
    pub fn clear(&self) -> TableResult<()> {
        {
            let mut bytes = self.handle.bytes()?;
            bytes[..HEADER_SIZE].fill(0);
        }
        self.handle.wrote_bytes();
        Ok(())
    }

    pub fn kind(&self) -> TableResult<PageKind> {
        let bytes = self.handle.bytes()?;
        Ok(PageKind::from_byte(bytes[KIND_OFFSET]))
    }

    pub fn set_kind(&self, kind: PageKind) -> TableResult<()> {
        {
            let mut bytes = self.handle.bytes()?;
            bytes[KIND_OFFSET] = kind.to_byte();
        }
        self.handle.wrote_bytes();
        Ok(())
    }

    /// Offset of the first free byte. The header counter tracks record bytes
    /// only, so a zeroed (never-cleared) page counts as empty.
    pub fn used_bytes(&self) -> TableResult<usize> {
        let bytes = self.handle.bytes()?;
        Ok(Self::used_from(&bytes))
    }

    fn used_from(bytes: &[u8]) -> usize {
        let recs = u32::from_le_bytes(bytes[..4].try_into().expect("header is 4 bytes")) as usize;
        HEADER_SIZE + recs
    }

    /// Free bytes remaining for records.
    pub fn free_bytes(&self) -> TableResult<usize> {
        Ok(self.page_size - self.used_bytes()?)
    }

    /// Append a record; returns `false`, leaving the page untouched, when it
    /// does not fit.
    pub fn append(&self, rec: &impl PageRecord) -> TableResult<bool> {
        Ok(self.append_and_return_offset(rec)?.is_some())
    }

    /// Append a record and report the byte offset it was written at, or
    /// `None` when it does not fit.
    pub fn append_and_return_offset(&self, rec: &impl PageRecord) -> TableResult<Option<usize>> {
        let size = rec.binary_size();
        let offset = {
            let mut bytes = self.handle.bytes()?;
            let used = Self::used_from(&bytes);
            if used + size > self.page_size {
                return Ok(None);
            }
            rec.to_binary(&mut bytes[used..used + size])?;
            bytes[..4].copy_from_slice(&((used + size - HEADER_SIZE) as u32).to_le_bytes());
            used
        };
        self.handle.wrote_bytes();
        Ok(Some(offset))
    }

    /// Deserialize the record stored at `offset`; returns its encoded size.
    pub fn read_at(&self, offset: usize, rec: &mut impl PageRecord) -> TableResult<usize> {
        let bytes = self.handle.bytes()?;
        let used = Self::used_from(&bytes);
        Ok(rec.from_binary(&bytes[offset..used])?)
    }

    /// Overwrite the record at `offset` in place. The replacement must have
    /// the same encoded size as what it replaces, or the records after it
    /// turn to garbage.
    pub fn rewrite_at(&self, offset: usize, rec: &impl PageRecord) -> TableResult<()> {
        let size = rec.binary_size();
        {
            let mut bytes = self.handle.bytes()?;
            rec.to_binary(&mut bytes[offset..offset + size])?;
        }
        self.handle.wrote_bytes();
        Ok(())
    }

    /// Cursor over the records packed on this page.
    pub fn cursor(&self) -> PageCursor {
        PageCursor::new(self.clone())
    }

    /// Iterator over this page's records, cloning `proto` per record.
    pub fn records<R: PageRecord + Clone>(&self, proto: R) -> RecordIter<PageCursor, R> {
        RecordIter::new(self.cursor(), proto)
    }

    /// Decode every record on the page, using `proto` as the template.
    pub fn decode_all<R: PageRecord + Clone>(&self, proto: &R) -> TableResult<Vec<R>> {
        let mut out = Vec::new();
        let bytes = self.handle.bytes()?;
        let used = Self::used_from(&bytes);
        let mut pos = HEADER_SIZE;
        while pos < used {
            let mut rec = proto.clone();
            pos += rec.from_binary(&bytes[pos..used])?;
            out.push(rec);
        }
        Ok(out)
    }

    /// Stable-sort the records on this page in place, preserving the page
    /// kind.
    pub fn sort_in_place<R: PageRecord + Clone>(
        &self,
        cmp: &dyn Fn(&R, &R) -> Ordering,
        proto: &R,
    ) -> TableResult<()> {
        let kind = self.kind()?;
        let mut recs = self.decode_all(proto)?;
        recs.sort_by(|a, b| cmp(a, b));
        self.clear()?;
        self.set_kind(kind)?;
        for rec in &recs {
            if !self.append(rec)? {
                return Err(TableError::RecordTooLarge {
                    size: rec.binary_size(),
                    page_size: self.page_size,
                });
            }
        }
        Ok(())
    }

    /// Non-destructive sort: the records land in sorted order on a fresh
    /// scratch page, this page is left as-is.
    pub fn sorted<R: PageRecord + Clone>(
        &self,
        buffer: &BufferManager,
        cmp: &dyn Fn(&R, &R) -> Ordering,
        proto: &R,
    ) -> TableResult<PageReaderWriter> {
        let mut recs = self.decode_all(proto)?;
        recs.sort_by(|a, b| cmp(a, b));

        let out = PageReaderWriter::new(buffer.get_scratch_page()?);
        out.clear()?;
        for rec in &recs {
            if !out.append(rec)? {
                return Err(TableError::RecordTooLarge {
                    size: rec.binary_size(),
                    page_size: self.page_size,
                });
            }
        }
        Ok(out)
    }
}
