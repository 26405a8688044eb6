use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use crate::file::BufferManager;
use crate::record::Record;
use crate::table::{
    PageKind, PageListCursor, PageReaderWriter, TableError, TableResult, TableReaderWriter,
};

/// Orders the records being sorted. Shared by every heap entry of a merge.
pub type RecordComparator = Rc<dyn Fn(&Record, &Record) -> Ordering>;

/// External merge sort: sort the records of `src` into `dst`, reading at most
/// `run_size` pages of `src` at a time.
///
/// Each batch of `run_size` pages becomes one fully sorted run of scratch
/// pages (per-page sorts, then pairwise merges), and a final k-way merge
/// streams all runs into `dst`. `src` is left untouched; equal records keep
/// their original relative order.
pub fn sort(
    run_size: usize,
    src: &TableReaderWriter,
    dst: &TableReaderWriter,
    cmp: RecordComparator,
) -> TableResult<()> {
    let buffer = src.buffer();
    let proto = src.empty_record();
    let run_size = run_size.max(1);

    let mut runs: Vec<Vec<PageReaderWriter>> = Vec::new();
    let num_pages = src.num_pages();
    let mut start = 0;
    while start < num_pages {
        let end = (start + run_size).min(num_pages);

        let mut lists: Vec<Vec<PageReaderWriter>> = Vec::new();
        for i in start..end {
            let page = src.page(i)?;
            if page.kind()? == PageKind::Directory {
                continue;
            }
            lists.push(vec![page.sorted(buffer, cmp.as_ref(), &proto)?]);
        }
        if !lists.is_empty() {
            runs.push(merge_lists(buffer, lists, &cmp, &proto)?);
        }
        start = end;
    }

    let cursors = runs.into_iter().map(PageListCursor::new).collect();
    merge_into_table(dst, cursors, cmp)
}

/// Pairwise-merge single-page sorted lists down to one sorted list.
fn merge_lists(
    buffer: &BufferManager,
    mut lists: Vec<Vec<PageReaderWriter>>,
    cmp: &RecordComparator,
    proto: &Record,
) -> TableResult<Vec<PageReaderWriter>> {
    while lists.len() > 1 {
        let mut merged = Vec::with_capacity(lists.len().div_ceil(2));
        let mut iter = lists.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => merged.push(merge_into_list(
                    buffer,
                    PageListCursor::new(a),
                    PageListCursor::new(b),
                    cmp,
                    proto,
                )?),
                None => merged.push(a),
            }
        }
        lists = merged;
    }
    Ok(lists.pop().unwrap_or_default())
}

/// Two-way merge of sorted cursors into a fresh list of scratch pages. Ties
/// go to the left cursor.
pub fn merge_into_list(
    buffer: &BufferManager,
    mut left: PageListCursor,
    mut right: PageListCursor,
    cmp: &RecordComparator,
    proto: &Record,
) -> TableResult<Vec<PageReaderWriter>> {
    let mut out: Vec<PageReaderWriter> = Vec::new();
    let mut l = next_record(&mut left, proto)?;
    let mut r = next_record(&mut right, proto)?;

    loop {
        let take_left = match (&l, &r) {
            (Some(a), Some(b)) => cmp(a, b) != Ordering::Greater,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let rec = if take_left {
            let rec = l.take().expect("checked above");
            l = next_record(&mut left, proto)?;
            rec
        } else {
            let rec = r.take().expect("checked above");
            r = next_record(&mut right, proto)?;
            rec
        };
        append_to_list(buffer, &mut out, &rec)?;
    }
    Ok(out)
}

fn next_record(cursor: &mut PageListCursor, proto: &Record) -> TableResult<Option<Record>> {
    if cursor.advance()? {
        let mut rec = proto.clone();
        cursor.get_current(&mut rec)?;
        Ok(Some(rec))
    } else {
        Ok(None)
    }
}

pub(crate) fn append_to_list(
    buffer: &BufferManager,
    out: &mut Vec<PageReaderWriter>,
    rec: &Record,
) -> TableResult<()> {
    if let Some(page) = out.last()
        && page.append(rec)?
    {
        return Ok(());
    }
    let page = PageReaderWriter::new(buffer.get_scratch_page()?);
    page.clear()?;
    if !page.append(rec)? {
        return Err(TableError::RecordTooLarge {
            size: crate::record::PageRecord::binary_size(rec),
            page_size: page.page_size(),
        });
    }
    out.push(page);
    Ok(())
}

struct HeapEntry {
    /// Run number; ties between equal records pop the earlier run first.
    seq: usize,
    rec: Record,
    cursor: PageListCursor,
    order: RecordComparator,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        Ord::cmp(self, other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(Ord::cmp(self, other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap's max-heap pops the smallest record.
        (self.order)(&self.rec, &other.rec)
            .then(self.seq.cmp(&other.seq))
            .reverse()
    }
}

/// K-way merge of sorted runs into `dst`, appending in order.
pub fn merge_into_table(
    dst: &TableReaderWriter,
    runs: Vec<PageListCursor>,
    cmp: RecordComparator,
) -> TableResult<()> {
    let proto = dst.empty_record();
    let mut heap = BinaryHeap::with_capacity(runs.len());

    for (seq, mut cursor) in runs.into_iter().enumerate() {
        if let Some(rec) = next_record(&mut cursor, &proto)? {
            heap.push(HeapEntry {
                seq,
                rec,
                cursor,
                order: cmp.clone(),
            });
        }
    }

    while let Some(mut entry) = heap.pop() {
        dst.append(&entry.rec)?;
        if let Some(rec) = next_record(&mut entry.cursor, &proto)? {
            entry.rec = rec;
            heap.push(entry);
        }
    }
    Ok(())
}
