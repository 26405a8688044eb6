mod error;

pub use error::{BTreeError, BTreeResult};

use std::cmp::Ordering;

use crate::catalog::TableRef;
use crate::file::BufferManager;
use crate::record::{compare_values, IndexKey, IndexRecord, PageRecord, Record, Value};
use crate::table::{
    PageKind, PageReaderWriter, RecordCursor, RecordIter, TableError, TableResult,
    TableReaderWriter,
};

/// A table whose pages form a B+-tree over one ordering attribute.
///
/// Directory pages hold `IndexRecord` entries sorted by key; every record in
/// the subtree under an entry has a key less than or equal to the entry's,
/// and the rightmost entry carries the `Max` sentinel so descent never falls
/// off the end. Leaf pages are ordinary record pages and are not kept sorted;
/// only the leaf-to-key-range assignment is maintained, which is what range
/// discovery relies on.
pub struct BPlusTreeReaderWriter {
    inner: TableReaderWriter,
    ordering_att: usize,
}

impl BPlusTreeReaderWriter {
    /// Open an index over `table`, ordered by the attribute named
    /// `order_by`.
    pub fn new(order_by: &str, table: TableRef, buffer: BufferManager) -> BTreeResult<Self> {
        let inner = TableReaderWriter::new(table, buffer)?;
        let ordering_att = inner
            .schema()
            .att_index(order_by)
            .ok_or_else(|| BTreeError::NoSuchAttribute(order_by.to_string()))?;
        Ok(Self {
            inner,
            ordering_att,
        })
    }

    pub fn table_rw(&self) -> &TableReaderWriter {
        &self.inner
    }

    pub fn ordering_att(&self) -> usize {
        self.ordering_att
    }

    fn key_of(&self, rec: &Record) -> IndexKey {
        IndexKey::Val(rec.at(self.ordering_att).clone())
    }

    /// Comparator ordering data records by this index's attribute.
    pub fn key_comparator(&self) -> crate::sort::RecordComparator {
        let att = self.ordering_att;
        std::rc::Rc::new(move |a: &Record, b: &Record| compare_values(a.at(att), b.at(att)))
    }

    /// First use of an index table: page 0 becomes the root directory,
    /// pointing at a single empty leaf through the `Max` sentinel.
    fn ensure_root(&self) -> BTreeResult<()> {
        if self.inner.table().borrow().root_location() >= 0 {
            return Ok(());
        }
        let root = self.inner.page(0)?;
        root.clear()?;
        root.set_kind(PageKind::Directory)?;
        let leaf = self.new_page()?;
        self.must_append(&root, &IndexRecord::new(IndexKey::Max, leaf.page_index()))?;
        self.inner.table().borrow_mut().set_root_location(0);
        Ok(())
    }

    /// Grow the table by one cleared page and return it.
    fn new_page(&self) -> TableResult<PageReaderWriter> {
        let next = (self.inner.table().borrow().last_page() + 1) as usize;
        self.inner.page(next)
    }

    fn must_append(&self, page: &PageReaderWriter, rec: &impl PageRecord) -> TableResult<()> {
        if page.append(rec)? {
            Ok(())
        } else {
            Err(TableError::RecordTooLarge {
                size: rec.binary_size(),
                page_size: page.page_size(),
            })
        }
    }

    /// Insert a record, splitting pages on the way up as needed. A split
    /// that propagates past the root grows the tree by one level.
    pub fn append(&self, rec: &Record) -> BTreeResult<()> {
        self.ensure_root()?;
        let root = self.inner.table().borrow().root_location() as usize;

        if let Some(promoted) = self.append_at(root, rec)? {
            let new_root = self.new_page()?;
            new_root.set_kind(PageKind::Directory)?;
            self.must_append(&new_root, &promoted)?;
            self.must_append(&new_root, &IndexRecord::new(IndexKey::Max, root))?;
            self.inner
                .table()
                .borrow_mut()
                .set_root_location(new_root.page_index() as i64);
        }
        Ok(())
    }

    /// Recursive insert. Returns the directory entry for a freshly split-off
    /// page when the target page had to split, `None` otherwise.
    fn append_at(&self, page_idx: usize, rec: &Record) -> BTreeResult<Option<IndexRecord>> {
        let page = self.inner.page(page_idx)?;
        match page.kind()? {
            PageKind::Regular => {
                if page.append(rec)? {
                    Ok(None)
                } else {
                    let att = self.ordering_att;
                    let key_of =
                        move |r: &Record| IndexKey::Val(r.at(att).clone());
                    Ok(Some(self.split_page(
                        &page,
                        rec,
                        &self.inner.empty_record(),
                        &key_of,
                    )?))
                }
            }
            PageKind::Directory => {
                let entries: Vec<IndexRecord> = page.decode_all(&IndexRecord::empty())?;
                let key = self.key_of(rec);
                let child = entries
                    .iter()
                    .find(|e| e.key.compare(&key) != Ordering::Less)
                    .or(entries.last())
                    .expect("directory pages always hold at least the sentinel entry")
                    .child;

                match self.append_at(child, rec)? {
                    None => Ok(None),
                    Some(promoted) => {
                        if page.append(&promoted)? {
                            page.sort_in_place(
                                &|a: &IndexRecord, b: &IndexRecord| a.key.compare(&b.key),
                                &IndexRecord::empty(),
                            )?;
                            Ok(None)
                        } else {
                            let key_of = |r: &IndexRecord| r.key.clone();
                            Ok(Some(self.split_page(
                                &page,
                                &promoted,
                                &IndexRecord::empty(),
                                &key_of,
                            )?))
                        }
                    }
                }
            }
        }
    }

    /// Split a full page. The low half of the records (boundary included)
    /// moves to a fresh page; the high half stays put, so every directory
    /// entry already pointing at this page remains valid. Returns the entry
    /// for the new page.
    fn split_page<R: PageRecord + Clone>(
        &self,
        page: &PageReaderWriter,
        extra: &R,
        proto: &R,
        key_of: &dyn Fn(&R) -> IndexKey,
    ) -> BTreeResult<IndexRecord> {
        let kind = page.kind()?;
        let mut recs = page.decode_all(proto)?;
        recs.push(extra.clone());
        recs.sort_by(|a, b| key_of(a).compare(&key_of(b)));

        let half = recs.len() / 2;
        let boundary = key_of(&recs[half]);

        let low_page = self.new_page()?;
        low_page.set_kind(kind)?;
        for r in &recs[..=half] {
            self.must_append(&low_page, r)?;
        }

        page.clear()?;
        page.set_kind(kind)?;
        for r in &recs[half + 1..] {
            self.must_append(page, r)?;
        }

        Ok(IndexRecord::new(boundary, low_page.page_index()))
    }

    /// Collect, in key order, every leaf page that could hold a key in
    /// `[low, high]`.
    fn discover_pages(
        &self,
        page_idx: usize,
        out: &mut Vec<PageReaderWriter>,
        low: &IndexKey,
        high: &IndexKey,
    ) -> BTreeResult<()> {
        let page = self.inner.page(page_idx)?;
        if page.kind()? == PageKind::Regular {
            out.push(page);
            return Ok(());
        }
        for entry in page.decode_all(&IndexRecord::empty())? {
            if entry.key.compare(low) != Ordering::Less {
                self.discover_pages(entry.child, out, low, high)?;
            }
            if high.compare(&entry.key) == Ordering::Less {
                break;
            }
        }
        Ok(())
    }

    fn matching_leaves(&self, low: &Value, high: &Value) -> BTreeResult<Vec<PageReaderWriter>> {
        self.ensure_root()?;
        let root = self.inner.table().borrow().root_location() as usize;
        let mut pages = Vec::new();
        self.discover_pages(
            root,
            &mut pages,
            &IndexKey::Val(low.clone()),
            &IndexKey::Val(high.clone()),
        )?;
        Ok(pages)
    }

    /// Cursor over every record with key in `[low, high]`, in leaf order.
    /// Records within a leaf come back in insertion order.
    pub fn range_cursor(&self, low: Value, high: Value) -> BTreeResult<BTreeRangeCursor> {
        let pages = self.matching_leaves(&low, &high)?;
        Ok(BTreeRangeCursor::new(
            pages,
            low,
            high,
            self.ordering_att,
            self.inner.empty_record(),
        ))
    }

    /// Like `range_cursor`, but each matching leaf is first sorted in place,
    /// so records come back in ascending key order across the whole range.
    pub fn sorted_range_cursor(&self, low: Value, high: Value) -> BTreeResult<BTreeRangeCursor> {
        let pages = self.matching_leaves(&low, &high)?;
        let att = self.ordering_att;
        let cmp = move |a: &Record, b: &Record| compare_values(a.at(att), b.at(att));
        for page in &pages {
            page.sort_in_place(&cmp, &self.inner.empty_record())?;
        }
        Ok(BTreeRangeCursor::new(
            pages,
            low,
            high,
            self.ordering_att,
            self.inner.empty_record(),
        ))
    }

    /// Iterator form of `range_cursor`.
    pub fn range(
        &self,
        low: Value,
        high: Value,
    ) -> BTreeResult<RecordIter<BTreeRangeCursor, Record>> {
        let proto = self.inner.empty_record();
        Ok(RecordIter::new(self.range_cursor(low, high)?, proto))
    }

    /// Iterator form of `sorted_range_cursor`.
    pub fn sorted_range(
        &self,
        low: Value,
        high: Value,
    ) -> BTreeResult<RecordIter<BTreeRangeCursor, Record>> {
        let proto = self.inner.empty_record();
        Ok(RecordIter::new(self.sorted_range_cursor(low, high)?, proto))
    }
}

/// Cursor over the leaves a range query discovered, filtering out the
/// records whose key falls outside `[low, high]`.
pub struct BTreeRangeCursor {
    inner: crate::table::PageListCursor,
    low: Value,
    high: Value,
    att: usize,
    proto: Record,
    current: Option<Record>,
}

impl BTreeRangeCursor {
    fn new(pages: Vec<PageReaderWriter>, low: Value, high: Value, att: usize, proto: Record) -> Self {
        Self {
            inner: crate::table::PageListCursor::new(pages),
            low,
            high,
            att,
            proto,
            current: None,
        }
    }

    pub fn advance(&mut self) -> TableResult<bool> {
        while self.inner.advance()? {
            let mut rec = self.proto.clone();
            self.inner.get_current(&mut rec)?;
            let key = rec.at(self.att);
            if compare_values(key, &self.low) != Ordering::Less
                && compare_values(key, &self.high) != Ordering::Greater
            {
                self.current = Some(rec);
                return Ok(true);
            }
        }
        self.current = None;
        Ok(false)
    }

    pub fn get_current(&mut self, rec: &mut Record) -> TableResult<()> {
        rec.clone_from(
            self.current
                .as_ref()
                .expect("advance must be called before get_current"),
        );
        Ok(())
    }
}

impl RecordCursor<Record> for BTreeRangeCursor {
    fn advance(&mut self) -> TableResult<bool> {
        BTreeRangeCursor::advance(self)
    }

    fn get_current(&mut self, rec: &mut Record) -> TableResult<()> {
        BTreeRangeCursor::get_current(self, rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Table;
    use crate::record::{AttKind, ColumnDef, Schema};
    use tempfile::TempDir;

    fn setup(page_size: usize, pool: usize) -> (TempDir, BPlusTreeReaderWriter) {
        let dir = tempfile::tempdir().unwrap();
        let bm = BufferManager::new(page_size, pool, dir.path().join("tmp.dat")).unwrap();
        let schema = Schema::new(vec![
            ColumnDef::new("key", AttKind::Int),
            ColumnDef::new("payload", AttKind::Varchar),
        ]);
        let table = Table::new("idx", dir.path().join("idx.tbl"), schema);
        let tree = BPlusTreeReaderWriter::new("key", table, bm).unwrap();
        (dir, tree)
    }

    fn add(tree: &BPlusTreeReaderWriter, key: i64, payload: &str) {
        let mut rec = tree.table_rw().empty_record();
        rec.set_at(0, Value::Int(key));
        rec.set_at(1, Value::Varchar(payload.to_string()));
        tree.append(&rec).unwrap();
    }

    fn keys_in_range(tree: &BPlusTreeReaderWriter, low: i64, high: i64) -> Vec<i64> {
        tree.range(Value::Int(low), Value::Int(high))
            .unwrap()
            .map(|r| match r.unwrap().at(0) {
                Value::Int(i) => *i,
                _ => panic!("expected int key"),
            })
            .collect()
    }

    fn sorted_keys_in_range(tree: &BPlusTreeReaderWriter, low: i64, high: i64) -> Vec<i64> {
        tree.sorted_range(Value::Int(low), Value::Int(high))
            .unwrap()
            .map(|r| match r.unwrap().at(0) {
                Value::Int(i) => *i,
                _ => panic!("expected int key"),
            })
            .collect()
    }

    #[test]
    fn test_unknown_ordering_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let bm = BufferManager::new(256, 8, dir.path().join("tmp.dat")).unwrap();
        let schema = Schema::new(vec![ColumnDef::new("key", AttKind::Int)]);
        let table = Table::new("idx", dir.path().join("idx.tbl"), schema);
        assert!(matches!(
            BPlusTreeReaderWriter::new("missing", table, bm),
            Err(BTreeError::NoSuchAttribute(_))
        ));
    }

    #[test]
    fn test_empty_tree_range() {
        let (_dir, tree) = setup(256, 8);
        assert!(keys_in_range(&tree, 0, 100).is_empty());
    }

    #[test]
    fn test_insert_and_lookup_without_splits() {
        let (_dir, tree) = setup(512, 8);
        for key in [5, 1, 9, 3] {
            add(&tree, key, "p");
        }
        let mut keys = keys_in_range(&tree, 0, 100);
        keys.sort_unstable();
        assert_eq!(keys, vec![1, 3, 5, 9]);
        assert_eq!(sorted_keys_in_range(&tree, 2, 5), vec![3, 5]);
    }

    #[test]
    fn test_leaf_split_keeps_range_complete() {
        // 72-byte pages hold four 15-byte records per leaf, so the fifth
        // insert forces a split.
        let (_dir, tree) = setup(72, 16);
        for key in [5, 3, 8, 1, 9, 2, 7] {
            add(&tree, key, "x");
        }
        assert_eq!(sorted_keys_in_range(&tree, 3, 8), vec![3, 5, 7, 8]);
    }

    #[test]
    fn test_many_inserts_split_the_tree() {
        // Small pages so the tree grows several directory levels.
        let (_dir, tree) = setup(128, 32);
        let n = 300i64;
        for i in 0..n {
            add(&tree, (i * 17) % n, "x");
        }
        assert!(tree.table_rw().table().borrow().root_location() > 0);

        let keys = sorted_keys_in_range(&tree, 0, n);
        assert_eq!(keys, (0..n).collect::<Vec<i64>>());
    }

    #[test]
    fn test_sorted_range_is_ascending() {
        let (_dir, tree) = setup(128, 16);
        for i in 0..100i64 {
            add(&tree, (i * 7) % 100, "x");
        }
        let keys = sorted_keys_in_range(&tree, 20, 60);
        assert_eq!(keys, (20..=60).collect::<Vec<i64>>());
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let (_dir, tree) = setup(256, 8);
        for key in 1..=10 {
            add(&tree, key, "x");
        }
        let keys = sorted_keys_in_range(&tree, 3, 7);
        assert_eq!(keys, vec![3, 4, 5, 6, 7]);
        assert!(keys_in_range(&tree, 11, 20).is_empty());
        assert_eq!(sorted_keys_in_range(&tree, 10, 10), vec![10]);
    }

    #[test]
    fn test_duplicate_keys_all_found() {
        let (_dir, tree) = setup(128, 16);
        for i in 0..40 {
            add(&tree, 7, &format!("dup{i}"));
            add(&tree, i, "other");
        }
        let dups = keys_in_range(&tree, 7, 7);
        // 40 inserted with key 7, plus one from the 0..40 sequence.
        assert_eq!(dups.len(), 41);
        assert!(dups.iter().all(|&k| k == 7));
    }

    #[test]
    fn test_table_scan_skips_directory_pages() {
        let (_dir, tree) = setup(128, 16);
        for i in 0..100i64 {
            add(&tree, i, "x");
        }
        // A plain table scan sees each data record exactly once.
        assert_eq!(tree.table_rw().iter().count(), 100);
    }
}
