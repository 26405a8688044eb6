use std::cmp::Ordering;
use std::rc::Rc;

use ahash::AHashMap;

use super::{append_with_offset, emit_joined, encode_key, JoinPredicate, JoinProjection, KeyExtractor};
use crate::catalog::Table;
use crate::record::compare_values;
use crate::sort::{self, append_to_list, RecordComparator};
use crate::table::{PageListCursor, PageReaderWriter, TableResult, TableReaderWriter};

/// Equi-join via external sort.
///
/// Both inputs are sorted by their key into throwaway tables, then merged:
/// each maximal block of equal-key left records is buffered on scratch pages
/// and replayed against every right record with that key. The extra
/// predicate refines the equality match; projections build the output.
pub struct SortMergeJoin {
    left: TableReaderWriter,
    right: TableReaderWriter,
    output: TableReaderWriter,
    left_key: KeyExtractor,
    right_key: KeyExtractor,
    predicate: JoinPredicate,
    projections: Vec<JoinProjection>,
    run_size: usize,
}

impl SortMergeJoin {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        left: TableReaderWriter,
        right: TableReaderWriter,
        output: TableReaderWriter,
        left_key: KeyExtractor,
        right_key: KeyExtractor,
        predicate: JoinPredicate,
        projections: Vec<JoinProjection>,
        run_size: usize,
    ) -> Self {
        Self {
            left,
            right,
            output,
            left_key,
            right_key,
            predicate,
            projections,
            run_size,
        }
    }

    pub fn run(&self) -> TableResult<()> {
        let buffer = self.left.buffer().clone();

        let left_sorted = side_table(&self.left, "lsort")?;
        let right_sorted = side_table(&self.right, "rsort")?;

        let lk = self.left_key.clone();
        let lcmp: RecordComparator = Rc::new(move |a, b| compare_values(&lk(a), &lk(b)));
        sort::sort(self.run_size, &self.left, &left_sorted, lcmp)?;

        let rk = self.right_key.clone();
        let rcmp: RecordComparator = Rc::new(move |a, b| compare_values(&rk(a), &rk(b)));
        sort::sort(self.run_size, &self.right, &right_sorted, rcmp)?;

        let proto = left_sorted.empty_record();
        let mut left_iter = left_sorted.iter();
        let mut right_iter = right_sorted.iter();
        let mut l = left_iter.next().transpose()?;
        let mut r = right_iter.next().transpose()?;

        while let (Some(lrec), Some(rrec)) = (&l, &r) {
            match compare_values(&(self.left_key)(lrec), &(self.right_key)(rrec)) {
                Ordering::Less => l = left_iter.next().transpose()?,
                Ordering::Greater => r = right_iter.next().transpose()?,
                Ordering::Equal => {
                    let key = (self.left_key)(lrec);

                    let mut block: Vec<PageReaderWriter> = Vec::new();
                    while let Some(cur) = &l {
                        if compare_values(&(self.left_key)(cur), &key) != Ordering::Equal {
                            break;
                        }
                        append_to_list(&buffer, &mut block, cur)?;
                        l = left_iter.next().transpose()?;
                    }

                    while let Some(cur) = &r {
                        if compare_values(&(self.right_key)(cur), &key) != Ordering::Equal {
                            break;
                        }
                        let mut replay = PageListCursor::new(block.clone());
                        let mut buffered = proto.clone();
                        while replay.advance()? {
                            replay.get_current(&mut buffered)?;
                            if (self.predicate)(&buffered, cur) {
                                emit_joined(&self.output, &self.projections, &buffered, cur)?;
                            }
                        }
                        r = right_iter.next().transpose()?;
                    }
                }
            }
        }

        drop((l, r, left_iter, right_iter));
        let left_table = left_sorted.table().clone();
        let right_table = right_sorted.table().clone();
        drop((left_sorted, right_sorted));
        buffer.kill_table(&left_table)?;
        buffer.kill_table(&right_table)?;
        Ok(())
    }
}

/// A throwaway table with the same schema as `model`, stored next to it.
fn side_table(model: &TableReaderWriter, suffix: &str) -> TableResult<TableReaderWriter> {
    let (name, loc) = {
        let t = model.table().borrow();
        (
            format!("{}_{suffix}", t.name()),
            t.storage_loc().with_extension(suffix),
        )
    };
    let table = Table::new(name, loc, (**model.schema()).clone());
    TableReaderWriter::new(table, model.buffer().clone())
}

/// Equi-join via hashing.
///
/// The left input is staged on scratch pages and indexed by encoded key;
/// each right record probes the index and is matched against every staged
/// left record with the same key.
pub struct HashJoin {
    left: TableReaderWriter,
    right: TableReaderWriter,
    output: TableReaderWriter,
    left_key: KeyExtractor,
    right_key: KeyExtractor,
    predicate: JoinPredicate,
    projections: Vec<JoinProjection>,
}

impl HashJoin {
    pub fn new(
        left: TableReaderWriter,
        right: TableReaderWriter,
        output: TableReaderWriter,
        left_key: KeyExtractor,
        right_key: KeyExtractor,
        predicate: JoinPredicate,
        projections: Vec<JoinProjection>,
    ) -> Self {
        Self {
            left,
            right,
            output,
            left_key,
            right_key,
            predicate,
            projections,
        }
    }

    pub fn run(&self) -> TableResult<()> {
        let buffer = self.left.buffer().clone();

        let mut pages: Vec<PageReaderWriter> = Vec::new();
        let mut index: AHashMap<Vec<u8>, Vec<(usize, usize)>> = AHashMap::new();
        for rec in self.left.iter() {
            let rec = rec?;
            let key = encode_key(&[(self.left_key)(&rec)])?;
            let loc = append_with_offset(&buffer, &mut pages, &rec)?;
            index.entry(key).or_default().push(loc);
        }

        let proto = self.left.empty_record();
        for rec in self.right.iter() {
            let rec = rec?;
            let key = encode_key(&[(self.right_key)(&rec)])?;
            let Some(locations) = index.get(&key) else {
                continue;
            };
            for &(page_idx, offset) in locations {
                let mut staged = proto.clone();
                pages[page_idx].read_at(offset, &mut staged)?;
                if (self.predicate)(&staged, &rec) {
                    emit_joined(&self.output, &self.projections, &staged, &rec)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::BufferManager;
    use crate::record::{AttKind, ColumnDef, Record, Schema, Value};
    use tempfile::TempDir;

    fn setup() -> (TempDir, BufferManager) {
        let dir = tempfile::tempdir().unwrap();
        let bm = BufferManager::new(256, 16, dir.path().join("tmp.dat")).unwrap();
        (dir, bm)
    }

    fn table(
        dir: &TempDir,
        bm: &BufferManager,
        name: &str,
        columns: Vec<ColumnDef>,
    ) -> TableReaderWriter {
        let t = Table::new(name, dir.path().join(format!("{name}.tbl")), Schema::new(columns));
        TableReaderWriter::new(t, bm.clone()).unwrap()
    }

    fn customers(dir: &TempDir, bm: &BufferManager) -> TableReaderWriter {
        let rw = table(
            dir,
            bm,
            "customers",
            vec![
                ColumnDef::new("cid", AttKind::Int),
                ColumnDef::new("name", AttKind::Varchar),
            ],
        );
        for (cid, name) in [(1, "alice"), (2, "bob"), (3, "carol")] {
            let mut rec = rw.empty_record();
            rec.set_at(0, Value::Int(cid));
            rec.set_at(1, Value::Varchar(name.to_string()));
            rw.append(&rec).unwrap();
        }
        rw
    }

    fn orders(dir: &TempDir, bm: &BufferManager) -> TableReaderWriter {
        let rw = table(
            dir,
            bm,
            "orders",
            vec![
                ColumnDef::new("cid", AttKind::Int),
                ColumnDef::new("amount", AttKind::Int),
            ],
        );
        // Customer 1 has two orders, 2 has one, 4 matches nobody.
        for (cid, amount) in [(1, 10), (2, 20), (1, 30), (4, 40)] {
            let mut rec = rw.empty_record();
            rec.set_at(0, Value::Int(cid));
            rec.set_at(1, Value::Int(amount));
            rw.append(&rec).unwrap();
        }
        rw
    }

    fn joined_output(dir: &TempDir, bm: &BufferManager, name: &str) -> TableReaderWriter {
        table(
            dir,
            bm,
            name,
            vec![
                ColumnDef::new("name", AttKind::Varchar),
                ColumnDef::new("amount", AttKind::Int),
            ],
        )
    }

    fn projections() -> Vec<JoinProjection> {
        vec![
            Box::new(|l: &Record, _: &Record| l.at(1).clone()),
            Box::new(|_: &Record, r: &Record| r.at(1).clone()),
        ]
    }

    fn collect(output: &TableReaderWriter) -> Vec<(String, i64)> {
        let mut rows: Vec<(String, i64)> = output
            .iter()
            .map(|r| {
                let r = r.unwrap();
                match (r.at(0), r.at(1)) {
                    (Value::Varchar(s), Value::Int(a)) => (s.clone(), *a),
                    _ => panic!("unexpected kinds"),
                }
            })
            .collect();
        rows.sort();
        rows
    }

    fn expected() -> Vec<(String, i64)> {
        vec![
            ("alice".to_string(), 10),
            ("alice".to_string(), 30),
            ("bob".to_string(), 20),
        ]
    }

    #[test]
    fn test_sort_merge_join() {
        let (dir, bm) = setup();
        let output = joined_output(&dir, &bm, "joined");

        let op = SortMergeJoin::new(
            customers(&dir, &bm),
            orders(&dir, &bm),
            output.clone(),
            Rc::new(|r: &Record| r.at(0).clone()),
            Rc::new(|r: &Record| r.at(0).clone()),
            Box::new(|_, _| true),
            projections(),
            4,
        );
        op.run().unwrap();

        assert_eq!(collect(&output), expected());
        // The sorted side tables were deleted.
        assert!(!dir.path().join("customers.lsort").exists());
        assert!(!dir.path().join("orders.rsort").exists());
    }

    #[test]
    fn test_sort_merge_join_predicate_refines() {
        let (dir, bm) = setup();
        let output = joined_output(&dir, &bm, "joined");

        let op = SortMergeJoin::new(
            customers(&dir, &bm),
            orders(&dir, &bm),
            output.clone(),
            Rc::new(|r: &Record| r.at(0).clone()),
            Rc::new(|r: &Record| r.at(0).clone()),
            Box::new(|_, r| matches!(r.at(1), Value::Int(a) if *a >= 20)),
            projections(),
            4,
        );
        op.run().unwrap();

        assert_eq!(
            collect(&output),
            vec![("alice".to_string(), 30), ("bob".to_string(), 20)]
        );
    }

    #[test]
    fn test_hash_join_matches_sort_merge() {
        let (dir, bm) = setup();
        let output = joined_output(&dir, &bm, "joined");

        let op = HashJoin::new(
            customers(&dir, &bm),
            orders(&dir, &bm),
            output.clone(),
            Rc::new(|r: &Record| r.at(0).clone()),
            Rc::new(|r: &Record| r.at(0).clone()),
            Box::new(|_, _| true),
            projections(),
        );
        op.run().unwrap();

        assert_eq!(collect(&output), expected());
    }

    #[test]
    fn test_join_with_duplicate_keys_on_both_sides() {
        let (dir, bm) = setup();
        let left = table(
            &dir,
            &bm,
            "l",
            vec![
                ColumnDef::new("k", AttKind::Int),
                ColumnDef::new("tag", AttKind::Varchar),
            ],
        );
        let right = table(
            &dir,
            &bm,
            "r",
            vec![
                ColumnDef::new("k", AttKind::Int),
                ColumnDef::new("tag", AttKind::Varchar),
            ],
        );
        for (rw, n) in [(&left, 3), (&right, 4)] {
            for i in 0..n {
                let mut rec = rw.empty_record();
                rec.set_at(0, Value::Int(7));
                rec.set_at(1, Value::Varchar(format!("t{i}")));
                rw.append(&rec).unwrap();
            }
        }
        let output = table(
            &dir,
            &bm,
            "out",
            vec![
                ColumnDef::new("lt", AttKind::Varchar),
                ColumnDef::new("rt", AttKind::Varchar),
            ],
        );

        let op = SortMergeJoin::new(
            left,
            right,
            output.clone(),
            Rc::new(|r: &Record| r.at(0).clone()),
            Rc::new(|r: &Record| r.at(0).clone()),
            Box::new(|_, _| true),
            vec![
                Box::new(|l: &Record, _: &Record| l.at(1).clone()),
                Box::new(|_: &Record, r: &Record| r.at(1).clone()),
            ],
            2,
        );
        op.run().unwrap();

        // Full cross product within the equal-key group.
        assert_eq!(output.iter().count(), 12);
    }
}
