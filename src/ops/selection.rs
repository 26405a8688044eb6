use super::{Predicate, Projection};
use crate::btree::{BPlusTreeReaderWriter, BTreeResult};
use crate::record::{Record, Value};
use crate::table::{TableResult, TableReaderWriter};

fn project_into(output: &TableReaderWriter, projections: &[Projection], rec: &Record) -> TableResult<()> {
    let mut out = output.empty_record();
    for (i, proj) in projections.iter().enumerate() {
        out.set_at(i, proj(rec));
    }
    output.append(&out)
}

/// Filter-and-project over a full table scan.
pub struct RegularSelection {
    input: TableReaderWriter,
    output: TableReaderWriter,
    predicate: Predicate,
    projections: Vec<Projection>,
}

impl RegularSelection {
    pub fn new(
        input: TableReaderWriter,
        output: TableReaderWriter,
        predicate: Predicate,
        projections: Vec<Projection>,
    ) -> Self {
        Self {
            input,
            output,
            predicate,
            projections,
        }
    }

    /// Scan the input once, appending one projected record to the output for
    /// every record the predicate accepts.
    pub fn run(&self) -> TableResult<()> {
        for rec in self.input.iter() {
            let rec = rec?;
            if (self.predicate)(&rec) {
                project_into(&self.output, &self.projections, &rec)?;
            }
        }
        Ok(())
    }
}

/// Filter-and-project over an index range scan: only the leaves that can
/// hold keys in `[low, high]` are read, and the predicate refines from
/// there.
pub struct BPlusSelection {
    input: BPlusTreeReaderWriter,
    output: TableReaderWriter,
    low: Value,
    high: Value,
    predicate: Predicate,
    projections: Vec<Projection>,
}

impl BPlusSelection {
    pub fn new(
        input: BPlusTreeReaderWriter,
        output: TableReaderWriter,
        low: Value,
        high: Value,
        predicate: Predicate,
        projections: Vec<Projection>,
    ) -> Self {
        Self {
            input,
            output,
            low,
            high,
            predicate,
            projections,
        }
    }

    pub fn run(&self) -> BTreeResult<()> {
        for rec in self.input.range(self.low.clone(), self.high.clone())? {
            let rec = rec?;
            if (self.predicate)(&rec) {
                project_into(&self.output, &self.projections, &rec)?;
            }
        }
        Ok(())
    }
}
