use std::rc::Rc;

use ahash::AHashMap;

use super::{append_with_offset, encode_key, Predicate, Projection};
use crate::record::{AttKind, ColumnDef, Record, Schema, Value};
use crate::table::{PageReaderWriter, TableResult, TableReaderWriter};

/// The aggregate functions `Aggregate` can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Avg,
    Count,
}

/// Grouped aggregation.
///
/// Partial results live as records on scratch pages rather than in an
/// in-memory table, with a hash index from encoded group key to the
/// partial's location; each input record updates its group's partial in
/// place. Output records carry the group values first, then one value per
/// aggregate, matching the output table's schema.
pub struct Aggregate {
    input: TableReaderWriter,
    output: TableReaderWriter,
    group_by: Vec<Projection>,
    aggs: Vec<(AggFunc, Projection)>,
    predicate: Predicate,
}

impl Aggregate {
    pub fn new(
        input: TableReaderWriter,
        output: TableReaderWriter,
        group_by: Vec<Projection>,
        aggs: Vec<(AggFunc, Projection)>,
        predicate: Predicate,
    ) -> Self {
        Self {
            input,
            output,
            group_by,
            aggs,
            predicate,
        }
    }

    pub fn run(&self) -> TableResult<()> {
        let buffer = self.input.buffer().clone();

        // A partial holds the group values, then an accumulator and a count
        // per aggregate. Accumulators and counts are fixed-width, and group
        // values repeat within a group, so in-place rewrites never resize.
        let arity = self.group_by.len() + 2 * self.aggs.len();
        let partial_schema = Rc::new(Schema::new(
            (0..arity)
                .map(|i| ColumnDef::new(format!("f{i}"), AttKind::Int))
                .collect(),
        ));

        let mut pages: Vec<PageReaderWriter> = Vec::new();
        let mut index: AHashMap<Vec<u8>, (usize, usize)> = AHashMap::new();

        for rec in self.input.iter() {
            let rec = rec?;
            if !(self.predicate)(&rec) {
                continue;
            }
            let groups: Vec<Value> = self.group_by.iter().map(|g| g(&rec)).collect();
            let key = encode_key(&groups)?;

            match index.get(&key) {
                Some(&(page_idx, offset)) => {
                    let mut partial = Record::new(partial_schema.clone());
                    pages[page_idx].read_at(offset, &mut partial)?;
                    self.fold_into(&mut partial, &rec);
                    pages[page_idx].rewrite_at(offset, &partial)?;
                }
                None => {
                    let mut vals = groups;
                    for (func, proj) in &self.aggs {
                        match func {
                            AggFunc::Count => vals.push(Value::Int(0)),
                            _ => vals.push(proj(&rec)),
                        }
                        vals.push(Value::Int(1));
                    }
                    let mut partial = Record::new(partial_schema.clone());
                    partial.set_values(vals);
                    let loc = append_with_offset(&buffer, &mut pages, &partial)?;
                    index.insert(key, loc);
                }
            }
        }

        // One output record per group, in first-seen order per page.
        let proto = Record::new(partial_schema);
        for page in &pages {
            for partial in page.decode_all(&proto)? {
                let mut out = self.output.empty_record();
                for i in 0..self.group_by.len() {
                    out.set_at(i, partial.at(i).clone());
                }
                for (ai, (func, _)) in self.aggs.iter().enumerate() {
                    let base = self.group_by.len() + 2 * ai;
                    let value = match func {
                        AggFunc::Sum => partial.at(base).clone(),
                        AggFunc::Count => partial.at(base + 1).clone(),
                        AggFunc::Avg => {
                            let sum = as_f64(partial.at(base)).unwrap_or(0.0);
                            let count = as_f64(partial.at(base + 1)).unwrap_or(1.0);
                            Value::Double(sum / count)
                        }
                    };
                    out.set_at(self.group_by.len() + ai, value);
                }
                self.output.append(&out)?;
            }
        }
        Ok(())
    }

    fn fold_into(&self, partial: &mut Record, rec: &Record) {
        for (ai, (func, proj)) in self.aggs.iter().enumerate() {
            let base = self.group_by.len() + 2 * ai;
            if *func != AggFunc::Count {
                let v = proj(rec);
                partial.set_at(base, add_values(partial.at(base), &v));
            }
            partial.set_at(base + 1, add_values(partial.at(base + 1), &Value::Int(1)));
        }
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Double(d) => Some(*d),
        _ => None,
    }
}

/// Numeric accumulation: int-plus-int stays int, anything involving a double
/// promotes, non-numeric input leaves the accumulator alone.
fn add_values(acc: &Value, v: &Value) -> Value {
    match (acc, v) {
        (Value::Int(a), Value::Int(b)) => Value::Int(a + b),
        _ => match (as_f64(acc), as_f64(v)) {
            (Some(a), Some(b)) => Value::Double(a + b),
            _ => acc.clone(),
        },
    }
}
