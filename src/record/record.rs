use std::cmp::Ordering;
use std::rc::Rc;

use super::error::{RecordError, RecordResult};
use super::schema::Schema;
use super::value::{compare_values, Value};
use crate::file::PageId;

/// Anything that can be packed into a page.
///
/// Encodings must be self-delimiting: `from_binary` figures out how many
/// bytes the record occupied from the bytes alone and reports it, which is
/// what lets cursors walk a page without any per-record length table.
pub trait PageRecord {
    /// Exact number of bytes `to_binary` will write.
    fn binary_size(&self) -> usize;

    /// Serialize into the front of `buf`; returns bytes written.
    fn to_binary(&self, buf: &mut [u8]) -> RecordResult<usize>;

    /// Overwrite `self` with the record encoded at the front of `buf`;
    /// returns bytes consumed.
    fn from_binary(&mut self, buf: &[u8]) -> RecordResult<usize>;
}

/// A data record: one value per schema attribute.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Rc<Schema>,
    values: Vec<Value>,
}

impl Record {
    /// A record holding the neutral value for every attribute.
    pub fn new(schema: Rc<Schema>) -> Self {
        let values = schema
            .columns()
            .iter()
            .map(|c| Value::empty(c.kind))
            .collect();
        Self { schema, values }
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn at(&self, i: usize) -> &Value {
        &self.values[i]
    }

    pub fn set_at(&mut self, i: usize, value: Value) {
        self.values[i] = value;
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn set_values(&mut self, values: Vec<Value>) {
        self.values = values;
    }
}

impl PageRecord for Record {
    fn binary_size(&self) -> usize {
        self.values.iter().map(Value::binary_size).sum()
    }

    fn to_binary(&self, buf: &mut [u8]) -> RecordResult<usize> {
        let mut pos = 0;
        for value in &self.values {
            pos += value.write(&mut buf[pos..])?;
        }
        Ok(pos)
    }

    fn from_binary(&mut self, buf: &[u8]) -> RecordResult<usize> {
        let mut pos = 0;
        for slot in self.values.iter_mut() {
            let (value, used) = Value::read(&buf[pos..])?;
            *slot = value;
            pos += used;
        }
        Ok(pos)
    }
}

const TAG_MAX_KEY: u8 = 0xFF;

/// A B+-tree key: either an ordinary value or the `Max` sentinel, which
/// compares greater than every value and marks the rightmost child of a
/// directory page.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexKey {
    Val(Value),
    Max,
}

impl IndexKey {
    pub fn compare(&self, other: &IndexKey) -> Ordering {
        match (self, other) {
            (IndexKey::Max, IndexKey::Max) => Ordering::Equal,
            (IndexKey::Max, _) => Ordering::Greater,
            (_, IndexKey::Max) => Ordering::Less,
            (IndexKey::Val(a), IndexKey::Val(b)) => compare_values(a, b),
        }
    }

    fn binary_size(&self) -> usize {
        match self {
            IndexKey::Val(v) => v.binary_size(),
            IndexKey::Max => 1,
        }
    }

    fn write(&self, buf: &mut [u8]) -> RecordResult<usize> {
        match self {
            IndexKey::Val(v) => v.write(buf),
            IndexKey::Max => {
                let slot = buf.first_mut().ok_or_else(|| {
                    RecordError::Serialization("no room for key sentinel".to_string())
                })?;
                *slot = TAG_MAX_KEY;
                Ok(1)
            }
        }
    }

    fn read(buf: &[u8]) -> RecordResult<(Self, usize)> {
        match buf.first() {
            Some(&TAG_MAX_KEY) => Ok((IndexKey::Max, 1)),
            Some(_) => {
                let (v, used) = Value::read(buf)?;
                Ok((IndexKey::Val(v), used))
            }
            None => Err(RecordError::Deserialization(
                "truncated key encoding".to_string(),
            )),
        }
    }
}

/// An internal B+-tree entry: every record in the subtree rooted at `child`
/// has a key less than or equal to `key`.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub key: IndexKey,
    pub child: PageId,
}

impl IndexRecord {
    pub fn new(key: IndexKey, child: PageId) -> Self {
        Self { key, child }
    }

    /// A placeholder for cursors to deserialize into.
    pub fn empty() -> Self {
        Self {
            key: IndexKey::Max,
            child: 0,
        }
    }
}

impl PageRecord for IndexRecord {
    fn binary_size(&self) -> usize {
        self.key.binary_size() + 8
    }

    fn to_binary(&self, buf: &mut [u8]) -> RecordResult<usize> {
        let pos = self.key.write(buf)?;
        let end = pos + 8;
        if buf.len() < end {
            return Err(RecordError::Serialization(
                "no room for child pointer".to_string(),
            ));
        }
        buf[pos..end].copy_from_slice(&(self.child as u64).to_le_bytes());
        Ok(end)
    }

    fn from_binary(&mut self, buf: &[u8]) -> RecordResult<usize> {
        let (key, pos) = IndexKey::read(buf)?;
        let bytes: [u8; 8] = buf
            .get(pos..pos + 8)
            .ok_or_else(|| RecordError::Deserialization("truncated child pointer".to_string()))?
            .try_into()
            .expect("slice is 8 bytes");
        self.key = key;
        self.child = u64::from_le_bytes(bytes) as PageId;
        Ok(pos + 8)
    }
}
