use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::error::{RecordError, RecordResult};

/// The attribute types the engine stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttKind {
    Int,
    Double,
    Varchar,
    Bool,
}

const TAG_INT: u8 = 0x01;
const TAG_DOUBLE: u8 = 0x02;
const TAG_VARCHAR: u8 = 0x03;
const TAG_BOOL: u8 = 0x04;

/// A single attribute value.
///
/// Values are self-delimiting on disk: a one-byte type tag, then a
/// fixed-width payload (varchars carry a four-byte length prefix). Knowing
/// where a value starts is enough to know where it ends.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    Varchar(String),
    Bool(bool),
}

impl Value {
    /// The neutral value a fresh record holds for an attribute of `kind`.
    pub fn empty(kind: AttKind) -> Self {
        match kind {
            AttKind::Int => Value::Int(0),
            AttKind::Double => Value::Double(0.0),
            AttKind::Varchar => Value::Varchar(String::new()),
            AttKind::Bool => Value::Bool(false),
        }
    }

    pub fn kind(&self) -> AttKind {
        match self {
            Value::Int(_) => AttKind::Int,
            Value::Double(_) => AttKind::Double,
            Value::Varchar(_) => AttKind::Varchar,
            Value::Bool(_) => AttKind::Bool,
        }
    }

    /// Encoded size in bytes, tag included.
    pub fn binary_size(&self) -> usize {
        match self {
            Value::Int(_) => 1 + 8,
            Value::Double(_) => 1 + 8,
            Value::Varchar(s) => 1 + 4 + s.len(),
            Value::Bool(_) => 1 + 1,
        }
    }

    /// Write the value at the start of `buf`; returns the number of bytes
    /// written.
    pub fn write(&self, buf: &mut [u8]) -> RecordResult<usize> {
        let needed = self.binary_size();
        if buf.len() < needed {
            return Err(RecordError::Serialization(format!(
                "need {} bytes, have {}",
                needed,
                buf.len()
            )));
        }
        match self {
            Value::Int(i) => {
                buf[0] = TAG_INT;
                buf[1..9].copy_from_slice(&i.to_le_bytes());
            }
            Value::Double(d) => {
                buf[0] = TAG_DOUBLE;
                buf[1..9].copy_from_slice(&d.to_le_bytes());
            }
            Value::Varchar(s) => {
                buf[0] = TAG_VARCHAR;
                buf[1..5].copy_from_slice(&(s.len() as u32).to_le_bytes());
                buf[5..5 + s.len()].copy_from_slice(s.as_bytes());
            }
            Value::Bool(b) => {
                buf[0] = TAG_BOOL;
                buf[1] = *b as u8;
            }
        }
        Ok(needed)
    }

    /// Read one value from the start of `buf`; returns it together with the
    /// number of bytes consumed.
    pub fn read(buf: &[u8]) -> RecordResult<(Self, usize)> {
        let too_short =
            || RecordError::Deserialization("truncated value encoding".to_string());
        let tag = *buf.first().ok_or_else(too_short)?;
        match tag {
            TAG_INT => {
                let bytes: [u8; 8] = buf
                    .get(1..9)
                    .ok_or_else(too_short)?
                    .try_into()
                    .expect("slice is 8 bytes");
                Ok((Value::Int(i64::from_le_bytes(bytes)), 9))
            }
            TAG_DOUBLE => {
                let bytes: [u8; 8] = buf
                    .get(1..9)
                    .ok_or_else(too_short)?
                    .try_into()
                    .expect("slice is 8 bytes");
                Ok((Value::Double(f64::from_le_bytes(bytes)), 9))
            }
            TAG_VARCHAR => {
                let len_bytes: [u8; 4] = buf
                    .get(1..5)
                    .ok_or_else(too_short)?
                    .try_into()
                    .expect("slice is 4 bytes");
                let len = u32::from_le_bytes(len_bytes) as usize;
                let raw = buf.get(5..5 + len).ok_or_else(too_short)?;
                let s = String::from_utf8(raw.to_vec()).map_err(|e| {
                    RecordError::Deserialization(format!("invalid UTF-8 in varchar: {e}"))
                })?;
                Ok((Value::Varchar(s), 5 + len))
            }
            TAG_BOOL => {
                let b = *buf.get(1).ok_or_else(too_short)?;
                Ok((Value::Bool(b != 0), 2))
            }
            other => Err(RecordError::Deserialization(format!(
                "unknown value tag {other:#04x}"
            ))),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Int(_) => TAG_INT,
            Value::Double(_) => TAG_DOUBLE,
            Value::Varchar(_) => TAG_VARCHAR,
            Value::Bool(_) => TAG_BOOL,
        }
    }
}

/// Total order over values. Ints and doubles compare numerically against each
/// other; mixed non-numeric kinds fall back to ordering by type tag so that
/// sorting never panics on a heterogeneous column.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Int(x), Value::Double(y)) => (*x as f64).total_cmp(y),
        (Value::Double(x), Value::Int(y)) => x.total_cmp(&(*y as f64)),
        (Value::Double(x), Value::Double(y)) => x.total_cmp(y),
        (Value::Varchar(x), Value::Varchar(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.kind_rank().cmp(&b.kind_rank()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: Value) {
        let mut buf = vec![0u8; v.binary_size()];
        let written = v.write(&mut buf).unwrap();
        assert_eq!(written, buf.len());
        let (back, read) = Value::read(&buf).unwrap();
        assert_eq!(read, written);
        assert_eq!(back, v);
    }

    #[test]
    fn test_value_encoding() {
        round_trip(Value::Int(-40));
        round_trip(Value::Double(3.25));
        round_trip(Value::Varchar("hello".to_string()));
        round_trip(Value::Varchar(String::new()));
        round_trip(Value::Bool(true));
    }

    #[test]
    fn test_truncated_value() {
        let v = Value::Varchar("hello".to_string());
        let mut buf = vec![0u8; v.binary_size()];
        v.write(&mut buf).unwrap();
        assert!(Value::read(&buf[..4]).is_err());
    }

    #[test]
    fn test_write_needs_room() {
        let v = Value::Int(1);
        let mut buf = vec![0u8; 4];
        assert!(v.write(&mut buf).is_err());
    }

    #[test]
    fn test_numeric_promotion() {
        assert_eq!(
            compare_values(&Value::Int(2), &Value::Double(2.5)),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&Value::Double(3.0), &Value::Int(3)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_string_order() {
        assert_eq!(
            compare_values(
                &Value::Varchar("abc".to_string()),
                &Value::Varchar("abd".to_string())
            ),
            Ordering::Less
        );
    }
}
