use serde::{Deserialize, Serialize};

use super::value::AttKind;

/// One attribute in a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: AttKind,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: AttKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// An ordered list of attributes describing a table's records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnDef>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn num_atts(&self) -> usize {
        self.columns.len()
    }

    pub fn att_kind(&self, i: usize) -> AttKind {
        self.columns[i].kind
    }

    /// Position of the attribute called `name`, if any.
    pub fn att_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}
