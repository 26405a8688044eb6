use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

use crate::record::Schema;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Table {0} already exists")]
    TableExists(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Shared, mutable table metadata. Reader-writers hold clones of the same
/// `TableRef` so that bookkeeping such as `last_page` is seen by everyone.
pub type TableRef = Rc<RefCell<Table>>;

/// Metadata for one table: its name, where its pages live on disk, its
/// schema, and the storage bookkeeping the reader-writers maintain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    name: String,
    storage_loc: PathBuf,
    schema: Schema,
    /// Index of the highest page ever used; -1 when no page has been touched.
    last_page: i64,
    /// Page index of the B+-tree root; -1 when the table is not indexed or
    /// the tree has not been bootstrapped yet.
    root_location: i64,
}

impl Table {
    pub fn new(name: impl Into<String>, storage_loc: impl Into<PathBuf>, schema: Schema) -> TableRef {
        Rc::new(RefCell::new(Self {
            name: name.into(),
            storage_loc: storage_loc.into(),
            schema,
            last_page: -1,
            root_location: -1,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage_loc(&self) -> &Path {
        &self.storage_loc
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn last_page(&self) -> i64 {
        self.last_page
    }

    pub fn set_last_page(&mut self, last_page: i64) {
        self.last_page = last_page;
    }

    pub fn root_location(&self) -> i64 {
        self.root_location
    }

    pub fn set_root_location(&mut self, root_location: i64) {
        self.root_location = root_location;
    }
}

/// The set of tables known to the engine, persisted as `catalog.json` in the
/// database directory.
pub struct Catalog {
    path: PathBuf,
    tables: HashMap<String, TableRef>,
}

impl Catalog {
    /// Open the catalog stored under `db_path`, creating an empty one if no
    /// catalog file exists yet.
    pub fn open(db_path: impl Into<PathBuf>) -> CatalogResult<Self> {
        let path: PathBuf = db_path.into();
        let file = path.join("catalog.json");

        let tables = if file.exists() {
            let content = fs::read_to_string(&file)?;
            let stored: Vec<Table> = serde_json::from_str(&content)?;
            stored
                .into_iter()
                .map(|t| (t.name.clone(), Rc::new(RefCell::new(t))))
                .collect()
        } else {
            fs::create_dir_all(&path)?;
            HashMap::new()
        };

        Ok(Self { path, tables })
    }

    /// Persist every table's current metadata.
    pub fn save(&self) -> CatalogResult<()> {
        let mut stored: Vec<Table> = self.tables.values().map(|t| t.borrow().clone()).collect();
        stored.sort_by(|a, b| a.name.cmp(&b.name));
        let content = serde_json::to_string_pretty(&stored)?;
        fs::write(self.path.join("catalog.json"), content)?;
        Ok(())
    }

    /// Register a new table whose pages live in `<db_path>/<name>.tbl`.
    pub fn create_table(&mut self, name: &str, schema: Schema) -> CatalogResult<TableRef> {
        if self.tables.contains_key(name) {
            return Err(CatalogError::TableExists(name.to_string()));
        }
        let table = Table::new(name, self.path.join(format!("{name}.tbl")), schema);
        self.tables.insert(name.to_string(), table.clone());
        Ok(table)
    }

    pub fn get_table(&self, name: &str) -> CatalogResult<TableRef> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    /// Forget a table. The caller is responsible for deleting its storage
    /// file (normally via `BufferManager::kill_table`).
    pub fn drop_table(&mut self, name: &str) -> CatalogResult<TableRef> {
        self.tables
            .remove(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AttKind, ColumnDef};

    fn test_schema() -> Schema {
        Schema::new(vec![
            ColumnDef::new("id", AttKind::Int),
            ColumnDef::new("name", AttKind::Varchar),
        ])
    }

    #[test]
    fn test_create_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(dir.path()).unwrap();

        let t = catalog.create_table("customers", test_schema()).unwrap();
        assert_eq!(t.borrow().name(), "customers");
        assert_eq!(t.borrow().last_page(), -1);
        assert_eq!(t.borrow().root_location(), -1);

        let again = catalog.get_table("customers").unwrap();
        assert!(Rc::ptr_eq(&t, &again));

        assert!(matches!(
            catalog.create_table("customers", test_schema()),
            Err(CatalogError::TableExists(_))
        ));
        assert!(matches!(
            catalog.get_table("orders"),
            Err(CatalogError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut catalog = Catalog::open(dir.path()).unwrap();
            let t = catalog.create_table("customers", test_schema()).unwrap();
            t.borrow_mut().set_last_page(17);
            t.borrow_mut().set_root_location(3);
            catalog.save().unwrap();
        }

        let catalog = Catalog::open(dir.path()).unwrap();
        let t = catalog.get_table("customers").unwrap();
        assert_eq!(t.borrow().last_page(), 17);
        assert_eq!(t.borrow().root_location(), 3);
        assert_eq!(t.borrow().schema().num_atts(), 2);
    }

    #[test]
    fn test_drop_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(dir.path()).unwrap();

        catalog.create_table("customers", test_schema()).unwrap();
        catalog.drop_table("customers").unwrap();
        assert!(matches!(
            catalog.get_table("customers"),
            Err(CatalogError::TableNotFound(_))
        ));
    }
}
