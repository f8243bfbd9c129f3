//! Schema registry.
//!
//! Descriptors are loaded once through [`SchemaRegistryBuilder`] and frozen
//! into a [`SchemaRegistry`]. Lookups hand out shared `Arc<Schema>` values.

mod descriptor;

pub use descriptor::parse_descriptor;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::core::schema::Schema;
use crate::error::{MigrateError, Result};

/// Schema of the module table used by the migration store.
pub const MODULE_SCHEMA: &str = "dbm_module";
/// Schema of the migration file table used by the migration store.
pub const MIGRATION_SCHEMA: &str = "dbm_migration";

const BUILTINS: &[(&str, &str)] = &[
    (MODULE_SCHEMA, include_str!("../../schemas/dbm_module.xml")),
    (MIGRATION_SCHEMA, include_str!("../../schemas/dbm_migration.xml")),
];

/// Immutable set of loaded schemas keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Registry holding only the store's own schemas.
    pub fn builtin() -> Result<Self> {
        Self::builder().with_builtins()?.build()
    }

    /// Look up a schema by name.
    pub fn get(&self, name: &str) -> Result<Arc<Schema>> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| MigrateError::UnknownSchema(name.to_string()))
    }

    /// Schema names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Collects descriptors before the registry is frozen.
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    schemas: BTreeMap<String, Arc<Schema>>,
}

impl SchemaRegistryBuilder {
    /// Add the compiled-in store descriptors.
    pub fn with_builtins(mut self) -> Result<Self> {
        for (name, xml) in BUILTINS {
            self = self.add_descriptor(name, xml)?;
        }
        Ok(self)
    }

    /// Parse and add one descriptor document.
    pub fn add_descriptor(self, fallback_name: &str, xml: &str) -> Result<Self> {
        let schema = parse_descriptor(fallback_name, xml)?;
        self.add(schema)
    }

    /// Add an already constructed schema.
    pub fn add(mut self, schema: Schema) -> Result<Self> {
        let name = schema.name().to_string();
        if self.schemas.contains_key(&name) {
            return Err(MigrateError::Descriptor(format!(
                "schema {} is defined more than once",
                name
            )));
        }
        debug!("Registered schema {} (table {})", name, schema.table_name());
        self.schemas.insert(name, Arc::new(schema));
        Ok(self)
    }

    /// Load every `*.xml` file under `dir`, recursively, in path order.
    pub fn load_dir(mut self, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        collect_xml(dir, &mut files)?;
        files.sort();

        for path in &files {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let xml = fs::read_to_string(path)?;
            self = self.add_descriptor(&stem, &xml).map_err(|e| match e {
                MigrateError::Descriptor(msg) => {
                    MigrateError::Descriptor(format!("{}: {}", path.display(), msg))
                }
                other => other,
            })?;
        }

        info!("Loaded {} schema descriptors from {}", files.len(), dir.display());
        Ok(self)
    }

    pub fn build(self) -> Result<SchemaRegistry> {
        Ok(SchemaRegistry {
            schemas: self.schemas,
        })
    }
}

fn collect_xml(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_xml(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            out.push(path);
        }
    }
    Ok(())
}
