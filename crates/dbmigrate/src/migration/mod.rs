//! Migration engine: scanning, tracking and running migration files.
//!
//! - [`scanner`]: walks the module tree on disk
//! - [`conf`]: per-module connection settings
//! - [`store`]: persisted module and file state
//! - [`register`]: reconciles a scan with the store
//! - [`handler`] and [`service`]: per-file execution strategies
//! - [`runner`]: runs a module's outstanding files in order

pub mod conf;
pub mod handler;
pub mod register;
pub mod runner;
pub mod scanner;
pub mod service;
pub mod store;

pub use conf::{ConfEntry, ConnectionConf, ModuleConf};
pub use handler::{FileStatus, Handler, HandlerKind, StatusSink};
pub use register::{register_modules, RegistrationSummary};
pub use runner::{MigrationRunner, ModuleBuildResult};
pub use scanner::{scan, scan_filtered, ScanOptions, ScannedFile, ScannedModule};
pub use store::{DbMigrationStore, MemoryStore, MigrationStore};

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::core::value::sql_datetime;

/// A registered top-level module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub fileid: String,
    pub name: String,
    pub dbname: String,
    pub dir: PathBuf,
    #[serde(default)]
    pub conf: ModuleConf,
    #[serde(default)]
    pub lastfileid: Option<String>,
}

/// Processing state of a migration file. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "StateRepr", into = "u8")]
pub enum FileState {
    #[default]
    Unprocessed,
    Processed,
}

impl FileState {
    pub fn as_u8(self) -> u8 {
        match self {
            FileState::Unprocessed => 0,
            FileState::Processed => 1,
        }
    }
}

impl From<FileState> for u8 {
    fn from(state: FileState) -> Self {
        state.as_u8()
    }
}

impl TryFrom<u64> for FileState {
    type Error = String;

    fn try_from(value: u64) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(FileState::Unprocessed),
            1 => Ok(FileState::Processed),
            other => Err(format!("invalid file state {}", other)),
        }
    }
}

// Drivers hand integer columns back as numbers or, over the text
// protocol, as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum StateRepr {
    Number(u64),
    Text(String),
}

impl TryFrom<StateRepr> for FileState {
    type Error = String;

    fn try_from(repr: StateRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            StateRepr::Number(n) => n.try_into(),
            StateRepr::Text(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("invalid file state '{}'", s))?
                .try_into(),
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileState::Unprocessed => write!(f, "pending"),
            FileState::Processed => write!(f, "processed"),
        }
    }
}

/// A tracked migration script.
///
/// Identity is (`parentid`, `modulename`, `filename`): the top-level module,
/// the dotted submodule path (empty for the module itself) and the file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationFile {
    pub parentid: String,
    #[serde(default)]
    pub modulename: String,
    pub filename: String,
    pub file: PathBuf,
    #[serde(with = "sql_datetime")]
    pub dtfiled: NaiveDateTime,
    pub state: FileState,
    #[serde(default)]
    pub errors: Option<String>,
}

impl MigrationFile {
    pub fn new(
        parentid: impl Into<String>,
        modulename: impl Into<String>,
        filename: impl Into<String>,
        file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            parentid: parentid.into(),
            modulename: modulename.into(),
            filename: filename.into(),
            file: file.into(),
            dtfiled: chrono::Utc::now().naive_utc(),
            state: FileState::Unprocessed,
            errors: None,
        }
    }

    /// Lowercased extension of the file name, empty when there is none.
    pub fn extension(&self) -> String {
        Path::new(&self.filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    /// Full dotted id of the module the file belongs to.
    pub fn module_fileid(&self) -> String {
        if self.modulename.is_empty() {
            self.parentid.clone()
        } else {
            format!("{}.{}", self.parentid, self.modulename)
        }
    }

    /// `module.submodule/filename`, used in log lines and errors.
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.module_fileid(), self.filename)
    }
}

/// Files of one (sub)module, as shown to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileGroup {
    /// Submodule key, empty for the module itself.
    pub modulename: String,
    /// Display name: the submodule key or the module name.
    pub name: String,
    pub files: Vec<MigrationFile>,
}

/// Group files by submodule, keeping the order in which submodules appear.
pub fn group_files(module_name: &str, files: Vec<MigrationFile>) -> Vec<FileGroup> {
    let mut groups: Vec<FileGroup> = Vec::new();
    for file in files {
        match groups.iter_mut().find(|g| g.modulename == file.modulename) {
            Some(group) => group.files.push(file),
            None => groups.push(FileGroup {
                name: if file.modulename.is_empty() {
                    module_name.to_string()
                } else {
                    file.modulename.clone()
                },
                modulename: file.modulename.clone(),
                files: vec![file],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_state_accepts_numbers_and_text() {
        assert_eq!(serde_json::from_value::<FileState>(json!(0)).unwrap(), FileState::Unprocessed);
        assert_eq!(serde_json::from_value::<FileState>(json!("1")).unwrap(), FileState::Processed);
        assert!(serde_json::from_value::<FileState>(json!(7)).is_err());
        assert_eq!(serde_json::to_value(FileState::Processed).unwrap(), json!(1));
    }

    #[test]
    fn test_migration_file_entity_shape() {
        let mut file = MigrationFile::new("etracs", "rpt", "001.SQL", "/m/etracs/rpt/001.SQL");
        file.dtfiled = sql_datetime::parse("2024-01-02 03:04:05").unwrap();
        let entity = crate::core::value::to_entity(&file).unwrap();
        assert_eq!(entity["dtfiled"], json!("2024-01-02 03:04:05"));
        assert_eq!(entity["state"], json!(0));
        assert_eq!(entity["errors"], json!(null));
        assert_eq!(file.extension(), "sql");
        assert_eq!(file.display_name(), "etracs.rpt/001.SQL");
    }

    #[test]
    fn test_group_files() {
        let files = vec![
            MigrationFile::new("m", "", "001.sql", "a"),
            MigrationFile::new("m", "", "002.sql", "b"),
            MigrationFile::new("m", "sub", "001.sql", "c"),
        ];
        let groups = group_files("m", files);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "m");
        assert_eq!(groups[0].files.len(), 2);
        assert_eq!(groups[1].name, "sub");
    }
}
