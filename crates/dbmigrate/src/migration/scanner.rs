//! Directory scanner.
//!
//! ```text
//! root/
//!   etracs/                 module "etracs"
//!     env.conf              conf file
//!     migrations/           flattened into "etracs"
//!       001_init.sql
//!     rpt/                  module "etracs.rpt"
//!       001_rpt.sql
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::ScanConfig;
use crate::error::Result;

/// Scanner settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    /// Directory name (case-insensitive) folded into its parent module.
    pub flatten_marker: String,
    /// Extension of conf files, without the dot.
    pub conf_extension: String,
    /// Name of the per-level defaults conf file.
    pub env_file: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from(&ScanConfig::default())
    }
}

impl From<&ScanConfig> for ScanOptions {
    fn from(config: &ScanConfig) -> Self {
        Self {
            flatten_marker: config.flatten_marker.clone(),
            conf_extension: config.conf_extension.clone(),
            env_file: config.env_file.clone(),
        }
    }
}

/// A plain file found during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub name: String,
    pub path: PathBuf,
}

/// A module directory and everything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedModule {
    pub name: String,
    /// Dotted path from the root, e.g. `etracs.rpt`.
    pub fileid: String,
    pub dir: PathBuf,
    /// Migration candidates, sorted by name.
    pub files: Vec<ScannedFile>,
    pub conf_files: Vec<ScannedFile>,
    pub modules: Vec<ScannedModule>,
}

impl ScannedModule {
    fn new(name: String, fileid: String, dir: PathBuf) -> Self {
        Self {
            name,
            fileid,
            dir,
            files: Vec::new(),
            conf_files: Vec::new(),
            modules: Vec::new(),
        }
    }

    /// This module and all nested modules, depth first, each paired with
    /// its dotted path relative to this module (empty for itself).
    pub fn levels(&self) -> Vec<(String, &ScannedModule)> {
        let mut out = Vec::new();
        self.collect_levels(String::new(), &mut out);
        out
    }

    fn collect_levels<'a>(&'a self, key: String, out: &mut Vec<(String, &'a ScannedModule)>) {
        out.push((key.clone(), self));
        for child in &self.modules {
            let child_key = if key.is_empty() {
                child.name.clone()
            } else {
                format!("{}.{}", key, child.name)
            };
            child.collect_levels(child_key, out);
        }
    }

    /// Number of migration candidates in this module and below.
    pub fn file_count(&self) -> usize {
        self.files.len() + self.modules.iter().map(ScannedModule::file_count).sum::<usize>()
    }
}

/// Scan every top-level module under `root`.
pub fn scan(root: impl AsRef<Path>, options: &ScanOptions) -> Result<Vec<ScannedModule>> {
    scan_filtered(root, options, |_| true)
}

/// Scan the top-level modules whose directory name satisfies `predicate`.
pub fn scan_filtered<F>(
    root: impl AsRef<Path>,
    options: &ScanOptions,
    predicate: F,
) -> Result<Vec<ScannedModule>>
where
    F: Fn(&str) -> bool,
{
    let root = root.as_ref();
    let mut modules = Vec::new();

    for (name, path) in sorted_entries(root)? {
        if !path.is_dir() || !predicate(&name) {
            continue;
        }
        let mut module = ScannedModule::new(name.clone(), name, path.clone());
        scan_into(&path, &mut module, options)?;
        debug!(
            "Scanned module {} ({} files)",
            module.fileid,
            module.file_count()
        );
        modules.push(module);
    }

    Ok(modules)
}

fn scan_into(dir: &Path, module: &mut ScannedModule, options: &ScanOptions) -> Result<()> {
    for (name, path) in sorted_entries(dir)? {
        if path.is_dir() {
            if name.eq_ignore_ascii_case(&options.flatten_marker) {
                scan_into(&path, module, options)?;
            } else {
                let fileid = format!("{}.{}", module.fileid, name);
                let mut child = ScannedModule::new(name, fileid, path.clone());
                scan_into(&path, &mut child, options)?;
                module.modules.push(child);
            }
        } else if is_conf(&name, options) {
            module.conf_files.push(ScannedFile { name, path });
        } else {
            module.files.push(ScannedFile { name, path });
        }
    }

    module.files.sort_by(|a, b| a.name.cmp(&b.name));
    module.conf_files.sort_by(|a, b| a.name.cmp(&b.name));
    module.modules.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(())
}

fn is_conf(name: &str, options: &ScanOptions) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(options.conf_extension.as_str()))
}

/// Directory entries sorted by name, dotfiles skipped.
fn sorted_entries(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        entries.push((name, entry.path()));
    }
    entries.sort();
    Ok(entries)
}
