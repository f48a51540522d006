//! Schema Module Loading
//!
//! Where schema modules come from: a directory on disk, in-memory text, or the
//! corpus compiled into the binary. A [`ModuleSource`] only knows module names
//! and how to decode a module; preparation and caching live in the
//! [`SchemaContext`](crate::SchemaContext).

use include_dir::{include_dir, Dir};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::decl::SchemaModule;
use crate::error::{Result, SchemaError};

/// Sample schema corpus shipped with the crate
pub static BUNDLED_SCHEMAS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/schemas");

/// Provider of schema modules by database name
pub trait ModuleSource {
    /// Names of every module this source can provide, sorted
    fn modules(&self) -> Vec<String>;

    /// Decode one module
    fn load(&self, name: &str) -> Result<SchemaModule>;

    fn contains(&self, name: &str) -> bool {
        self.modules().iter().any(|m| m == name)
    }
}

/// Configuration for directory scanning
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Skip files matching these path prefixes
    pub skip_prefixes: Vec<String>,
    /// Only load files matching these path prefixes
    pub include_prefixes: Vec<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            skip_prefixes: vec![
                "target/".to_string(),
                ".git/".to_string(),
            ],
            include_prefixes: Vec::new(),
        }
    }
}

impl LoadConfig {
    fn accepts(&self, relative: &str) -> bool {
        if !self.include_prefixes.is_empty() && !self.include_prefixes.iter().any(|p| relative.starts_with(p)) {
            return false;
        }
        !self.skip_prefixes.iter().any(|p| relative.starts_with(p))
    }
}

fn module_name(path: &Path) -> Option<String> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") | Some("json") => path.file_stem().and_then(|s| s.to_str()).map(str::to_string),
        _ => None,
    }
}

// =============================================================================
// Directory Source
// =============================================================================

/// Modules stored as `<database>.toml` / `<database>.json` files under a directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    files: BTreeMap<String, PathBuf>,
}

impl DirectorySource {
    pub fn new(root: &Path) -> Result<Self> {
        Self::with_config(root, &LoadConfig::default())
    }

    pub fn with_config(root: &Path, config: &LoadConfig) -> Result<Self> {
        if !root.is_dir() {
            return Err(SchemaError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("schema directory {} does not exist", root.display()),
            )));
        }

        let mut files = BTreeMap::new();
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = module_name(path) else {
                continue;
            };
            let relative = path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/");
            if !config.accepts(&relative) {
                continue;
            }
            if let Some(previous) = files.insert(name.clone(), path.to_path_buf()) {
                return Err(SchemaError::InvalidFormat(format!(
                    "schema module {} defined by both {} and {}",
                    name,
                    previous.display(),
                    path.display()
                )));
            }
        }

        debug!(root = %root.display(), modules = files.len(), "scanned schema directory");
        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ModuleSource for DirectorySource {
    fn modules(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn load(&self, name: &str) -> Result<SchemaModule> {
        let path = self
            .files
            .get(name)
            .ok_or_else(|| SchemaError::ModuleNotFound(name.to_string()))?;
        let text = fs::read_to_string(path)?;
        SchemaModule::from_path_text(path, &text)
    }

    fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }
}

// =============================================================================
// Memory Source
// =============================================================================

/// Modules held as text in memory, keyed by module name
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    modules: BTreeMap<String, (PathBuf, String)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_toml(mut self, name: &str, text: &str) -> Self {
        self.insert(name, PathBuf::from(format!("{}.toml", name)), text);
        self
    }

    pub fn with_json(mut self, name: &str, text: &str) -> Self {
        self.insert(name, PathBuf::from(format!("{}.json", name)), text);
        self
    }

    fn insert(&mut self, name: &str, path: PathBuf, text: &str) {
        self.modules.insert(name.to_string(), (path, text.to_string()));
    }
}

impl ModuleSource for MemorySource {
    fn modules(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    fn load(&self, name: &str) -> Result<SchemaModule> {
        let (path, text) = self
            .modules
            .get(name)
            .ok_or_else(|| SchemaError::ModuleNotFound(name.to_string()))?;
        SchemaModule::from_path_text(path, text)
    }

    fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }
}

// =============================================================================
// Embedded Source
// =============================================================================

/// Modules compiled into the binary via `include_dir!`
#[derive(Debug, Clone)]
pub struct EmbeddedSource {
    files: BTreeMap<String, (&'static Path, &'static str)>,
}

impl EmbeddedSource {
    pub fn new(dir: &'static Dir<'static>) -> Self {
        let mut files = BTreeMap::new();
        collect_embedded_files(dir, &mut files);
        Self { files }
    }

    /// The corpus bundled with this crate
    pub fn bundled() -> Self {
        Self::new(&BUNDLED_SCHEMAS)
    }
}

fn collect_embedded_files(dir: &'static Dir<'static>, out: &mut BTreeMap<String, (&'static Path, &'static str)>) {
    for file in dir.files() {
        let path = file.path();
        if let (Some(name), Some(text)) = (module_name(path), file.contents_utf8()) {
            out.insert(name, (path, text));
        }
    }
    for sub in dir.dirs() {
        collect_embedded_files(sub, out);
    }
}

impl ModuleSource for EmbeddedSource {
    fn modules(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn load(&self, name: &str) -> Result<SchemaModule> {
        let (path, text) = self
            .files
            .get(name)
            .ok_or_else(|| SchemaError::ModuleNotFound(name.to_string()))?;
        SchemaModule::from_path_text(path, text)
    }

    fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }
}
