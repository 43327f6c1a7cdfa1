//! Definition Catalog - discovers migration definitions on storage
//!
//! The catalog answers three questions for the registry: which candidate
//! names exist on storage, whether a given version has a definition at its
//! canonical location, and how to build that version's behavior.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{MigrationError, MigrationResult};
use crate::migration::{Migration, MigrationFactory, MigrationHandle};
use crate::sql::{SqlDefinition, SqlMigration, StatementRunner};
use crate::version::VersionName;

static MARKUP_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]*>").expect("markup tag pattern is valid"));

/// A candidate definition found while enumerating storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Candidate version name; not yet validated
    pub name: String,
    pub location: String,
}

/// A definition that loaded successfully
#[derive(Debug, Clone)]
pub struct LoadedDefinition {
    pub handle: MigrationHandle,
    pub description: String,
}

/// Source of migration definitions
pub trait DefinitionCatalog: Send + Sync {
    /// Enumerate every candidate definition on storage
    fn entries(&self) -> MigrationResult<Vec<CatalogEntry>>;

    /// Whether a definition exists at the version's canonical location
    fn contains(&self, version: &VersionName) -> bool;

    /// Canonical location of a version's definition
    fn location(&self, version: &VersionName) -> String;

    /// Load a version's definition
    fn load(&self, version: &VersionName) -> MigrationResult<LoadedDefinition>;
}

/// Normalise a description for display
///
/// Line breaks become spaces, markup tags are dropped and backslash escapes
/// are removed.
pub fn clean_description(raw: &str) -> String {
    let single_line = raw.replace("\r\n", " ").replace(['\n', '\r'], " ");
    let without_tags = MARKUP_TAG.replace_all(&single_line, "");

    let mut cleaned = String::with_capacity(without_tags.len());
    let mut chars = without_tags.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                cleaned.push(escaped);
            }
        } else {
            cleaned.push(c);
        }
    }
    cleaned
}

/// Instantiate a handle once to read its description
///
/// A definition that panics while being built counts as a load failure.
fn describe(version: &VersionName, handle: MigrationHandle) -> MigrationResult<LoadedDefinition> {
    let description = catch_unwind(AssertUnwindSafe(|| handle.instantiate().description()))
        .map_err(|_| {
            MigrationError::Catalog(format!("definition {} panicked while loading", version))
        })?;

    Ok(LoadedDefinition {
        handle,
        description: clean_description(&description),
    })
}

/// Catalog backed by a directory of definition files
///
/// The canonical location of a version is `<root>/<version>.<extension>`.
/// Files load as SQL definitions unless a code factory is registered for the
/// version, in which case the file marks the definition as present and the
/// factory supplies the behavior.
pub struct FileCatalog {
    root: PathBuf,
    extension: String,
    runner: Option<Arc<dyn StatementRunner>>,
    factories: HashMap<VersionName, Arc<MigrationFactory>>,
}

impl FileCatalog {
    /// Create a catalog over `root` with the default `sql` extension
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "sql".to_string(),
            runner: None,
            factories: HashMap::new(),
        }
    }

    /// Use a different definition file extension
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Runner that SQL definitions execute through
    pub fn with_runner(mut self, runner: Arc<dyn StatementRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Supply the behavior for a version in code
    pub fn with_factory<F>(mut self, version: VersionName, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Migration> + Send + Sync + 'static,
    {
        self.factories.insert(version, Arc::new(factory));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    fn definition_path(&self, version: &VersionName) -> PathBuf {
        self.root.join(format!("{}.{}", version, self.extension))
    }

    fn load_sql(&self, version: &VersionName, path: &Path) -> MigrationResult<MigrationHandle> {
        let runner = self.runner.clone().ok_or_else(|| {
            MigrationError::Catalog(format!(
                "no statement runner configured for SQL definition {}",
                version
            ))
        })?;

        let content = fs::read_to_string(path).map_err(|e| {
            MigrationError::Catalog(format!("Failed to read migration file {}: {}", path.display(), e))
        })?;
        let definition = SqlDefinition::parse(&content);

        Ok(MigrationHandle::new(version.clone(), move || {
            Box::new(SqlMigration::new(definition.clone(), runner.clone()))
        }))
    }
}

impl DefinitionCatalog for FileCatalog {
    fn entries(&self) -> MigrationResult<Vec<CatalogEntry>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.root).map_err(|e| {
            MigrationError::Catalog(format!("Failed to read migrations directory: {}", e))
        })?;

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                MigrationError::Catalog(format!("Failed to read directory entry: {}", e))
            })?;

            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().map_or(true, |ext| ext != self.extension.as_str()) {
                continue;
            }

            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                found.push(CatalogEntry {
                    name: stem.to_string(),
                    location: path.display().to_string(),
                });
            }
        }

        Ok(found)
    }

    fn contains(&self, version: &VersionName) -> bool {
        self.definition_path(version).is_file()
    }

    fn location(&self, version: &VersionName) -> String {
        self.definition_path(version).display().to_string()
    }

    fn load(&self, version: &VersionName) -> MigrationResult<LoadedDefinition> {
        let path = self.definition_path(version);
        if !path.is_file() {
            return Err(MigrationError::MigrationNotFound(version.to_string()));
        }

        let handle = match self.factories.get(version) {
            Some(factory) => MigrationHandle::from_factory(version.clone(), factory.clone()),
            None => self.load_sql(version, &path)?,
        };

        describe(version, handle)
    }
}

/// Catalog holding definitions registered in process
///
/// Useful for embedding migrations in a binary and for tests. Removing a
/// definition models a deleted definition file.
#[derive(Default)]
pub struct MemoryCatalog {
    definitions: RwLock<BTreeMap<VersionName, Arc<MigrationFactory>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a definition
    pub fn register<F>(&self, version: VersionName, factory: F)
    where
        F: Fn() -> Box<dyn Migration> + Send + Sync + 'static,
    {
        self.definitions.write().insert(version, Arc::new(factory));
    }

    /// Remove a definition, returning whether it existed
    pub fn remove(&self, version: &VersionName) -> bool {
        self.definitions.write().remove(version).is_some()
    }

    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }
}

impl DefinitionCatalog for MemoryCatalog {
    fn entries(&self) -> MigrationResult<Vec<CatalogEntry>> {
        Ok(self
            .definitions
            .read()
            .keys()
            .map(|version| CatalogEntry {
                name: version.to_string(),
                location: self.location(version),
            })
            .collect())
    }

    fn contains(&self, version: &VersionName) -> bool {
        self.definitions.read().contains_key(version)
    }

    fn location(&self, version: &VersionName) -> String {
        format!("memory:{}", version)
    }

    fn load(&self, version: &VersionName) -> MigrationResult<LoadedDefinition> {
        let factory = self
            .definitions
            .read()
            .get(version)
            .cloned()
            .ok_or_else(|| MigrationError::MigrationNotFound(version.to_string()))?;

        describe(version, MigrationHandle::from_factory(version.clone(), factory))
    }
}
