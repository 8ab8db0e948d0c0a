//! Spec repository - source, destination and mapping definitions
//!
//! The conversion core only reads specs; [`SpecRepository`] is that
//! read-only view. Two implementations:
//!
//! - [`MemorySpecStore`] - plain in-memory maps, used by tests and callers
//!   that build specs in code;
//! - [`JsonSpecStore`] - `sources.json`, `destinations.json` and
//!   `mappings.json` in a config directory, each an object keyed by id.

pub mod defaults;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::models::{DestinationSpec, SourceSpec};
use crate::transform::executor::Mapper;
use crate::transform::mapping::MappingSpec;

pub const SOURCES_FILE: &str = "sources.json";
pub const DESTINATIONS_FILE: &str = "destinations.json";
pub const MAPPINGS_FILE: &str = "mappings.json";

/// A mapping together with the specs it connects.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMapping {
    pub mapping: MappingSpec,
    pub source: SourceSpec,
    pub destination: DestinationSpec,
}

impl ResolvedMapping {
    pub fn mapper(&self) -> Mapper<'_> {
        Mapper::new(&self.mapping, &self.source, &self.destination)
    }
}

/// Read-only access to stored specs.
pub trait SpecRepository {
    fn source(&self, id: &str) -> StoreResult<SourceSpec>;

    fn destination(&self, id: &str) -> StoreResult<DestinationSpec>;

    fn mapping(&self, id: &str) -> StoreResult<MappingSpec>;

    fn sources(&self) -> Vec<SourceSpec>;

    fn destinations(&self) -> Vec<DestinationSpec>;

    fn mappings(&self) -> Vec<MappingSpec>;

    /// Mappings reading from `source_id`.
    fn mappings_for_source(&self, source_id: &str) -> Vec<MappingSpec> {
        self.mappings()
            .into_iter()
            .filter(|m| m.source_id == source_id)
            .collect()
    }

    /// Load a mapping and both of its specs.
    fn resolve(&self, mapping_id: &str) -> StoreResult<ResolvedMapping> {
        let mapping = self.mapping(mapping_id)?;
        let source = self.source(&mapping.source_id)?;
        let destination = self.destination(&mapping.destination_id)?;
        Ok(ResolvedMapping {
            mapping,
            source,
            destination,
        })
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Specs held in memory, listed in id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySpecStore {
    sources: BTreeMap<String, SourceSpec>,
    destinations: BTreeMap<String, DestinationSpec>,
    mappings: BTreeMap<String, MappingSpec>,
}

impl MemorySpecStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with the built-in specs.
    pub fn with_defaults() -> Self {
        let mut store = Self::new();
        store.add_defaults();
        store
    }

    pub fn insert_source(&mut self, spec: SourceSpec) {
        self.sources.insert(spec.id.clone(), spec);
    }

    pub fn insert_destination(&mut self, spec: DestinationSpec) {
        self.destinations.insert(spec.id.clone(), spec);
    }

    pub fn insert_mapping(&mut self, mapping: MappingSpec) {
        self.mappings.insert(mapping.id.clone(), mapping);
    }

    pub fn remove_source(&mut self, id: &str) -> bool {
        self.sources.remove(id).is_some()
    }

    pub fn remove_destination(&mut self, id: &str) -> bool {
        self.destinations.remove(id).is_some()
    }

    pub fn remove_mapping(&mut self, id: &str) -> bool {
        self.mappings.remove(id).is_some()
    }

    /// Add built-in specs for every kind that is still empty.
    /// Returns whether anything was added.
    pub fn add_defaults(&mut self) -> bool {
        let mut added = false;
        if self.sources.is_empty() {
            defaults::sources().into_iter().for_each(|s| self.insert_source(s));
            added = true;
        }
        if self.destinations.is_empty() {
            defaults::destinations().into_iter().for_each(|d| self.insert_destination(d));
            added = true;
        }
        if self.mappings.is_empty() {
            defaults::mappings().into_iter().for_each(|m| self.insert_mapping(m));
            added = true;
        }
        added
    }
}

fn lookup<T: Clone>(map: &BTreeMap<String, T>, kind: &'static str, id: &str) -> StoreResult<T> {
    map.get(id).cloned().ok_or_else(|| StoreError::NotFound {
        kind,
        id: id.to_string(),
    })
}

impl SpecRepository for MemorySpecStore {
    fn source(&self, id: &str) -> StoreResult<SourceSpec> {
        lookup(&self.sources, "Source", id)
    }

    fn destination(&self, id: &str) -> StoreResult<DestinationSpec> {
        lookup(&self.destinations, "Destination", id)
    }

    fn mapping(&self, id: &str) -> StoreResult<MappingSpec> {
        lookup(&self.mappings, "Mapping", id)
    }

    fn sources(&self) -> Vec<SourceSpec> {
        self.sources.values().cloned().collect()
    }

    fn destinations(&self) -> Vec<DestinationSpec> {
        self.destinations.values().cloned().collect()
    }

    fn mappings(&self) -> Vec<MappingSpec> {
        self.mappings.values().cloned().collect()
    }
}

// =============================================================================
// JSON file store
// =============================================================================

/// Specs persisted as JSON files in one directory.
///
/// Files are read once on [`JsonSpecStore::open`]; every save rewrites the
/// affected file. A missing file is an empty collection.
#[derive(Debug, Clone)]
pub struct JsonSpecStore {
    dir: PathBuf,
    specs: MemorySpecStore,
}

impl JsonSpecStore {
    /// Open the store in `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let specs = MemorySpecStore {
            sources: load_file(&dir.join(SOURCES_FILE))?,
            destinations: load_file(&dir.join(DESTINATIONS_FILE))?,
            mappings: load_file(&dir.join(MAPPINGS_FILE))?,
        };
        tracing::debug!(
            dir = %dir.display(),
            sources = specs.sources.len(),
            destinations = specs.destinations.len(),
            mappings = specs.mappings.len(),
            "Loaded spec store"
        );

        Ok(Self { dir, specs })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_source(&mut self, spec: SourceSpec) -> StoreResult<()> {
        self.specs.insert_source(spec);
        save_file(&self.dir.join(SOURCES_FILE), &self.specs.sources)
    }

    pub fn save_destination(&mut self, spec: DestinationSpec) -> StoreResult<()> {
        self.specs.insert_destination(spec);
        save_file(&self.dir.join(DESTINATIONS_FILE), &self.specs.destinations)
    }

    pub fn save_mapping(&mut self, mapping: MappingSpec) -> StoreResult<()> {
        self.specs.insert_mapping(mapping);
        save_file(&self.dir.join(MAPPINGS_FILE), &self.specs.mappings)
    }

    pub fn delete_source(&mut self, id: &str) -> StoreResult<bool> {
        if !self.specs.remove_source(id) {
            return Ok(false);
        }
        save_file(&self.dir.join(SOURCES_FILE), &self.specs.sources)?;
        Ok(true)
    }

    pub fn delete_destination(&mut self, id: &str) -> StoreResult<bool> {
        if !self.specs.remove_destination(id) {
            return Ok(false);
        }
        save_file(&self.dir.join(DESTINATIONS_FILE), &self.specs.destinations)?;
        Ok(true)
    }

    pub fn delete_mapping(&mut self, id: &str) -> StoreResult<bool> {
        if !self.specs.remove_mapping(id) {
            return Ok(false);
        }
        save_file(&self.dir.join(MAPPINGS_FILE), &self.specs.mappings)?;
        Ok(true)
    }

    /// Write the built-in specs for every kind that is still empty.
    pub fn init_defaults(&mut self) -> StoreResult<bool> {
        if !self.specs.add_defaults() {
            return Ok(false);
        }
        save_file(&self.dir.join(SOURCES_FILE), &self.specs.sources)?;
        save_file(&self.dir.join(DESTINATIONS_FILE), &self.specs.destinations)?;
        save_file(&self.dir.join(MAPPINGS_FILE), &self.specs.mappings)?;
        tracing::info!(dir = %self.dir.display(), "Initialized default specs");
        Ok(true)
    }
}

impl SpecRepository for JsonSpecStore {
    fn source(&self, id: &str) -> StoreResult<SourceSpec> {
        self.specs.source(id)
    }

    fn destination(&self, id: &str) -> StoreResult<DestinationSpec> {
        self.specs.destination(id)
    }

    fn mapping(&self, id: &str) -> StoreResult<MappingSpec> {
        self.specs.mapping(id)
    }

    fn sources(&self) -> Vec<SourceSpec> {
        self.specs.sources()
    }

    fn destinations(&self) -> Vec<DestinationSpec> {
        self.specs.destinations()
    }

    fn mappings(&self) -> Vec<MappingSpec> {
        self.specs.mappings()
    }
}

fn load_file<T: DeserializeOwned>(path: &Path) -> StoreResult<BTreeMap<String, T>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(&content)?)
}

fn save_file<T: Serialize>(path: &Path, specs: &BTreeMap<String, T>) -> StoreResult<()> {
    let content = serde_json::to_string_pretty(specs)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnSpec, ColumnType, FileSpec};
    use crate::transform::operations::TransformSpec;
    use tempfile::TempDir;

    fn sample_mapping() -> MappingSpec {
        MappingSpec::new("a_to_b", "a", "b").with_field("out", TransformSpec::direct("in"))
    }

    #[test]
    fn test_memory_store_resolve() {
        let mut store = MemorySpecStore::new();
        store.insert_source(FileSpec::new("a", "A"));
        store.insert_destination(FileSpec::new("b", "B").with_column(ColumnSpec::new("out", ColumnType::String)));
        store.insert_mapping(sample_mapping());

        let resolved = store.resolve("a_to_b").unwrap();
        assert_eq!(resolved.source.id, "a");
        assert_eq!(resolved.mapper().destination().columns.len(), 1);
        assert_eq!(store.mappings_for_source("a").len(), 1);
        assert!(store.mappings_for_source("b").is_empty());
    }

    #[test]
    fn test_resolve_reports_missing_spec() {
        let mut store = MemorySpecStore::new();
        store.insert_mapping(sample_mapping());

        let err = store.resolve("a_to_b").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "Source", .. }));
        assert_eq!(err.to_string(), "Source not found: a");
        assert!(matches!(store.mapping("nope"), Err(StoreError::NotFound { kind: "Mapping", .. })));
    }

    #[test]
    fn test_json_store_missing_files_are_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonSpecStore::open(dir.path().join("config")).unwrap();
        assert!(store.sources().is_empty());
        assert!(store.mappings().is_empty());
        assert!(store.dir().exists());
    }

    #[test]
    fn test_json_store_persists() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = JsonSpecStore::open(dir.path()).unwrap();
            store.save_source(FileSpec::new("a", "A")).unwrap();
            store.save_mapping(sample_mapping()).unwrap();
        }

        let content = fs::read_to_string(dir.path().join(MAPPINGS_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json["a_to_b"]["source_id"], "a");
        assert_eq!(json["a_to_b"]["field_mappings"][0]["transform"]["type"], "direct");

        let mut store = JsonSpecStore::open(dir.path()).unwrap();
        assert_eq!(store.mapping("a_to_b").unwrap(), sample_mapping());
        assert_eq!(store.source("a").unwrap().name, "A");

        assert!(store.delete_mapping("a_to_b").unwrap());
        assert!(!store.delete_mapping("a_to_b").unwrap());
        let store = JsonSpecStore::open(dir.path()).unwrap();
        assert!(store.mappings().is_empty());
    }

    #[test]
    fn test_json_store_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SOURCES_FILE), "[not json").unwrap();
        assert!(matches!(JsonSpecStore::open(dir.path()), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_init_defaults_only_once() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonSpecStore::open(dir.path()).unwrap();
        assert!(store.init_defaults().unwrap());
        assert!(!store.init_defaults().unwrap());

        let store = JsonSpecStore::open(dir.path()).unwrap();
        assert_eq!(store.sources().len(), 2);
        assert_eq!(store.destinations().len(), 1);
        assert_eq!(store.mappings().len(), 2);
        assert!(store.resolve("revolut_stocks_to_ghostfolio").is_ok());
    }
}
