use crate::{FlowError, NodeId, WorkflowError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File the CLI exports to when no other path is given.
pub const DEFAULT_OUTPUT_FILE: &str = "workflow_output.json";

/// Run-scoped mapping from node id to the value its handler produced.
///
/// Each id is written at most once. The store doubles as the template
/// context for later nodes and as the exported artifact of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultStore {
    entries: BTreeMap<NodeId, Value>,
}

/// Outcome of looking a node up in a stored run.
#[derive(Debug, PartialEq)]
pub enum Inspection<'a> {
    Found(&'a Value),
    Missing { available: Vec<NodeId> },
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: impl Into<NodeId>, value: Value) -> Result<(), WorkflowError> {
        let id = id.into();
        if self.entries.contains_key(&id) {
            return Err(WorkflowError::ResultAlreadyRecorded(id));
        }
        self.entries.insert(id, value);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Value)> {
        self.entries.iter()
    }

    pub fn inspect(&self, id: &str) -> Inspection<'_> {
        match self.entries.get(id) {
            Some(value) => Inspection::Found(value),
            None => Inspection::Missing {
                available: self.ids(),
            },
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, FlowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FlowError> {
        let json = self.to_json_pretty()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Persistence collaborator the engine hands the final store to
pub trait ResultExporter: Send + Sync {
    fn export(&self, results: &ResultStore) -> Result<(), FlowError>;
}

/// Writes the store as pretty-printed JSON to a file
#[derive(Debug, Clone)]
pub struct JsonFileExporter {
    path: PathBuf,
}

impl JsonFileExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for JsonFileExporter {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_FILE)
    }
}

impl ResultExporter for JsonFileExporter {
    fn export(&self, results: &ResultStore) -> Result<(), FlowError> {
        tracing::debug!("Writing {} results to {}", results.len(), self.path.display());
        results
            .save(&self.path)
            .map_err(|e| FlowError::Export(format!("{}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_is_write_once() {
        let mut store = ResultStore::new();
        store.record("a", json!({"output": "first"})).unwrap();

        let err = store.record("a", json!({"output": "second"})).unwrap_err();
        assert_eq!(err, WorkflowError::ResultAlreadyRecorded("a".to_string()));
        assert_eq!(store.get("a"), Some(&json!({"output": "first"})));
    }

    #[test]
    fn test_inspect_lists_available_ids() {
        let mut store = ResultStore::new();
        store.record("b", json!("two")).unwrap();
        store.record("a", json!("one")).unwrap();

        assert_eq!(store.inspect("a"), Inspection::Found(&json!("one")));
        assert_eq!(
            store.inspect("zzz"),
            Inspection::Missing {
                available: vec!["a".to_string(), "b".to_string()]
            }
        );
    }

    #[test]
    fn test_exported_file_is_keyed_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_OUTPUT_FILE);

        let mut store = ResultStore::new();
        store.record("a", json!({"output": "Data_from_a"})).unwrap();
        JsonFileExporter::new(&path).export(&store).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, json!({"a": {"output": "Data_from_a"}}));
        assert_eq!(ResultStore::load(&path).unwrap(), store);
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonFileExporter::new(dir.path().join("missing").join("out.json"));

        let err = exporter.export(&ResultStore::new()).unwrap_err();
        assert!(matches!(err, FlowError::Export(_)));
    }
}
