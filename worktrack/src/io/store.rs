//! Generic keyed record store.
//!
//! The tracker needs only key lookup, record creation, shallow field updates
//! and filtered listing. Each write replaces one record atomically; nothing
//! here offers multi-record transactions.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Map, Value};
use tracing::debug;

/// Top-level fields of a record.
pub type Fields = Map<String, Value>;

/// Conjunction of predicates over stored records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Only ids starting with this prefix (e.g. `unit/`).
    pub id_prefix: Option<String>,
    /// Top-level `field == value` checks.
    pub equals: Vec<(String, Value)>,
}

impl Filter {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            id_prefix: Some(prefix.into()),
            equals: Vec::new(),
        }
    }

    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, id: &str, record: &Value) -> bool {
        if let Some(prefix) = &self.id_prefix
            && !id.starts_with(prefix.as_str())
        {
            return false;
        }
        self.equals
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected))
    }
}

/// Persistence collaborator.
pub trait RecordStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Value>>;

    /// Create a record; fails if `id` already exists.
    fn create(&self, id: &str, fields: Fields) -> Result<()>;

    /// Merge `fields` over the stored top-level fields; fails if `id` is missing.
    fn update(&self, id: &str, fields: Fields) -> Result<()>;

    /// Matching records ordered by id.
    fn list(&self, filter: &Filter) -> Result<Vec<(String, Value)>>;
}

fn merge_fields(existing: &mut Value, fields: Fields) -> Result<()> {
    let Some(object) = existing.as_object_mut() else {
        bail!("stored record is not an object");
    };
    for (key, value) in fields {
        object.insert(key, value);
    }
    Ok(())
}

/// In-memory store; shared across threads, not durable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Value>>> {
        self.records
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn create(&self, id: &str, fields: Fields) -> Result<()> {
        let mut records = self.lock()?;
        if records.contains_key(id) {
            bail!("record '{id}' already exists");
        }
        records.insert(id.to_string(), Value::Object(fields));
        Ok(())
    }

    fn update(&self, id: &str, fields: Fields) -> Result<()> {
        let mut records = self.lock()?;
        let existing = records
            .get_mut(id)
            .ok_or_else(|| anyhow!("record '{id}' not found"))?;
        merge_fields(existing, fields).with_context(|| format!("update record '{id}'"))
    }

    fn list(&self, filter: &Filter) -> Result<Vec<(String, Value)>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|(id, record)| filter.matches(id, record))
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect())
    }
}

/// One pretty-printed JSON file per record under a directory.
///
/// Record id `unit/abc` lives at `<dir>/unit/abc.json`.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty()
            || id.starts_with('/')
            || id
                .split('/')
                .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            bail!("invalid record id '{id}'");
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    fn read(&self, path: &Path) -> Result<Option<Value>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("read record {}", path.display()))?;
        let value = serde_json::from_str(&contents)
            .with_context(|| format!("parse record {}", path.display()))?;
        Ok(Some(value))
    }

    fn write(&self, path: &Path, value: &Value) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(value)?;
        buf.push('\n');
        write_atomic(path, &buf)
    }

    fn collect(&self, dir: &Path, out: &mut Vec<String>) -> Result<()> {
        if !dir.is_dir() {
            return Ok(());
        }
        let entries = fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("read dir entry in {}", dir.display()))?
                .path();
            if path.is_dir() {
                self.collect(&path, out)?;
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Ok(rel) = path.with_extension("").strip_prefix(&self.dir).map(Path::to_path_buf)
            else {
                continue;
            };
            let id = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.push(id);
        }
        Ok(())
    }
}

impl RecordStore for DirStore {
    fn get(&self, id: &str) -> Result<Option<Value>> {
        let path = self.record_path(id)?;
        self.read(&path)
    }

    fn create(&self, id: &str, fields: Fields) -> Result<()> {
        let path = self.record_path(id)?;
        if path.exists() {
            bail!("record '{id}' already exists");
        }
        debug!(id, path = %path.display(), "creating record");
        self.write(&path, &Value::Object(fields))
    }

    /// Read, merge, then atomically replace the file. Nothing serializes two
    /// processes updating the same record: the later write wins whole, so a
    /// field merged by the earlier one can be lost until it is written again.
    fn update(&self, id: &str, fields: Fields) -> Result<()> {
        let path = self.record_path(id)?;
        let mut existing = self
            .read(&path)?
            .ok_or_else(|| anyhow!("record '{id}' not found"))?;
        merge_fields(&mut existing, fields).with_context(|| format!("update record '{id}'"))?;
        debug!(id, "updating record");
        self.write(&path, &existing)
    }

    fn list(&self, filter: &Filter) -> Result<Vec<(String, Value)>> {
        let mut ids = Vec::new();
        self.collect(&self.dir, &mut ids)?;
        ids.sort();
        let mut out = Vec::new();
        for id in ids {
            if let Some(prefix) = &filter.id_prefix
                && !id.starts_with(prefix.as_str())
            {
                continue;
            }
            let path = self.record_path(&id)?;
            // A concurrent writer may have renamed it away between listing and reading.
            let Some(record) = self.read(&path)? else {
                continue;
            };
            if filter.matches(&id, &record) {
                out.push((id, record));
            }
        }
        Ok(out)
    }
}

/// Write `contents` to `path` via a temp file and rename.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    fs::write(tmp.path(), contents)
        .with_context(|| format!("write temp file {}", tmp.path().display()))?;
    tmp.persist(path)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn exercise(store: &dyn RecordStore) {
        store
            .create("unit/a", fields(json!({"container_id": "p1", "status": "IN_PROGRESS"})))
            .expect("create a");
        store
            .create("unit/b", fields(json!({"container_id": "p2", "status": "IN_PROGRESS"})))
            .expect("create b");
        store
            .create("container/p1", fields(json!({"kind": "phase"})))
            .expect("create p1");

        assert!(store.create("unit/a", Fields::new()).is_err());

        store
            .update("unit/a", fields(json!({"status": "SUCCESS"})))
            .expect("update");
        let a = store.get("unit/a").expect("get").expect("present");
        assert_eq!(a["status"], "SUCCESS");
        assert_eq!(a["container_id"], "p1");

        assert!(store.update("unit/missing", Fields::new()).is_err());
        assert!(store.get("unit/missing").expect("get").is_none());

        let units = store.list(&Filter::prefix("unit/")).expect("list");
        let ids: Vec<&str> = units.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["unit/a", "unit/b"]);

        let in_p1 = store
            .list(&Filter::prefix("unit/").field_eq("container_id", "p1"))
            .expect("list");
        assert_eq!(in_p1.len(), 1);
        assert_eq!(in_p1[0].0, "unit/a");
    }

    #[test]
    fn memory_store_supports_keyed_operations() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn dir_store_supports_keyed_operations() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = DirStore::new(temp.path().join("records"));
        exercise(&store);
        assert!(temp.path().join("records/unit/a.json").is_file());
    }

    #[test]
    fn dir_store_rejects_path_traversal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = DirStore::new(temp.path());
        assert!(store.get("unit/../../etc").is_err());
        assert!(store.get("/abs").is_err());
    }
}
