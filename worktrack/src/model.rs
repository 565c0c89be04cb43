//! Persisted records for work units and containers.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::core::aggregate::Rollup;
use crate::core::types::{
    ChangeSet, ContainerStatus, DiffCompleteness, ScopeVerdict, SnapshotDescriptor, UnitStatus,
};
use crate::error::{TrackError, TrackResult};
use crate::io::store::Fields;

pub const UNIT_PREFIX: &str = "unit/";
pub const CONTAINER_PREFIX: &str = "container/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Phase,
    Workflow,
    Mission,
}

/// Caller-reported cost of a unit of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitMetrics {
    pub duration_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UnitMetrics {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Smallest tracked piece of work (a task).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub id: String,
    pub container_id: String,
    #[serde(default)]
    pub parent_unit_id: Option<String>,
    pub root: String,
    #[serde(default)]
    pub declared_areas: Vec<String>,
    pub status: UnitStatus,
    pub snapshot: SnapshotDescriptor,
    pub started_at_ms: i64,
    #[serde(default)]
    pub completed_at_ms: Option<i64>,
    #[serde(default)]
    pub changes: Option<ChangeSet>,
    #[serde(default)]
    pub scope: Option<ScopeVerdict>,
    #[serde(default)]
    pub diff: Option<DiffCompleteness>,
    #[serde(default)]
    pub diff_gaps: Vec<String>,
    #[serde(default)]
    pub metrics: UnitMetrics,
}

/// Phase, workflow or mission whose status derives from its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub kind: ContainerKind,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub status: ContainerStatus,
    /// Externally asserted: an unresolved issue needs human review.
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub rollup: Rollup,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

pub fn unit_key(id: &str) -> String {
    format!("{UNIT_PREFIX}{id}")
}

pub fn container_key(id: &str) -> String {
    format!("{CONTAINER_PREFIX}{id}")
}

/// Ids become file names and record keys, so keep them to `[A-Za-z0-9._-]`.
pub fn validate_id(id: &str) -> TrackResult<()> {
    let invalid = |reason: &str| TrackError::InvalidId {
        id: id.to_string(),
        reason: reason.to_string(),
    };
    if id.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if id == "." || id == ".." {
        return Err(invalid("must not be a relative path component"));
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(invalid("must be [A-Za-z0-9._-] only"));
    }
    Ok(())
}

pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(anyhow!("expected a JSON object, got {other}")),
    }
}

pub fn from_record<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// Generate a unit id from the current time and a random suffix.
pub fn generate_unit_id() -> String {
    use rand::{Rng, distributions::Alphanumeric};

    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    format!("unit-{stamp}-{suffix}")
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_id_rejects_separators() {
        assert!(validate_id("phase-1").is_ok());
        assert!(validate_id("bad/id").is_err());
        assert!(validate_id("..").is_err());
        assert!(validate_id("").is_err());
    }

    #[test]
    fn generated_unit_ids_are_valid() {
        let id = generate_unit_id();
        assert!(id.starts_with("unit-"));
        validate_id(&id).expect("valid");
    }

    #[test]
    fn unit_record_round_trips_through_fields() {
        let unit = WorkUnit {
            id: "u1".to_string(),
            container_id: "p1".to_string(),
            parent_unit_id: None,
            root: "/repo".to_string(),
            declared_areas: vec!["auth".to_string()],
            status: UnitStatus::InProgress,
            snapshot: SnapshotDescriptor::Versioned {
                id: "abc123".to_string(),
            },
            started_at_ms: 1,
            completed_at_ms: None,
            changes: None,
            scope: None,
            diff: None,
            diff_gaps: Vec::new(),
            metrics: UnitMetrics::default(),
        };
        let fields = to_fields(&unit).expect("fields");
        assert_eq!(fields["status"], "IN_PROGRESS");
        let back: WorkUnit = from_record(serde_json::Value::Object(fields)).expect("decode");
        assert_eq!(back, unit);
    }
}
