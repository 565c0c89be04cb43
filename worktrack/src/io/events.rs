//! Outbound notifications for live-update observers.
//!
//! The tracker only emits events; delivery to dashboards or sockets is the
//! transport's job. A failed publish is logged by the caller and never undoes
//! the state change it describes.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::{ChangeSummary, ContainerStatus, DiffCompleteness, ScopeVerdict, UnitStatus};

/// State change worth telling observers about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    UnitCompleted {
        unit_id: String,
        container_id: String,
        status: UnitStatus,
        changes: ChangeSummary,
        diff: DiffCompleteness,
        scope: ScopeVerdict,
    },
    ContainerStatusChanged {
        container_id: String,
        from: ContainerStatus,
        to: ContainerStatus,
    },
}

pub trait EventSink: Send + Sync {
    fn publish(&self, event: &TrackerEvent) -> Result<()>;
}

impl<T: EventSink + ?Sized> EventSink for Box<T> {
    fn publish(&self, event: &TrackerEvent) -> Result<()> {
        (**self).publish(event)
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: &TrackerEvent) -> Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonlSink {
    fn publish(&self, event: &TrackerEvent) -> Result<()> {
        let mut line = serde_json::to_string(event).context("serialize event")?;
        line.push('\n');

        let _guard = self
            .guard
            .lock()
            .map_err(|_| anyhow!("event sink lock poisoned"))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))?;
        Ok(())
    }
}
