//! Unit and container lifecycle over a record store.
//!
//! Container status is never written by callers. Every change to a child
//! triggers [`Tracker::recompute_container_status`], which re-fetches the
//! children from the store, derives status and rollup from scratch, and then
//! walks up to the parent. Concurrent recomputations of one container are
//! last-writer-wins and converge because the derivation is idempotent.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::aggregate::{
    ChildState, ChildTotals, Rollup, compute_rollup, derive_container_status,
};
use crate::core::types::{ContainerStatus, UnitStatus};
use crate::error::{TrackError, TrackResult};
use crate::io::config::TrackerConfig;
use crate::io::events::{EventSink, TrackerEvent};
use crate::io::git::VcsProbe;
use crate::io::store::{Fields, Filter, RecordStore};
use crate::model::{
    CONTAINER_PREFIX, Container, ContainerKind, UNIT_PREFIX, UnitMetrics, WorkUnit, container_key,
    from_record, generate_unit_id, now_ms, to_fields, unit_key, validate_id,
};
use crate::unit::{UnitOutcome, complete_unit, start_unit};

/// Input for [`Tracker::begin_unit`].
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    /// Generated when absent.
    pub unit_id: Option<String>,
    pub container_id: String,
    pub parent_unit_id: Option<String>,
    pub root: PathBuf,
    pub declared_areas: Vec<String>,
}

/// Input for [`Tracker::finish_unit`].
#[derive(Debug, Clone)]
pub struct CompleteRequest {
    pub unit_id: String,
    /// Must be terminal.
    pub status: UnitStatus,
    /// A zero `duration_ms` is replaced by the wall-clock time since start.
    pub metrics: UnitMetrics,
}

pub struct Tracker<P, S, E> {
    probe: P,
    store: S,
    events: E,
    config: TrackerConfig,
}

impl<P: VcsProbe, S: RecordStore, E: EventSink> Tracker<P, S, E> {
    pub fn new(probe: P, store: S, events: E, config: TrackerConfig) -> Self {
        Self {
            probe,
            store,
            events,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn container(&self, id: &str) -> TrackResult<Container> {
        let value = self
            .store
            .get(&container_key(id))?
            .ok_or_else(|| TrackError::NotFound {
                kind: "container",
                id: id.to_string(),
            })?;
        Ok(from_record(value)?)
    }

    pub fn unit(&self, id: &str) -> TrackResult<WorkUnit> {
        let value = self
            .store
            .get(&unit_key(id))?
            .ok_or_else(|| TrackError::NotFound {
                kind: "unit",
                id: id.to_string(),
            })?;
        Ok(from_record(value)?)
    }

    /// Units directly under `container_id`, ordered by start time then id.
    pub fn units_in(&self, container_id: &str) -> TrackResult<Vec<WorkUnit>> {
        let mut units = self
            .list_children::<WorkUnit>(container_id, UNIT_PREFIX, "container_id")?
            .into_iter()
            .map(|(_, unit)| unit)
            .collect::<Vec<_>>();
        units.sort_by(|a, b| (a.started_at_ms, &a.id).cmp(&(b.started_at_ms, &b.id)));
        Ok(units)
    }

    /// Create a `PENDING` container, optionally nested under `parent_id`.
    #[instrument(skip_all, fields(container_id = %id, kind = ?kind))]
    pub fn create_container(
        &self,
        id: &str,
        kind: ContainerKind,
        parent_id: Option<&str>,
    ) -> TrackResult<Container> {
        validate_id(id)?;
        if let Some(parent) = parent_id {
            self.container(parent)?;
        }

        let now = now_ms();
        let container = Container {
            id: id.to_string(),
            kind,
            parent_id: parent_id.map(str::to_string),
            status: ContainerStatus::Pending,
            blocked: false,
            rollup: Rollup::default(),
            created_at_ms: now,
            updated_at_ms: now,
        };
        self.store.create(&container_key(id), to_fields(&container)?)?;
        info!("container created");

        if let Some(parent) = parent_id {
            self.reopen_upward(parent)?;
            self.recompute_container_status(parent)?;
        }
        Ok(container)
    }

    /// Snapshot the tree, persist an `IN_PROGRESS` unit and reopen its
    /// container chain.
    #[instrument(skip_all, fields(container_id = %request.container_id))]
    pub fn begin_unit(&self, request: StartRequest) -> TrackResult<WorkUnit> {
        let container = self.container(&request.container_id)?;
        let id = request.unit_id.unwrap_or_else(generate_unit_id);
        validate_id(&id)?;
        if let Some(parent) = &request.parent_unit_id {
            self.unit(parent)?;
        }

        let snapshot = start_unit(
            &self.probe,
            &request.root,
            &request.declared_areas,
            &self.config.fingerprint,
        );
        let unit = WorkUnit {
            id: id.clone(),
            container_id: container.id.clone(),
            parent_unit_id: request.parent_unit_id,
            root: request.root.to_string_lossy().into_owned(),
            declared_areas: request.declared_areas,
            status: UnitStatus::InProgress,
            snapshot,
            started_at_ms: now_ms(),
            completed_at_ms: None,
            changes: None,
            scope: None,
            diff: None,
            diff_gaps: Vec::new(),
            metrics: UnitMetrics::default(),
        };
        self.store.create(&unit_key(&id), to_fields(&unit)?)?;
        info!(unit_id = %id, snapshot = %unit.snapshot.id(), "unit begun");

        self.reopen_upward(&container.id)?;
        self.recompute_container_status(&container.id)?;
        Ok(unit)
    }

    /// Diff, verify scope, persist the terminal unit, notify, then
    /// recompute containers upward.
    ///
    /// A probe that cannot run yields an empty change set marked
    /// `Unavailable`; the unit still becomes terminal.
    #[instrument(skip_all, fields(unit_id = %request.unit_id, status = request.status.label()))]
    pub fn finish_unit(&self, request: CompleteRequest) -> TrackResult<WorkUnit> {
        if !request.status.is_terminal() {
            return Err(TrackError::NonTerminalStatus {
                status: request.status.label(),
            });
        }
        let unit = self.unit(&request.unit_id)?;
        if unit.status.is_terminal() {
            return Err(TrackError::InvalidTransition {
                kind: "unit",
                id: unit.id,
                status: unit.status.label(),
            });
        }

        let root = PathBuf::from(&unit.root);
        let outcome =
            match complete_unit(&self.probe, &unit.snapshot, &root, &unit.declared_areas) {
                Ok(outcome) => outcome,
                Err(err) if err.is_probe_unavailable() => {
                    warn!(err = %err, "diff unavailable, completing with empty change set");
                    UnitOutcome::unavailable(err.to_string())
                }
                Err(err) => return Err(err),
            };

        let completed_at = now_ms();
        let mut metrics = request.metrics;
        if metrics.duration_ms == 0 {
            metrics.duration_ms = u64::try_from(completed_at - unit.started_at_ms).unwrap_or(0);
        }

        let UnitOutcome { report, verdict } = outcome;
        let finished = WorkUnit {
            status: request.status,
            completed_at_ms: Some(completed_at),
            changes: Some(report.changes.clone()),
            scope: Some(verdict.clone()),
            diff: Some(report.completeness),
            diff_gaps: report.gaps,
            metrics,
            ..unit
        };
        self.store
            .update(&unit_key(&finished.id), to_fields(&finished)?)?;

        self.publish(&TrackerEvent::UnitCompleted {
            unit_id: finished.id.clone(),
            container_id: finished.container_id.clone(),
            status: finished.status,
            changes: report.changes.summary(),
            diff: report.completeness,
            scope: verdict,
        });

        self.recompute_container_status(&finished.container_id)?;
        Ok(finished)
    }

    /// Derive status and rollup from the current children, persist them,
    /// then recompute the parent container.
    #[instrument(skip_all, fields(container_id = %id))]
    pub fn recompute_container_status(&self, id: &str) -> TrackResult<(ContainerStatus, Rollup)> {
        let container = self.container(id)?;
        let children = self.child_views(&container.id)?;
        let states: Vec<ChildState> = children.iter().map(|(state, _)| *state).collect();
        let status = derive_container_status(&states, container.blocked);
        let (rollup, _files) = compute_rollup(&children);

        let mut fields = Fields::new();
        fields.insert("status".to_string(), to_value(&status)?);
        fields.insert("rollup".to_string(), to_value(&rollup)?);
        fields.insert("updated_at_ms".to_string(), Value::from(now_ms()));
        self.store.update(&container_key(id), fields)?;
        debug!(status = status.label(), children = states.len(), "container recomputed");

        if status != container.status {
            self.announce_status(id, container.status, status);
        }
        if let Some(parent) = &container.parent_id {
            self.recompute_container_status(parent)?;
        }
        Ok((status, rollup))
    }

    /// Set or clear the externally asserted BLOCKED overlay.
    ///
    /// Status is derived again from the stored children after the flag is
    /// written, so a status left stale by a racing recompute in another
    /// process is corrected here rather than kept.
    #[instrument(skip_all, fields(container_id = %id, blocked = blocked))]
    pub fn set_blocked(&self, id: &str, blocked: bool) -> TrackResult<ContainerStatus> {
        self.container(id)?;
        let mut fields = Fields::new();
        fields.insert("blocked".to_string(), Value::Bool(blocked));
        self.store.update(&container_key(id), fields)?;
        let (status, _) = self.recompute_container_status(id)?;
        Ok(status)
    }

    /// New work proves a container active: force it and every ancestor out
    /// of `PENDING` or a terminal status.
    fn reopen_upward(&self, id: &str) -> TrackResult<()> {
        let mut next = Some(id.to_string());
        while let Some(current) = next {
            let container = self.container(&current)?;
            if matches!(
                container.status,
                ContainerStatus::Pending | ContainerStatus::Completed | ContainerStatus::Failed
            ) {
                let mut fields = Fields::new();
                fields.insert("status".to_string(), to_value(&ContainerStatus::InProgress)?);
                fields.insert("updated_at_ms".to_string(), Value::from(now_ms()));
                self.store.update(&container_key(&current), fields)?;
                self.announce_status(&current, container.status, ContainerStatus::InProgress);
            }
            next = container.parent_id;
        }
        Ok(())
    }

    /// Aggregation view of every direct child: units, then sub-containers.
    fn child_views(&self, container_id: &str) -> TrackResult<Vec<(ChildState, ChildTotals)>> {
        let mut views = Vec::new();
        for (_, unit) in self.list_children::<WorkUnit>(container_id, UNIT_PREFIX, "container_id")? {
            views.push((
                ChildState::from(unit.status),
                ChildTotals {
                    duration_ms: unit.metrics.duration_ms,
                    tokens: unit.metrics.total_tokens(),
                    files: unit_files(&unit),
                },
            ));
        }
        for (_, sub) in self.list_children::<Container>(container_id, CONTAINER_PREFIX, "parent_id")? {
            views.push((
                ChildState::from(sub.status),
                ChildTotals {
                    duration_ms: sub.rollup.total_duration_ms,
                    tokens: sub.rollup.total_tokens,
                    files: self.descendant_files(&sub.id)?,
                },
            ));
        }
        Ok(views)
    }

    /// Every changed path recorded by units anywhere below `container_id`.
    fn descendant_files(&self, container_id: &str) -> TrackResult<BTreeSet<String>> {
        let mut files = BTreeSet::new();
        for (_, unit) in self.list_children::<WorkUnit>(container_id, UNIT_PREFIX, "container_id")? {
            files.extend(unit_files(&unit));
        }
        for (_, sub) in self.list_children::<Container>(container_id, CONTAINER_PREFIX, "parent_id")? {
            files.extend(self.descendant_files(&sub.id)?);
        }
        Ok(files)
    }

    /// Decode every record under `prefix` whose `field` names `container_id`.
    ///
    /// A record that does not decode aborts with `AggregationInconsistency`.
    fn list_children<T: serde::de::DeserializeOwned>(
        &self,
        container_id: &str,
        prefix: &str,
        field: &str,
    ) -> TrackResult<Vec<(String, T)>> {
        let filter = Filter::prefix(prefix).field_eq(field, container_id);
        self.store
            .list(&filter)?
            .into_iter()
            .map(|(key, value)| match from_record::<T>(value) {
                Ok(child) => Ok((key, child)),
                Err(err) => Err(TrackError::AggregationInconsistency {
                    container_id: container_id.to_string(),
                    child_id: key,
                    reason: format!("{err:#}"),
                }),
            })
            .collect()
    }

    fn announce_status(&self, id: &str, from: ContainerStatus, to: ContainerStatus) {
        info!(container_id = %id, from = from.label(), to = to.label(), "container status changed");
        self.publish(&TrackerEvent::ContainerStatusChanged {
            container_id: id.to_string(),
            from,
            to,
        });
    }

    fn publish(&self, event: &TrackerEvent) {
        if let Err(err) = self.events.publish(event) {
            warn!(err = %format!("{err:#}"), "event publish failed");
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> TrackResult<Value> {
    Ok(serde_json::to_value(value).map_err(anyhow::Error::from)?)
}

fn unit_files(unit: &WorkUnit) -> BTreeSet<String> {
    unit.changes
        .as_ref()
        .map(|changes| changes.paths().map(str::to_string).collect())
        .unwrap_or_default()
}
