//! Interfaces to the systems around the engine.
//!
//! The updater calls these after it has committed a change in memory. They
//! are notifications: a failure is logged and reported on the result, and
//! the in-memory commit stands.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::impact::ChangeImpact;
use super::state::CalendarizedTask;
use super::updater::UpdateAction;
use super::validator::Conflict;

/// Error type returned by collaborators.
pub type NotifyError = Box<dyn std::error::Error + Send + Sync>;

/// Durable storage for committed tasks.
pub trait TaskStore: Send + Sync {
    /// Called with the exact record committed by an add or update.
    fn write(&self, _task: &CalendarizedTask) -> Result<(), NotifyError> {
        Ok(()) // default no-op
    }

    fn remove(&self, _task_id: &str) -> Result<(), NotifyError> {
        Ok(()) // default no-op
    }

    /// Called once per applied plan.
    fn write_batch(&self, tasks: &[CalendarizedTask]) -> Result<(), NotifyError> {
        for task in tasks {
            self.write(task)?;
        }
        Ok(())
    }
}

/// Drops cached query results for the dates and weeks a change touched.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, _impact: &ChangeImpact) -> Result<(), NotifyError> {
        Ok(()) // default no-op
    }
}

/// Receives a record of every operation, committed or not.
pub trait OperationLog: Send + Sync {
    fn record(&self, _record: &OperationRecord) -> Result<(), NotifyError> {
        Ok(()) // default no-op
    }
}

/// What happened during one updater call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Set for committed operations only.
    pub operation_id: Option<u64>,
    pub action: UpdateAction,
    pub success: bool,
    /// Snapshot of the single task involved, if any.
    pub task: Option<CalendarizedTask>,
    /// Every task involved for batch operations.
    #[serde(default)]
    pub tasks: Vec<CalendarizedTask>,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    pub timestamp: DateTime<Utc>,
}

/// Task store backed by a shared map. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<Mutex<BTreeMap<String, CalendarizedTask>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored tasks ordered by id.
    pub fn tasks(&self) -> Vec<CalendarizedTask> {
        match self.tasks.lock() {
            Ok(tasks) => tasks.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        }
    }

    pub fn get(&self, task_id: &str) -> Option<CalendarizedTask> {
        self.tasks().into_iter().find(|t| t.id == task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskStore for InMemoryTaskStore {
    fn write(&self, task: &CalendarizedTask) -> Result<(), NotifyError> {
        let mut tasks = self.tasks.lock().map_err(|e| e.to_string())?;
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn remove(&self, task_id: &str) -> Result<(), NotifyError> {
        let mut tasks = self.tasks.lock().map_err(|e| e.to_string())?;
        tasks.remove(task_id);
        Ok(())
    }
}

/// Operation log that emits each record as a tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingOperationLog;

impl OperationLog for TracingOperationLog {
    fn record(&self, record: &OperationRecord) -> Result<(), NotifyError> {
        tracing::info!(
            target: "worldmodel::oplog",
            action = %record.action,
            success = record.success,
            operation_id = ?record.operation_id,
            task_id = record.task.as_ref().map(|t| t.id.as_str()),
            tasks = record.tasks.len(),
            conflicts = record.conflicts.len(),
            "operation"
        );
        Ok(())
    }
}
