//! The single writer of a [`WorldState`].
//!
//! Every mutation follows the same path: reject malformed input, validate,
//! then either commit (snapshot for undo, recompute capacity for the
//! affected dates, notify collaborators) or hand back the conflicts together
//! with alternative slots and leave the state untouched.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::collaborators::{CacheInvalidator, NotifyError, OperationLog, OperationRecord, TaskStore};
use super::impact::{task_diff, ChangeImpact};
use super::query::{SlotQuery, TimeSlot, WorldQueryEngine};
use super::scoring::TaskType;
use super::state::{CalendarizedTask, WorldState};
use super::validator::{Conflict, ConflictKind, WorldValidator};
use crate::config::WorldConfig;
use crate::error::{ErrorKind, Result, WorldError};

/// Kind of mutation an update or undo entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    AddTask,
    RemoveTask,
    UpdateTask,
    ApplyPlan,
    Undo,
    SyncTasks,
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AddTask => "add_task",
            Self::RemoveTask => "remove_task",
            Self::UpdateTask => "update_task",
            Self::ApplyPlan => "apply_plan",
            Self::Undo => "undo",
            Self::SyncTasks => "sync_tasks",
        };
        f.write_str(name)
    }
}

/// Outcome of an updater call.
///
/// Conflicts are data, not errors: a rejected update has `success == false`,
/// a non-empty `conflicts` list and usually some `suggested_slots`. The
/// exceptional cases set `error_kind` and `error_message` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub success: bool,
    pub action: UpdateAction,
    pub task: Option<CalendarizedTask>,
    #[serde(default)]
    pub affected_task_ids: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    #[serde(default)]
    pub suggested_slots: Vec<TimeSlot>,
    pub error_kind: Option<ErrorKind>,
    /// The missing id or what was malformed.
    pub error_message: Option<String>,
    pub impact: Option<ChangeImpact>,
    pub operation_id: Option<u64>,
    /// World version after the call.
    pub version: u64,
    /// Collaborator failures that did not undo the commit.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl UpdateResult {
    fn base(action: UpdateAction, version: u64) -> Self {
        Self {
            success: false,
            action,
            task: None,
            affected_task_ids: Vec::new(),
            conflicts: Vec::new(),
            suggested_slots: Vec::new(),
            error_kind: None,
            error_message: None,
            impact: None,
            operation_id: None,
            version,
            warnings: Vec::new(),
        }
    }

    fn failed(action: UpdateAction, version: u64, err: &WorldError) -> Self {
        Self {
            error_kind: err.kind(),
            error_message: Some(err.detail()),
            ..Self::base(action, version)
        }
    }

    /// Whether the call was turned down by validation.
    pub fn is_conflict(&self) -> bool {
        !self.success && !self.conflicts.is_empty()
    }

    pub fn has_conflict(&self, kind: ConflictKind) -> bool {
        self.conflicts.iter().any(|c| c.kind() == kind)
    }

    /// Turn an exceptional failure into a [`WorldError`]. Conflicts and
    /// successes pass through as `Ok`.
    pub fn into_result(self) -> Result<Self> {
        match self.error_kind {
            Some(kind) => Err(WorldError::from_kind(
                kind,
                self.error_message.unwrap_or_default(),
            )),
            None => Ok(self),
        }
    }
}

/// One reversible step on the undo stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoOperation {
    pub operation_id: u64,
    pub action: UpdateAction,
    pub description: String,
    pub before_state: WorldState,
    pub after_state: WorldState,
    pub timestamp: DateTime<Utc>,
}

/// Undo entry without its snapshots, for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoSummary {
    pub operation_id: u64,
    pub action: UpdateAction,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&UndoOperation> for UndoSummary {
    fn from(op: &UndoOperation) -> Self {
        Self {
            operation_id: op.operation_id,
            action: op.action,
            description: op.description.clone(),
            timestamp: op.timestamp,
        }
    }
}

/// Owns one user's world and is the only thing that changes it.
pub struct WorldUpdater {
    state: WorldState,
    validator: WorldValidator,
    engine: WorldQueryEngine,
    undo_stack: VecDeque<UndoOperation>,
    retention: usize,
    next_operation_id: u64,
    store: Option<Box<dyn TaskStore>>,
    cache: Option<Box<dyn CacheInvalidator>>,
    log: Option<Box<dyn OperationLog>>,
}

impl fmt::Debug for WorldUpdater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldUpdater")
            .field("user_id", &self.state.user_id)
            .field("version", &self.state.version)
            .field("tasks", &self.state.all_tasks.len())
            .field("undo_depth", &self.undo_stack.len())
            .finish()
    }
}

impl WorldUpdater {
    /// Updater with the default configuration.
    pub fn new(state: WorldState) -> Self {
        Self::with_config(state, &WorldConfig::default())
    }

    /// Updater over `state`. Task order and capacity are rebuilt from the
    /// tasks before anything is validated against them.
    pub fn with_config(mut state: WorldState, config: &WorldConfig) -> Self {
        state.normalize();
        Self {
            state,
            validator: WorldValidator::new(),
            engine: WorldQueryEngine::from_config(config),
            undo_stack: VecDeque::new(),
            retention: config.undo.retention.max(1),
            next_operation_id: 1,
            store: None,
            cache: None,
            log: None,
        }
    }

    pub fn with_store(mut self, store: impl TaskStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn with_cache(mut self, cache: impl CacheInvalidator + 'static) -> Self {
        self.cache = Some(Box::new(cache));
        self
    }

    pub fn with_log(mut self, log: impl OperationLog + 'static) -> Self {
        self.log = Some(Box::new(log));
        self
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn into_state(self) -> WorldState {
        self.state
    }

    pub fn query_engine(&self) -> &WorldQueryEngine {
        &self.engine
    }

    pub fn validator(&self) -> &WorldValidator {
        &self.validator
    }

    /// Undo entries, most recent first.
    pub fn undo_history(&self) -> Vec<UndoSummary> {
        self.undo_stack.iter().rev().map(UndoSummary::from).collect()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Add a new task.
    pub fn add_task(&mut self, task: CalendarizedTask) -> UpdateResult {
        let action = UpdateAction::AddTask;
        if let Err(err) = task
            .check_well_formed()
            .and_then(|()| self.check_id_free(&task.id))
        {
            return self.fail(action, &err, Some(task));
        }

        let validation = self.validator.validate_task(&task, &self.state);
        if !validation.is_valid {
            let suggestions = self.alternatives(&task, false);
            return self.reject(action, task, Vec::new(), validation.conflicts, suggestions);
        }

        let before = self.state.clone();
        let impact = ChangeImpact::from_tasks([&task]);
        self.state.insert_task(task.clone());
        let description = format!("add '{}'", task.title);
        let mut result = self.commit(action, description, before, impact, vec![task.id.clone()]);

        let warnings = self.notify(&result, |store| store.write(&task));
        result.warnings.extend(warnings);
        result.task = Some(task);
        self.log_outcome(&mut result, Vec::new());
        result
    }

    /// Remove a task by id.
    pub fn remove_task(&mut self, task_id: &str) -> UpdateResult {
        let action = UpdateAction::RemoveTask;
        let before = self.state.clone();
        let Some(removed) = self.state.take_task(task_id) else {
            return self.fail(action, &WorldError::NotFound(task_id.to_string()), None);
        };

        let impact = ChangeImpact::from_tasks([&removed]);
        let description = format!("remove '{}'", removed.title);
        let mut result = self.commit(action, description, before, impact, vec![removed.id.clone()]);

        let warnings = self.notify(&result, |store| store.remove(&removed.id));
        result.warnings.extend(warnings);
        result.task = Some(removed);
        self.log_outcome(&mut result, Vec::new());
        result
    }

    /// Replace the stored task with the same id.
    ///
    /// The stored version does not conflict with its replacement. On
    /// rejection the stored version is left exactly as it was.
    pub fn update_task(&mut self, task: CalendarizedTask) -> UpdateResult {
        let action = UpdateAction::UpdateTask;
        if let Err(err) = task.check_well_formed() {
            return self.fail(action, &err, Some(task));
        }
        if self.state.find_task(&task.id).is_none() {
            return self.fail(action, &WorldError::NotFound(task.id.clone()), Some(task));
        }

        let validation = self.validator.validate_update(&task, &self.state);
        if !validation.is_valid {
            let suggestions = self.alternatives(&task, true);
            return self.reject(action, task, Vec::new(), validation.conflicts, suggestions);
        }

        let before = self.state.clone();
        let old = self.state.take_task(&task.id);
        self.state.insert_task(task.clone());
        let impact = ChangeImpact::from_tasks(old.iter().chain([&task]));
        let description = format!("update '{}'", task.title);
        let mut result = self.commit(action, description, before, impact, vec![task.id.clone()]);

        let warnings = self.notify(&result, |store| store.write(&task));
        result.warnings.extend(warnings);
        result.task = Some(task);
        self.log_outcome(&mut result, Vec::new());
        result
    }

    /// Commit a batch of new tasks as one unit, or none of them.
    pub fn apply_plan(&mut self, tasks: Vec<CalendarizedTask>) -> UpdateResult {
        let action = UpdateAction::ApplyPlan;
        if tasks.is_empty() {
            let mut result = UpdateResult::base(action, self.state.version);
            result.success = true;
            return result;
        }
        if let Err(err) = self.check_batch(&tasks) {
            return self.fail_batch(action, &err, tasks);
        }

        let validation = self.validator.validate_batch(&tasks, &self.state);
        if !validation.is_valid {
            // Alternatives are offered for the first member that broke a rule.
            let suggestions = validation
                .conflicts
                .first()
                .and_then(|c| tasks.iter().find(|t| t.id == c.task_id()))
                .map(|t| self.alternatives(t, false))
                .unwrap_or_default();
            let mut result = UpdateResult {
                conflicts: validation.conflicts,
                suggested_slots: suggestions,
                ..UpdateResult::base(action, self.state.version)
            };
            result.affected_task_ids = tasks.iter().map(|t| t.id.clone()).collect();
            self.warn_rejected(&result);
            self.log_outcome(&mut result, tasks);
            return result;
        }

        let before = self.state.clone();
        for task in &tasks {
            self.state.insert_task(task.clone());
        }
        let impact = ChangeImpact::from_tasks(&tasks);
        let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let description = format!("apply plan of {} tasks", tasks.len());
        let mut result = self.commit(action, description, before, impact, ids);

        let warnings = self.notify(&result, |store| store.write_batch(&tasks));
        result.warnings.extend(warnings);
        self.log_outcome(&mut result, tasks);
        result
    }

    /// Restore the state from before the most recent committed operation.
    pub fn undo_last_operation(&mut self) -> UpdateResult {
        let action = UpdateAction::Undo;
        let Some(op) = self.undo_stack.pop_back() else {
            return self.fail(action, &WorldError::EmptyUndoStack, None);
        };

        let current = std::mem::replace(&mut self.state, op.before_state);
        let impact = ChangeImpact::between(&current, &self.state);
        let (vanished, restored) = task_diff(&current, &self.state);

        let mut result = UpdateResult::base(action, self.state.version);
        result.success = true;
        result.operation_id = Some(op.operation_id);
        result.affected_task_ids = vanished
            .iter()
            .chain(restored.iter())
            .map(|t| t.id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if let Some(store) = &self.store {
            for task in &vanished {
                if let Err(e) = store.remove(&task.id) {
                    result.warnings.push(notify_failed("task store", &e));
                }
            }
            for task in &restored {
                if let Err(e) = store.write(task) {
                    result.warnings.push(notify_failed("task store", &e));
                }
            }
        }
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate(&impact) {
                result.warnings.push(notify_failed("cache invalidator", &e));
            }
        }
        result.impact = Some(impact);

        tracing::info!(
            operation_id = op.operation_id,
            undone = %op.action,
            version = self.state.version,
            "undid world update"
        );
        self.log_outcome(&mut result, Vec::new());
        result
    }

    /// Replace the whole task set, e.g. after reloading from the store.
    ///
    /// Tasks are taken as they are (no conflict checks), capacity is rebuilt
    /// and undo history is cleared.
    pub fn sync_tasks(&mut self, tasks: Vec<CalendarizedTask>) -> UpdateResult {
        let action = UpdateAction::SyncTasks;
        let malformed = tasks
            .iter()
            .try_for_each(CalendarizedTask::check_well_formed)
            .and_then(|()| check_unique_ids(&tasks));
        if let Err(err) = malformed {
            return self.fail_batch(action, &err, tasks);
        }

        let before = self.state.clone();
        self.state.all_tasks = tasks;
        self.state.all_tasks.sort_by_key(|t| t.start);
        self.state.rebuild_capacity();
        self.state.version += 1;
        self.undo_stack.clear();

        let impact = ChangeImpact::between(&before, &self.state);
        let mut result = UpdateResult::base(action, self.state.version);
        result.success = true;
        result.affected_task_ids = self.state.all_tasks.iter().map(|t| t.id.clone()).collect();
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate(&impact) {
                result.warnings.push(notify_failed("cache invalidator", &e));
            }
        }
        result.impact = Some(impact);

        tracing::info!(
            tasks = self.state.all_tasks.len(),
            version = self.state.version,
            "synced world tasks"
        );
        self.log_outcome(&mut result, Vec::new());
        result
    }

    /// Slots where `task` could go instead, best first.
    ///
    /// If the task is already stored it does not block its own alternatives.
    pub fn find_alternatives(&self, task: &CalendarizedTask) -> Vec<TimeSlot> {
        let stored = self.state.find_task(&task.id).is_some();
        self.alternatives(task, stored)
    }

    fn alternatives(&self, task: &CalendarizedTask, ignore_self: bool) -> Vec<TimeSlot> {
        let config = self.engine.config();
        let from = task.date();
        let mut query = SlotQuery::new(task.duration_minutes(), from)
            .through(
                Duration::try_days(config.suggestion_window_days)
                    .and_then(|window| from.checked_add_signed(window))
                    .unwrap_or(NaiveDate::MAX),
            )
            .prefer(task.start.time())
            .respecting_capacity(Some(task.estimated_minutes))
            .with_limit(config.max_suggestions);
        if let Some(task_type) = TaskType::from_tags(&task.tags) {
            query = query.for_task_type(task_type);
        }
        if ignore_self {
            query = query.ignoring(task.id.clone());
        }

        match self.engine.find_available_slots(&query, &self.state) {
            Ok(slots) => slots,
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "could not search for alternatives");
                Vec::new()
            }
        }
    }

    fn check_id_free(&self, id: &str) -> Result<()> {
        if self.state.find_task(id).is_some() {
            return Err(WorldError::MalformedInput(format!("task id {id} already exists")));
        }
        Ok(())
    }

    fn check_batch(&self, tasks: &[CalendarizedTask]) -> Result<()> {
        for task in tasks {
            task.check_well_formed()?;
            self.check_id_free(&task.id)?;
        }
        check_unique_ids(tasks)
    }

    /// Bump the version, snapshot for undo and recompute affected capacity.
    fn commit(
        &mut self,
        action: UpdateAction,
        description: String,
        before: WorldState,
        impact: ChangeImpact,
        affected_task_ids: Vec<String>,
    ) -> UpdateResult {
        self.state.recompute_capacity(&impact.affected_dates);
        tracing::debug!(
            dates = impact.affected_dates.len(),
            weeks = impact.affected_weeks.len(),
            "recomputed capacity"
        );
        self.state.version += 1;

        let operation_id = self.next_operation_id;
        self.next_operation_id += 1;
        self.push_undo(UndoOperation {
            operation_id,
            action,
            description,
            before_state: before,
            after_state: self.state.clone(),
            timestamp: Utc::now(),
        });

        tracing::info!(
            operation_id,
            action = %action,
            version = self.state.version,
            "committed world update"
        );

        let mut result = UpdateResult::base(action, self.state.version);
        result.success = true;
        result.operation_id = Some(operation_id);
        result.affected_task_ids = affected_task_ids;
        result.impact = Some(impact);
        result
    }

    fn push_undo(&mut self, op: UndoOperation) {
        while self.undo_stack.len() >= self.retention {
            if let Some(dropped) = self.undo_stack.pop_front() {
                tracing::debug!(operation_id = dropped.operation_id, "dropped oldest undo entry");
            }
        }
        tracing::debug!(
            operation_id = op.operation_id,
            depth = self.undo_stack.len() + 1,
            "pushed undo entry"
        );
        self.undo_stack.push_back(op);
    }

    /// Store write plus cache invalidation after a commit.
    fn notify(
        &self,
        result: &UpdateResult,
        write: impl FnOnce(&dyn TaskStore) -> std::result::Result<(), NotifyError>,
    ) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(store) = &self.store {
            if let Err(e) = write(store.as_ref()) {
                warnings.push(notify_failed("task store", &e));
            }
        }
        if let (Some(cache), Some(impact)) = (&self.cache, &result.impact) {
            if let Err(e) = cache.invalidate(impact) {
                warnings.push(notify_failed("cache invalidator", &e));
            }
        }
        warnings
    }

    fn log_outcome(&self, result: &mut UpdateResult, tasks: Vec<CalendarizedTask>) {
        let Some(log) = &self.log else {
            return;
        };
        let record = OperationRecord {
            operation_id: result.operation_id,
            action: result.action,
            success: result.success,
            task: result.task.clone(),
            tasks,
            conflicts: result.conflicts.clone(),
            timestamp: Utc::now(),
        };
        if let Err(e) = log.record(&record) {
            result.warnings.push(notify_failed("operation log", &e));
        }
    }

    fn reject(
        &self,
        action: UpdateAction,
        task: CalendarizedTask,
        tasks: Vec<CalendarizedTask>,
        conflicts: Vec<Conflict>,
        suggestions: Vec<TimeSlot>,
    ) -> UpdateResult {
        let mut result = UpdateResult {
            affected_task_ids: vec![task.id.clone()],
            task: Some(task),
            conflicts,
            suggested_slots: suggestions,
            ..UpdateResult::base(action, self.state.version)
        };
        self.warn_rejected(&result);
        self.log_outcome(&mut result, tasks);
        result
    }

    fn warn_rejected(&self, result: &UpdateResult) {
        let kinds: Vec<String> = result
            .conflicts
            .iter()
            .map(|c| c.kind().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        tracing::warn!(
            action = %result.action,
            conflicts = result.conflicts.len(),
            kinds = %kinds.join(","),
            suggestions = result.suggested_slots.len(),
            "rejected world update"
        );
    }

    fn fail(&self, action: UpdateAction, err: &WorldError, task: Option<CalendarizedTask>) -> UpdateResult {
        tracing::warn!(action = %action, error = %err, "world update failed");
        let mut result = UpdateResult::failed(action, self.state.version, err);
        result.task = task;
        self.log_outcome(&mut result, Vec::new());
        result
    }

    fn fail_batch(&self, action: UpdateAction, err: &WorldError, tasks: Vec<CalendarizedTask>) -> UpdateResult {
        tracing::warn!(action = %action, error = %err, "world update failed");
        let mut result = UpdateResult::failed(action, self.state.version, err);
        self.log_outcome(&mut result, tasks);
        result
    }
}

fn check_unique_ids(tasks: &[CalendarizedTask]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for task in tasks {
        if !seen.insert(task.id.as_str()) {
            return Err(WorldError::MalformedInput(format!(
                "task id {} appears more than once",
                task.id
            )));
        }
    }
    Ok(())
}

fn notify_failed(collaborator: &str, err: &NotifyError) -> String {
    tracing::warn!(collaborator, error = %err, "collaborator notification failed");
    format!("{collaborator} notification failed: {err}")
}
