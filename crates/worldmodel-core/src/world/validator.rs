//! Conflict detection for candidate tasks.
//!
//! The validator is a fixed pipeline over a borrowed [`WorldState`]:
//! overlap, blackout, availability, capacity. Every check runs and the
//! conflicts are collected; nothing short-circuits and nothing is mutated.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::state::{week_start, CalendarizedTask, WorldState};

/// Which limit a capacity conflict exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPeriod {
    Daily,
    Weekly,
}

/// Coarse classification of a [`Conflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Overlap,
    Blackout,
    Availability,
    Capacity,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Overlap => "overlap",
            Self::Blackout => "blackout",
            Self::Availability => "availability",
            Self::Capacity => "capacity",
        };
        f.write_str(name)
    }
}

/// A rule a candidate task breaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conflict {
    Overlap {
        task_id: String,
        conflicting_task_id: String,
        overlap_minutes: i64,
    },
    Blackout {
        task_id: String,
        reason: String,
    },
    Availability {
        task_id: String,
        date: NaiveDate,
    },
    Capacity {
        task_id: String,
        period: CapacityPeriod,
        date: NaiveDate,
        committed: i64,
        requested: i64,
        limit: i64,
    },
}

impl Conflict {
    pub fn kind(&self) -> ConflictKind {
        match self {
            Self::Overlap { .. } => ConflictKind::Overlap,
            Self::Blackout { .. } => ConflictKind::Blackout,
            Self::Availability { .. } => ConflictKind::Availability,
            Self::Capacity { .. } => ConflictKind::Capacity,
        }
    }

    /// Id of the candidate that broke the rule.
    pub fn task_id(&self) -> &str {
        match self {
            Self::Overlap { task_id, .. }
            | Self::Blackout { task_id, .. }
            | Self::Availability { task_id, .. }
            | Self::Capacity { task_id, .. } => task_id,
        }
    }

    pub fn conflicting_task_id(&self) -> Option<&str> {
        match self {
            Self::Overlap {
                conflicting_task_id,
                ..
            } => Some(conflicting_task_id),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Overlap {
                task_id,
                conflicting_task_id,
                overlap_minutes,
            } => format!(
                "task {task_id} overlaps {conflicting_task_id} by {overlap_minutes} minutes"
            ),
            Self::Blackout { task_id, reason } => {
                format!("task {task_id} falls in a blackout window ({reason})")
            }
            Self::Availability { task_id, date } => format!(
                "task {task_id} is outside availability on {} {date}",
                date.format("%a")
            ),
            Self::Capacity {
                task_id,
                period,
                date,
                committed,
                requested,
                limit,
            } => {
                let scope = match period {
                    CapacityPeriod::Daily => format!("daily capacity on {date}"),
                    CapacityPeriod::Weekly => {
                        format!("weekly capacity for the week of {}", week_start(*date))
                    }
                };
                format!(
                    "task {task_id} exceeds {scope}: {committed} + {requested} > {limit} minutes"
                )
            }
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub conflicts: Vec<Conflict>,
}

impl ValidationResult {
    pub fn from_conflicts(conflicts: Vec<Conflict>) -> Self {
        Self {
            is_valid: conflicts.is_empty(),
            conflicts,
        }
    }

    pub fn has(&self, kind: ConflictKind) -> bool {
        self.conflicts.iter().any(|c| c.kind() == kind)
    }

    pub fn kinds(&self) -> Vec<ConflictKind> {
        let mut kinds: Vec<ConflictKind> = Vec::new();
        for conflict in &self.conflicts {
            if !kinds.contains(&conflict.kind()) {
                kinds.push(conflict.kind());
            }
        }
        kinds
    }
}

/// Stateless rule engine over a borrowed world.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldValidator;

impl WorldValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check a new task against the world.
    pub fn validate_task(&self, task: &CalendarizedTask, state: &WorldState) -> ValidationResult {
        ValidationResult::from_conflicts(self.check(task, state, None, &[]))
    }

    /// Check a replacement for the task with the same id.
    ///
    /// The stored version is ignored for overlap and its minutes are released
    /// before capacity is checked.
    pub fn validate_update(&self, task: &CalendarizedTask, state: &WorldState) -> ValidationResult {
        ValidationResult::from_conflicts(self.check(task, state, Some(&task.id), &[]))
    }

    /// Check a batch against the world and against itself.
    ///
    /// Each member is checked against existing tasks plus the members before
    /// it, so an intra-batch overlap is reported once and capacity accumulates
    /// in batch order.
    pub fn validate_batch(&self, tasks: &[CalendarizedTask], state: &WorldState) -> ValidationResult {
        let conflicts = tasks
            .iter()
            .enumerate()
            .flat_map(|(i, task)| self.check(task, state, None, &tasks[..i]))
            .collect();
        ValidationResult::from_conflicts(conflicts)
    }

    /// Audit a whole world: pairwise overlaps, blackouts, availability and
    /// per-day and per-week capacity.
    pub fn check_consistency(&self, state: &WorldState) -> ValidationResult {
        let mut conflicts = Vec::new();
        let tasks = &state.all_tasks;

        for (i, task) in tasks.iter().enumerate() {
            for other in &tasks[i + 1..] {
                if let Some(conflict) = overlap_conflict(task, other) {
                    conflicts.push(conflict);
                }
            }
            conflicts.extend(blackout_conflicts(task, state));
            conflicts.extend(availability_conflict(task, state));
        }

        // Capacity is recomputed from the tasks so a stale map cannot hide a breach.
        let limits = state.capacity.constraints;
        let mut daily_seen: Vec<NaiveDate> = Vec::new();
        let mut weekly_seen: Vec<NaiveDate> = Vec::new();
        for task in tasks {
            let date = task.date();
            if !daily_seen.contains(&date) {
                daily_seen.push(date);
                let on_day: Vec<&CalendarizedTask> = tasks.iter().filter(|t| t.date() == date).collect();
                conflicts.extend(audit_period(&on_day, CapacityPeriod::Daily, limits.daily_max_minutes));
            }
            let monday = week_start(date);
            if !weekly_seen.contains(&monday) {
                weekly_seen.push(monday);
                let in_week: Vec<&CalendarizedTask> = tasks
                    .iter()
                    .filter(|t| week_start(t.date()) == monday)
                    .collect();
                conflicts.extend(audit_period(&in_week, CapacityPeriod::Weekly, limits.weekly_max_minutes));
            }
        }

        ValidationResult::from_conflicts(conflicts)
    }

    fn check(
        &self,
        task: &CalendarizedTask,
        state: &WorldState,
        replacing: Option<&str>,
        peers: &[CalendarizedTask],
    ) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        let existing = state
            .all_tasks
            .iter()
            .filter(|t| Some(t.id.as_str()) != replacing);
        for other in existing.chain(peers.iter()) {
            if let Some(conflict) = overlap_conflict(task, other) {
                conflicts.push(conflict);
            }
        }

        conflicts.extend(blackout_conflicts(task, state));
        conflicts.extend(availability_conflict(task, state));
        conflicts.extend(capacity_conflicts(task, state, replacing, peers));

        tracing::debug!(
            task_id = %task.id,
            conflicts = conflicts.len(),
            "validated candidate"
        );
        conflicts
    }
}

fn overlap_conflict(task: &CalendarizedTask, other: &CalendarizedTask) -> Option<Conflict> {
    let shared = task.range().intersection(&other.range())?;
    Some(Conflict::Overlap {
        task_id: task.id.clone(),
        conflicting_task_id: other.id.clone(),
        overlap_minutes: shared.duration_minutes(),
    })
}

fn blackout_conflicts(task: &CalendarizedTask, state: &WorldState) -> Vec<Conflict> {
    let range = task.range();
    state
        .blackouts
        .iter()
        .filter(|b| b.intersects(&range))
        .map(|b| Conflict::Blackout {
            task_id: task.id.clone(),
            reason: b.reason.clone(),
        })
        .collect()
}

fn availability_conflict(task: &CalendarizedTask, state: &WorldState) -> Option<Conflict> {
    if state.availability.contains(&task.range()) {
        return None;
    }
    Some(Conflict::Availability {
        task_id: task.id.clone(),
        date: task.date(),
    })
}

fn capacity_conflicts(
    task: &CalendarizedTask,
    state: &WorldState,
    replacing: Option<&str>,
    peers: &[CalendarizedTask],
) -> Vec<Conflict> {
    let date = task.date();
    let monday = week_start(date);
    let limits = state.capacity.constraints;

    // Minutes of the stored version being replaced are released first.
    let old = replacing.and_then(|id| state.find_task(id));
    let same_day = |d: NaiveDate| d == date;
    let same_week = |d: NaiveDate| week_start(d) == monday;

    let daily = state.committed_minutes_on(date) - minutes_where(old, same_day)
        + minutes_where(peers, same_day);
    let weekly = state.committed_minutes_in_week(date) - minutes_where(old, same_week)
        + minutes_where(peers, same_week);

    let mut conflicts = Vec::new();
    if daily + task.estimated_minutes > limits.daily_max_minutes {
        conflicts.push(Conflict::Capacity {
            task_id: task.id.clone(),
            period: CapacityPeriod::Daily,
            date,
            committed: daily,
            requested: task.estimated_minutes,
            limit: limits.daily_max_minutes,
        });
    }
    if weekly + task.estimated_minutes > limits.weekly_max_minutes {
        conflicts.push(Conflict::Capacity {
            task_id: task.id.clone(),
            period: CapacityPeriod::Weekly,
            date,
            committed: weekly,
            requested: task.estimated_minutes,
            limit: limits.weekly_max_minutes,
        });
    }
    conflicts
}

fn minutes_where<'a>(
    tasks: impl IntoIterator<Item = &'a CalendarizedTask>,
    in_period: impl Fn(NaiveDate) -> bool,
) -> i64 {
    tasks
        .into_iter()
        .filter(|t| in_period(t.date()))
        .map(|t| t.estimated_minutes)
        .sum()
}

/// Report the task that first pushes a period's running total over `limit`.
fn audit_period(tasks: &[&CalendarizedTask], period: CapacityPeriod, limit: i64) -> Option<Conflict> {
    let mut committed = 0;
    for task in tasks {
        if committed + task.estimated_minutes > limit {
            return Some(Conflict::Capacity {
                task_id: task.id.clone(),
                period,
                date: task.date(),
                committed,
                requested: task.estimated_minutes,
                limit,
            });
        }
        committed += task.estimated_minutes;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::state::{
        AvailabilityMap, BlackoutWindow, CapacityConstraints, DayWindow,
    };
    use chrono::{DateTime, TimeZone, Utc, Weekday};

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, day, hour, minute, 0).unwrap()
    }

    fn task(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarizedTask {
        CalendarizedTask::new(id, start, end).with_id(id)
    }

    fn world(daily: i64, weekly: i64) -> WorldState {
        let window = DayWindow::parse("09:00", "17:00").unwrap();
        let days = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];
        WorldState::new(
            "u1",
            AvailabilityMap::workweek(window, &days),
            CapacityConstraints {
                daily_max_minutes: daily,
                weekly_max_minutes: weekly,
            },
        )
    }

    #[test]
    fn overlapping_task_is_rejected_with_conflicting_id() {
        let state = world(480, 2400).with_tasks(vec![task("a", at(18, 9, 0), at(18, 10, 0))]);
        let result = WorldValidator::new().validate_task(&task("b", at(18, 9, 30), at(18, 10, 30)), &state);

        assert!(!result.is_valid);
        assert_eq!(result.kinds(), vec![ConflictKind::Overlap]);
        assert_eq!(result.conflicts[0].conflicting_task_id(), Some("a"));
        assert!(matches!(
            result.conflicts[0],
            Conflict::Overlap { overlap_minutes: 30, .. }
        ));
    }

    #[test]
    fn back_to_back_tasks_are_valid() {
        let state = world(480, 2400).with_tasks(vec![task("a", at(18, 9, 0), at(18, 10, 0))]);
        let result = WorldValidator::new().validate_task(&task("b", at(18, 10, 0), at(18, 11, 0)), &state);
        assert!(result.is_valid);
    }

    #[test]
    fn all_checks_run_and_union() {
        let state = world(60, 2400)
            .with_tasks(vec![task("a", at(18, 9, 0), at(18, 10, 0))])
            .with_blackout(BlackoutWindow::daily(
                DayWindow::parse("16:00", "18:00").unwrap(),
                "school run",
            ));
        // Overlaps nothing but hits the blackout, leaves availability and busts the day.
        let result = WorldValidator::new().validate_task(&task("b", at(18, 16, 30), at(18, 17, 30)), &state);

        assert!(result.has(ConflictKind::Blackout));
        assert!(result.has(ConflictKind::Availability));
        assert!(result.has(ConflictKind::Capacity));
        assert!(!result.has(ConflictKind::Overlap));
    }

    #[test]
    fn capacity_counts_estimate_against_day_and_week() {
        let state = world(60, 90).with_tasks(vec![task("a", at(18, 9, 0), at(18, 10, 0))]);
        let small = task("b", at(18, 11, 0), at(18, 11, 15));
        let result = WorldValidator::new().validate_task(&small, &state);
        assert_eq!(result.kinds(), vec![ConflictKind::Capacity]);

        // Tuesday has room for the day but the week is at 60 of 90.
        let tuesday = task("c", at(19, 9, 0), at(19, 10, 0));
        let result = WorldValidator::new().validate_task(&tuesday, &state);
        assert!(matches!(
            result.conflicts.as_slice(),
            [Conflict::Capacity { period: CapacityPeriod::Weekly, committed: 60, .. }]
        ));
    }

    #[test]
    fn update_ignores_its_own_stored_version() {
        let state = world(60, 2400).with_tasks(vec![task("a", at(18, 9, 0), at(18, 10, 0))]);
        let moved = task("a", at(18, 9, 30), at(18, 10, 30));

        assert!(WorldValidator::new().validate_update(&moved, &state).is_valid);
        assert!(!WorldValidator::new().validate_task(&moved, &state).is_valid);
    }

    #[test]
    fn batch_detects_intra_batch_overlap_once() {
        let state = world(480, 2400);
        let batch = vec![
            task("p1", at(18, 9, 0), at(18, 10, 0)),
            task("p2", at(18, 9, 45), at(18, 11, 0)),
            task("p3", at(18, 13, 0), at(18, 14, 0)),
        ];
        let result = WorldValidator::new().validate_batch(&batch, &state);

        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].task_id(), "p2");
        assert_eq!(result.conflicts[0].conflicting_task_id(), Some("p1"));
    }

    #[test]
    fn batch_capacity_accumulates_members() {
        let state = world(90, 2400);
        let batch = vec![
            task("p1", at(18, 9, 0), at(18, 10, 0)),
            task("p2", at(18, 11, 0), at(18, 12, 0)),
        ];
        let result = WorldValidator::new().validate_batch(&batch, &state);
        assert!(matches!(
            result.conflicts.as_slice(),
            [Conflict::Capacity { task_id, committed: 60, .. }] if task_id == "p2"
        ));
    }

    #[test]
    fn override_makes_day_unavailable() {
        let mut state = world(480, 2400);
        state.availability = state
            .availability
            .clone()
            .with_override(NaiveDate::from_ymd_opt(2025, 8, 18).unwrap(), vec![]);
        let result = WorldValidator::new().validate_task(&task("a", at(18, 9, 0), at(18, 10, 0)), &state);
        assert_eq!(result.kinds(), vec![ConflictKind::Availability]);
    }

    #[test]
    fn consistency_audit_finds_seeded_problems() {
        let state = world(90, 2400).with_tasks(vec![
            task("a", at(18, 9, 0), at(18, 10, 0)),
            task("b", at(18, 9, 30), at(18, 10, 30)),
            task("c", at(23, 9, 0), at(23, 10, 0)),
        ]);
        let result = WorldValidator::new().check_consistency(&state);

        assert!(result.has(ConflictKind::Overlap));
        assert!(result.has(ConflictKind::Capacity));
        // Saturday is not a workday.
        assert!(result
            .conflicts
            .iter()
            .any(|c| c.kind() == ConflictKind::Availability && c.task_id() == "c"));
    }

    #[test]
    fn consistent_world_passes_audit() {
        let state = world(480, 2400).with_tasks(vec![
            task("a", at(18, 9, 0), at(18, 10, 0)),
            task("b", at(18, 10, 0), at(18, 11, 0)),
        ]);
        assert!(WorldValidator::new().check_consistency(&state).is_valid);
    }

    #[test]
    fn conflict_serializes_with_kind_tag() {
        let conflict = Conflict::Blackout {
            task_id: "a".into(),
            reason: "lunch".into(),
        };
        let json = serde_json::to_value(&conflict).unwrap();
        assert_eq!(json["kind"], "blackout");
        assert_eq!(conflict.kind().to_string(), "blackout");
    }
}
