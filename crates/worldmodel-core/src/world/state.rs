//! World state: one user's commitments and the rules around them.
//!
//! Everything here is plain data plus small read helpers. The only writers
//! are the `pub(crate)` helpers used by [`WorldUpdater`](super::WorldUpdater).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::config::WorldConfig;
use crate::error::{Result, WorldError};

/// Half-open span of time `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range, rejecting `end <= start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(WorldError::MalformedInput(format!(
                "end ({end}) must be after start ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Range of `minutes` starting at `start`.
    pub fn starting_at(start: DateTime<Utc>, minutes: i64) -> Result<Self> {
        Self::new(start, add_minutes(start, minutes)?)
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Half-open intersection test.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn intersection(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(TimeRange { start, end })
    }

    /// Range grown by `minutes` on both sides, clamped to the representable
    /// instants.
    pub fn padded(&self, minutes: i64) -> TimeRange {
        let pad = Duration::try_minutes(minutes);
        TimeRange {
            start: pad
                .and_then(|d| self.start.checked_sub_signed(d))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: pad
                .and_then(|d| self.end.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Parts of this range not covered by any of `busy`, in start order.
    pub fn subtract(&self, busy: &[TimeRange]) -> Vec<TimeRange> {
        let mut blocking: Vec<&TimeRange> = busy.iter().filter(|b| b.overlaps(self)).collect();
        blocking.sort_by_key(|b| b.start);

        let mut free = Vec::new();
        let mut cursor = self.start;
        for block in blocking {
            if block.end <= cursor {
                continue;
            }
            if block.start > cursor {
                free.push(TimeRange {
                    start: cursor,
                    end: block.start,
                });
            }
            cursor = block.end;
            if cursor >= self.end {
                break;
            }
        }
        if cursor < self.end {
            free.push(TimeRange {
                start: cursor,
                end: self.end,
            });
        }
        free
    }
}

/// `at + minutes`, or `MalformedInput` when the result is out of range.
pub fn add_minutes(at: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>> {
    Duration::try_minutes(minutes)
        .and_then(|d| at.checked_add_signed(d))
        .ok_or_else(|| {
            WorldError::MalformedInput(format!("{minutes} minutes after {at} is out of range"))
        })
}

/// Time-of-day window, `start < end` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DayWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DayWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self> {
        if end <= start {
            return Err(WorldError::MalformedInput(format!(
                "window end ({end}) must be after start ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse `"HH:MM"` bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s, "%H:%M")
                .map_err(|e| WorldError::MalformedInput(format!("invalid time '{s}': {e}")))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    /// The concrete range this window covers on `date` (UTC wall clock).
    pub fn on(&self, date: NaiveDate) -> TimeRange {
        TimeRange {
            start: date.and_time(self.start).and_utc(),
            end: date.and_time(self.end).and_utc(),
        }
    }
}

/// A scheduled commitment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarizedTask {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub estimated_minutes: i64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub source_plan_node_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl CalendarizedTask {
    /// New task with a generated id; the estimate defaults to the span.
    pub fn new(title: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            start,
            end,
            estimated_minutes: (end - start).num_minutes(),
            tags: BTreeSet::new(),
            source_plan_node_id: None,
            metadata: BTreeMap::new(),
        }
    }

    /// New task lasting `minutes` from `start`.
    ///
    /// Fails with `MalformedInput` for a non-positive or out-of-range length.
    pub fn spanning(title: impl Into<String>, start: DateTime<Utc>, minutes: i64) -> Result<Self> {
        let range = TimeRange::starting_at(start, minutes)?;
        Ok(Self::new(title, range.start, range.end))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_estimate(mut self, minutes: i64) -> Self {
        self.estimated_minutes = minutes;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_plan_node(mut self, node_id: impl Into<String>) -> Self {
        self.source_plan_node_id = Some(node_id.into());
        self
    }

    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end,
        }
    }

    /// Calendar date the task counts against for capacity.
    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &CalendarizedTask) -> bool {
        self.range().overlaps(&other.range())
    }

    /// Reject input no validation rule could make sense of.
    pub fn check_well_formed(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(WorldError::MalformedInput("task id is empty".into()));
        }
        if self.end <= self.start {
            return Err(WorldError::MalformedInput(format!(
                "task {}: end ({}) must be after start ({})",
                self.id, self.end, self.start
            )));
        }
        if self.estimated_minutes < 0 {
            return Err(WorldError::MalformedInput(format!(
                "task {}: estimated_minutes must not be negative",
                self.id
            )));
        }
        Ok(())
    }
}

/// When the user can be scheduled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityMap {
    /// Recurring weekly pattern.
    #[serde(default)]
    pub weekly: HashMap<Weekday, Vec<DayWindow>>,
    /// Per-date replacements for the weekly pattern. Empty means unavailable.
    #[serde(default)]
    pub overrides: BTreeMap<NaiveDate, Vec<DayWindow>>,
}

impl AvailabilityMap {
    /// Same window on each of `days`.
    pub fn workweek(window: DayWindow, days: &[Weekday]) -> Self {
        let weekly = days.iter().map(|d| (*d, vec![window])).collect();
        Self {
            weekly,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_day(mut self, day: Weekday, mut windows: Vec<DayWindow>) -> Self {
        windows.sort_by_key(|w| w.start);
        self.weekly.insert(day, windows);
        self
    }

    pub fn with_override(mut self, date: NaiveDate, mut windows: Vec<DayWindow>) -> Self {
        windows.sort_by_key(|w| w.start);
        self.overrides.insert(date, windows);
        self
    }

    pub fn windows_on(&self, date: NaiveDate) -> &[DayWindow] {
        if let Some(windows) = self.overrides.get(&date) {
            return windows;
        }
        self.weekly
            .get(&date.weekday())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Available ranges on `date`, sorted with touching windows merged.
    pub fn ranges_on(&self, date: NaiveDate) -> Vec<TimeRange> {
        let mut ranges: Vec<TimeRange> = self.windows_on(date).iter().map(|w| w.on(date)).collect();
        ranges.sort_by_key(|r| r.start);

        let mut merged: Vec<TimeRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        merged
    }

    /// Whether `range` sits entirely inside one available range of its start date.
    pub fn contains(&self, range: &TimeRange) -> bool {
        self.ranges_on(range.start.date_naive())
            .iter()
            .any(|r| r.contains(range))
    }
}

/// Limits on committed minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityConstraints {
    pub daily_max_minutes: i64,
    pub weekly_max_minutes: i64,
}

/// Derived committed minutes per date and per ISO week.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityMap {
    #[serde(default)]
    pub daily: BTreeMap<NaiveDate, i64>,
    #[serde(default)]
    pub weekly: BTreeMap<String, i64>,
}

impl CapacityMap {
    pub fn daily_minutes(&self, date: NaiveDate) -> i64 {
        self.daily.get(&date).copied().unwrap_or(0)
    }

    pub fn weekly_minutes(&self, date: NaiveDate) -> i64 {
        self.weekly.get(&week_key(date)).copied().unwrap_or(0)
    }
}

/// Constraints together with the load they are checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub constraints: CapacityConstraints,
    #[serde(default)]
    pub load: CapacityMap,
}

/// ISO week key for a date, e.g. `2025-W34`.
pub fn week_key(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date.checked_sub_signed(Duration::days(i64::from(date.weekday().num_days_from_monday())))
        .unwrap_or(NaiveDate::MIN)
}

/// Midnight to midnight, ending at the last representable instant on the
/// last representable date.
pub(crate) fn day_span(date: NaiveDate) -> TimeRange {
    TimeRange {
        start: date.and_time(NaiveTime::MIN).and_utc(),
        end: date
            .succ_opt()
            .map_or(DateTime::<Utc>::MAX_UTC, |next| next.and_time(NaiveTime::MIN).and_utc()),
    }
}

/// How a blackout recurs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlackoutRule {
    Once { range: TimeRange },
    Daily { window: DayWindow },
    Weekly { weekday: Weekday, window: DayWindow },
}

/// Time no task may occupy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlackoutWindow {
    pub rule: BlackoutRule,
    pub reason: String,
}

impl BlackoutWindow {
    pub fn once(range: TimeRange, reason: impl Into<String>) -> Self {
        Self {
            rule: BlackoutRule::Once { range },
            reason: reason.into(),
        }
    }

    pub fn daily(window: DayWindow, reason: impl Into<String>) -> Self {
        Self {
            rule: BlackoutRule::Daily { window },
            reason: reason.into(),
        }
    }

    pub fn weekly(weekday: Weekday, window: DayWindow, reason: impl Into<String>) -> Self {
        Self {
            rule: BlackoutRule::Weekly { weekday, window },
            reason: reason.into(),
        }
    }

    /// Occurrences that touch `date`.
    pub fn occurrences_on(&self, date: NaiveDate) -> Vec<TimeRange> {
        match &self.rule {
            BlackoutRule::Once { range } => {
                if range.overlaps(&day_span(date)) {
                    vec![*range]
                } else {
                    Vec::new()
                }
            }
            BlackoutRule::Daily { window } => vec![window.on(date)],
            BlackoutRule::Weekly { weekday, window } => {
                if date.weekday() == *weekday {
                    vec![window.on(date)]
                } else {
                    Vec::new()
                }
            }
        }
    }

    pub fn intersects(&self, range: &TimeRange) -> bool {
        if let BlackoutRule::Once { range: blackout } = &self.rule {
            return blackout.overlaps(range);
        }
        let last = range.end.date_naive();
        let mut date = range.start.date_naive();
        loop {
            if self.occurrences_on(date).iter().any(|o| o.overlaps(range)) {
                return true;
            }
            match date.succ_opt() {
                Some(next) if next <= last => date = next,
                _ => return false,
            }
        }
    }
}

/// Complete world model for one user.
///
/// Deserializing re-sorts `all_tasks` and rebuilds `capacity.load`, so a
/// stored world never brings in a stale or missing capacity map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredWorld")]
pub struct WorldState {
    pub user_id: String,
    /// Ordered by start time.
    pub all_tasks: Vec<CalendarizedTask>,
    pub availability: AvailabilityMap,
    pub capacity: Capacity,
    pub blackouts: Vec<BlackoutWindow>,
    /// Bumped on every commit. Undo rewinds it along with the rest of the
    /// snapshot, so the same number can describe two different worlds.
    pub version: u64,
}

/// Serialized shape of a [`WorldState`].
#[derive(Deserialize)]
struct StoredWorld {
    user_id: String,
    #[serde(default)]
    all_tasks: Vec<CalendarizedTask>,
    availability: AvailabilityMap,
    capacity: Capacity,
    #[serde(default)]
    blackouts: Vec<BlackoutWindow>,
    #[serde(default)]
    version: u64,
}

impl From<StoredWorld> for WorldState {
    fn from(stored: StoredWorld) -> Self {
        let mut state = Self {
            user_id: stored.user_id,
            all_tasks: stored.all_tasks,
            availability: stored.availability,
            capacity: stored.capacity,
            blackouts: stored.blackouts,
            version: stored.version,
        };
        state.normalize();
        state
    }
}

impl WorldState {
    pub fn new(
        user_id: impl Into<String>,
        availability: AvailabilityMap,
        constraints: CapacityConstraints,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            all_tasks: Vec::new(),
            availability,
            capacity: Capacity {
                constraints,
                load: CapacityMap::default(),
            },
            blackouts: Vec::new(),
            version: 0,
        }
    }

    /// Fresh world using the configured default week and limits.
    pub fn from_config(user_id: impl Into<String>, config: &WorldConfig) -> Self {
        let defaults = &config.defaults;
        let window = DayWindow {
            start: defaults.workday_start,
            end: defaults.workday_end,
        };
        Self::new(
            user_id,
            AvailabilityMap::workweek(window, &defaults.workdays),
            CapacityConstraints {
                daily_max_minutes: defaults.daily_max_minutes,
                weekly_max_minutes: defaults.weekly_max_minutes,
            },
        )
    }

    pub fn with_blackout(mut self, blackout: BlackoutWindow) -> Self {
        self.blackouts.push(blackout);
        self
    }

    /// Seed tasks directly, bypassing validation. Capacity is rebuilt.
    pub fn with_tasks(mut self, tasks: Vec<CalendarizedTask>) -> Self {
        self.all_tasks = tasks;
        self.normalize();
        self
    }

    pub fn find_task(&self, id: &str) -> Option<&CalendarizedTask> {
        self.all_tasks.iter().find(|t| t.id == id)
    }

    /// Tasks whose start falls on `date`.
    pub fn tasks_on(&self, date: NaiveDate) -> impl Iterator<Item = &CalendarizedTask> {
        self.all_tasks.iter().filter(move |t| t.date() == date)
    }

    pub fn committed_minutes_on(&self, date: NaiveDate) -> i64 {
        self.capacity.load.daily_minutes(date)
    }

    pub fn committed_minutes_in_week(&self, date: NaiveDate) -> i64 {
        self.capacity.load.weekly_minutes(date)
    }

    pub fn windows_on(&self, date: NaiveDate) -> &[DayWindow] {
        self.availability.windows_on(date)
    }

    pub fn blackouts_on(&self, date: NaiveDate) -> Vec<TimeRange> {
        self.blackouts
            .iter()
            .flat_map(|b| b.occurrences_on(date))
            .collect()
    }

    pub(crate) fn insert_task(&mut self, task: CalendarizedTask) {
        let at = self.all_tasks.partition_point(|t| t.start <= task.start);
        self.all_tasks.insert(at, task);
    }

    pub(crate) fn take_task(&mut self, id: &str) -> Option<CalendarizedTask> {
        let at = self.all_tasks.iter().position(|t| t.id == id)?;
        Some(self.all_tasks.remove(at))
    }

    /// Recompute daily totals for `dates` and weekly totals for their weeks.
    pub(crate) fn recompute_capacity(&mut self, dates: &BTreeSet<NaiveDate>) {
        let weeks: BTreeSet<NaiveDate> = dates.iter().map(|d| week_start(*d)).collect();

        for date in dates {
            let total: i64 = self.tasks_on(*date).map(|t| t.estimated_minutes).sum();
            set_or_clear(&mut self.capacity.load.daily, *date, total);
        }
        for monday in weeks {
            let sunday = monday + Duration::days(6);
            let total: i64 = self
                .all_tasks
                .iter()
                .filter(|t| (monday..=sunday).contains(&t.date()))
                .map(|t| t.estimated_minutes)
                .sum();
            set_or_clear(&mut self.capacity.load.weekly, week_key(monday), total);
        }
    }

    /// Recompute the whole capacity map from scratch.
    pub fn rebuild_capacity(&mut self) {
        self.capacity.load = CapacityMap::default();
        let dates: BTreeSet<NaiveDate> = self.all_tasks.iter().map(|t| t.date()).collect();
        self.recompute_capacity(&dates);
    }

    /// Restore the derived invariants: tasks in start order, capacity
    /// matching the tasks.
    pub(crate) fn normalize(&mut self) {
        self.all_tasks.sort_by_key(|t| t.start);
        self.rebuild_capacity();
    }
}

fn set_or_clear<K: Ord>(map: &mut BTreeMap<K, i64>, key: K, total: i64) {
    if total == 0 {
        map.remove(&key);
    } else {
        map.insert(key, total);
    }
}
