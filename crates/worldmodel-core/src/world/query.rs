//! Slot discovery and ranking.
//!
//! For each day in range the engine takes the user's availability, carves
//! out existing tasks and blackout occurrences, then slides a window of the
//! requested length across what is left. Candidates are scored with the
//! time-of-day curves from [`ScoringTable`] and ranked best first.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::scoring::{EnergyLevel, FocusLevel, PartOfDay, ScoringTable, TaskType};
use super::state::{day_span, week_start, TimeRange, WorldState};
use crate::config::{QueryConfig, WorldConfig, MINUTES_PER_DAY};
use crate::error::{Result, WorldError};

const MINUTES_PER_HALF_DAY: f64 = 720.0;

/// What kind of slot the caller is looking for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotQuery {
    pub duration_minutes: i64,
    pub start_date: NaiveDate,
    /// Inclusive. Defaults to the configured horizon.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub task_type: Option<TaskType>,
    /// Slots closer to any of these times of day rank slightly higher.
    #[serde(default)]
    pub preferred_times: Vec<NaiveTime>,
    #[serde(default)]
    pub preferred_parts_of_day: BTreeSet<PartOfDay>,
    /// Favors hours with a high energy curve.
    #[serde(default)]
    pub energy_level: Option<EnergyLevel>,
    /// Favors hours with a high focus curve.
    #[serde(default)]
    pub focus_level: Option<FocusLevel>,
    #[serde(default)]
    pub earliest_time: Option<NaiveTime>,
    #[serde(default)]
    pub latest_time: Option<NaiveTime>,
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exclude_weekends: bool,
    /// Gap kept free around existing tasks.
    #[serde(default)]
    pub min_buffer_minutes: i64,
    /// Skip days whose remaining capacity cannot take `load_minutes`.
    #[serde(default)]
    pub respect_capacity: bool,
    /// Minutes charged against capacity. Defaults to the duration.
    #[serde(default)]
    pub load_minutes: Option<i64>,
    /// Tasks treated as absent, e.g. the one being moved.
    #[serde(default)]
    pub ignore_task_ids: BTreeSet<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SlotQuery {
    pub fn new(duration_minutes: i64, start_date: NaiveDate) -> Self {
        Self {
            duration_minutes,
            start_date,
            end_date: None,
            task_type: None,
            preferred_times: Vec::new(),
            preferred_parts_of_day: BTreeSet::new(),
            energy_level: None,
            focus_level: None,
            earliest_time: None,
            latest_time: None,
            not_before: None,
            exclude_weekends: false,
            min_buffer_minutes: 0,
            respect_capacity: false,
            load_minutes: None,
            ignore_task_ids: BTreeSet::new(),
            limit: None,
        }
    }

    pub fn through(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn for_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    /// Adds a preferred time of day. May be called more than once.
    pub fn prefer(mut self, time: NaiveTime) -> Self {
        self.preferred_times.push(time);
        self
    }

    pub fn prefer_part_of_day(mut self, part: PartOfDay) -> Self {
        self.preferred_parts_of_day.insert(part);
        self
    }

    pub fn requiring_energy(mut self, level: EnergyLevel) -> Self {
        self.energy_level = Some(level);
        self
    }

    pub fn requiring_focus(mut self, level: FocusLevel) -> Self {
        self.focus_level = Some(level);
        self
    }

    pub fn between(mut self, earliest: NaiveTime, latest: NaiveTime) -> Self {
        self.earliest_time = Some(earliest);
        self.latest_time = Some(latest);
        self
    }

    pub fn after(mut self, instant: DateTime<Utc>) -> Self {
        self.not_before = Some(instant);
        self
    }

    pub fn excluding_weekends(mut self) -> Self {
        self.exclude_weekends = true;
        self
    }

    pub fn with_buffer(mut self, minutes: i64) -> Self {
        self.min_buffer_minutes = minutes;
        self
    }

    pub fn respecting_capacity(mut self, load_minutes: Option<i64>) -> Self {
        self.respect_capacity = true;
        self.load_minutes = load_minutes;
        self
    }

    pub fn ignoring(mut self, task_id: impl Into<String>) -> Self {
        self.ignore_task_ids.insert(task_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn load(&self) -> i64 {
        self.load_minutes.unwrap_or(self.duration_minutes)
    }
}

/// A scored candidate slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub range: TimeRange,
    pub energy_score: f64,
    pub focus_score: f64,
    pub creativity_score: f64,
    pub composite_score: f64,
}

impl TimeSlot {
    pub fn start(&self) -> DateTime<Utc> {
        self.range.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.range.end
    }

    pub fn duration_minutes(&self) -> i64 {
        self.range.duration_minutes()
    }
}

/// Read-only slot finder over a borrowed world.
#[derive(Debug, Clone, Default)]
pub struct WorldQueryEngine {
    config: QueryConfig,
    scoring: ScoringTable,
}

impl WorldQueryEngine {
    pub fn new(config: QueryConfig, scoring: ScoringTable) -> Self {
        Self { config, scoring }
    }

    pub fn from_config(config: &WorldConfig) -> Self {
        Self::new(config.query.clone(), config.scoring.clone())
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Ranked slots across the query's date range, best first.
    ///
    /// Returns an empty list when nothing fits.
    pub fn find_available_slots(&self, query: &SlotQuery, state: &WorldState) -> Result<Vec<TimeSlot>> {
        check_query(query)?;
        let last = self.last_date(query);

        let mut slots = Vec::new();
        let mut date = query.start_date;
        loop {
            slots.extend(self.candidates_on(date, query, state));
            match date.succ_opt() {
                Some(next) if next <= last => date = next,
                _ => break,
            }
        }
        tracing::debug!(
            candidates = slots.len(),
            from = %query.start_date,
            to = %last,
            "enumerated slot candidates"
        );

        rank(&mut slots);
        slots.truncate(query.limit.unwrap_or(self.config.default_limit));
        Ok(slots)
    }

    /// Ranked slots on a single date.
    pub fn find_slots_on_date(
        &self,
        date: NaiveDate,
        query: &SlotQuery,
        state: &WorldState,
    ) -> Result<Vec<TimeSlot>> {
        check_query(query)?;
        let mut slots = self.candidates_on(date, query, state);
        rank(&mut slots);
        slots.truncate(query.limit.unwrap_or(self.config.default_limit));
        Ok(slots)
    }

    /// Earliest slot of `duration_minutes` starting at or after `after`
    /// within the search horizon. Days without remaining capacity are skipped.
    pub fn find_next_free_slot(
        &self,
        duration_minutes: i64,
        after: DateTime<Utc>,
        state: &WorldState,
    ) -> Result<Option<TimeSlot>> {
        let query = SlotQuery::new(duration_minutes, after.date_naive())
            .after(after)
            .respecting_capacity(None);
        check_query(&query)?;
        let last = self.last_date(&query);

        let mut date = query.start_date;
        loop {
            // Candidates come out in start order.
            if let Some(slot) = self.candidates_on(date, &query, state).into_iter().next() {
                return Ok(Some(slot));
            }
            match date.succ_opt() {
                Some(next) if next <= last => date = next,
                _ => return Ok(None),
            }
        }
    }

    /// Whether a task of `duration_minutes` fits anywhere on `date`.
    pub fn can_fit_on_date(&self, duration_minutes: i64, date: NaiveDate, state: &WorldState) -> Result<bool> {
        let query = SlotQuery::new(duration_minutes, date).respecting_capacity(None);
        check_query(&query)?;
        Ok(!self.candidates_on(date, &query, state).is_empty())
    }

    /// Free ranges on `date` after availability, query bounds, tasks (with
    /// buffer) and blackouts are applied.
    pub fn free_ranges_on(&self, date: NaiveDate, state: &WorldState, query: &SlotQuery) -> Vec<TimeRange> {
        if query.exclude_weekends && matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return Vec::new();
        }

        let bounds = self.day_bounds(date, query);
        let open: Vec<TimeRange> = state
            .availability
            .ranges_on(date)
            .iter()
            .filter_map(|r| bounds.and_then(|b| r.intersection(&b)))
            .collect();
        if open.is_empty() {
            return open;
        }

        let mut busy: Vec<TimeRange> = state
            .all_tasks
            .iter()
            .filter(|t| !query.ignore_task_ids.contains(&t.id))
            .map(|t| t.range().padded(query.min_buffer_minutes.max(0)))
            .collect();
        busy.extend(state.blackouts_on(date));

        open.iter().flat_map(|r| r.subtract(&busy)).collect()
    }

    fn candidates_on(&self, date: NaiveDate, query: &SlotQuery, state: &WorldState) -> Vec<TimeSlot> {
        let daily_limit = state.capacity.constraints.daily_max_minutes;
        let committed_today = committed_minutes(state, query, |d| d == date);

        if query.respect_capacity {
            let monday = week_start(date);
            let committed_week = committed_minutes(state, query, |d| week_start(d) == monday);
            let load = query.load();
            if committed_today + load > daily_limit
                || committed_week + load > state.capacity.constraints.weekly_max_minutes
            {
                return Vec::new();
            }
        }

        let load_ratio = if daily_limit > 0 {
            (committed_today as f64 / daily_limit as f64).min(1.0)
        } else {
            0.0
        };

        let day_tasks: Vec<TimeRange> = state
            .all_tasks
            .iter()
            .filter(|t| !query.ignore_task_ids.contains(&t.id) && t.date() == date)
            .map(|t| t.range())
            .collect();

        // Durations are capped at a day by check_query, so the window fits.
        let length = Duration::minutes(query.duration_minutes);
        let step = Duration::minutes(self.config.step_minutes.max(1));
        let mut slots = Vec::new();
        for free in self.free_ranges_on(date, state, query) {
            let mut start = free.start;
            while let Some(end) = start.checked_add_signed(length).filter(|end| *end <= free.end) {
                let context = SlotContext {
                    load_ratio,
                    nearby_tasks: self.nearby_count(&TimeRange { start, end }, &day_tasks),
                };
                slots.push(self.score(TimeRange { start, end }, query, context));
                match start.checked_add_signed(step) {
                    Some(next) => start = next,
                    None => break,
                }
            }
        }
        slots
    }

    /// Tasks on the slot's day that start or end within the nearby window.
    fn nearby_count(&self, slot: &TimeRange, day_tasks: &[TimeRange]) -> usize {
        let reach = slot.padded(self.config.nearby_window_minutes.max(0));
        day_tasks
            .iter()
            .filter(|task| task.start <= reach.end && task.end >= reach.start)
            .count()
    }

    fn score(&self, range: TimeRange, query: &SlotQuery, context: SlotContext) -> TimeSlot {
        let (axes, semantic) = self.scoring.semantic_score(range.start, query.task_type);
        let cfg = &self.config;
        let part = PartOfDay::of(range.start);

        let proximity = query
            .preferred_times
            .iter()
            .map(|preferred| {
                let distance = (range.start.time() - *preferred).num_minutes().abs() as f64;
                1.0 - distance.min(MINUTES_PER_HALF_DAY) / MINUTES_PER_HALF_DAY
            })
            .fold(0.0, f64::max);

        let requirement = query.energy_level.map_or(0.0, |level| level.factor() * axes.energy)
            + query.focus_level.map_or(0.0, |level| level.factor() * axes.focus);

        let mut composite = semantic + cfg.proximity_weight * proximity + cfg.requirement_weight * requirement;
        if query.preferred_parts_of_day.contains(&part) {
            composite += cfg.part_of_day_bonus;
        }
        if query.task_type == Some(TaskType::Social) && part != PartOfDay::Morning {
            composite += cfg.social_bonus;
        }
        composite -= cfg.nearby_task_penalty * context.nearby_tasks as f64;
        composite -= cfg.load_penalty_weight * context.load_ratio;

        TimeSlot {
            range,
            energy_score: axes.energy,
            focus_score: axes.focus,
            creativity_score: axes.creativity,
            composite_score: composite,
        }
    }

    fn last_date(&self, query: &SlotQuery) -> NaiveDate {
        query.end_date.unwrap_or_else(|| {
            Duration::try_days(self.config.horizon_days.max(1) - 1)
                .and_then(|span| query.start_date.checked_add_signed(span))
                .unwrap_or(NaiveDate::MAX)
        })
    }

    /// The part of `date` the query allows, or `None` if it allows nothing.
    fn day_bounds(&self, date: NaiveDate, query: &SlotQuery) -> Option<TimeRange> {
        let mut start = date.and_time(query.earliest_time.unwrap_or(NaiveTime::MIN)).and_utc();
        let mut end = match query.latest_time {
            Some(latest) => date.and_time(latest).and_utc(),
            None => day_span(date).end,
        };
        if let Some(after) = query.not_before {
            start = start.max(align_up(after, self.config.step_minutes));
        }
        end = end.max(start);
        (start < end).then_some(TimeRange { start, end })
    }
}

/// Per-day facts that feed into a slot's score.
#[derive(Debug, Clone, Copy)]
struct SlotContext {
    load_ratio: f64,
    nearby_tasks: usize,
}

fn check_query(query: &SlotQuery) -> Result<()> {
    if query.duration_minutes <= 0 {
        return Err(WorldError::MalformedInput(format!(
            "slot duration must be positive, got {} minutes",
            query.duration_minutes
        )));
    }
    if query.duration_minutes > MINUTES_PER_DAY {
        return Err(WorldError::MalformedInput(format!(
            "slot duration of {} minutes is longer than a day",
            query.duration_minutes
        )));
    }
    if !(0..=MINUTES_PER_DAY).contains(&query.min_buffer_minutes) {
        return Err(WorldError::MalformedInput(format!(
            "buffer must be between 0 and {MINUTES_PER_DAY} minutes, got {}",
            query.min_buffer_minutes
        )));
    }
    if let Some(load) = query.load_minutes {
        if !(0..=MINUTES_PER_DAY).contains(&load) {
            return Err(WorldError::MalformedInput(format!(
                "capacity load must be between 0 and {MINUTES_PER_DAY} minutes, got {load}"
            )));
        }
    }
    if let Some(end) = query.end_date {
        if end < query.start_date {
            return Err(WorldError::MalformedInput(format!(
                "query end date {end} is before start date {}",
                query.start_date
            )));
        }
    }
    Ok(())
}

fn committed_minutes(state: &WorldState, query: &SlotQuery, in_period: impl Fn(NaiveDate) -> bool) -> i64 {
    state
        .all_tasks
        .iter()
        .filter(|t| !query.ignore_task_ids.contains(&t.id) && in_period(t.date()))
        .map(|t| t.estimated_minutes)
        .sum()
}

/// Best composite first, earliest start on ties.
fn rank(slots: &mut [TimeSlot]) {
    slots.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(Ordering::Equal)
            .then(a.range.start.cmp(&b.range.start))
    });
}

/// Round up to the next step boundary counted from midnight.
fn align_up(at: DateTime<Utc>, step_minutes: i64) -> DateTime<Utc> {
    let step = step_minutes.max(1);
    let midnight = at.date_naive().and_time(NaiveTime::MIN).and_utc();
    let elapsed = at - midnight;
    let whole = elapsed.num_minutes();
    let minutes = if elapsed > Duration::minutes(whole) {
        whole + 1
    } else {
        whole
    };
    midnight
        .checked_add_signed(Duration::minutes((minutes + step - 1) / step * step))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::state::{
        AvailabilityMap, BlackoutWindow, CalendarizedTask, CapacityConstraints, DayWindow,
    };
    use chrono::TimeZone;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, day, hour, minute, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, day).unwrap()
    }

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn world() -> WorldState {
        let window = DayWindow::parse("09:00", "17:00").unwrap();
        let days = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];
        WorldState::new(
            "u1",
            AvailabilityMap::workweek(window, &days),
            CapacityConstraints {
                daily_max_minutes: 480,
                weekly_max_minutes: 2400,
            },
        )
    }

    #[test]
    fn next_free_slot_starts_at_opening_of_availability() {
        let engine = WorldQueryEngine::default();
        let slot = engine
            .find_next_free_slot(30, at(18, 8, 0), &world())
            .unwrap()
            .unwrap();
        assert_eq!(slot.start(), at(18, 9, 0));
        assert_eq!(slot.end(), at(18, 9, 30));
    }

    #[test]
    fn next_free_slot_skips_busy_time_and_rounds_up_to_step() {
        let state = world().with_tasks(vec![CalendarizedTask::new("a", at(18, 9, 0), at(18, 11, 0))]);
        let engine = WorldQueryEngine::default();
        let after = at(18, 8, 0) + Duration::seconds(90);
        let slot = engine.find_next_free_slot(30, after, &state).unwrap().unwrap();
        assert_eq!(slot.start(), at(18, 11, 0));

        let slot = engine
            .find_next_free_slot(30, at(18, 11, 7), &state)
            .unwrap()
            .unwrap();
        assert_eq!(slot.start(), at(18, 11, 15));
    }

    #[test]
    fn next_free_slot_moves_to_next_day_when_full() {
        let state = world().with_tasks(vec![CalendarizedTask::new("a", at(18, 9, 0), at(18, 17, 0))]);
        let slot = WorldQueryEngine::default()
            .find_next_free_slot(60, at(18, 8, 0), &state)
            .unwrap()
            .unwrap();
        assert_eq!(slot.start(), at(19, 9, 0));
    }

    #[test]
    fn zero_duration_is_malformed() {
        let result = WorldQueryEngine::default().find_available_slots(&SlotQuery::new(0, date(18)), &world());
        assert!(matches!(result, Err(WorldError::MalformedInput(_))));
    }

    #[test]
    fn slots_avoid_tasks_blackouts_and_stay_in_availability() {
        let state = world()
            .with_tasks(vec![CalendarizedTask::new("a", at(18, 10, 0), at(18, 11, 0))])
            .with_blackout(BlackoutWindow::daily(DayWindow::parse("12:00", "13:00").unwrap(), "lunch"));
        let query = SlotQuery::new(45, date(18)).through(date(24)).with_limit(500);
        let slots = WorldQueryEngine::default().find_available_slots(&query, &state).unwrap();

        assert!(!slots.is_empty());
        for slot in &slots {
            assert!(!slot.range.overlaps(&state.all_tasks[0].range()));
            assert!(state.blackouts.iter().all(|b| !b.intersects(&slot.range)));
            assert!(state.availability.contains(&slot.range));
        }
        // Weekend days contribute nothing.
        assert!(slots.iter().all(|s| s.start().date_naive() < date(23)));
    }

    #[test]
    fn ranking_is_by_composite_then_start() {
        let query = SlotQuery::new(60, date(18)).through(date(19)).with_limit(50);
        let slots = WorldQueryEngine::default().find_available_slots(&query, &world()).unwrap();
        for pair in slots.windows(2) {
            assert!(
                pair[0].composite_score > pair[1].composite_score
                    || (pair[0].composite_score == pair[1].composite_score
                        && pair[0].start() <= pair[1].start())
            );
        }
        assert_eq!(slots.len(), 50);
    }

    #[test]
    fn preferred_time_breaks_ties_within_a_band() {
        let query = SlotQuery::new(30, date(18))
            .through(date(18))
            .for_task_type(TaskType::Analytical)
            .prefer(hm(11, 0))
            .with_limit(1);
        let best = WorldQueryEngine::default().find_available_slots(&query, &world()).unwrap();
        assert_eq!(best[0].start(), at(18, 11, 0));
    }

    #[test]
    fn time_bounds_and_buffer_shrink_free_ranges() {
        let state = world().with_tasks(vec![CalendarizedTask::new("a", at(18, 12, 0), at(18, 13, 0))]);
        let query = SlotQuery::new(30, date(18)).between(hm(10, 0), hm(15, 0)).with_buffer(15);
        let free = WorldQueryEngine::default().free_ranges_on(date(18), &state, &query);
        assert_eq!(
            free,
            vec![
                TimeRange::new(at(18, 10, 0), at(18, 11, 45)).unwrap(),
                TimeRange::new(at(18, 13, 15), at(18, 15, 0)).unwrap(),
            ]
        );
    }

    #[test]
    fn ignored_tasks_do_not_block() {
        let state = world().with_tasks(vec![CalendarizedTask::new("a", at(18, 9, 0), at(18, 17, 0)).with_id("a")]);
        let engine = WorldQueryEngine::default();
        let query = SlotQuery::new(60, date(18)).through(date(18));
        assert!(engine.find_available_slots(&query, &state).unwrap().is_empty());
        let query = query.ignoring("a");
        assert!(!engine.find_available_slots(&query, &state).unwrap().is_empty());
    }

    #[test]
    fn capacity_aware_queries_skip_full_days() {
        let mut state = world().with_tasks(vec![CalendarizedTask::new("a", at(18, 9, 0), at(18, 10, 0))]);
        state.capacity.constraints.daily_max_minutes = 60;
        let engine = WorldQueryEngine::default();

        assert!(!engine.can_fit_on_date(15, date(18), &state).unwrap());
        assert!(engine.can_fit_on_date(15, date(19), &state).unwrap());
        assert!(!engine.can_fit_on_date(30, date(23), &state).unwrap());
    }

    #[test]
    fn excluding_weekends_drops_weekend_availability() {
        let state = world();
        let mut all_week = state.clone();
        all_week.availability = all_week
            .availability
            .clone()
            .with_day(Weekday::Sat, vec![DayWindow::parse("10:00", "12:00").unwrap()]);
        let engine = WorldQueryEngine::default();
        let query = SlotQuery::new(30, date(23)).through(date(23));
        assert!(!engine.find_slots_on_date(date(23), &query, &all_week).unwrap().is_empty());
        let query = query.excluding_weekends();
        assert!(engine.find_slots_on_date(date(23), &query, &all_week).unwrap().is_empty());
    }

    #[test]
    fn busy_day_scores_lower_than_empty_day() {
        let state = world().with_tasks(vec![CalendarizedTask::new("a", at(18, 14, 0), at(18, 16, 0))]);
        let engine = WorldQueryEngine::default();
        let query = SlotQuery::new(30, date(18)).between(hm(10, 0), hm(10, 30));
        let monday = engine.find_slots_on_date(date(18), &query, &state).unwrap();
        let tuesday = engine.find_slots_on_date(date(19), &query, &state).unwrap();
        assert!(monday[0].composite_score < tuesday[0].composite_score);
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// The single 30 minute slot starting at `hour:minute` on `day`.
    fn slot_at(
        engine: &WorldQueryEngine,
        state: &WorldState,
        day: u32,
        hour: u32,
        minute: u32,
        query: SlotQuery,
    ) -> TimeSlot {
        let start = hm(hour, minute);
        let query = query.between(start, start + Duration::minutes(30));
        let slots = engine.find_slots_on_date(date(day), &query, state).unwrap();
        assert_eq!(slots.len(), 1);
        slots[0].clone()
    }

    #[test]
    fn overlong_durations_and_buffers_are_malformed() {
        let engine = WorldQueryEngine::default();
        let state = world();
        for query in [
            SlotQuery::new(MINUTES_PER_DAY + 1, date(18)),
            SlotQuery::new(i64::MAX, date(18)),
            SlotQuery::new(30, date(18)).with_buffer(-1),
            SlotQuery::new(30, date(18)).with_buffer(i64::MAX),
            SlotQuery::new(30, date(18)).respecting_capacity(Some(i64::MAX)),
        ] {
            let result = engine.find_available_slots(&query, &state);
            assert!(matches!(result, Err(WorldError::MalformedInput(_))), "{query:?}");
        }
        assert!(engine.find_next_free_slot(i64::MAX, at(18, 9, 0), &state).is_err());
        assert!(engine.can_fit_on_date(i64::MAX, date(18), &state).is_err());

        // A whole day is allowed, it just never fits a 9 to 5 window.
        let query = SlotQuery::new(MINUTES_PER_DAY, date(18)).through(date(18));
        assert!(engine.find_available_slots(&query, &state).unwrap().is_empty());
    }

    #[test]
    fn horizon_stops_at_the_last_representable_date() {
        let engine = WorldQueryEngine::default();
        let query = SlotQuery::new(30, NaiveDate::MAX);
        assert!(engine.find_available_slots(&query, &world()).is_ok());
    }

    #[test]
    fn tasks_within_the_nearby_window_lower_the_score() {
        let config = QueryConfig {
            load_penalty_weight: 0.0,
            ..QueryConfig::default()
        };
        let engine = WorldQueryEngine::new(config, ScoringTable::default());
        let state = world().with_tasks(vec![CalendarizedTask::new("a", at(18, 11, 0), at(18, 12, 0))]);

        // 10:00-10:30 ends within an hour of 11:00.
        let crowded = slot_at(&engine, &state, 18, 10, 0, SlotQuery::new(30, date(18)));
        let quiet = slot_at(&engine, &state, 19, 10, 0, SlotQuery::new(30, date(19)));
        assert!(close(quiet.composite_score - crowded.composite_score, 0.02));

        // 09:00-09:30 is more than an hour away.
        let early = slot_at(&engine, &state, 18, 9, 0, SlotQuery::new(30, date(18)));
        let early_quiet = slot_at(&engine, &state, 19, 9, 0, SlotQuery::new(30, date(19)));
        assert!(close(early.composite_score, early_quiet.composite_score));
    }

    #[test]
    fn energy_and_focus_requirements_scale_their_axes() {
        let engine = WorldQueryEngine::default();
        let state = world();
        let plain = slot_at(&engine, &state, 18, 10, 0, SlotQuery::new(30, date(18)));

        let high = slot_at(
            &engine,
            &state,
            18,
            10,
            0,
            SlotQuery::new(30, date(18)).requiring_energy(EnergyLevel::High),
        );
        assert!(close(high.composite_score - plain.composite_score, 0.4 * plain.energy_score));

        let medium = slot_at(
            &engine,
            &state,
            18,
            10,
            0,
            SlotQuery::new(30, date(18)).requiring_energy(EnergyLevel::Medium),
        );
        assert!(close(medium.composite_score - plain.composite_score, 0.2 * plain.energy_score));

        let deep = slot_at(
            &engine,
            &state,
            18,
            10,
            0,
            SlotQuery::new(30, date(18))
                .requiring_focus(FocusLevel::Deep)
                .requiring_energy(EnergyLevel::Low),
        );
        assert!(close(deep.composite_score - plain.composite_score, 0.4 * plain.focus_score));
    }

    #[test]
    fn preferred_part_of_day_adds_a_bonus() {
        let engine = WorldQueryEngine::default();
        let state = world();
        let afternoon = SlotQuery::new(30, date(18)).prefer_part_of_day(PartOfDay::Afternoon);

        let plain = slot_at(&engine, &state, 18, 13, 0, SlotQuery::new(30, date(18)));
        let preferred = slot_at(&engine, &state, 18, 13, 0, afternoon.clone());
        assert!(close(preferred.composite_score - plain.composite_score, 0.2));

        let plain = slot_at(&engine, &state, 18, 10, 0, SlotQuery::new(30, date(18)));
        let morning = slot_at(&engine, &state, 18, 10, 0, afternoon);
        assert!(close(morning.composite_score, plain.composite_score));
    }

    #[test]
    fn nearest_of_several_preferred_times_counts() {
        let engine = WorldQueryEngine::default();
        let state = world();
        let both = slot_at(
            &engine,
            &state,
            18,
            15,
            0,
            SlotQuery::new(30, date(18)).prefer(hm(9, 0)).prefer(hm(15, 0)),
        );
        let exact = slot_at(&engine, &state, 18, 15, 0, SlotQuery::new(30, date(18)).prefer(hm(15, 0)));
        let morning_only = slot_at(&engine, &state, 18, 15, 0, SlotQuery::new(30, date(18)).prefer(hm(9, 0)));
        assert!(close(both.composite_score, exact.composite_score));
        assert!(both.composite_score > morning_only.composite_score);
    }

    #[test]
    fn social_work_gets_an_afternoon_bonus() {
        let state = world();
        let no_bonus = WorldQueryEngine::new(
            QueryConfig {
                social_bonus: 0.0,
                ..QueryConfig::default()
            },
            ScoringTable::default(),
        );
        let engine = WorldQueryEngine::default();
        let social = SlotQuery::new(30, date(18)).for_task_type(TaskType::Social);

        let with = slot_at(&engine, &state, 18, 14, 0, social.clone());
        let without = slot_at(&no_bonus, &state, 18, 14, 0, social.clone());
        assert!(close(with.composite_score - without.composite_score, 0.2));

        let with = slot_at(&engine, &state, 18, 10, 0, social.clone());
        let without = slot_at(&no_bonus, &state, 18, 10, 0, social);
        assert!(close(with.composite_score, without.composite_score));
    }
}
