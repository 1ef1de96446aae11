//! Change-impact analysis.
//!
//! A committed mutation only touches the dates its tasks sit on. The impact
//! names those dates and their ISO weeks so capacity recalculation and cache
//! invalidation stay local.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::state::{week_key, CalendarizedTask, WorldState};

/// Dates and weeks touched by a mutation, plus the cache keys derived from them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeImpact {
    pub affected_dates: BTreeSet<NaiveDate>,
    pub affected_weeks: BTreeSet<String>,
    /// `slots:<date>`, `availability:<date>` and `capacity:<iso-week>`.
    pub cache_keys: Vec<String>,
}

impl ChangeImpact {
    /// Impact of adding or removing `tasks`.
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a CalendarizedTask>) -> Self {
        let mut dates = BTreeSet::new();
        for task in tasks {
            dates.insert(task.date());
            // A task running past midnight also blocks slots on its last day.
            let last = (task.end - Duration::seconds(1)).date_naive();
            if last > task.date() {
                dates.insert(last);
            }
        }
        Self::from_dates(dates)
    }

    /// Impact of replacing `before` with `after` wholesale.
    pub fn between(before: &WorldState, after: &WorldState) -> Self {
        let (removed, written) = task_diff(before, after);
        let old: Vec<&CalendarizedTask> = removed
            .iter()
            .chain(written.iter())
            .filter_map(|t| before.find_task(&t.id))
            .collect();
        Self::from_tasks(old.into_iter().chain(written.iter().copied()))
    }

    pub fn from_dates(affected_dates: BTreeSet<NaiveDate>) -> Self {
        let affected_weeks: BTreeSet<String> = affected_dates.iter().map(|d| week_key(*d)).collect();

        let mut cache_keys = Vec::with_capacity(affected_dates.len() * 2 + affected_weeks.len());
        for date in &affected_dates {
            cache_keys.push(format!("slots:{date}"));
            cache_keys.push(format!("availability:{date}"));
        }
        for week in &affected_weeks {
            cache_keys.push(format!("capacity:{week}"));
        }

        Self {
            affected_dates,
            affected_weeks,
            cache_keys,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.affected_dates.is_empty()
    }
}

/// Tasks present in `before` but gone from `after`, and tasks in `after` that
/// are new or differ from their `before` version.
pub(crate) fn task_diff<'a>(
    before: &'a WorldState,
    after: &'a WorldState,
) -> (Vec<&'a CalendarizedTask>, Vec<&'a CalendarizedTask>) {
    let old: BTreeMap<&str, &CalendarizedTask> =
        before.all_tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let new: BTreeMap<&str, &CalendarizedTask> =
        after.all_tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    let removed = old
        .iter()
        .filter(|(id, _)| !new.contains_key(*id))
        .map(|(_, t)| *t)
        .collect();
    let written = new
        .iter()
        .filter(|(id, task)| old.get(*id) != Some(*task))
        .map(|(_, t)| *t)
        .collect();
    (removed, written)
}
