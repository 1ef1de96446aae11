//! Property tests for the world model invariants.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc, Weekday};
use proptest::prelude::*;
use worldmodel_core::{
    AvailabilityMap, BlackoutWindow, CalendarizedTask, CapacityConstraints, DayWindow, SlotQuery,
    TimeRange, WorldQueryEngine, WorldState, WorldUpdater, WorldValidator,
};

#[derive(Debug, Clone)]
enum Op {
    Add { day: u32, quarter: u32, quarters: u32 },
    Remove { pick: usize },
    Move { pick: usize, day: u32, quarter: u32 },
    Plan(Vec<(u32, u32, u32)>),
    Undo,
}

// Monday 2025-08-18 through Sunday 2025-08-24, in quarter hours from 07:00.
fn start_of(day: u32, quarter: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, day, 7, 0, 0).unwrap() + Duration::minutes(15 * i64::from(quarter))
}

fn make_task(id: String, day: u32, quarter: u32, quarters: u32) -> CalendarizedTask {
    let start = start_of(day, quarter);
    CalendarizedTask::new(id.clone(), start, start + Duration::minutes(15 * i64::from(quarters))).with_id(id)
}

fn world(daily: i64, weekly: i64) -> WorldState {
    let window = DayWindow::parse("09:00", "17:00").unwrap();
    let days = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];
    WorldState::new(
        "prop-user",
        AvailabilityMap::workweek(window, &days),
        CapacityConstraints {
            daily_max_minutes: daily,
            weekly_max_minutes: weekly,
        },
    )
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (18u32..25, 0u32..48, 1u32..12).prop_map(|(day, quarter, quarters)| Op::Add { day, quarter, quarters }),
        1 => any::<usize>().prop_map(|pick| Op::Remove { pick }),
        2 => (any::<usize>(), 18u32..25, 0u32..48).prop_map(|(pick, day, quarter)| Op::Move { pick, day, quarter }),
        2 => prop::collection::vec((18u32..25, 0u32..48, 1u32..8), 1..4).prop_map(Op::Plan),
        1 => Just(Op::Undo),
    ]
}

fn assert_invariants(state: &WorldState) {
    for (i, a) in state.all_tasks.iter().enumerate() {
        for b in &state.all_tasks[i + 1..] {
            assert!(!a.overlaps(b), "{} overlaps {}", a.id, b.id);
        }
    }
    for pair in state.all_tasks.windows(2) {
        assert!(pair[0].start <= pair[1].start, "tasks out of order");
    }
    let daily = state.capacity.constraints.daily_max_minutes;
    let mut dates: Vec<NaiveDate> = state.all_tasks.iter().map(|t| t.date()).collect();
    dates.dedup();
    for date in dates {
        let total: i64 = state.tasks_on(date).map(|t| t.estimated_minutes).sum();
        assert!(total <= daily, "{date}: {total} > {daily}");
        assert_eq!(state.committed_minutes_on(date), total);
    }
    let audit = WorldValidator::new().check_consistency(state);
    assert!(audit.is_valid, "{:?}", audit.conflicts);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn committed_worlds_stay_consistent(
        ops in prop::collection::vec(op_strategy(), 1..40),
        daily in 60i64..480,
    ) {
        let mut updater = WorldUpdater::new(world(daily, daily * 4));
        let mut next_id = 0u32;

        for op in ops {
            let before = updater.state().clone();
            let result = match op {
                Op::Add { day, quarter, quarters } => {
                    next_id += 1;
                    updater.add_task(make_task(format!("t{next_id}"), day, quarter, quarters))
                }
                Op::Remove { pick } => {
                    let ids: Vec<String> = updater.state().all_tasks.iter().map(|t| t.id.clone()).collect();
                    if ids.is_empty() {
                        continue;
                    }
                    updater.remove_task(&ids[pick % ids.len()])
                }
                Op::Move { pick, day, quarter } => {
                    let tasks = updater.state().all_tasks.clone();
                    if tasks.is_empty() {
                        continue;
                    }
                    let current = &tasks[pick % tasks.len()];
                    let quarters = (current.duration_minutes() / 15) as u32;
                    updater.update_task(make_task(current.id.clone(), day, quarter, quarters))
                }
                Op::Plan(members) => {
                    let batch = members
                        .into_iter()
                        .map(|(day, quarter, quarters)| {
                            next_id += 1;
                            make_task(format!("t{next_id}"), day, quarter, quarters)
                        })
                        .collect();
                    updater.apply_plan(batch)
                }
                Op::Undo => updater.undo_last_operation(),
            };

            if !result.success {
                prop_assert_eq!(updater.state(), &before);
            }
            assert_invariants(updater.state());
        }
    }

    #[test]
    fn single_mutation_then_undo_restores_snapshot(
        seed in prop::collection::vec((18u32..23, 8u32..32, 1u32..4), 0..6),
        candidate in (18u32..23, 8u32..32, 1u32..8),
    ) {
        let mut updater = WorldUpdater::new(world(480, 2400));
        let plan: Vec<CalendarizedTask> = seed
            .into_iter()
            .enumerate()
            .map(|(i, (day, quarter, quarters))| make_task(format!("s{i}"), day, quarter, quarters))
            .collect();
        updater.apply_plan(plan);
        let snapshot = updater.state().clone();

        let (day, quarter, quarters) = candidate;
        let result = updater.add_task(make_task("candidate".into(), day, quarter, quarters));
        if result.success {
            prop_assert!(updater.undo_last_operation().success);
        }
        prop_assert_eq!(updater.state(), &snapshot);
    }

    #[test]
    fn found_slots_respect_tasks_blackouts_and_availability(
        busy in prop::collection::vec((18u32..25, 0u32..48, 1u32..12), 0..12),
        lunch_start in 8u32..16,
        duration in 15i64..180,
        step_days in 0i64..7,
    ) {
        let tasks: Vec<CalendarizedTask> = busy
            .into_iter()
            .enumerate()
            .map(|(i, (day, quarter, quarters))| make_task(format!("b{i}"), day, quarter, quarters))
            .collect();
        let lunch = DayWindow::new(
            chrono::NaiveTime::from_hms_opt(lunch_start, 0, 0).unwrap(),
            chrono::NaiveTime::from_hms_opt(lunch_start + 1, 0, 0).unwrap(),
        )
        .unwrap();
        let state = world(480, 2400)
            .with_tasks(tasks)
            .with_blackout(BlackoutWindow::daily(lunch, "lunch"));

        let from = NaiveDate::from_ymd_opt(2025, 8, 18).unwrap();
        let query = SlotQuery::new(duration, from)
            .through(from + Duration::days(step_days))
            .with_limit(1000);
        let slots = WorldQueryEngine::default().find_available_slots(&query, &state).unwrap();

        for slot in &slots {
            prop_assert_eq!(slot.duration_minutes(), duration);
            prop_assert!(state.availability.contains(&slot.range));
            prop_assert!(state.all_tasks.iter().all(|t| !t.range().overlaps(&slot.range)));
            prop_assert!(state.blackouts.iter().all(|b| !b.intersects(&slot.range)));
        }
        for pair in slots.windows(2) {
            prop_assert!(pair[0].composite_score >= pair[1].composite_score);
        }
    }

    #[test]
    fn subtract_leaves_disjoint_uncovered_ranges(
        busy in prop::collection::vec((0i64..600, 1i64..120), 0..10),
    ) {
        let base = Utc.with_ymd_and_hms(2025, 8, 18, 8, 0, 0).unwrap();
        let day = TimeRange::new(base, base + Duration::hours(10)).unwrap();
        let blocks: Vec<TimeRange> = busy
            .into_iter()
            .map(|(offset, len)| {
                let start = base + Duration::minutes(offset);
                TimeRange::new(start, start + Duration::minutes(len)).unwrap()
            })
            .collect();

        let free = day.subtract(&blocks);
        for range in &free {
            prop_assert!(day.contains(range));
            prop_assert!(blocks.iter().all(|b| !b.overlaps(range)));
        }
        for pair in free.windows(2) {
            prop_assert!(pair[0].end < pair[1].start);
        }
        let covered: i64 = free.iter().map(TimeRange::duration_minutes).sum();
        prop_assert!(covered <= day.duration_minutes());
    }
}
