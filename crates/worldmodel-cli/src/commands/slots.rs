use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use clap::Args;
use worldmodel_core::{EnergyLevel, FocusLevel, PartOfDay, SlotQuery, TaskType, WorldQueryEngine};

use super::{print_slots, CmdResult, Context};

#[derive(Args)]
pub struct SlotsArgs {
    /// Slot length in minutes
    #[arg(long)]
    pub duration: i64,
    /// First date to search (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// Last date to search, inclusive
    #[arg(long)]
    pub to: Option<NaiveDate>,
    /// Task type used to weight the scoring curves
    #[arg(long)]
    pub task_type: Option<TaskType>,
    /// Preferred time of day (HH:MM), repeatable
    #[arg(long, value_parser = parse_hhmm)]
    pub prefer: Vec<NaiveTime>,
    /// Preferred part of the day (morning, afternoon, evening), repeatable
    #[arg(long = "part-of-day")]
    pub parts_of_day: Vec<PartOfDay>,
    /// Energy the work needs (high, medium, low)
    #[arg(long)]
    pub energy: Option<EnergyLevel>,
    /// Focus the work needs (deep, moderate, light)
    #[arg(long)]
    pub focus: Option<FocusLevel>,
    /// Skip Saturdays and Sundays
    #[arg(long)]
    pub weekdays_only: bool,
    /// Minutes kept free around existing tasks
    #[arg(long, default_value_t = 0)]
    pub buffer: i64,
    /// Maximum number of slots
    #[arg(long)]
    pub limit: Option<usize>,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct NextArgs {
    /// Slot length in minutes
    #[arg(long)]
    pub duration: i64,
    /// Search from this instant (RFC 3339, defaults to now)
    #[arg(long)]
    pub after: Option<DateTime<Utc>>,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_hhmm(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| format!("expected HH:MM: {e}"))
}

pub fn slots(ctx: &Context, args: SlotsArgs) -> CmdResult {
    let config = ctx.config()?;
    let state = ctx.load_world()?;
    let engine = WorldQueryEngine::from_config(&config);

    let from = args.from.unwrap_or_else(|| Utc::now().date_naive());
    let to = args.to.unwrap_or_else(|| {
        Duration::try_days(config.query.horizon_days - 1)
            .and_then(|span| from.checked_add_signed(span))
            .unwrap_or(NaiveDate::MAX)
    });
    let mut query = SlotQuery::new(args.duration, from)
        .through(to)
        .with_buffer(args.buffer);
    if let Some(task_type) = args.task_type {
        query = query.for_task_type(task_type);
    }
    for time in args.prefer {
        query = query.prefer(time);
    }
    for part in args.parts_of_day {
        query = query.prefer_part_of_day(part);
    }
    if let Some(level) = args.energy {
        query = query.requiring_energy(level);
    }
    if let Some(level) = args.focus {
        query = query.requiring_focus(level);
    }
    if args.weekdays_only {
        query = query.excluding_weekends();
    }
    if let Some(limit) = args.limit {
        query = query.with_limit(limit);
    }

    let found = engine.find_available_slots(&query, &state)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        print_slots(&found);
    }
    Ok(())
}

pub fn next(ctx: &Context, args: NextArgs) -> CmdResult {
    let config = ctx.config()?;
    let state = ctx.load_world()?;
    let engine = WorldQueryEngine::from_config(&config);

    let after = args.after.unwrap_or_else(Utc::now);
    let slot = engine.find_next_free_slot(args.duration, after, &state)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&slot)?);
        return Ok(());
    }
    match slot {
        Some(slot) => print_slots(&[slot]),
        None => println!(
            "no free slot within {} days",
            config.query.horizon_days
        ),
    }
    Ok(())
}
