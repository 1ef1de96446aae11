use std::path::Path;

use chrono::{DateTime, Utc};
use clap::Args;
use serde::Deserialize;
use worldmodel_core::{CalendarizedTask, WorldError};

use super::{finish_update, CmdResult, Context};

#[derive(Args)]
pub struct AddArgs {
    /// Task title
    #[arg(long)]
    pub title: String,
    /// Start time (RFC 3339)
    #[arg(long)]
    pub start: DateTime<Utc>,
    /// Length in minutes
    #[arg(long)]
    pub minutes: i64,
    /// Minutes counted against capacity (defaults to the length)
    #[arg(long)]
    pub estimate: Option<i64>,
    /// Tag, repeatable
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Explicit id (generated when omitted)
    #[arg(long)]
    pub id: Option<String>,
}

/// One entry of a plan file.
#[derive(Debug, Deserialize)]
struct PlanEntry {
    #[serde(default)]
    id: Option<String>,
    title: String,
    start: DateTime<Utc>,
    minutes: i64,
    #[serde(default)]
    estimated_minutes: Option<i64>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    source_plan_node_id: Option<String>,
}

impl PlanEntry {
    fn into_task(self) -> Result<CalendarizedTask, WorldError> {
        let task = build_task(
            self.id,
            self.title,
            self.start,
            self.minutes,
            self.estimated_minutes,
            self.tags,
        )?;
        Ok(match self.source_plan_node_id {
            Some(node_id) => task.with_plan_node(node_id),
            None => task,
        })
    }
}

fn build_task(
    id: Option<String>,
    title: String,
    start: DateTime<Utc>,
    minutes: i64,
    estimate: Option<i64>,
    tags: Vec<String>,
) -> Result<CalendarizedTask, WorldError> {
    let mut task = CalendarizedTask::spanning(title, start, minutes)?;
    if let Some(id) = id {
        task = task.with_id(id);
    }
    if let Some(estimate) = estimate {
        task = task.with_estimate(estimate);
    }
    for tag in tags {
        task = task.with_tag(tag);
    }
    Ok(task)
}

pub fn add(ctx: &Context, args: AddArgs) -> CmdResult {
    let mut updater = ctx.updater()?;
    let task = build_task(
        args.id,
        args.title,
        args.start,
        args.minutes,
        args.estimate,
        args.tags,
    )?;
    let result = updater.add_task(task);
    if let (true, Some(task)) = (result.success, &result.task) {
        println!("added {} ({}) v{}", task.id, task.title, result.version);
    }
    finish_update(ctx, updater, result)
}

pub fn remove(ctx: &Context, id: &str) -> CmdResult {
    let mut updater = ctx.updater()?;
    let result = updater.remove_task(id);
    if result.success {
        println!("removed {id} v{}", result.version);
    }
    finish_update(ctx, updater, result)
}

pub fn plan(ctx: &Context, file: &Path) -> CmdResult {
    let content = std::fs::read_to_string(file)?;
    let entries: Vec<PlanEntry> = serde_json::from_str(&content)?;
    let tasks = entries
        .into_iter()
        .map(PlanEntry::into_task)
        .collect::<Result<Vec<_>, _>>()?;

    let mut updater = ctx.updater()?;
    let result = updater.apply_plan(tasks);
    if result.success {
        println!(
            "applied {} task(s) v{}",
            result.affected_task_ids.len(),
            result.version
        );
    }
    finish_update(ctx, updater, result)
}
