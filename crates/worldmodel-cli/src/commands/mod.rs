pub mod config;
pub mod slots;
pub mod task;
pub mod world;

use std::error::Error;
use std::path::{Path, PathBuf};

use worldmodel_core::world::TracingOperationLog;
use worldmodel_core::{TimeSlot, UpdateResult, WorldConfig, WorldState, WorldUpdater};

pub type CmdResult = Result<(), Box<dyn Error>>;

/// Paths shared by every command.
pub struct Context {
    pub world_path: PathBuf,
    pub config_path: Option<PathBuf>,
}

impl Context {
    pub fn new(world_path: PathBuf, config_path: Option<PathBuf>) -> Self {
        Self {
            world_path,
            config_path,
        }
    }

    pub fn config(&self) -> Result<WorldConfig, Box<dyn Error>> {
        match &self.config_path {
            Some(path) => Ok(WorldConfig::load_from(path)?),
            None => Ok(WorldConfig::load_or_default()),
        }
    }

    pub fn load_world(&self) -> Result<WorldState, Box<dyn Error>> {
        if !self.world_path.exists() {
            return Err(format!(
                "world file {} not found (run `init --user <id>` first)",
                self.world_path.display()
            )
            .into());
        }
        let content = std::fs::read_to_string(&self.world_path)?;
        let state: WorldState = serde_json::from_str(&content)?;
        Ok(state)
    }

    pub fn save_world(&self, state: &WorldState) -> CmdResult {
        write_json(&self.world_path, state)
    }

    /// Updater over the stored world with operations logged through tracing.
    pub fn updater(&self) -> Result<WorldUpdater, Box<dyn Error>> {
        let config = self.config()?;
        let state = self.load_world()?;
        Ok(WorldUpdater::with_config(state, &config).with_log(TracingOperationLog))
    }
}

pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> CmdResult {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn print_slots(slots: &[TimeSlot]) {
    if slots.is_empty() {
        println!("no free slots");
        return;
    }
    for slot in slots {
        println!(
            "{} - {}  score {:.3}  (energy {:.2}, focus {:.2}, creativity {:.2})",
            slot.start().format("%a %Y-%m-%d %H:%M"),
            slot.end().format("%H:%M"),
            slot.composite_score,
            slot.energy_score,
            slot.focus_score,
            slot.creativity_score,
        );
    }
}

/// Save the world after a commit, or explain a rejection and fail.
pub fn finish_update(ctx: &Context, updater: WorldUpdater, result: UpdateResult) -> CmdResult {
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
    if result.success {
        ctx.save_world(&updater.into_state())?;
        return Ok(());
    }

    let result = result.into_result()?;
    for conflict in &result.conflicts {
        println!("conflict ({}): {}", conflict.kind(), conflict.message());
    }
    if !result.suggested_slots.is_empty() {
        println!("suggested slots:");
        print_slots(&result.suggested_slots);
    }
    Err(format!("{} rejected with {} conflict(s)", result.action, result.conflicts.len()).into())
}
