//! TOML-based engine configuration.
//!
//! Holds the tunables of the engine:
//! - Slot search granularity, horizon and suggestion counts
//! - Undo retention
//! - Defaults for a freshly created world (work week, capacity limits)
//! - The time-of-day scoring table
//!
//! Configuration is stored at `~/.config/worldmodel/config.toml`.

use std::path::{Path, PathBuf};

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::world::ScoringTable;

pub(crate) const MINUTES_PER_DAY: i64 = 24 * 60;

/// Slot search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Step between candidate slot starts (minutes).
    #[serde(default = "default_step_minutes")]
    pub step_minutes: i64,
    /// Days searched when a query names no end date.
    #[serde(default = "default_horizon_days")]
    pub horizon_days: i64,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Alternatives returned with a rejected update.
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
    /// Days after the requested date searched for alternatives.
    #[serde(default = "default_suggestion_window_days")]
    pub suggestion_window_days: i64,
    /// Weight of closeness to the preferred time of day.
    #[serde(default = "default_proximity_weight")]
    pub proximity_weight: f64,
    /// Penalty per unit of daily capacity already used.
    #[serde(default = "default_load_penalty_weight")]
    pub load_penalty_weight: f64,
    /// Weight of the energy and focus axes when a query states a required level.
    #[serde(default = "default_requirement_weight")]
    pub requirement_weight: f64,
    /// Bonus for a slot in one of the query's preferred parts of the day.
    #[serde(default = "default_part_of_day_bonus")]
    pub part_of_day_bonus: f64,
    /// Bonus for social work in the afternoon or evening.
    #[serde(default = "default_social_bonus")]
    pub social_bonus: f64,
    /// Penalty per task starting or ending near the slot on the same day.
    #[serde(default = "default_nearby_task_penalty")]
    pub nearby_task_penalty: f64,
    /// How close a task must be to count as nearby (minutes).
    #[serde(default = "default_nearby_window_minutes")]
    pub nearby_window_minutes: i64,
}

/// Undo stack configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoConfig {
    /// Operations kept; older entries are dropped.
    #[serde(default = "default_undo_retention")]
    pub retention: usize,
}

/// Defaults used when creating a new world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_daily_max_minutes")]
    pub daily_max_minutes: i64,
    #[serde(default = "default_weekly_max_minutes")]
    pub weekly_max_minutes: i64,
    #[serde(default = "default_workday_start")]
    pub workday_start: NaiveTime,
    #[serde(default = "default_workday_end")]
    pub workday_end: NaiveTime,
    #[serde(default = "default_workdays")]
    pub workdays: Vec<Weekday>,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/worldmodel/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub undo: UndoConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub scoring: ScoringTable,
}

// Default functions
fn default_step_minutes() -> i64 {
    15
}
fn default_horizon_days() -> i64 {
    14
}
fn default_limit() -> usize {
    10
}
fn default_max_suggestions() -> usize {
    5
}
fn default_suggestion_window_days() -> i64 {
    7
}
fn default_proximity_weight() -> f64 {
    0.05
}
fn default_load_penalty_weight() -> f64 {
    0.02
}
fn default_requirement_weight() -> f64 {
    0.4
}
fn default_part_of_day_bonus() -> f64 {
    0.2
}
fn default_social_bonus() -> f64 {
    0.2
}
fn default_nearby_task_penalty() -> f64 {
    0.02
}
fn default_nearby_window_minutes() -> i64 {
    60
}
fn default_undo_retention() -> usize {
    10
}
fn default_daily_max_minutes() -> i64 {
    360
}
fn default_weekly_max_minutes() -> i64 {
    1800
}
fn default_workday_start() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()
}
fn default_workday_end() -> NaiveTime {
    NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default()
}
fn default_workdays() -> Vec<Weekday> {
    vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ]
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            step_minutes: default_step_minutes(),
            horizon_days: default_horizon_days(),
            default_limit: default_limit(),
            max_suggestions: default_max_suggestions(),
            suggestion_window_days: default_suggestion_window_days(),
            proximity_weight: default_proximity_weight(),
            load_penalty_weight: default_load_penalty_weight(),
            requirement_weight: default_requirement_weight(),
            part_of_day_bonus: default_part_of_day_bonus(),
            social_bonus: default_social_bonus(),
            nearby_task_penalty: default_nearby_task_penalty(),
            nearby_window_minutes: default_nearby_window_minutes(),
        }
    }
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            retention: default_undo_retention(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            daily_max_minutes: default_daily_max_minutes(),
            weekly_max_minutes: default_weekly_max_minutes(),
            workday_start: default_workday_start(),
            workday_end: default_workday_end(),
            workdays: default_workdays(),
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            query: QueryConfig::default(),
            undo: UndoConfig::default(),
            defaults: DefaultsConfig::default(),
            scoring: ScoringTable::default(),
        }
    }
}

/// Returns `~/.config/worldmodel[-dev]/` based on WORLDMODEL_ENV.
///
/// Set WORLDMODEL_ENV=dev to use the development directory.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("WORLDMODEL_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("worldmodel-dev")
    } else {
        base_dir.join("worldmodel")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}

impl WorldConfig {
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if nothing exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or is
    /// invalid, or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            return Ok(cfg);
        }
        Self::load_from(&path)
    }

    /// Load and validate a config file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let cfg: WorldConfig = toml::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "falling back to default configuration");
                Self::default()
            }
        }
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };
        if self.query.step_minutes <= 0 {
            return Err(invalid("query.step_minutes", "must be positive"));
        }
        if self.query.horizon_days <= 0 {
            return Err(invalid("query.horizon_days", "must be positive"));
        }
        if self.query.suggestion_window_days < 0 {
            return Err(invalid("query.suggestion_window_days", "must not be negative"));
        }
        let weights = [
            ("query.proximity_weight", self.query.proximity_weight),
            ("query.load_penalty_weight", self.query.load_penalty_weight),
            ("query.requirement_weight", self.query.requirement_weight),
            ("query.part_of_day_bonus", self.query.part_of_day_bonus),
            ("query.social_bonus", self.query.social_bonus),
            ("query.nearby_task_penalty", self.query.nearby_task_penalty),
        ];
        for (key, weight) in weights {
            if !(weight >= 0.0 && weight.is_finite()) {
                return Err(invalid(key, "must be a finite, non-negative number"));
            }
        }
        if !(0..=MINUTES_PER_DAY).contains(&self.query.nearby_window_minutes) {
            return Err(invalid("query.nearby_window_minutes", "must be between 0 and 1440"));
        }
        if self.undo.retention == 0 {
            return Err(invalid("undo.retention", "must keep at least one operation"));
        }
        if self.defaults.workday_end <= self.defaults.workday_start {
            return Err(invalid("defaults.workday_end", "must be after workday_start"));
        }
        if self.defaults.daily_max_minutes < 0 || self.defaults.weekly_max_minutes < 0 {
            return Err(invalid("defaults", "capacity limits must not be negative"));
        }
        self.scoring.validate()
    }
}
