//! Time-of-day fitness curves.
//!
//! Each axis (energy, focus, creativity) is a piecewise function over the
//! 24-hour clock. A [`TaskType`] selects how the three axes are weighted
//! when ranking candidate slots. The whole table is configuration, so the
//! bands below are defaults rather than fixed behavior.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Kind of work a slot is being searched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Creative,
    Analytical,
    Administrative,
    Physical,
    Social,
}

impl TaskType {
    /// First tag that names a task type, if any.
    pub fn from_tags<'a, I>(tags: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a String>,
    {
        tags.into_iter().find_map(|tag| tag.parse().ok())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "creative" => Ok(Self::Creative),
            "analytical" => Ok(Self::Analytical),
            "administrative" | "admin" => Ok(Self::Administrative),
            "physical" => Ok(Self::Physical),
            "social" => Ok(Self::Social),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Creative => "creative",
            Self::Analytical => "analytical",
            Self::Administrative => "administrative",
            Self::Physical => "physical",
            Self::Social => "social",
        };
        f.write_str(name)
    }
}

/// How much energy a task needs. Higher levels reward high-energy slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyLevel {
    High,
    Medium,
    Low,
}

impl EnergyLevel {
    /// Share of the requirement weight applied to the energy axis.
    pub fn factor(self) -> f64 {
        match self {
            Self::High => 1.0,
            Self::Medium => 0.5,
            Self::Low => 0.0,
        }
    }
}

impl FromStr for EnergyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown energy level: {other}")),
        }
    }
}

/// How much concentration a task needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusLevel {
    Deep,
    Moderate,
    Light,
}

impl FocusLevel {
    /// Share of the requirement weight applied to the focus axis.
    pub fn factor(self) -> f64 {
        match self {
            Self::Deep => 1.0,
            Self::Moderate => 0.5,
            Self::Light => 0.0,
        }
    }
}

impl FromStr for FocusLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deep" => Ok(Self::Deep),
            "moderate" => Ok(Self::Moderate),
            "light" => Ok(Self::Light),
            other => Err(format!("unknown focus level: {other}")),
        }
    }
}

/// Coarse period of the day: before noon, noon to 17:00, from 17:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartOfDay {
    Morning,
    Afternoon,
    Evening,
}

impl PartOfDay {
    pub fn of(at: DateTime<Utc>) -> Self {
        match at.hour() {
            0..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            _ => Self::Evening,
        }
    }
}

impl FromStr for PartOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Ok(Self::Morning),
            "afternoon" => Ok(Self::Afternoon),
            "evening" => Ok(Self::Evening),
            other => Err(format!("unknown part of day: {other}")),
        }
    }
}

impl fmt::Display for PartOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
        };
        f.write_str(name)
    }
}

/// Hours in `[from_hour, to_hour)` score `score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub from_hour: u32,
    pub to_hour: u32,
    pub score: f64,
}

impl Band {
    fn new(from_hour: u32, to_hour: u32, score: f64) -> Self {
        Self {
            from_hour,
            to_hour,
            score,
        }
    }
}

/// Piecewise curve over the hour of day. First matching band wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub fallback: f64,
    pub bands: Vec<Band>,
}

impl Curve {
    /// Score for an hour of day (0-23).
    pub fn score_at(&self, hour: u32) -> f64 {
        self.bands
            .iter()
            .find(|b| b.from_hour <= hour && hour < b.to_hour)
            .map(|b| b.score)
            .unwrap_or(self.fallback)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.fallback) {
            return Err(ConfigError::InvalidValue {
                key: format!("scoring.{name}.fallback"),
                message: format!("{} is outside [0, 1]", self.fallback),
            });
        }
        for band in &self.bands {
            if band.from_hour >= band.to_hour || band.to_hour > 24 {
                return Err(ConfigError::InvalidValue {
                    key: format!("scoring.{name}.bands"),
                    message: format!("invalid hour band {}..{}", band.from_hour, band.to_hour),
                });
            }
            if !in_unit(band.score) {
                return Err(ConfigError::InvalidValue {
                    key: format!("scoring.{name}.bands"),
                    message: format!("{} is outside [0, 1]", band.score),
                });
            }
        }
        Ok(())
    }
}

/// Scores of one instant on the three axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisScores {
    pub energy: f64,
    pub focus: f64,
    pub creativity: f64,
}

/// Relative weights of the three axes. Normalized when combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisWeights {
    #[serde(default)]
    pub energy: f64,
    #[serde(default)]
    pub focus: f64,
    #[serde(default)]
    pub creativity: f64,
}

impl AxisWeights {
    pub fn new(energy: f64, focus: f64, creativity: f64) -> Self {
        Self {
            energy,
            focus,
            creativity,
        }
    }

    /// Weighted mean of the scores, in [0, 1] when the scores are.
    pub fn combine(&self, scores: &AxisScores) -> f64 {
        let total = self.energy + self.focus + self.creativity;
        if total <= 0.0 {
            return (scores.energy + scores.focus + scores.creativity) / 3.0;
        }
        (scores.energy * self.energy
            + scores.focus * self.focus
            + scores.creativity * self.creativity)
            / total
    }
}

/// Weight table per task type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTypeWeights {
    pub creative: AxisWeights,
    pub analytical: AxisWeights,
    pub administrative: AxisWeights,
    pub physical: AxisWeights,
    pub social: AxisWeights,
    /// Used when the query carries no task type.
    pub balanced: AxisWeights,
}

impl Default for TaskTypeWeights {
    fn default() -> Self {
        Self {
            creative: AxisWeights::new(2.0, 0.0, 5.0),
            analytical: AxisWeights::new(3.0, 5.0, 0.0),
            administrative: AxisWeights::new(2.0, 1.0, 0.0),
            physical: AxisWeights::new(6.0, 0.0, 0.0),
            social: AxisWeights::new(2.0, 0.0, 0.0),
            balanced: AxisWeights::new(1.0, 1.0, 1.0),
        }
    }
}

/// Full scoring configuration: three curves plus the weight table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringTable {
    #[serde(default = "default_energy_curve")]
    pub energy: Curve,
    #[serde(default = "default_focus_curve")]
    pub focus: Curve,
    #[serde(default = "default_creativity_curve")]
    pub creativity: Curve,
    #[serde(default)]
    pub weights: TaskTypeWeights,
}

// Energy peaks late morning with a second wind mid-afternoon.
fn default_energy_curve() -> Curve {
    Curve {
        bands: vec![
            Band::new(9, 12, 1.0),
            Band::new(14, 17, 0.85),
            Band::new(8, 9, 0.7),
            Band::new(12, 14, 0.7),
            Band::new(17, 19, 0.6),
        ],
        fallback: 0.3,
    }
}

fn default_focus_curve() -> Curve {
    Curve {
        bands: vec![
            Band::new(9, 12, 1.0),
            Band::new(8, 9, 0.8),
            Band::new(15, 18, 0.75),
            Band::new(7, 8, 0.6),
            Band::new(12, 14, 0.6),
        ],
        fallback: 0.4,
    }
}

// Creativity peaks around midday and again in the evening.
fn default_creativity_curve() -> Curve {
    Curve {
        bands: vec![
            Band::new(10, 13, 1.0),
            Band::new(19, 22, 0.9),
            Band::new(8, 10, 0.7),
            Band::new(14, 17, 0.7),
            Band::new(17, 19, 0.6),
        ],
        fallback: 0.4,
    }
}

impl Default for ScoringTable {
    fn default() -> Self {
        Self {
            energy: default_energy_curve(),
            focus: default_focus_curve(),
            creativity: default_creativity_curve(),
            weights: TaskTypeWeights::default(),
        }
    }
}

impl ScoringTable {
    /// Axis scores for the hour containing `at`.
    pub fn axis_scores(&self, at: DateTime<Utc>) -> AxisScores {
        let hour = at.hour();
        AxisScores {
            energy: self.energy.score_at(hour),
            focus: self.focus.score_at(hour),
            creativity: self.creativity.score_at(hour),
        }
    }

    pub fn weights_for(&self, task_type: Option<TaskType>) -> &AxisWeights {
        match task_type {
            Some(TaskType::Creative) => &self.weights.creative,
            Some(TaskType::Analytical) => &self.weights.analytical,
            Some(TaskType::Administrative) => &self.weights.administrative,
            Some(TaskType::Physical) => &self.weights.physical,
            Some(TaskType::Social) => &self.weights.social,
            None => &self.weights.balanced,
        }
    }

    /// Axis scores plus their weighted combination for a task type.
    pub fn semantic_score(&self, at: DateTime<Utc>, task_type: Option<TaskType>) -> (AxisScores, f64) {
        let scores = self.axis_scores(at);
        let combined = self.weights_for(task_type).combine(&scores);
        (scores, combined)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.energy.validate("energy")?;
        self.focus.validate("focus")?;
        self.creativity.validate("creativity")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 18, hour, 0, 0).unwrap()
    }

    #[test]
    fn curve_uses_first_matching_band_then_fallback() {
        let table = ScoringTable::default();
        assert_eq!(table.energy.score_at(10), 1.0);
        assert_eq!(table.energy.score_at(15), 0.85);
        assert_eq!(table.energy.score_at(3), 0.3);
        assert_eq!(table.creativity.score_at(20), 0.9);
    }

    #[test]
    fn creative_weights_prefer_evening_over_early_morning() {
        let table = ScoringTable::default();
        let (_, evening) = table.semantic_score(at_hour(20), Some(TaskType::Creative));
        let (_, early) = table.semantic_score(at_hour(7), Some(TaskType::Creative));
        assert!(evening > early);
    }

    #[test]
    fn analytical_prefers_mid_morning() {
        let table = ScoringTable::default();
        let (_, morning) = table.semantic_score(at_hour(10), Some(TaskType::Analytical));
        let (_, evening) = table.semantic_score(at_hour(20), Some(TaskType::Analytical));
        assert!(morning > evening);
        assert!(morning <= 1.0);
    }

    #[test]
    fn zero_weights_fall_back_to_mean() {
        let weights = AxisWeights::new(0.0, 0.0, 0.0);
        let scores = AxisScores {
            energy: 0.3,
            focus: 0.6,
            creativity: 0.9,
        };
        assert!((weights.combine(&scores) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn task_type_parses_from_tags() {
        let tags = vec!["deep-work".to_string(), "Analytical".to_string()];
        assert_eq!(TaskType::from_tags(&tags), Some(TaskType::Analytical));
        assert_eq!(TaskType::from_tags(&Vec::<String>::new()), None);
    }

    #[test]
    fn validate_rejects_out_of_range_scores() {
        let mut table = ScoringTable::default();
        table.focus.bands.push(Band::new(1, 2, 1.5));
        assert!(table.validate().is_err());
    }

    #[test]
    fn part_of_day_boundaries() {
        assert_eq!(PartOfDay::of(at_hour(11)), PartOfDay::Morning);
        assert_eq!(PartOfDay::of(at_hour(12)), PartOfDay::Afternoon);
        assert_eq!(PartOfDay::of(at_hour(16)), PartOfDay::Afternoon);
        assert_eq!(PartOfDay::of(at_hour(17)), PartOfDay::Evening);
        assert_eq!("Evening".parse::<PartOfDay>(), Ok(PartOfDay::Evening));
    }

    #[test]
    fn requirement_levels_parse_and_scale() {
        assert_eq!("high".parse::<EnergyLevel>().map(EnergyLevel::factor), Ok(1.0));
        assert_eq!("moderate".parse::<FocusLevel>().map(FocusLevel::factor), Ok(0.5));
        assert_eq!(FocusLevel::Light.factor(), 0.0);
        assert!("extreme".parse::<EnergyLevel>().is_err());
    }
}
