//! # World Model Core Library
//!
//! This library keeps the authoritative schedule of one user and answers two
//! questions about it: is a proposed change consistent with everything else
//! the user has committed to, and where could a new commitment go instead.
//!
//! ## Architecture
//!
//! - **State**: plain data for tasks, weekly availability with per-date
//!   overrides, capacity limits with their derived load, and blackouts
//! - **Validator**: a fixed pipeline of overlap, blackout, availability and
//!   capacity checks that reports conflicts as data
//! - **Query engine**: slot enumeration over free time, ranked by
//!   time-of-day fitness curves
//! - **Updater**: the single writer, with undo snapshots, change-impact
//!   analysis and collaborator notifications
//!
//! ## Key Components
//!
//! - [`WorldUpdater`]: mutation API (add, remove, update, apply plan, undo)
//! - [`WorldValidator`]: conflict detection
//! - [`WorldQueryEngine`]: slot discovery and ranking
//! - [`WorldConfig`]: TOML configuration
//! - [`TaskStore`], [`CacheInvalidator`], [`OperationLog`]: collaborator seams

pub mod config;
pub mod error;
pub mod world;

pub use config::{DefaultsConfig, QueryConfig, UndoConfig, WorldConfig};
pub use error::{ConfigError, ErrorKind, WorldError};
pub use world::{
    AvailabilityMap, BlackoutWindow, CacheInvalidator, CalendarizedTask, CapacityConstraints,
    ChangeImpact, Conflict, ConflictKind, DayWindow, EnergyLevel, FocusLevel, OperationLog,
    OperationRecord, PartOfDay, SlotQuery, TaskStore, TaskType, TimeRange, TimeSlot, UpdateAction,
    UpdateResult, ValidationResult, WorldQueryEngine, WorldState, WorldUpdater, WorldValidator,
};
