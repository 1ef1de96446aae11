//! Per-user world model: state, validation, slot search and updates.

pub mod collaborators;
pub mod impact;
pub mod query;
pub mod scoring;
pub mod state;
pub mod updater;
pub mod validator;

pub use collaborators::{
    CacheInvalidator, InMemoryTaskStore, NotifyError, OperationLog, OperationRecord, TaskStore,
    TracingOperationLog,
};
pub use impact::ChangeImpact;
pub use query::{SlotQuery, TimeSlot, WorldQueryEngine};
pub use scoring::{
    AxisScores, AxisWeights, Band, Curve, EnergyLevel, FocusLevel, PartOfDay, ScoringTable, TaskType,
    TaskTypeWeights,
};
pub use state::{
    week_key, week_start, AvailabilityMap, BlackoutRule, BlackoutWindow, CalendarizedTask,
    Capacity, CapacityConstraints, CapacityMap, DayWindow, TimeRange, WorldState,
};
pub use updater::{UndoOperation, UndoSummary, UpdateAction, UpdateResult, WorldUpdater};
pub use validator::{
    CapacityPeriod, Conflict, ConflictKind, ValidationResult, WorldValidator,
};
