//! Core activity logic.
//!
//! This module contains:
//! - Activity definitions and their per-frame state
//! - Multi-person requirements such as `Surround`
//! - The rule evaluator deciding which activities are happening
//! - Occurrence bookkeeping and the presence-driven session machine

pub mod activity;
pub mod lifecycle;
pub mod requirement;
pub mod rules;

// Re-export commonly used types
pub use activity::{Activity, ActivityState, AreaSource, ObjectRef};
pub use lifecycle::{
    ActivityRecorder, OccurrenceEvent, OccurrenceRow, PresenceMonitor, SessionState,
    SessionTransition,
};
pub use requirement::{Requirement, RequirementRef, RequirementRegistry, Surround};
pub use rules::{
    decide_activity_status, decide_activity_text_for_people, is_satisfied_by, EvalContext,
};
