//! Statistics about what the agent has processed.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, SessionLog, SessionStats,
    SharedSessionLog,
};
