//! Session statistics.
//!
//! Counts what the pipeline did without keeping any of the data itself:
//! no positions, no identities, only totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Running totals for the agent.
#[derive(Debug)]
pub struct SessionLog {
    /// Frames run through the pipeline
    frames_processed: AtomicU64,
    /// Tracked-person observations, summed over frames
    person_observations: AtomicU64,
    /// Recording sessions started
    sessions_started: AtomicU64,
    /// Activity occurrences closed
    occurrences_recorded: AtomicU64,
    /// Template scans applied
    localizer_scans: AtomicU64,
    /// Times the body tracker went away
    sensor_disconnects: AtomicU64,
    /// Identifies this agent run in saved stats and logs
    instance_id: Uuid,
    /// Agent start time
    started_at: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self {
            frames_processed: AtomicU64::new(0),
            person_observations: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            occurrences_recorded: AtomicU64::new(0),
            localizer_scans: AtomicU64::new(0),
            sensor_disconnects: AtomicU64::new(0),
            instance_id: Uuid::new_v4(),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that carries totals over from `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            warn!("Could not load previous session stats: {e}");
        }

        log
    }

    /// Record one processed frame and how many people it tracked.
    pub fn record_frame(&self, tracked_persons: usize) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.person_observations
            .fetch_add(tracked_persons as u64, Ordering::Relaxed);
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_occurrences(&self, count: u64) {
        self.occurrences_recorded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_localizer_scan(&self) {
        self.localizer_scans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sensor_disconnect(&self) {
        self.sensor_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            instance_id: self.instance_id,
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            person_observations: self.person_observations.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            occurrences_recorded: self.occurrences_recorded.load(Ordering::Relaxed),
            localizer_scans: self.localizer_scans.load(Ordering::Relaxed),
            sensor_disconnects: self.sensor_disconnects.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Frames processed: {}\n\
             - Person observations: {}\n\
             - Recording sessions: {}\n\
             - Activity occurrences: {}\n\
             - Template scans: {}\n\
             - Sensor disconnects: {}\n\
             - Uptime: {} seconds",
            stats.frames_processed,
            stats.person_observations,
            stats.sessions_started,
            stats.occurrences_recorded,
            stats.localizer_scans,
            stats.sensor_disconnects,
            stats.uptime_secs
        )
    }

    /// Save totals to disk, if a path was given.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                frames_processed: stats.frames_processed,
                person_observations: stats.person_observations,
                sessions_started: stats.sessions_started,
                occurrences_recorded: stats.occurrences_recorded,
                localizer_scans: stats.localizer_scans,
                sensor_disconnects: stats.sensor_disconnects,
                last_instance_id: Some(stats.instance_id),
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.frames_processed
                    .store(persisted.frames_processed, Ordering::Relaxed);
                self.person_observations
                    .store(persisted.person_observations, Ordering::Relaxed);
                self.sessions_started
                    .store(persisted.sessions_started, Ordering::Relaxed);
                self.occurrences_recorded
                    .store(persisted.occurrences_recorded, Ordering::Relaxed);
                self.localizer_scans
                    .store(persisted.localizer_scans, Ordering::Relaxed);
                self.sensor_disconnects
                    .store(persisted.sensor_disconnects, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.frames_processed,
            &self.person_observations,
            &self.sessions_started,
            &self.occurrences_recorded,
            &self.localizer_scans,
            &self.sensor_disconnects,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub instance_id: Uuid,
    pub frames_processed: u64,
    pub person_observations: u64,
    pub sessions_started: u64,
    pub occurrences_recorded: u64,
    pub localizer_scans: u64,
    pub sensor_disconnects: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    frames_processed: u64,
    person_observations: u64,
    sessions_started: u64,
    occurrences_recorded: u64,
    localizer_scans: u64,
    #[serde(default)]
    sensor_disconnects: u64,
    #[serde(default)]
    last_instance_id: Option<Uuid>,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared session log.
pub type SharedSessionLog = Arc<SessionLog>;

pub fn create_shared_log() -> SharedSessionLog {
    Arc::new(SessionLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedSessionLog {
    Arc::new(SessionLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let log = SessionLog::new();

        log.record_frame(2);
        log.record_frame(0);
        log.record_session_started();
        log.record_occurrences(3);

        let stats = log.stats();
        assert_eq!(stats.frames_processed, 2);
        assert_eq!(stats.person_observations, 2);
        assert_eq!(stats.sessions_started, 1);
        assert_eq!(stats.occurrences_recorded, 3);
    }

    #[test]
    fn test_reset() {
        let log = SessionLog::new();
        log.record_frame(5);
        log.record_localizer_scan();
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.frames_processed, 0);
        assert_eq!(stats.localizer_scans, 0);
    }

    #[test]
    fn test_persistence() {
        let path = std::env::temp_dir()
            .join(format!("activity-stats-{}", uuid::Uuid::new_v4()))
            .join("stats.json");

        let log = SessionLog::with_persistence(path.clone());
        log.record_frame(1);
        log.record_sensor_disconnect();
        log.save().unwrap();

        let reloaded = SessionLog::with_persistence(path.clone());
        assert_eq!(reloaded.stats().frames_processed, 1);
        assert_eq!(reloaded.stats().sensor_disconnects, 1);
        assert_ne!(reloaded.instance_id(), log.instance_id());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_summary_format() {
        let summary = SessionLog::new().summary();
        assert!(summary.contains("Frames processed"));
        assert!(summary.contains("Template scans"));
    }
}
