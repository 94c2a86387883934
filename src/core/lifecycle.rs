//! Recording state machines.
//!
//! Two machines run once per frame, after rule evaluation:
//!
//! - [`ActivityRecorder`] turns each activity's per-frame active flag into
//!   debounced occurrences. A short drop-out inside the debounce window does
//!   not split an occurrence.
//! - [`PresenceMonitor`] decides whether the session records at all. It
//!   starts as soon as someone is tracked and stops only once the room has
//!   stayed empty for the stop interval.

use crate::core::activity::Activity;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One continuous stretch of an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceRow {
    pub activity: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl OccurrenceRow {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Occurrence changes produced by one advance.
#[derive(Debug, Clone, PartialEq)]
pub enum OccurrenceEvent {
    Opened { handle: usize, row: OccurrenceRow },
    Closed { handle: usize, row: OccurrenceRow },
}

/// Opens, extends and closes occurrence rows.
///
/// Only open rows are kept. A row is handed out in its `Closed` event and
/// then forgotten; handles are never reused.
#[derive(Debug, Clone)]
pub struct ActivityRecorder {
    debounce: Duration,
    open: BTreeMap<usize, OccurrenceRow>,
    next_handle: usize,
}

impl ActivityRecorder {
    pub fn new(debounce: std::time::Duration) -> Self {
        Self {
            debounce: Duration::from_std(debounce).unwrap_or_else(|_| Duration::zero()),
            open: BTreeMap::new(),
            next_handle: 0,
        }
    }

    /// Advance every activity by one frame.
    pub fn advance(&mut self, activities: &mut [Activity], now: DateTime<Utc>) -> Vec<OccurrenceEvent> {
        let mut events = Vec::new();

        for activity in activities.iter_mut() {
            let state = &mut activity.state;

            if state.is_active {
                state.last_active = Some(now);

                match state.record.filter(|_| state.is_recording) {
                    Some(handle) => {
                        if let Some(row) = self.open.get_mut(&handle) {
                            row.end = now;
                        }
                    }
                    None => {
                        let row = OccurrenceRow {
                            activity: activity.name.clone(),
                            start: now,
                            end: now,
                        };
                        let handle = self.next_handle;
                        self.next_handle += 1;
                        self.open.insert(handle, row.clone());
                        state.record = Some(handle);
                        state.is_recording = true;
                        events.push(OccurrenceEvent::Opened { handle, row });
                    }
                }
            } else if state.is_recording {
                let expired = state
                    .last_active
                    .map_or(true, |last| now - last > self.debounce);
                if expired {
                    if let Some(event) = self.close(state.record.take()) {
                        events.push(event);
                    }
                    state.is_recording = false;
                }
            }
        }

        events
    }

    /// Close every open occurrence, as at the end of a session.
    pub fn close_all(&mut self, activities: &mut [Activity]) -> Vec<OccurrenceEvent> {
        let mut events = Vec::new();
        for activity in activities.iter_mut() {
            if activity.state.is_recording {
                if let Some(event) = self.close(activity.state.record.take()) {
                    events.push(event);
                }
            }
            activity.state.is_recording = false;
            activity.state.is_active = false;
        }
        events
    }

    fn close(&mut self, handle: Option<usize>) -> Option<OccurrenceEvent> {
        let handle = handle?;
        let row = self.open.remove(&handle)?;
        Some(OccurrenceEvent::Closed { handle, row })
    }

    /// Occurrences still open, oldest first.
    pub fn open_rows(&self) -> impl Iterator<Item = &OccurrenceRow> {
        self.open.values()
    }
}

/// Where the session machine stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording { since: DateTime<Utc> },
    /// Still recording, with a stop scheduled for `deadline`
    Stopping {
        since: DateTime<Utc>,
        deadline: DateTime<Utc>,
    },
}

impl SessionState {
    pub fn is_recording(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

/// Session transitions reported to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransition {
    Started { at: DateTime<Utc> },
    StopScheduled { deadline: DateTime<Utc> },
    StopCancelled { at: DateTime<Utc> },
    Stopped { at: DateTime<Utc> },
    /// The uptime watchdog fired; the host should restart the process
    RestartDue { at: DateTime<Utc> },
}

/// Presence-driven session machine plus the uptime watchdog.
#[derive(Debug, Clone)]
pub struct PresenceMonitor {
    stop_interval: Duration,
    restart_after: Duration,
    state: SessionState,
    restart_deadline: Option<DateTime<Utc>>,
    restart_requested: bool,
}

impl PresenceMonitor {
    pub fn new(stop_interval: std::time::Duration, restart_after: std::time::Duration) -> Self {
        Self {
            stop_interval: Duration::from_std(stop_interval).unwrap_or_else(|_| Duration::zero()),
            restart_after: Duration::from_std(restart_after).unwrap_or_else(|_| Duration::days(365 * 100)),
            state: SessionState::Idle,
            restart_deadline: None,
            restart_requested: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state.is_recording()
    }

    /// Feed this frame's tracked-person count.
    pub fn observe(&mut self, tracked: usize, now: DateTime<Utc>) -> Vec<SessionTransition> {
        let mut transitions = self.tick(now);

        match (self.state, tracked) {
            (SessionState::Idle, n) if n >= 1 => {
                self.state = SessionState::Recording { since: now };
                if self.restart_deadline.is_none() {
                    self.restart_deadline = now.checked_add_signed(self.restart_after);
                }
                transitions.push(SessionTransition::Started { at: now });
            }
            (SessionState::Recording { since }, 0) => {
                match now.checked_add_signed(self.stop_interval) {
                    Some(deadline) => {
                        self.state = SessionState::Stopping { since, deadline };
                        transitions.push(SessionTransition::StopScheduled { deadline });
                    }
                    None => debug!("Stop deadline out of range at {now}; still recording"),
                }
            }
            (SessionState::Stopping { since, .. }, n) if n >= 1 => {
                self.state = SessionState::Recording { since };
                transitions.push(SessionTransition::StopCancelled { at: now });
            }
            _ => {}
        }

        transitions
    }

    /// Fire timers that are due. Safe to call between frames.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<SessionTransition> {
        let mut transitions = Vec::new();

        if let SessionState::Stopping { deadline, .. } = self.state {
            if now >= deadline {
                self.state = SessionState::Idle;
                transitions.push(SessionTransition::Stopped { at: now });
            }
        }

        if !self.restart_requested {
            if let Some(deadline) = self.restart_deadline {
                if now >= deadline {
                    self.restart_requested = true;
                    transitions.push(SessionTransition::RestartDue { at: now });
                }
            }
        }

        transitions
    }

    /// Stop immediately, e.g. when the sensor goes away.
    pub fn force_stop(&mut self, now: DateTime<Utc>) -> Option<SessionTransition> {
        if self.state.is_recording() {
            self.state = SessionState::Idle;
            Some(SessionTransition::Stopped { at: now })
        } else {
            None
        }
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::activity::AreaSource;
    use crate::geometry::Rect2D;
    use crate::tracking::Orientation;
    use chrono::TimeZone;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn activity() -> Activity {
        Activity::new(
            "Reading",
            AreaSource::Static(Rect2D::new(0.0, 0.0, 100.0, 100.0)),
            Orientation::FRONT,
            1,
        )
        .unwrap()
    }

    fn run(recorder: &mut ActivityRecorder, activities: &mut [Activity], flags: &[(i64, bool)]) {
        for &(ms, active) in flags {
            activities[0].state.is_active = active;
            recorder.advance(activities, t(ms));
        }
    }

    #[test]
    fn test_short_dropout_keeps_one_occurrence() {
        let mut recorder = ActivityRecorder::new(std::time::Duration::from_millis(5000));
        let mut activities = vec![activity()];

        run(
            &mut recorder,
            &mut activities,
            &[(0, true), (1000, false), (2000, false), (3000, true)],
        );

        let open: Vec<_> = recorder.open_rows().collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].start, t(0));
        assert_eq!(open[0].end, t(3000));
        assert!(activities[0].state.is_recording);
    }

    #[test]
    fn test_long_gap_splits_occurrences() {
        let mut recorder = ActivityRecorder::new(std::time::Duration::from_millis(5000));
        let mut activities = vec![activity()];

        run(&mut recorder, &mut activities, &[(0, true), (1000, true), (5000, false)]);
        assert!(activities[0].state.is_recording);

        // Exactly at the window edge the occurrence is still open.
        run(&mut recorder, &mut activities, &[(6000, false)]);
        assert!(activities[0].state.is_recording);

        activities[0].state.is_active = false;
        let events = recorder.advance(&mut activities, t(6001));
        assert_eq!(
            events,
            vec![OccurrenceEvent::Closed {
                handle: 0,
                row: OccurrenceRow {
                    activity: "Reading".to_string(),
                    start: t(0),
                    end: t(1000),
                },
            }]
        );
        assert!(!activities[0].state.is_recording);
        assert_eq!(activities[0].state.record, None);
        assert_eq!(recorder.open_rows().count(), 0);

        run(&mut recorder, &mut activities, &[(9000, true)]);
        assert_eq!(recorder.open_rows().count(), 1);
        assert_eq!(activities[0].state.record, Some(1));
    }

    #[test]
    fn test_close_all() {
        let mut recorder = ActivityRecorder::new(std::time::Duration::from_millis(5000));
        let mut activities = vec![activity()];
        run(&mut recorder, &mut activities, &[(0, true), (500, true)]);

        let events = recorder.close_all(&mut activities);
        assert_eq!(events.len(), 1);
        assert_eq!(recorder.open_rows().count(), 0);
        assert!(!activities[0].state.is_recording);
        assert!(recorder.close_all(&mut activities).is_empty());
    }

    #[test]
    fn test_presence_start_and_stop() {
        let mut monitor = PresenceMonitor::new(
            std::time::Duration::from_millis(5000),
            std::time::Duration::from_secs(3600),
        );

        assert!(monitor.observe(0, t(0)).is_empty());
        assert_eq!(monitor.observe(1, t(100)), vec![SessionTransition::Started { at: t(100) }]);
        assert_eq!(
            monitor.observe(0, t(200)),
            vec![SessionTransition::StopScheduled { deadline: t(5200) }]
        );
        assert!(monitor.is_recording());

        // Still empty: no reschedule.
        assert!(monitor.observe(0, t(3000)).is_empty());
        assert_eq!(monitor.tick(t(5200)), vec![SessionTransition::Stopped { at: t(5200) }]);
        assert_eq!(monitor.state(), SessionState::Idle);
    }

    #[test]
    fn test_presence_stop_cancelled() {
        let mut monitor = PresenceMonitor::new(
            std::time::Duration::from_millis(5000),
            std::time::Duration::from_secs(3600),
        );
        monitor.observe(2, t(0));
        monitor.observe(0, t(1000));
        assert_eq!(
            monitor.observe(1, t(4000)),
            vec![SessionTransition::StopCancelled { at: t(4000) }]
        );
        assert!(monitor.tick(t(7000)).is_empty());

        // The interval starts over on the next absence.
        assert_eq!(
            monitor.observe(0, t(8000)),
            vec![SessionTransition::StopScheduled { deadline: t(13000) }]
        );
    }

    #[test]
    fn test_watchdog_after_recording_starts() {
        let mut monitor = PresenceMonitor::new(
            std::time::Duration::from_millis(5000),
            std::time::Duration::from_secs(60),
        );

        assert!(monitor.tick(t(120_000)).is_empty());

        monitor.observe(1, t(120_000));
        assert!(monitor.tick(t(150_000)).is_empty());
        assert_eq!(
            monitor.tick(t(180_000)),
            vec![SessionTransition::RestartDue { at: t(180_000) }]
        );
        assert!(monitor.restart_requested());
        assert!(monitor.tick(t(240_000)).is_empty());
    }

    #[test]
    fn test_force_stop() {
        let mut monitor = PresenceMonitor::new(
            std::time::Duration::from_millis(5000),
            std::time::Duration::from_secs(3600),
        );
        assert!(monitor.force_stop(t(0)).is_none());
        monitor.observe(1, t(0));
        assert_eq!(monitor.force_stop(t(10)), Some(SessionTransition::Stopped { at: t(10) }));
    }

    #[test]
    fn test_stop_deadline_past_time_range_keeps_recording() {
        let mut monitor = PresenceMonitor::new(
            std::time::Duration::from_millis(5000),
            std::time::Duration::from_secs(3600),
        );
        let late = DateTime::<Utc>::MAX_UTC - Duration::seconds(1);

        assert_eq!(monitor.observe(1, late), vec![SessionTransition::Started { at: late }]);
        assert!(monitor.observe(0, late).is_empty());
        assert!(monitor.is_recording());
        assert!(!monitor.restart_requested());
    }
}
