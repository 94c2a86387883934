//! The per-frame driver.
//!
//! `FramePipeline` owns all per-session state and advances it once per
//! tracking frame, in a fixed order:
//!
//! 1. apply finished template scans,
//! 2. update every person from its tracking slot,
//! 3. advance the presence (session) machine,
//! 4. evaluate activities,
//! 5. advance occurrences,
//! 6. emit records.
//!
//! Nothing here blocks on the localizer or the object detector; both run on
//! their own threads and are only read from here.

use crate::config::Config;
use crate::core::activity::Activity;
use crate::core::lifecycle::{
    ActivityRecorder, OccurrenceEvent, OccurrenceRow, PresenceMonitor, SessionState,
    SessionTransition,
};
use crate::core::rules::{decide_activity_status, decide_activity_text_for_people, EvalContext};
use crate::error::LocalizerError;
use crate::geometry::{
    count_zero_in_square, rotate_back_from_tilt, to_ground_plane, CameraPoint, DisplayFrame,
};
use crate::localizer::{LocatedTemplate, TemplateLocalizer, TemplateSet};
use crate::objects::{ObjectDetector, ObjectTable, SharedObjectTable};
use crate::record::RecordSink;
use crate::stats::{create_shared_log, SharedSessionLog};
use crate::tracking::{
    tracked_count, BodyFrame, BodySlot, DepthImage, OrientationClassifier, Person,
    SharedPostureBoard, TrackingEvent,
};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

/// Something the pipeline wants its host to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    SensorConnected { at: DateTime<Utc> },
    /// The body tracker went away; persons are untracked until it returns
    SensorUnavailable { at: DateTime<Utc> },
    SessionStarted { at: DateTime<Utc> },
    StopScheduled { deadline: DateTime<Utc> },
    StopCancelled { at: DateTime<Utc> },
    SessionStopped { at: DateTime<Utc> },
    OccurrenceOpened { activity: String, start: DateTime<Utc> },
    OccurrenceClosed(OccurrenceRow),
    TemplatesLocated(Vec<LocatedTemplate>),
    /// The uptime watchdog fired; the host should restart
    RestartRequested { at: DateTime<Utc> },
}

/// Frame-driven activity inference.
pub struct FramePipeline {
    tilt_degrees: f64,
    display: DisplayFrame,
    occlusion_window: usize,
    scan_interval: Duration,
    classifier: OrientationClassifier,
    persons: Vec<Person>,
    activities: Vec<Activity>,
    templates: TemplateSet,
    localizer: Option<TemplateLocalizer>,
    latest_cloud: Option<Vec<CameraPoint>>,
    last_scan_request: Option<DateTime<Utc>>,
    objects: SharedObjectTable,
    detector: Option<ObjectDetector>,
    postures: Option<SharedPostureBoard>,
    recorder: ActivityRecorder,
    presence: PresenceMonitor,
    sink: Box<dyn RecordSink>,
    stats: SharedSessionLog,
    sensor_available: bool,
}

impl FramePipeline {
    /// Create a pipeline with no localizer, detector or posture source attached.
    pub fn new(config: &Config, activities: Vec<Activity>, sink: Box<dyn RecordSink>) -> Self {
        Self {
            tilt_degrees: config.tilt_degrees,
            display: config.display,
            occlusion_window: config.orientation.occlusion_window,
            scan_interval: Duration::from_std(config.localizer.interval)
                .unwrap_or_else(|_| Duration::seconds(10)),
            classifier: OrientationClassifier::new(&config.orientation, config.display.height),
            persons: Vec::new(),
            activities,
            templates: TemplateSet::new(),
            localizer: None,
            latest_cloud: None,
            last_scan_request: None,
            objects: ObjectTable::shared(&config.objects.objects),
            detector: None,
            postures: None,
            recorder: ActivityRecorder::new(config.session.activity_debounce),
            presence: PresenceMonitor::new(
                config.session.stop_interval,
                config.session.restart_after,
            ),
            sink,
            stats: create_shared_log(),
            sensor_available: true,
        }
    }

    pub fn with_localizer(mut self, localizer: TemplateLocalizer) -> Self {
        self.localizer = Some(localizer);
        self
    }

    /// Attach an object detector. Its table replaces the pipeline's own.
    pub fn with_object_detector(mut self, detector: ObjectDetector) -> Self {
        self.objects = detector.table().clone();
        self.detector = Some(detector);
        self
    }

    /// Read object state from a table fed elsewhere.
    pub fn with_object_table(mut self, objects: SharedObjectTable) -> Self {
        self.objects = objects;
        self
    }

    pub fn with_posture_board(mut self, board: SharedPostureBoard) -> Self {
        self.postures = Some(board);
        self.warn_unknown_postures();
        self
    }

    pub fn with_stats(mut self, stats: SharedSessionLog) -> Self {
        self.stats = stats;
        self
    }

    /// Handle one event from the body tracker.
    pub fn handle(&mut self, event: TrackingEvent) -> Vec<PipelineEvent> {
        match event {
            TrackingEvent::Frame(frame) => self.process_frame(frame),
            TrackingEvent::Connected { timestamp } => self.sensor_connected(timestamp),
            TrackingEvent::Disconnected { timestamp } => self.sensor_unavailable(timestamp),
        }
    }

    /// Run one frame through every stage.
    pub fn process_frame(&mut self, frame: BodyFrame) -> Vec<PipelineEvent> {
        let now = frame.timestamp;
        let mut events = Vec::new();

        if !self.sensor_available {
            events.extend(self.sensor_connected(now));
        }

        self.apply_scan_results(&mut events);

        if let Some(cloud) = frame.point_cloud {
            self.latest_cloud = Some(cloud);
        }
        self.update_persons(&frame.bodies, frame.depth.as_ref());

        let tracked = tracked_count(&self.persons);
        let transitions = self.presence.observe(tracked, now);
        self.apply_transitions(transitions, &mut events);

        if self.presence.is_recording() {
            let ctx = EvalContext::new(self.display, &self.templates, &self.objects);
            decide_activity_text_for_people(&self.activities, &mut self.persons, &ctx);
            decide_activity_status(&mut self.activities, &self.persons, &ctx);

            let occurrences = self.recorder.advance(&mut self.activities, now);
            self.emit_occurrences(occurrences, &mut events);

            if let Err(e) = self.sink.record_frame(now, &self.activities, &self.persons) {
                warn!("Failed to write frame records: {e}");
            }
        }

        self.schedule_scan(now);
        self.stats.record_frame(tracked);
        events
    }

    /// Fire timers between frames.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        self.apply_scan_results(&mut events);
        let transitions = self.presence.tick(now);
        self.apply_transitions(transitions, &mut events);
        self.schedule_scan(now);
        events
    }

    /// Ask for a template scan of the latest point cloud now.
    pub fn request_localization(&mut self, now: DateTime<Utc>) -> Result<(), LocalizerError> {
        let localizer = self.localizer.as_ref().ok_or(LocalizerError::Disabled)?;
        let cloud = self.latest_cloud.clone().ok_or(LocalizerError::NoPointCloud)?;
        localizer.request(cloud)?;
        self.last_scan_request = Some(now);
        Ok(())
    }

    /// Close the session, e.g. on shutdown.
    pub fn shutdown(&mut self, now: DateTime<Utc>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        if let Some(transition) = self.presence.force_stop(now) {
            self.apply_transitions(vec![transition], &mut events);
        }
        if let Some(detector) = self.detector.as_mut() {
            detector.stop();
        }
        if let Err(e) = self.stats.save() {
            warn!("Failed to save session stats: {e}");
        }
        events
    }

    /// Swap the activity catalogue, closing anything still open.
    pub fn replace_activities(&mut self, activities: Vec<Activity>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        let closed = self.recorder.close_all(&mut self.activities);
        self.emit_occurrences(closed, &mut events);
        self.activities = activities;
        for activity in &mut self.activities {
            activity.reset_state();
        }
        self.warn_unknown_postures();
        events
    }

    pub fn clear_activities(&mut self) -> Vec<PipelineEvent> {
        self.replace_activities(Vec::new())
    }

    pub fn persons(&self) -> &[Person] {
        &self.persons
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    pub fn objects(&self) -> &SharedObjectTable {
        &self.objects
    }

    /// Occurrences not yet closed. Closed ones live only in the sink.
    pub fn open_occurrences(&self) -> Vec<&OccurrenceRow> {
        self.recorder.open_rows().collect()
    }

    /// `(activity, posture)` pairs naming a posture the board never reports.
    pub fn unknown_postures(&self) -> Vec<(String, String)> {
        let Some(board) = &self.postures else {
            return Vec::new();
        };
        let catalog = board.catalog();
        self.activities
            .iter()
            .flat_map(|a| {
                a.postures
                    .iter()
                    .filter(|p| !catalog.contains(p))
                    .map(move |p| (a.name.clone(), p.clone()))
            })
            .collect()
    }

    fn warn_unknown_postures(&self) {
        for (activity, posture) in self.unknown_postures() {
            warn!("Activity {activity} requires unknown posture {posture}; it can never match");
        }
    }

    pub fn session_state(&self) -> SessionState {
        self.presence.state()
    }

    pub fn is_recording(&self) -> bool {
        self.presence.is_recording()
    }

    pub fn is_sensor_available(&self) -> bool {
        self.sensor_available
    }

    pub fn restart_requested(&self) -> bool {
        self.presence.restart_requested()
    }

    pub fn stats(&self) -> &SharedSessionLog {
        &self.stats
    }

    fn sensor_connected(&mut self, at: DateTime<Utc>) -> Vec<PipelineEvent> {
        if !self.sensor_available {
            info!("Body tracker connected");
        }
        self.sensor_available = true;
        vec![PipelineEvent::SensorConnected { at }]
    }

    fn sensor_unavailable(&mut self, at: DateTime<Utc>) -> Vec<PipelineEvent> {
        warn!("Body tracker unavailable; suspending evaluation");
        self.sensor_available = false;
        self.stats.record_sensor_disconnect();

        for person in &mut self.persons {
            person.tracked = false;
        }

        let mut events = vec![PipelineEvent::SensorUnavailable { at }];
        if let Some(transition) = self.presence.force_stop(at) {
            self.apply_transitions(vec![transition], &mut events);
        }
        events
    }

    fn apply_scan_results(&mut self, events: &mut Vec<PipelineEvent>) {
        let Some(result) = self.localizer.as_ref().and_then(|l| l.try_collect()) else {
            return;
        };

        self.templates.apply(&result);
        self.stats.record_localizer_scan();
        events.push(PipelineEvent::TemplatesLocated(result.placements));
    }

    fn schedule_scan(&mut self, now: DateTime<Utc>) {
        let Some(localizer) = self.localizer.as_ref() else {
            return;
        };
        let due = self
            .last_scan_request
            .map_or(true, |last| now - last >= self.scan_interval);
        if !due || localizer.is_processing() {
            return;
        }
        let Some(cloud) = self.latest_cloud.clone() else {
            return;
        };

        match localizer.request(cloud) {
            Ok(()) => self.last_scan_request = Some(now),
            Err(e) => debug!("Template scan not started: {e}"),
        }
    }

    fn update_persons(&mut self, bodies: &[BodySlot], depth: Option<&DepthImage>) {
        if self.persons.len() < bodies.len() {
            self.persons.resize_with(bodies.len(), Person::default);
        }

        for (slot, person) in self.persons.iter_mut().enumerate() {
            let body = bodies.get(slot).filter(|b| b.tracked);
            let Some((body, head)) = body.and_then(|b| b.joints.head.map(|h| (b, h))) else {
                person.tracked = false;
                continue;
            };

            person.tracked = true;
            person.id = body.tracking_id;
            person.position = to_ground_plane(head, self.tilt_degrees);

            if let (Some(left), Some(right)) = (body.joints.shoulder_left, body.joints.shoulder_right) {
                let occlusion = match (depth, body.head_depth) {
                    (Some(image), Some(center)) => {
                        count_zero_in_square(&image.pixels, image.width, center, self.occlusion_window)
                    }
                    _ => 0,
                };
                let classified = self.classifier.classify(
                    rotate_back_from_tilt(left, self.tilt_degrees),
                    rotate_back_from_tilt(right, self.tilt_degrees),
                    person.position.y,
                    occlusion,
                );
                if let Some(orientation) = classified {
                    person.orientation = orientation;
                }
            }

            if let Some(board) = &self.postures {
                person.postures = board.postures(slot);
            }
        }
    }

    fn apply_transitions(
        &mut self,
        transitions: Vec<SessionTransition>,
        events: &mut Vec<PipelineEvent>,
    ) {
        for transition in transitions {
            match transition {
                SessionTransition::Started { at } => {
                    info!("Recording session started");
                    self.stats.record_session_started();
                    if let Err(e) = self.sink.begin_session(at) {
                        warn!("Failed to open session records: {e}");
                    }
                    if let Some(detector) = self.detector.as_mut() {
                        if let Err(e) = detector.start() {
                            warn!("Object detector not started: {e}");
                        }
                    }
                    events.push(PipelineEvent::SessionStarted { at });
                }
                SessionTransition::StopScheduled { deadline } => {
                    debug!("Room empty; stopping at {deadline}");
                    events.push(PipelineEvent::StopScheduled { deadline });
                }
                SessionTransition::StopCancelled { at } => {
                    debug!("Stop cancelled");
                    events.push(PipelineEvent::StopCancelled { at });
                }
                SessionTransition::Stopped { at } => {
                    info!("Recording session stopped");
                    let closed = self.recorder.close_all(&mut self.activities);
                    self.emit_occurrences(closed, events);
                    if let Err(e) = self.sink.end_session() {
                        warn!("Failed to close session records: {e}");
                    }
                    if let Some(detector) = self.detector.as_mut() {
                        detector.stop();
                    }
                    events.push(PipelineEvent::SessionStopped { at });
                }
                SessionTransition::RestartDue { at } => {
                    warn!("Uptime limit reached; restart requested");
                    events.push(PipelineEvent::RestartRequested { at });
                }
            }
        }
    }

    fn emit_occurrences(&mut self, occurrences: Vec<OccurrenceEvent>, events: &mut Vec<PipelineEvent>) {
        for occurrence in occurrences {
            match occurrence {
                OccurrenceEvent::Opened { row, .. } => {
                    debug!("{} started", row.activity);
                    events.push(PipelineEvent::OccurrenceOpened {
                        activity: row.activity,
                        start: row.start,
                    });
                }
                OccurrenceEvent::Closed { row, .. } => {
                    debug!("{} ended after {}s", row.activity, row.duration().num_seconds());
                    if let Err(e) = self.sink.record_occurrence(&row) {
                        warn!("Failed to write occurrence: {e}");
                    }
                    self.stats.record_occurrences(1);
                    events.push(PipelineEvent::OccurrenceClosed(row));
                }
            }
        }
    }
}
