//! Record emission.
//!
//! While a session records, every frame produces one activity line per
//! activity and one position line per tracked person. Closed occurrences
//! are written as `name, start, end` rows. The file sink names its files
//! after the local session start time, one directory per record kind.

use crate::core::activity::Activity;
use crate::core::lifecycle::OccurrenceRow;
use crate::error::RecordError;
use crate::tracking::Person;
use chrono::{DateTime, Local, Utc};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Something that keeps the records of a session.
pub trait RecordSink: Send {
    /// A recording session started.
    fn begin_session(&mut self, started_at: DateTime<Utc>) -> Result<(), RecordError>;

    /// Per-frame activity flags and tracked positions.
    fn record_frame(
        &mut self,
        at: DateTime<Utc>,
        activities: &[Activity],
        persons: &[Person],
    ) -> Result<(), RecordError>;

    /// An occurrence was closed.
    fn record_occurrence(&mut self, row: &OccurrenceRow) -> Result<(), RecordError>;

    /// The session ended.
    fn end_session(&mut self) -> Result<(), RecordError>;
}

fn clock(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// File stem for a session, e.g. `5-1-2024_09-00-00`.
pub fn session_file_stem(started_at: DateTime<Utc>) -> String {
    started_at
        .with_timezone(&Local)
        .format("%-m-%-d-%Y_%H-%M-%S")
        .to_string()
}

pub fn activity_line(activity: &Activity, at: DateTime<Utc>) -> String {
    format!("{}, {}, {}", activity.name, clock(at), activity.state.is_active)
}

pub fn position_line(person: &Person, at: DateTime<Utc>) -> String {
    format!(
        "{}, {}, {}, {}",
        person.id,
        clock(at),
        person.position.x,
        person.position.y
    )
}

pub fn occurrence_line(row: &OccurrenceRow) -> String {
    format!("{}, {}, {}", row.activity, clock(row.start), clock(row.end))
}

/// Records kept in memory, for tests and replay summaries.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecords {
    pub sessions: Vec<DateTime<Utc>>,
    pub activity_lines: Vec<String>,
    pub position_lines: Vec<String>,
    pub occurrences: Vec<OccurrenceRow>,
    pub open: bool,
}

/// In-memory sink. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<MemoryRecords>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn records(&self) -> MemoryRecords {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn with<R>(&self, f: impl FnOnce(&mut MemoryRecords) -> R) -> R {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut records)
    }
}

impl RecordSink for MemorySink {
    fn begin_session(&mut self, started_at: DateTime<Utc>) -> Result<(), RecordError> {
        self.with(|r| {
            r.sessions.push(started_at);
            r.open = true;
        });
        Ok(())
    }

    fn record_frame(
        &mut self,
        at: DateTime<Utc>,
        activities: &[Activity],
        persons: &[Person],
    ) -> Result<(), RecordError> {
        self.with(|r| {
            if !r.open {
                return Err(RecordError::NoSession);
            }
            r.activity_lines
                .extend(activities.iter().map(|a| activity_line(a, at)));
            r.position_lines.extend(
                persons
                    .iter()
                    .filter(|p| p.tracked)
                    .map(|p| position_line(p, at)),
            );
            Ok(())
        })
    }

    fn record_occurrence(&mut self, row: &OccurrenceRow) -> Result<(), RecordError> {
        self.with(|r| r.occurrences.push(row.clone()));
        Ok(())
    }

    fn end_session(&mut self) -> Result<(), RecordError> {
        self.with(|r| r.open = false);
        Ok(())
    }
}

struct SessionFiles {
    activity: BufWriter<File>,
    position: BufWriter<File>,
    occurrence: BufWriter<File>,
}

impl SessionFiles {
    fn open(root: &Path, stem: &str) -> Result<Self, RecordError> {
        let open = |kind: &str| -> Result<BufWriter<File>, RecordError> {
            let dir = root.join(kind);
            std::fs::create_dir_all(&dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(format!("{stem}.csv")))?;
            Ok(BufWriter::new(file))
        };

        Ok(Self {
            activity: open("activity")?,
            position: open("position")?,
            occurrence: open("occurrence")?,
        })
    }

    fn flush(&mut self) -> Result<(), RecordError> {
        self.activity.flush()?;
        self.position.flush()?;
        self.occurrence.flush()?;
        Ok(())
    }
}

/// Appends records to per-session CSV files under a root directory.
pub struct CsvFileSink {
    root: PathBuf,
    files: Option<SessionFiles>,
    stem: Option<String>,
}

impl CsvFileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: None,
            stem: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File stem of the open session.
    pub fn session_stem(&self) -> Option<&str> {
        self.stem.as_deref()
    }

    fn files(&mut self) -> Result<&mut SessionFiles, RecordError> {
        self.files.as_mut().ok_or(RecordError::NoSession)
    }
}

impl RecordSink for CsvFileSink {
    fn begin_session(&mut self, started_at: DateTime<Utc>) -> Result<(), RecordError> {
        if self.files.is_some() {
            self.end_session()?;
        }

        let stem = session_file_stem(started_at);
        self.files = Some(SessionFiles::open(&self.root, &stem)?);
        info!("Recording to {}/*/{stem}.csv", self.root.display());
        self.stem = Some(stem);
        Ok(())
    }

    fn record_frame(
        &mut self,
        at: DateTime<Utc>,
        activities: &[Activity],
        persons: &[Person],
    ) -> Result<(), RecordError> {
        let files = self.files()?;
        for activity in activities {
            writeln!(files.activity, "{}", activity_line(activity, at))?;
        }
        for person in persons.iter().filter(|p| p.tracked) {
            writeln!(files.position, "{}", position_line(person, at))?;
        }
        files.activity.flush()?;
        files.position.flush()?;
        Ok(())
    }

    fn record_occurrence(&mut self, row: &OccurrenceRow) -> Result<(), RecordError> {
        let files = self.files()?;
        writeln!(files.occurrence, "{}", occurrence_line(row))?;
        files.occurrence.flush()?;
        Ok(())
    }

    fn end_session(&mut self) -> Result<(), RecordError> {
        if let Some(mut files) = self.files.take() {
            files.flush()?;
            debug!("Closed record files for {:?}", self.stem);
        }
        self.stem = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::activity::AreaSource;
    use crate::geometry::{Point2D, Rect2D};
    use crate::tracking::Orientation;
    use chrono::TimeZone;

    fn activity(active: bool) -> Activity {
        let mut a = Activity::new(
            "Reading",
            AreaSource::Static(Rect2D::new(0.0, 0.0, 100.0, 100.0)),
            Orientation::FRONT,
            1,
        )
        .unwrap();
        a.state.is_active = active;
        a
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_line_formats() {
        let person = Person::tracked_at(72057594037928000, Point2D::new(-12.5, 230.0), Orientation::FRONT);
        let t = clock(at());

        assert_eq!(activity_line(&activity(true), at()), format!("Reading, {t}, true"));
        assert_eq!(
            position_line(&person, at()),
            format!("72057594037928000, {t}, -12.5, 230")
        );
        assert_eq!(t.len(), 8);

        let stem = session_file_stem(at());
        assert!(stem.ends_with(&at().with_timezone(&Local).format("_%H-%M-%S").to_string()));
        assert!(!stem.starts_with('0'));
    }

    #[test]
    fn test_memory_sink_requires_session() {
        let mut sink = MemorySink::new();
        assert!(matches!(
            sink.record_frame(at(), &[activity(false)], &[]),
            Err(RecordError::NoSession)
        ));

        sink.begin_session(at()).unwrap();
        let persons = vec![
            Person::tracked_at(1, Point2D::new(0.0, 100.0), Orientation::FRONT),
            Person::default(),
        ];
        sink.record_frame(at(), &[activity(false)], &persons).unwrap();

        let records = sink.clone().records();
        assert_eq!(records.activity_lines.len(), 1);
        assert_eq!(records.position_lines.len(), 1);
    }

    #[test]
    fn test_csv_sink_writes_session_files() {
        let root = std::env::temp_dir().join(format!("activity-records-{}", uuid::Uuid::new_v4()));
        let mut sink = CsvFileSink::new(&root);

        assert!(matches!(
            sink.record_occurrence(&OccurrenceRow {
                activity: "Reading".to_string(),
                start: at(),
                end: at(),
            }),
            Err(RecordError::NoSession)
        ));

        sink.begin_session(at()).unwrap();
        let stem = sink.session_stem().unwrap().to_string();

        let persons = vec![Person::tracked_at(7, Point2D::new(1.0, 2.0), Orientation::FRONT)];
        sink.record_frame(at(), &[activity(true)], &persons).unwrap();
        sink.record_occurrence(&OccurrenceRow {
            activity: "Reading".to_string(),
            start: at(),
            end: at() + chrono::Duration::seconds(3),
        })
        .unwrap();
        sink.end_session().unwrap();

        let read = |kind: &str| {
            std::fs::read_to_string(root.join(kind).join(format!("{stem}.csv"))).unwrap()
        };
        assert_eq!(read("activity").lines().count(), 1);
        assert!(read("position").starts_with("7, "));
        assert!(read("occurrence").starts_with("Reading, "));

        let _ = std::fs::remove_dir_all(&root);
    }
}
