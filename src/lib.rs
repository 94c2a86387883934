//! Activity Sensor Agent - infers what people are doing in a room from a
//! depth sensor's body tracking.
//!
//! Each tracking frame yields a set of persons (ground position, facing,
//! postures). Activities are rules over those persons: an area, allowed
//! orientations, a minimum head count, optional postures, tagged objects in
//! use and multi-person requirements. Areas are either fixed rectangles or
//! the located position of a furniture template.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Activity Sensor Agent                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │  Tracking   │──▶│  Pipeline   │──▶│   Rules     │             │
//! │  │  (frames)   │   │ (per frame) │   │ (evaluate)  │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! │                      │   ▲    ▲             │                     │
//! │                      ▼   │    │             ▼                     │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │  Localizer  │──▶│  Templates  │   │  Lifecycle  │──▶ Records  │
//! │  │ (SAD scan)  │   │  (areas)    │   │ (sessions)  │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! │  ┌─────────────┐          │                 │                     │
//! │  │  Objects    │──────────┘                 ▼                     │
//! │  │  (RFID)     │                      ┌─────────────┐             │
//! │  └─────────────┘                      │    Stats    │             │
//! │                                       └─────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use activity_sensor_agent::{catalog, config::Config, core::RequirementRegistry};
//! use activity_sensor_agent::pipeline::FramePipeline;
//! use activity_sensor_agent::record::CsvFileSink;
//!
//! let config = Config::load().unwrap_or_default();
//! let activities = catalog::load_activities(&config.activities_path, &RequirementRegistry::default())
//!     .expect("Failed to load activities");
//!
//! let sink = Box::new(CsvFileSink::new(&config.records_path));
//! let mut pipeline = FramePipeline::new(&config, activities, sink);
//!
//! // Feed tracking events with pipeline.handle(event)
//! ```

pub mod catalog;
pub mod config;
pub mod core;
pub mod error;
pub mod geometry;
pub mod localizer;
pub mod objects;
pub mod pipeline;
pub mod record;
pub mod stats;
pub mod tracking;

// Re-export key types at crate root for convenience
pub use config::Config;
pub use core::{Activity, AreaSource, OccurrenceRow, RequirementRegistry, SessionState};
pub use geometry::{CameraPoint, DisplayFrame, Point2D, Rect2D};
pub use localizer::{TemplateLocalizer, TemplateSet};
pub use objects::{ObjectDetector, ObjectTable};
pub use pipeline::{FramePipeline, PipelineEvent};
pub use record::{CsvFileSink, MemorySink, RecordSink};
pub use stats::{SessionLog, SharedSessionLog};
pub use tracking::{BodyFrame, Orientation, Person, TrackingEvent};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
