//! Body-tracking frame types delivered by the sensor collaborator.
//!
//! Only the joints the pipeline actually uses are carried: head, neck and the
//! two shoulders. Raw depth data is optional and only needed for the head
//! occlusion count and for template localization scans.

use crate::geometry::{CameraPoint, DepthPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Joints of one tracked body, in sensor space (metres).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Joints {
    pub head: Option<CameraPoint>,
    pub neck: Option<CameraPoint>,
    pub shoulder_left: Option<CameraPoint>,
    pub shoulder_right: Option<CameraPoint>,
}

/// One tracking slot as reported for a single frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BodySlot {
    /// Whether the slot currently holds a tracked body
    pub tracked: bool,
    /// Stable identity assigned by the tracker (0 when untracked)
    pub tracking_id: u64,
    #[serde(default)]
    pub joints: Joints,
    /// Head joint projected into the depth image, when the mapper could do it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_depth: Option<DepthPoint>,
}

impl BodySlot {
    /// A tracked body with the given id and joints.
    pub fn tracked(tracking_id: u64, joints: Joints) -> Self {
        Self {
            tracked: true,
            tracking_id,
            joints,
            head_depth: None,
        }
    }

    /// An empty slot.
    pub fn untracked() -> Self {
        Self::default()
    }
}

/// A raw depth image (millimetres, 0 = no reading).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u16>,
}

/// One frame from the body tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyFrame {
    /// Wall-clock time the frame arrived
    pub timestamp: DateTime<Utc>,
    /// One entry per tracking slot, in slot order
    pub bodies: Vec<BodySlot>,
    /// Depth image for the occlusion count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<DepthImage>,
    /// Depth image mapped to sensor space, for template localization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_cloud: Option<Vec<CameraPoint>>,
}

impl BodyFrame {
    /// A frame carrying only body data.
    pub fn new(timestamp: DateTime<Utc>, bodies: Vec<BodySlot>) -> Self {
        Self {
            timestamp,
            bodies,
            depth: None,
            point_cloud: None,
        }
    }
}

/// Everything the body-tracking collaborator can tell the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackingEvent {
    Frame(BodyFrame),
    Connected { timestamp: DateTime<Utc> },
    Disconnected { timestamp: DateTime<Utc> },
}

impl TrackingEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TrackingEvent::Frame(f) => f.timestamp,
            TrackingEvent::Connected { timestamp } => *timestamp,
            TrackingEvent::Disconnected { timestamp } => *timestamp,
        }
    }
}
