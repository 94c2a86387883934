//! Tracking layer: frames from the body tracker and the per-person state
//! derived from them.

pub mod orientation;
pub mod person;
pub mod posture;
pub mod types;

pub use orientation::OrientationClassifier;
pub use person::{tracked_count, Orientation, Person};
pub use posture::{PostureBoard, SharedPostureBoard};
pub use types::{BodyFrame, BodySlot, DepthImage, Joints, TrackingEvent};
