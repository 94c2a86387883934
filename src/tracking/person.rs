//! Per-slot person state and the orientation flag set.

use crate::geometry::Point2D;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Facing direction relative to the sensor, as a 4-bit flag set.
///
/// A person holds exactly one flag; an activity may ask for any subset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Orientation(u8);

impl Orientation {
    pub const NONE: Orientation = Orientation(0);
    pub const FRONT: Orientation = Orientation(0x01);
    pub const LEFT: Orientation = Orientation(0x02);
    pub const RIGHT: Orientation = Orientation(0x04);
    pub const BACK: Orientation = Orientation(0x08);
    pub const ALL: Orientation = Orientation(0x0f);

    /// Build a mask from raw bits, or `None` if any unknown bit is set.
    pub fn from_bits(bits: u32) -> Option<Self> {
        if bits & !(Self::ALL.0 as u32) != 0 {
            None
        } else {
            Some(Orientation(bits as u8))
        }
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when the two sets share at least one direction.
    pub fn intersects(self, other: Orientation) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Orientation {
    type Output = Orientation;

    fn bitor(self, rhs: Orientation) -> Orientation {
        Orientation(self.0 | rhs.0)
    }
}

impl BitOrAssign for Orientation {
    fn bitor_assign(&mut self, rhs: Orientation) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::FRONT, "Front"),
            (Self::LEFT, "Left"),
            (Self::RIGHT, "Right"),
            (Self::BACK, "Back"),
        ]
        .iter()
        .filter(|(flag, _)| self.intersects(*flag))
        .map(|(_, name)| *name)
        .collect();

        if names.is_empty() {
            write!(f, "None")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// State of one tracking slot.
///
/// Created once per slot at startup and overwritten by the pipeline every
/// frame; never destroyed while the agent runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub tracked: bool,
    pub id: u64,
    /// Head position on the ground plane (cm)
    pub position: Point2D,
    pub orientation: Orientation,
    /// Postures currently detected, in detection order
    pub postures: Vec<String>,
    /// Newline-prefixed names of the activities this person is performing
    pub activities: String,
}

impl Default for Person {
    fn default() -> Self {
        Self {
            tracked: false,
            id: 0,
            position: Point2D::default(),
            orientation: Orientation::FRONT,
            postures: Vec::new(),
            activities: String::new(),
        }
    }
}

impl Person {
    /// A tracked person, mostly useful for tests and replay tooling.
    pub fn tracked_at(id: u64, position: Point2D, orientation: Orientation) -> Self {
        Self {
            tracked: true,
            id,
            position,
            orientation,
            ..Self::default()
        }
    }

    pub fn has_posture(&self, name: &str) -> bool {
        self.postures.iter().any(|p| p == name)
    }
}

/// Number of tracked persons.
pub fn tracked_count(persons: &[Person]) -> usize {
    persons.iter().filter(|p| p.tracked).count()
}
