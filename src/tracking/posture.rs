//! Shared posture state written by the posture collaborator.
//!
//! The gesture recognizer runs on its own callback cadence and replaces a
//! slot's posture set whenever it has a new result. The pipeline copies the
//! sets into each `Person` at the start of a frame and never writes back.

use std::sync::{Arc, RwLock};

/// Per-slot posture sets plus the catalogue of known posture names.
#[derive(Debug, Default)]
pub struct PostureBoard {
    catalog: Vec<String>,
    slots: RwLock<Vec<Vec<String>>>,
}

/// Thread-safe shared posture board.
pub type SharedPostureBoard = Arc<PostureBoard>;

impl PostureBoard {
    /// Create a board for `slot_count` tracking slots.
    pub fn new(catalog: Vec<String>, slot_count: usize) -> Self {
        Self {
            catalog,
            slots: RwLock::new(vec![Vec::new(); slot_count]),
        }
    }

    /// Names of every posture the recognizer knows about.
    pub fn catalog(&self) -> &[String] {
        &self.catalog
    }

    /// Replace the detected postures for a slot. Out-of-range slots are ignored.
    pub fn replace(&self, slot: usize, postures: Vec<String>) {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = slots.get_mut(slot) {
            let mut unique = Vec::with_capacity(postures.len());
            for name in postures {
                if !unique.contains(&name) {
                    unique.push(name);
                }
            }
            *entry = unique;
        }
    }

    /// Clear a slot, e.g. when its body stops being tracked.
    pub fn clear(&self, slot: usize) {
        self.replace(slot, Vec::new());
    }

    /// Current postures for a slot.
    pub fn postures(&self, slot: usize) -> Vec<String> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots.get(slot).cloned().unwrap_or_default()
    }
}
