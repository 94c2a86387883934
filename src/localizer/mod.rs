//! Furniture localization.
//!
//! Templates are located on a top-down height map and their expanded
//! bounding boxes become the areas of activities that reference them by
//! name.

pub mod height_map;
pub mod search;
pub mod template;
pub mod worker;

pub use height_map::HeightMap;
pub use search::{best_fit, sad, Fit};
pub use template::{load_templates, LocatedTemplate, Template};
pub use worker::{scan, ScanResult, TemplateLocalizer};

use crate::geometry::Rect2D;
use std::collections::BTreeMap;

/// Current located area of every template, owned by the frame pipeline.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    located: BTreeMap<String, LocatedTemplate>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take over the placements of a finished scan.
    ///
    /// A rejected fit clears any earlier location for that template.
    pub fn apply(&mut self, result: &ScanResult) {
        for placement in &result.placements {
            if placement.accepted {
                self.located.insert(placement.name.clone(), placement.clone());
            } else {
                self.located.remove(&placement.name);
            }
        }
    }

    /// Area of a located template.
    pub fn area(&self, name: &str) -> Option<Rect2D> {
        self.located.get(name).map(|t| t.location)
    }

    pub fn get(&self, name: &str) -> Option<&LocatedTemplate> {
        self.located.get(name)
    }

    pub fn located(&self) -> impl Iterator<Item = &LocatedTemplate> {
        self.located.values()
    }

    pub fn is_empty(&self) -> bool {
        self.located.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn placement(accepted: bool) -> LocatedTemplate {
        LocatedTemplate {
            name: "Table".to_string(),
            top_left: (0, 0),
            distance: 0.0,
            mean_error: 0.0,
            location: Rect2D::new(10.0, 10.0, 20.0, 20.0),
            color: "red".to_string(),
            accepted,
        }
    }

    #[test]
    fn test_apply_and_reject() {
        let mut set = TemplateSet::new();
        assert!(set.area("Table").is_none());

        set.apply(&ScanResult {
            completed_at: Utc::now(),
            filled_cells: 0,
            placements: vec![placement(true)],
        });
        assert_eq!(set.area("Table"), Some(Rect2D::new(10.0, 10.0, 20.0, 20.0)));

        set.apply(&ScanResult {
            completed_at: Utc::now(),
            filled_cells: 0,
            placements: vec![placement(false)],
        });
        assert!(set.area("Table").is_none());
        assert!(set.is_empty());
    }
}
