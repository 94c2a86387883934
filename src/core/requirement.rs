//! Pluggable activity requirements.
//!
//! A requirement is a pure check over an activity's resolved area and the
//! current persons. Activities refer to requirements by name; the registry
//! turns names from the catalogue into instances.

use crate::geometry::{DisplayFrame, Rect2D};
use crate::tracking::{Orientation, Person};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An extra condition an activity's area must meet.
pub trait Requirement: Send + Sync + fmt::Debug {
    /// Name used in the activity catalogue.
    fn name(&self) -> &str;

    /// Check the condition. Must not have side effects.
    fn is_satisfied(&self, area: Rect2D, persons: &[Person], display: DisplayFrame) -> bool;
}

/// Shared requirement instance.
pub type RequirementRef = Arc<dyn Requirement>;

/// People on at least two sides of the area, each facing into it.
///
/// The area is split into halves: someone in the top half must face the
/// sensor (front), bottom half away from it (back), left half to the right
/// and right half to the left. The person's orientation must be exactly the
/// inward one.
#[derive(Debug, Clone, Copy, Default)]
pub struct Surround;

impl Surround {
    pub const NAME: &'static str = "Surround";

    fn side_occupied(
        half: Rect2D,
        facing: Orientation,
        persons: &[Person],
        display: DisplayFrame,
    ) -> bool {
        persons.iter().any(|p| {
            p.tracked && p.orientation == facing && half.contains(display.to_display(p.position))
        })
    }
}

impl Requirement for Surround {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_satisfied(&self, area: Rect2D, persons: &[Person], display: DisplayFrame) -> bool {
        let sides = [
            (area.top_half(), Orientation::FRONT),
            (area.bottom_half(), Orientation::BACK),
            (area.left_half(), Orientation::RIGHT),
            (area.right_half(), Orientation::LEFT),
        ];

        sides
            .into_iter()
            .filter(|(half, facing)| Self::side_occupied(*half, *facing, persons, display))
            .count()
            >= 2
    }
}

type Factory = fn() -> RequirementRef;

/// Name to requirement factory lookup.
#[derive(Clone)]
pub struct RequirementRegistry {
    factories: BTreeMap<String, Factory>,
}

impl fmt::Debug for RequirementRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl Default for RequirementRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl RequirementRegistry {
    /// A registry with no requirements at all.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding the built-in requirements.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Surround::NAME, || Arc::new(Surround));
        registry
    }

    pub fn register(&mut self, name: &str, factory: Factory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// Build the requirement registered under `name`.
    pub fn create(&self, name: &str) -> Option<RequirementRef> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2D;

    // Area (0,0)-(100,100) in display space on the default 900x450 frame.
    const AREA: Rect2D = Rect2D::new(0.0, 0.0, 100.0, 100.0);

    fn person_at_display(x: f64, y: f64, orientation: Orientation) -> Person {
        let ground = DisplayFrame::default().from_display(Point2D::new(x, y));
        Person::tracked_at(1, ground, orientation)
    }

    #[test]
    fn test_two_sides_satisfy() {
        let persons = vec![
            person_at_display(50.0, 10.0, Orientation::FRONT),
            person_at_display(50.0, 90.0, Orientation::BACK),
        ];
        assert!(Surround.is_satisfied(AREA, &persons, DisplayFrame::default()));
    }

    #[test]
    fn test_one_side_is_not_enough() {
        let persons = vec![
            person_at_display(20.0, 10.0, Orientation::FRONT),
            person_at_display(80.0, 10.0, Orientation::FRONT),
        ];
        // Both people are in the top half; the right one also sits in the
        // right half but faces front, not left.
        assert!(!Surround.is_satisfied(AREA, &persons, DisplayFrame::default()));
    }

    #[test]
    fn test_orientation_must_face_inward() {
        let persons = vec![
            person_at_display(10.0, 50.0, Orientation::LEFT),
            person_at_display(90.0, 50.0, Orientation::RIGHT),
        ];
        assert!(!Surround.is_satisfied(AREA, &persons, DisplayFrame::default()));

        let persons = vec![
            person_at_display(10.0, 50.0, Orientation::RIGHT),
            person_at_display(90.0, 50.0, Orientation::LEFT),
        ];
        assert!(Surround.is_satisfied(AREA, &persons, DisplayFrame::default()));
    }

    #[test]
    fn test_untracked_people_do_not_count() {
        let mut back = person_at_display(50.0, 90.0, Orientation::BACK);
        back.tracked = false;
        let persons = vec![person_at_display(50.0, 10.0, Orientation::FRONT), back];
        assert!(!Surround.is_satisfied(AREA, &persons, DisplayFrame::default()));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = RequirementRegistry::with_builtins();
        assert_eq!(registry.create("Surround").map(|r| r.name().to_string()).as_deref(), Some("Surround"));
        assert!(registry.create("Queue").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["Surround"]);
    }
}
