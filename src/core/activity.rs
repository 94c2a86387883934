//! Activity definitions and their per-session state.

use crate::core::requirement::RequirementRef;
use crate::error::CatalogError;
use crate::geometry::Rect2D;
use crate::localizer::TemplateSet;
use crate::tracking::Orientation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an activity takes place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AreaSource {
    /// A fixed display-space rectangle
    Static(Rect2D),
    /// Wherever the named template was last located
    Template(String),
}

/// An object an activity needs to be in use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub name: String,
    pub tag_id: String,
}

/// Mutable state advanced once per frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityState {
    /// Satisfied by at least one tracked person this frame
    pub is_active: bool,
    /// An occurrence row is open
    pub is_recording: bool,
    /// Open occurrence row, when recording
    pub record: Option<usize>,
    /// Last frame time the activity was active
    pub last_active: Option<DateTime<Utc>>,
}

/// A named activity and the conditions that make it happen.
#[derive(Debug, Clone)]
pub struct Activity {
    pub name: String,
    pub area: AreaSource,
    pub orientations: Orientation,
    /// Any one of these is enough; empty means any posture
    pub postures: Vec<String>,
    /// All of these must be in use
    pub objects: Vec<ObjectRef>,
    pub requirements: Vec<RequirementRef>,
    pub min_people: u32,
    pub state: ActivityState,
}

impl Activity {
    /// Create an activity with no posture, object or requirement constraints.
    pub fn new(
        name: impl Into<String>,
        area: AreaSource,
        orientations: Orientation,
        min_people: u32,
    ) -> Result<Self, CatalogError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if min_people < 1 {
            return Err(CatalogError::InvalidMinPeople(name));
        }
        match &area {
            AreaSource::Static(rect) if !rect.is_well_formed() => {
                return Err(CatalogError::MalformedArea {
                    name,
                    reason: format!("{rect:?} is not a valid rectangle"),
                });
            }
            AreaSource::Template(template) if template.trim().is_empty() => {
                return Err(CatalogError::MissingArea(name));
            }
            _ => {}
        }

        Ok(Self {
            name,
            area,
            orientations,
            postures: Vec::new(),
            objects: Vec::new(),
            requirements: Vec::new(),
            min_people,
            state: ActivityState::default(),
        })
    }

    pub fn with_postures<I, S>(mut self, postures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.postures = postures.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_objects(mut self, objects: Vec<ObjectRef>) -> Self {
        self.objects = objects;
        self
    }

    pub fn with_requirement(mut self, requirement: RequirementRef) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Display-space area for this frame, `None` while a template is unlocated.
    pub fn resolve_area(&self, templates: &TemplateSet) -> Option<Rect2D> {
        match &self.area {
            AreaSource::Static(rect) => Some(*rect),
            AreaSource::Template(name) => templates.area(name),
        }
    }

    pub fn requirement_names(&self) -> Vec<String> {
        self.requirements.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn object_names(&self) -> Vec<&str> {
        self.objects.iter().map(|o| o.name.as_str()).collect()
    }

    /// Forget all per-session state.
    pub fn reset_state(&mut self) {
        self.state = ActivityState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::requirement::Surround;
    use std::sync::Arc;

    #[test]
    fn test_validation() {
        let area = AreaSource::Static(Rect2D::new(0.0, 0.0, 100.0, 100.0));

        assert!(Activity::new("Reading", area.clone(), Orientation::FRONT, 1).is_ok());
        assert_eq!(
            Activity::new("Reading", area.clone(), Orientation::FRONT, 0).unwrap_err(),
            CatalogError::InvalidMinPeople("Reading".to_string())
        );
        assert_eq!(
            Activity::new(" ", area, Orientation::FRONT, 1).unwrap_err(),
            CatalogError::EmptyName
        );
        assert!(matches!(
            Activity::new(
                "Reading",
                AreaSource::Static(Rect2D::new(0.0, 0.0, -5.0, 10.0)),
                Orientation::FRONT,
                1
            ),
            Err(CatalogError::MalformedArea { .. })
        ));
        assert_eq!(
            Activity::new("Meeting", AreaSource::Template(String::new()), Orientation::ALL, 2)
                .unwrap_err(),
            CatalogError::MissingArea("Meeting".to_string())
        );
    }

    #[test]
    fn test_resolve_area() {
        let templates = TemplateSet::new();

        let fixed = Activity::new(
            "Reading",
            AreaSource::Static(Rect2D::new(1.0, 2.0, 3.0, 4.0)),
            Orientation::FRONT,
            1,
        )
        .unwrap();
        assert_eq!(fixed.resolve_area(&templates), Some(Rect2D::new(1.0, 2.0, 3.0, 4.0)));

        let dynamic = Activity::new(
            "Meeting",
            AreaSource::Template("Table".to_string()),
            Orientation::ALL,
            2,
        )
        .unwrap()
        .with_requirement(Arc::new(Surround));
        assert_eq!(dynamic.resolve_area(&templates), None);
        assert_eq!(dynamic.requirement_names(), vec!["Surround".to_string()]);
    }
}
