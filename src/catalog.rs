//! Activity catalogue persistence.
//!
//! The catalogue is a JSON document holding one definition per activity.
//! Entries that cannot be turned into an activity (unknown requirement,
//! bad area, invalid people count) are skipped with a warning so that one
//! broken entry never takes the rest of the catalogue down with it.

use crate::config::ConfigError;
use crate::core::activity::{Activity, AreaSource, ObjectRef};
use crate::core::requirement::RequirementRegistry;
use crate::error::CatalogError;
use crate::geometry::Rect2D;
use crate::tracking::Orientation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Serialized form of one activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDefinition {
    pub name: String,
    /// Orientation flags as an integer (Front=1, Left=2, Right=4, Back=8)
    pub orientation: u32,
    pub min_people: u32,
    /// Template whose location is the area; empty for a static area
    #[serde(default)]
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<Rect2D>,
    #[serde(default)]
    pub postures: Vec<String>,
    #[serde(default)]
    pub objects: Vec<ObjectRef>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl ActivityDefinition {
    pub fn from_activity(activity: &Activity) -> Self {
        let (template, area) = match &activity.area {
            AreaSource::Static(rect) => (String::new(), Some(*rect)),
            AreaSource::Template(name) => (name.clone(), None),
        };

        Self {
            name: activity.name.clone(),
            orientation: activity.orientations.bits() as u32,
            min_people: activity.min_people,
            template,
            area,
            postures: activity.postures.clone(),
            objects: activity.objects.clone(),
            requirements: activity.requirement_names(),
        }
    }

    /// Build the activity, resolving requirement names through `registry`.
    pub fn to_activity(&self, registry: &RequirementRegistry) -> Result<Activity, CatalogError> {
        let area = match (self.template.trim().is_empty(), self.area) {
            (true, Some(rect)) => AreaSource::Static(rect),
            (false, None) => AreaSource::Template(self.template.clone()),
            (false, Some(_)) => return Err(CatalogError::AmbiguousArea(self.name.clone())),
            (true, None) => return Err(CatalogError::MissingArea(self.name.clone())),
        };

        let orientations =
            Orientation::from_bits(self.orientation).ok_or_else(|| CatalogError::InvalidOrientation {
                name: self.name.clone(),
                mask: self.orientation,
            })?;
        if orientations.is_empty() {
            warn!("Activity '{}' allows no orientation and can never occur", self.name);
        }

        let mut activity = Activity::new(self.name.clone(), area, orientations, self.min_people)?
            .with_postures(self.postures.iter().cloned())
            .with_objects(self.objects.clone());

        for name in &self.requirements {
            let requirement = registry
                .create(name)
                .ok_or_else(|| CatalogError::UnknownRequirement {
                    name: self.name.clone(),
                    requirement: name.clone(),
                })?;
            activity = activity.with_requirement(requirement);
        }

        Ok(activity)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogDocument<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<DateTime<Utc>>,
    activities: Vec<T>,
}

/// Parse a catalogue, skipping entries that do not make a valid activity.
pub fn parse_activities(
    content: &str,
    registry: &RequirementRegistry,
) -> Result<Vec<Activity>, ConfigError> {
    let document: CatalogDocument<serde_json::Value> =
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let mut activities = Vec::with_capacity(document.activities.len());
    for (index, entry) in document.activities.into_iter().enumerate() {
        let definition: ActivityDefinition = match serde_json::from_value(entry) {
            Ok(definition) => definition,
            Err(e) => {
                warn!("Skipping activity entry {index}: {e}");
                continue;
            }
        };

        match definition.to_activity(registry) {
            Ok(activity) => activities.push(activity),
            Err(e) => warn!("Skipping activity entry {index}: {e}"),
        }
    }

    Ok(activities)
}

/// Load the catalogue at `path`. A missing file is an empty catalogue.
pub fn load_activities(
    path: &Path,
    registry: &RequirementRegistry,
) -> Result<Vec<Activity>, ConfigError> {
    if !path.exists() {
        info!("No activity catalogue at {}", path.display());
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)?;
    let activities = parse_activities(&content, registry)?;
    info!("Loaded {} activities from {}", activities.len(), path.display());
    Ok(activities)
}

/// Serialize activities in catalogue order.
pub fn to_json(activities: &[Activity]) -> Result<String, ConfigError> {
    let document = CatalogDocument {
        saved_at: Some(Utc::now()),
        activities: activities
            .iter()
            .map(ActivityDefinition::from_activity)
            .collect(),
    };
    serde_json::to_string_pretty(&document).map_err(|e| ConfigError::Serialize(e.to_string()))
}

/// Write the catalogue to `path`, creating parent directories.
pub fn save_activities(path: &Path, activities: &[Activity]) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, to_json(activities)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::requirement::Surround;
    use std::sync::Arc;

    fn sample() -> Vec<Activity> {
        vec![
            Activity::new(
                "Reading",
                AreaSource::Static(Rect2D::new(0.0, 0.0, 100.0, 100.0)),
                Orientation::FRONT | Orientation::LEFT,
                1,
            )
            .unwrap()
            .with_postures(["Sitting"])
            .with_objects(vec![ObjectRef {
                name: "Book".to_string(),
                tag_id: "0000 0000 0000 0000 0000 001E".to_string(),
            }]),
            Activity::new(
                "Meeting",
                AreaSource::Template("Table".to_string()),
                Orientation::ALL,
                2,
            )
            .unwrap()
            .with_requirement(Arc::new(Surround)),
        ]
    }

    #[test]
    fn test_round_trip() {
        let registry = RequirementRegistry::with_builtins();
        let saved = sample();

        let json = to_json(&saved).unwrap();
        let loaded = parse_activities(&json, &registry).unwrap();

        let before: Vec<_> = saved.iter().map(ActivityDefinition::from_activity).collect();
        let after: Vec<_> = loaded.iter().map(ActivityDefinition::from_activity).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_bad_entries_are_skipped() {
        let registry = RequirementRegistry::with_builtins();
        let json = r#"{
            "activities": [
                { "name": "Good", "orientation": 1, "min_people": 1,
                  "area": { "x": 0, "y": 0, "width": 10, "height": 10 } },
                { "name": "Queue", "orientation": 1, "min_people": 1, "template": "Table",
                  "requirements": ["Queue"] },
                { "name": "Both", "orientation": 1, "min_people": 1, "template": "Table",
                  "area": { "x": 0, "y": 0, "width": 10, "height": 10 } },
                { "name": "Neither", "orientation": 1, "min_people": 1 },
                { "name": "Empty room", "orientation": 1, "min_people": 0, "template": "Table" },
                { "name": "Bad bits", "orientation": 16, "min_people": 1, "template": "Table" },
                { "name": 42 },
                { "name": "Also good", "orientation": 15, "min_people": 2, "template": "Table",
                  "requirements": ["Surround"] }
            ]
        }"#;

        let activities = parse_activities(json, &registry).unwrap();
        let names: Vec<_> = activities.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Good", "Also good"]);
    }

    #[test]
    fn test_definition_errors() {
        let registry = RequirementRegistry::with_builtins();
        let definition = ActivityDefinition {
            name: "Queue".to_string(),
            orientation: 1,
            min_people: 1,
            template: "Table".to_string(),
            area: None,
            postures: Vec::new(),
            objects: Vec::new(),
            requirements: vec!["Queue".to_string()],
        };
        assert_eq!(
            definition.to_activity(&registry).unwrap_err(),
            CatalogError::UnknownRequirement {
                name: "Queue".to_string(),
                requirement: "Queue".to_string(),
            }
        );
    }

    #[test]
    fn test_save_and_load_file() {
        let registry = RequirementRegistry::with_builtins();
        let path = std::env::temp_dir()
            .join(format!("activity-catalog-{}", uuid::Uuid::new_v4()))
            .join("activities.json");

        assert!(load_activities(&path, &registry).unwrap().is_empty());

        save_activities(&path, &sample()).unwrap();
        let loaded = load_activities(&path, &registry).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].requirement_names(), vec!["Surround".to_string()]);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_not_json_is_an_error() {
        let registry = RequirementRegistry::with_builtins();
        assert!(matches!(
            parse_activities("not json", &registry),
            Err(ConfigError::Parse(_))
        ));
    }
}
