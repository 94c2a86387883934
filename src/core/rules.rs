//! Activity rule evaluation.
//!
//! An activity holds for a person when all of these are true:
//!
//! - enough tracked people are inside the activity's area,
//! - this person is inside the area,
//! - the person's orientation is one the activity allows,
//! - the person holds one of the activity's postures (or it lists none),
//! - every object the activity needs is in use,
//! - every requirement is satisfied against the area.
//!
//! The checks run in that order and stop at the first failure. Everything
//! here reads shared state only; the evaluator writes nothing but the
//! activity flags and the per-person activity text.

use crate::core::activity::Activity;
use crate::geometry::{DisplayFrame, Rect2D};
use crate::localizer::TemplateSet;
use crate::objects::ObjectTable;
use crate::tracking::Person;

/// Shared state the evaluator reads for one frame.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub display: DisplayFrame,
    pub templates: &'a TemplateSet,
    pub objects: &'a ObjectTable,
}

impl<'a> EvalContext<'a> {
    pub fn new(display: DisplayFrame, templates: &'a TemplateSet, objects: &'a ObjectTable) -> Self {
        Self {
            display,
            templates,
            objects,
        }
    }
}

fn person_in(area: Rect2D, person: &Person, display: DisplayFrame) -> bool {
    area.contains(display.to_display(person.position))
}

/// Tracked persons inside the activity's area. Zero while the area is unresolved.
pub fn occupancy(activity: &Activity, persons: &[Person], ctx: &EvalContext<'_>) -> usize {
    match activity.resolve_area(ctx.templates) {
        Some(area) => persons
            .iter()
            .filter(|p| p.tracked && person_in(area, p, ctx.display))
            .count(),
        None => 0,
    }
}

pub fn meets_min_people(activity: &Activity, persons: &[Person], ctx: &EvalContext<'_>) -> bool {
    occupancy(activity, persons, ctx) >= activity.min_people as usize
}

/// Whether the person stands in the activity's area. False for an unlocated template.
pub fn is_in_area(activity: &Activity, person: &Person, ctx: &EvalContext<'_>) -> bool {
    activity
        .resolve_area(ctx.templates)
        .map_or(false, |area| person_in(area, person, ctx.display))
}

pub fn is_orientation_satisfied(activity: &Activity, person: &Person) -> bool {
    activity.orientations.intersects(person.orientation)
}

pub fn is_posture_satisfied(activity: &Activity, person: &Person) -> bool {
    activity.postures.is_empty() || activity.postures.iter().any(|p| person.has_posture(p))
}

pub fn is_object_use_satisfied(activity: &Activity, objects: &ObjectTable) -> bool {
    objects.all_in_use(&activity.object_names())
}

pub fn are_requirements_satisfied(
    activity: &Activity,
    persons: &[Person],
    ctx: &EvalContext<'_>,
) -> bool {
    if activity.requirements.is_empty() {
        return true;
    }
    match activity.resolve_area(ctx.templates) {
        Some(area) => activity
            .requirements
            .iter()
            .all(|r| r.is_satisfied(area, persons, ctx.display)),
        None => false,
    }
}

/// All predicates for one (activity, person) pair.
pub fn is_satisfied_by(
    activity: &Activity,
    person: &Person,
    persons: &[Person],
    ctx: &EvalContext<'_>,
) -> bool {
    person.tracked
        && meets_min_people(activity, persons, ctx)
        && is_in_area(activity, person, ctx)
        && is_orientation_satisfied(activity, person)
        && is_posture_satisfied(activity, person)
        && is_object_use_satisfied(activity, ctx.objects)
        && are_requirements_satisfied(activity, persons, ctx)
}

/// Fill each tracked person's activity text.
///
/// The text is `"\n" + name` for every satisfied activity, in catalogue
/// order. Untracked persons keep whatever they had.
pub fn decide_activity_text_for_people(
    activities: &[Activity],
    persons: &mut [Person],
    ctx: &EvalContext<'_>,
) {
    let texts: Vec<Option<String>> = persons
        .iter()
        .map(|person| {
            person.tracked.then(|| {
                activities
                    .iter()
                    .filter(|a| is_satisfied_by(a, person, persons, ctx))
                    .map(|a| format!("\n{}", a.name))
                    .collect()
            })
        })
        .collect();

    for (person, text) in persons.iter_mut().zip(texts) {
        if let Some(text) = text {
            person.activities = text;
        }
    }
}

/// Set every activity's `is_active` flag for this frame.
pub fn decide_activity_status(activities: &mut [Activity], persons: &[Person], ctx: &EvalContext<'_>) {
    for activity in activities.iter_mut() {
        activity.state.is_active = persons
            .iter()
            .any(|person| is_satisfied_by(activity, person, persons, ctx));
    }
}
