//! Shared table of tagged objects and their in-use state.
//!
//! The object detector thread is the only writer; the rule evaluator reads
//! the latest values each frame. There is no queue: readers always see the
//! most recent aggregate.

use crate::config::ObjectSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Last known state of one tagged object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedObject {
    pub name: String,
    pub tag_id: String,
    /// Mean RSSI over the last sampling period, if the tag was read at all
    pub rssi: Option<f64>,
    pub in_use: bool,
}

/// Name-keyed object table shared between the detector and the pipeline.
#[derive(Debug, Default)]
pub struct ObjectTable {
    objects: RwLock<BTreeMap<String, TaggedObject>>,
    faulted: AtomicBool,
}

/// Thread-safe shared object table.
pub type SharedObjectTable = Arc<ObjectTable>;

impl ObjectTable {
    /// Create a table with every configured object marked not in use.
    pub fn new(specs: &[ObjectSpec]) -> Self {
        let objects = specs
            .iter()
            .map(|spec| {
                (
                    spec.name.clone(),
                    TaggedObject {
                        name: spec.name.clone(),
                        tag_id: spec.tag_id.clone(),
                        rssi: None,
                        in_use: false,
                    },
                )
            })
            .collect();

        Self {
            objects: RwLock::new(objects),
            faulted: AtomicBool::new(false),
        }
    }

    /// Create a new shared table.
    pub fn shared(specs: &[ObjectSpec]) -> SharedObjectTable {
        Arc::new(Self::new(specs))
    }

    /// Whether the named object is in use.
    ///
    /// Unknown objects and a faulted detector both read as not in use.
    pub fn is_in_use(&self, name: &str) -> bool {
        if self.is_faulted() {
            return false;
        }
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        objects.get(name).map(|o| o.in_use).unwrap_or(false)
    }

    /// Whether every named object is in use. True for an empty list.
    pub fn all_in_use<S: AsRef<str>>(&self, names: &[S]) -> bool {
        names.iter().all(|n| self.is_in_use(n.as_ref()))
    }

    /// Publish a new reading for an object.
    pub fn publish(&self, name: &str, rssi: Option<f64>, in_use: bool) {
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        if let Some(object) = objects.get_mut(name) {
            object.rssi = rssi;
            object.in_use = in_use;
        }
    }

    /// Forget every reading. Objects stay registered but read as not in use.
    pub fn reset_readings(&self) {
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        for object in objects.values_mut() {
            object.rssi = None;
            object.in_use = false;
        }
    }

    /// Tag id registered for an object.
    pub fn tag_id(&self, name: &str) -> Option<String> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        objects.get(name).map(|o| o.tag_id.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        objects.contains_key(name)
    }

    /// Copy of every object, ordered by name.
    pub fn snapshot(&self) -> Vec<TaggedObject> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        objects.values().cloned().collect()
    }

    pub fn set_faulted(&self, faulted: bool) {
        self.faulted.store(faulted, Ordering::SeqCst);
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ObjectsConfig;

    #[test]
    fn test_new_table_reports_nothing_in_use() {
        let table = ObjectTable::new(&ObjectsConfig::default().objects);
        assert!(!table.is_in_use("Cup"));
        assert_eq!(table.snapshot().len(), 5);
        assert_eq!(
            table.tag_id("Mouse").as_deref(),
            Some("0000 0000 0000 0000 0000 0205")
        );
    }

    #[test]
    fn test_publish_and_all_in_use() {
        let table = ObjectTable::new(&ObjectsConfig::default().objects);
        table.publish("Cup", Some(-40.0), true);
        table.publish("Book", Some(-40.0), true);

        assert!(table.all_in_use(&["Cup", "Book"]));
        assert!(!table.all_in_use(&["Cup", "Bowl"]));
        assert!(table.all_in_use::<&str>(&[]));
        assert!(!table.is_in_use("Teapot"));
    }

    #[test]
    fn test_fault_fails_closed() {
        let table = ObjectTable::new(&ObjectsConfig::default().objects);
        table.publish("Cup", Some(-40.0), true);
        table.set_faulted(true);
        assert!(!table.is_in_use("Cup"));

        table.set_faulted(false);
        assert!(table.is_in_use("Cup"));
    }

    #[test]
    fn test_reset_readings() {
        let table = ObjectTable::new(&ObjectsConfig::default().objects);
        table.publish("Cup", Some(-40.0), true);
        table.reset_readings();

        assert!(!table.is_in_use("Cup"));
        assert!(table.contains("Cup"));
        assert!(table.snapshot().iter().all(|o| o.rssi.is_none() && !o.in_use));
    }
}
