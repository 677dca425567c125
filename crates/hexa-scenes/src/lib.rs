//! Scene Manager
//!
//! Scenes are named, replayable snapshots of desired switch states across
//! one or more devices. A scene stores boolean intents only; regulator
//! levels are not captured. Saving under an existing name replaces the
//! entries; replay applies entries in order and tolerates references to
//! devices that have since been removed, reporting the skips instead of
//! failing the whole run.

use hexa_core::{Context, DeviceId, SwitchRef};
use hexa_registry::DeviceRegistry;
use hexa_state_store::SwitchStore;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Errors raised by scene operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("scene name cannot be blank")]
    EmptyName,

    #[error("scene must contain at least one switch entry")]
    NoEntries,

    #[error("scene not found: {0}")]
    NotFound(String),
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;

/// One desired switch state inside a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneEntry {
    /// Target device
    pub device: DeviceId,

    /// Zero-based switch index on that device
    pub index: usize,

    /// Switch value the scene drives the channel to
    pub desired: bool,
}

impl SceneEntry {
    /// Create a new scene entry
    pub fn new(device: impl Into<DeviceId>, index: usize, desired: bool) -> Self {
        Self {
            device: device.into(),
            index,
            desired,
        }
    }

    /// The (device, index) pair this entry targets
    pub fn switch_ref(&self) -> SwitchRef {
        SwitchRef {
            device: self.device,
            index: self.index,
        }
    }
}

/// A named scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// Unique scene name
    pub name: String,

    /// Desired switch states, applied in this order on replay
    pub entries: Vec<SceneEntry>,
}

/// Report of one scene replay
///
/// Replay is not transactional across devices: entries that no longer
/// resolve are skipped and listed here while the rest are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneRun {
    /// Name of the scene that ran
    pub scene: String,

    /// Number of entries applied to the state store
    pub applied: usize,

    /// Entries skipped because their device or index no longer exists
    pub skipped: Vec<SceneEntry>,
}

/// The scene manager
///
/// Scenes are kept in first-saved order, matching how the original app
/// lists them.
pub struct SceneManager {
    scenes: RwLock<IndexMap<String, Scene>>,
}

impl SceneManager {
    /// Create a new empty manager
    pub fn new() -> Self {
        Self {
            scenes: RwLock::new(IndexMap::new()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<String, Scene>> {
        self.scenes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<String, Scene>> {
        self.scenes.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Save a scene, replacing any existing scene of the same name
    ///
    /// Fails with [`SceneError::EmptyName`] for a blank name and
    /// [`SceneError::NoEntries`] for an empty entry list.
    pub fn save(&self, name: impl Into<String>, entries: Vec<SceneEntry>) -> SceneResult<Scene> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SceneError::EmptyName);
        }
        if entries.is_empty() {
            return Err(SceneError::NoEntries);
        }

        let scene = Scene {
            name: name.clone(),
            entries,
        };
        let replaced = self.write().insert(name.clone(), scene.clone());
        info!(
            scene = %name,
            entries = scene.entries.len(),
            replaced = replaced.is_some(),
            "Saved scene"
        );
        Ok(scene)
    }

    /// Delete a scene by name
    pub fn delete(&self, name: &str) -> SceneResult<Scene> {
        // shift_remove keeps the remaining scenes in saved order.
        let scene = self
            .write()
            .shift_remove(name)
            .ok_or_else(|| SceneError::NotFound(name.to_string()))?;
        info!(scene = %name, "Deleted scene");
        Ok(scene)
    }

    /// Replay a scene against the state store
    ///
    /// Applies every entry's desired state in order through `states`,
    /// skipping entries whose device or switch index no longer resolves in
    /// `registry`. The skips are reported, not hidden.
    #[instrument(skip(self, registry, states, context))]
    pub fn run(
        &self,
        name: &str,
        registry: &DeviceRegistry,
        states: &SwitchStore,
        context: &Context,
    ) -> SceneResult<SceneRun> {
        let scene = self
            .get(name)
            .ok_or_else(|| SceneError::NotFound(name.to_string()))?;

        let mut applied = 0;
        let mut skipped = Vec::new();

        for entry in &scene.entries {
            if !registry.resolves(entry.switch_ref()) {
                warn!(switch = %entry.switch_ref(), "Skipping stale scene entry");
                skipped.push(*entry);
                continue;
            }
            match states.set_switch(entry.device, entry.index, entry.desired, context) {
                Ok(_) => applied += 1,
                Err(err) => {
                    // Registry and store disagree only transiently; treat
                    // like any other stale entry.
                    warn!(switch = %entry.switch_ref(), error = %err, "Skipping unapplied scene entry");
                    skipped.push(*entry);
                }
            }
        }

        debug!(scene = %name, applied, skipped = skipped.len(), "Ran scene");
        Ok(SceneRun {
            scene: scene.name,
            applied,
            skipped,
        })
    }

    /// Get a scene by name
    pub fn get(&self, name: &str) -> Option<Scene> {
        self.read().get(name).cloned()
    }

    /// All scenes in first-saved order
    pub fn all(&self) -> Vec<Scene> {
        self.read().values().cloned().collect()
    }

    /// Number of saved scenes
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if no scenes are saved
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl Default for SceneManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexa_event_bus::EventBus;
    use hexa_registry::DeviceDescriptor;
    use std::sync::Arc;

    fn fixture() -> (DeviceRegistry, SwitchStore, SceneManager) {
        let registry = DeviceRegistry::new();
        let states = SwitchStore::new(Arc::new(EventBus::new()));
        for (id, switches) in [(1, 3), (2, 5)] {
            registry
                .register(DeviceDescriptor {
                    id: DeviceId::new(id),
                    model: None,
                    switch_count: switches,
                    regulator_count: 0,
                })
                .unwrap();
            states.insert_device(DeviceId::new(id), switches, 0);
        }
        (registry, states, SceneManager::new())
    }

    #[test]
    fn test_save_validation() {
        let manager = SceneManager::new();
        assert_eq!(
            manager.save("  ", vec![SceneEntry::new(1, 0, true)]).unwrap_err(),
            SceneError::EmptyName
        );
        assert_eq!(
            manager.save("Movie", vec![]).unwrap_err(),
            SceneError::NoEntries
        );
    }

    #[test]
    fn test_save_upserts_by_name() {
        let manager = SceneManager::new();
        manager
            .save("Movie", vec![SceneEntry::new(1, 0, true)])
            .unwrap();
        manager
            .save("Night", vec![SceneEntry::new(2, 0, false)])
            .unwrap();
        manager
            .save("Movie", vec![SceneEntry::new(1, 1, false)])
            .unwrap();

        assert_eq!(manager.len(), 2);
        let movie = manager.get("Movie").unwrap();
        assert_eq!(movie.entries, vec![SceneEntry::new(1, 1, false)]);

        // Replacing keeps the original position.
        let names: Vec<String> = manager.all().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Movie", "Night"]);
    }

    #[test]
    fn test_delete() {
        let manager = SceneManager::new();
        manager
            .save("Movie", vec![SceneEntry::new(1, 0, true)])
            .unwrap();

        manager.delete("Movie").unwrap();
        assert!(manager.is_empty());
        assert_eq!(
            manager.delete("Movie").unwrap_err(),
            SceneError::NotFound("Movie".to_string())
        );
    }

    #[test]
    fn test_run_applies_desired_states() {
        let (registry, states, manager) = fixture();
        states
            .set_switch(DeviceId::new(2), 1, true, &Context::new())
            .unwrap();

        manager
            .save(
                "Movie",
                vec![SceneEntry::new(1, 0, true), SceneEntry::new(2, 1, false)],
            )
            .unwrap();

        let run = manager
            .run("Movie", &registry, &states, &Context::new())
            .unwrap();

        assert_eq!(run.applied, 2);
        assert!(run.skipped.is_empty());
        assert!(states.switch(DeviceId::new(1), 0).unwrap());
        assert!(!states.switch(DeviceId::new(2), 1).unwrap());
    }

    #[test]
    fn test_run_skips_stale_entries_and_reports_them() {
        let (registry, states, manager) = fixture();
        manager
            .save(
                "Evening",
                vec![
                    SceneEntry::new(1, 0, true),
                    SceneEntry::new(9, 0, true),  // unknown device
                    SceneEntry::new(2, 7, true),  // index out of range
                ],
            )
            .unwrap();

        let run = manager
            .run("Evening", &registry, &states, &Context::new())
            .unwrap();

        assert_eq!(run.applied, 1);
        assert_eq!(
            run.skipped,
            vec![SceneEntry::new(9, 0, true), SceneEntry::new(2, 7, true)]
        );
        assert!(states.switch(DeviceId::new(1), 0).unwrap());
    }

    #[test]
    fn test_run_unknown_scene_fails() {
        let (registry, states, manager) = fixture();
        assert_eq!(
            manager
                .run("Nope", &registry, &states, &Context::new())
                .unwrap_err(),
            SceneError::NotFound("Nope".to_string())
        );
    }
}
