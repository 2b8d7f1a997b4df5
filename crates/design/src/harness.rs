//! Headless harness for programmatic scene manipulation.
//!
//! Wraps a [`Scene`] with a private assets directory and addresses items by
//! id, which is what the JSON command protocol and integration tests use.

use std::path::PathBuf;
use std::time::Duration;

use glam::Vec3;
use shared::OutputType;

use crate::csg::CsgOption;
use crate::error::SceneError;
use crate::fixtures::{cube_node, test_settings};
use crate::geometry::SharedMesh;
use crate::node::{Node, NodeKind};
use crate::scene::Scene;
use crate::settings::EngineSettings;
use crate::validation::MeshValidator;

/// Headless test harness: a scene plus id-based helpers
pub struct TestHarness {
    pub scene: Scene,
    assets_dir: Option<PathBuf>,
}

impl TestHarness {
    /// Create a new empty harness with a temporary assets directory that is
    /// removed on drop.
    pub fn new() -> Self {
        let settings = test_settings();
        let assets_dir = settings.assets_dir.clone();
        Self {
            scene: Scene::new(settings),
            assets_dir,
        }
    }

    /// Harness over caller-provided settings; nothing is removed on drop.
    pub fn with_settings(settings: EngineSettings) -> Self {
        Self {
            scene: Scene::new(settings),
            assets_dir: None,
        }
    }

    // ── Lookup ────────────────────────────────────────────────

    /// Find a node anywhere in the scene by id
    pub fn find(&self, id: &str) -> Result<Node, SceneError> {
        self.scene
            .root()
            .find_by_id(id)
            .ok_or_else(|| SceneError::ItemNotInScene(id.to_string()))
    }

    fn find_all(&self, ids: &[String]) -> Result<Vec<Node>, SceneError> {
        ids.iter().map(|id| self.find(id)).collect()
    }

    // ── Scene manipulation ────────────────────────────────────

    /// Create a cube item, select it, and return its id
    pub fn create_cube(&mut self, name: &str, size: f32, position: Vec3) -> Result<String, SceneError> {
        let node = cube_node(name, size, position);
        let id = node.id();
        self.scene.add_item(node)?;
        Ok(id)
    }

    /// Delete an item by id, or the current selection
    pub fn delete(&mut self, id: Option<&str>) -> Result<Vec<String>, SceneError> {
        if let Some(id) = id {
            let node = self.find(id)?;
            self.scene.set_selected_item(Some(&node))?;
        }
        let removed = self.scene.delete_selection()?;
        Ok(removed.iter().map(|n| n.id()).collect())
    }

    pub fn select(&mut self, ids: &[String]) -> Result<(), SceneError> {
        let nodes = self.find_all(ids)?;
        self.scene.set_selection(&nodes)
    }

    pub fn add_to_selection(&mut self, id: &str) -> Result<(), SceneError> {
        let node = self.find(id)?;
        self.scene.add_to_selection(&node)
    }

    pub fn clear_selection(&mut self) {
        self.scene.clear_selection();
    }

    /// Ids of the selected items
    pub fn selected_ids(&self) -> Vec<String> {
        self.scene.selected_items().iter().map(|n| n.id()).collect()
    }

    pub fn group(&mut self) -> Result<String, SceneError> {
        Ok(self.scene.group_selection()?.id())
    }

    pub fn ungroup(&mut self) -> Result<Vec<String>, SceneError> {
        Ok(self.scene.ungroup_selection()?.iter().map(|n| n.id()).collect())
    }

    pub fn combine(&mut self) -> Result<String, SceneError> {
        Ok(self.scene.wrap_selection(NodeKind::Combine)?.id())
    }

    pub fn subtract(&mut self, holes: Vec<String>) -> Result<String, SceneError> {
        Ok(self.scene.subtract_selection(holes)?.id())
    }

    pub fn duplicate(&mut self, linked: bool) -> Result<Vec<String>, SceneError> {
        Ok(self.scene.duplicate_selection(linked)?.iter().map(|n| n.id()).collect())
    }

    pub fn translate(&mut self, id: &str, offset: Vec3) -> Result<(), SceneError> {
        let node = self.find(id)?;
        self.scene.translate_item(&node, offset)
    }

    pub fn set_output_type(&mut self, output_type: OutputType) -> Result<(), SceneError> {
        self.scene.set_selection_output_type(output_type)
    }

    /// Undo the last operation
    pub fn undo(&mut self) -> bool {
        self.scene.can_undo() && self.scene.undo()
    }

    /// Redo the last undone operation
    pub fn redo(&mut self) -> bool {
        self.scene.can_redo() && self.scene.redo()
    }

    /// Process background work until idle or `timeout`
    pub fn idle(&mut self, timeout: Duration) -> bool {
        self.scene.run_until_idle(timeout)
    }

    // ── Documents ─────────────────────────────────────────────

    /// Export the current scene as JSON
    pub fn export_scene_json(&mut self) -> Result<String, SceneError> {
        Ok(self.scene.to_json()?)
    }

    /// Load a scene from JSON string (replaces current)
    pub fn load_scene_json(&mut self, json: &str) -> Result<(), SceneError> {
        Ok(self.scene.load_json(json)?)
    }

    // ── Inspection ────────────────────────────────────────────

    /// Number of top-level items in the scene
    pub fn item_count(&self) -> usize {
        self.scene.root().child_count()
    }

    pub fn item_names(&self) -> Vec<String> {
        self.scene.root().children().iter().map(|n| n.name()).collect()
    }

    /// Mesh of an item by id
    pub fn mesh_of(&self, id: &str) -> Option<SharedMesh> {
        self.find(id).ok().and_then(|n| n.mesh())
    }

    /// Validation errors of an item's mesh; `None` when it has no mesh
    pub fn validate_mesh(&self, id: &str) -> Option<Vec<String>> {
        self.mesh_of(id).map(|m| MeshValidator::new(&m).validate_all())
    }

    /// Volume of the flattened printable scene
    pub fn exported_volume(&self) -> Result<f32, SceneError> {
        let mesh = self.scene.export_mesh(CsgOption::DoCsgMerge)?;
        Ok(mesh.map(|m| m.volume()).unwrap_or(0.0))
    }

    /// JSON summary of every top-level item
    pub fn inspect(&self) -> serde_json::Value {
        let items: Vec<serde_json::Value> = self
            .scene
            .root()
            .children()
            .iter()
            .map(|node| {
                let aabb = node.world_aabb();
                serde_json::json!({
                    "id": node.id(),
                    "name": node.name(),
                    "kind": node.kind().to_document(),
                    "visible": node.visible(),
                    "output_type": node.output_type(),
                    "clone_id": node.clone_id(),
                    "child_count": node.child_count(),
                    "triangles": node.mesh().map(|m| m.triangle_count()).unwrap_or(0),
                    "build_progress": self.scene.scheduler().build_progress(node),
                    "aabb": if aabb.is_empty() {
                        serde_json::Value::Null
                    } else {
                        serde_json::json!({ "min": aabb.min.to_array(), "max": aabb.max.to_array() })
                    },
                })
            })
            .collect();
        serde_json::json!({
            "item_count": items.len(),
            "items": items,
            "selected": self.selected_ids(),
            "can_undo": self.scene.can_undo(),
            "can_redo": self.scene.can_redo(),
            "busy": self.scene.has_pending_work(),
        })
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        if let Some(dir) = &self.assets_dir {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_harness_empty() {
        let h = TestHarness::new();
        assert_eq!(h.item_count(), 0);
        assert!(h.selected_ids().is_empty());
    }

    #[test]
    fn test_create_cube() {
        let mut h = TestHarness::new();
        let id = h.create_cube("Cube", 1.0, Vec3::ZERO).unwrap();
        assert!(!id.is_empty());
        assert_eq!(h.item_count(), 1);
        assert_eq!(h.selected_ids(), vec![id]);
    }

    #[test]
    fn test_undo_redo_cycle() {
        let mut h = TestHarness::new();
        h.create_cube("Cube", 1.0, Vec3::ZERO).unwrap();
        assert!(h.undo());
        assert_eq!(h.item_count(), 0);
        assert!(!h.undo());
        assert!(h.redo());
        assert_eq!(h.item_count(), 1);
        assert!(!h.redo());
    }

    #[test]
    fn test_delete_by_id() {
        let mut h = TestHarness::new();
        let a = h.create_cube("a", 1.0, Vec3::ZERO).unwrap();
        h.create_cube("b", 1.0, Vec3::X * 3.0).unwrap();
        assert_eq!(h.delete(Some(&a)).unwrap(), vec![a.clone()]);
        assert_eq!(h.item_names(), ["b"]);
        assert!(h.delete(Some(&a)).is_err());
    }

    #[test]
    fn test_load_export_json() {
        let mut h = TestHarness::new();
        h.create_cube("Cube", 2.0, Vec3::ZERO).unwrap();
        let json = h.export_scene_json().unwrap();

        let mut h2 = TestHarness::with_settings(h.scene.settings().clone());
        h2.load_scene_json(&json).unwrap();
        assert_eq!(h2.item_names(), ["Cube"]);
        let id = h2.scene.root().children()[0].id();
        assert_eq!(h2.validate_mesh(&id), Some(Vec::new()));
    }

    #[test]
    fn test_combine_volume() {
        let mut h = TestHarness::new();
        let a = h.create_cube("a", 2.0, Vec3::ZERO).unwrap();
        let b = h.create_cube("b", 2.0, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        h.select(&[a, b]).unwrap();
        let op = h.combine().unwrap();
        assert!(h.idle(Duration::from_secs(30)));
        let mesh = h.mesh_of(&op).unwrap();
        assert!((mesh.volume() - 12.0).abs() < 1e-3);
        assert!((h.exported_volume().unwrap() - 12.0).abs() < 1e-3);
    }

    #[test]
    fn test_inspect_lists_items() {
        let mut h = TestHarness::new();
        h.create_cube("c1", 1.0, Vec3::ZERO).unwrap();
        h.create_cube("c2", 2.0, Vec3::X * 5.0).unwrap();
        let data = h.inspect();
        assert_eq!(data["item_count"], 2);
        assert_eq!(data["items"][1]["name"], "c2");
        assert_eq!(data["items"][0]["triangles"], 12);
        assert!(data["items"][0]["build_progress"].is_null());
    }
}
