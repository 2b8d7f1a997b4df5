//! Integration tests for linked duplicates.
//!
//! Tests that editing one member of a clone group reaches every other member
//! through idle processing, and that copies survive a save/load cycle.

use std::sync::Arc;
use std::time::Duration;

use design_scene_lib::clone::deep_copy;
use design_scene_lib::fixtures::*;
use design_scene_lib::geometry::Mesh;
use design_scene_lib::node::{Node, NodeKind};
use design_scene_lib::scene::Scene;
use glam::{Mat4, Vec3};

#[test]
fn test_mesh_edit_reaches_linked_copies() {
    let mut scene = Scene::new(test_settings());
    let source = cube_node("part", 2.0, Vec3::ZERO);
    scene.add_item(source.clone()).unwrap();
    let copies = scene.duplicate_selection(true).unwrap();
    let copy = copies[0].clone();
    scene.translate_item(&copy, Vec3::new(10.0, 0.0, 0.0)).unwrap();

    source.set_mesh(Some(Arc::new(Mesh::cube(4.0, 4.0, 4.0))));
    assert_eq!(source.clone_update_count(), 1);
    assert!(scene.run_until_idle(Duration::from_secs(5)));

    // the copy was swapped for a fresh deep copy of the source
    let members: Vec<Node> = scene
        .root()
        .children()
        .into_iter()
        .filter(|n| n.clone_id() == source.clone_id())
        .collect();
    assert_eq!(members.len(), 2);
    let replacement = members.iter().find(|n| **n != source).unwrap();
    assert!(copy.parent().is_none());
    assert_eq!(replacement.matrix(), source.matrix());
    assert_eq!(replacement.name(), source.name());
    assert_eq!(replacement.mesh().unwrap().long_hash(), source.mesh().unwrap().long_hash());
    assert!(members.iter().all(|n| n.clone_update_count() == 0));
}

#[test]
fn test_rebuilt_operation_updates_linked_copy() {
    let mut scene = Scene::new(test_settings());
    let a = cube_node("a", 2.0, Vec3::ZERO);
    let b = cube_node("b", 2.0, Vec3::new(1.0, 0.0, 0.0));
    scene.add_item(a.clone()).unwrap();
    scene.add_item(b.clone()).unwrap();
    scene.set_selection(&[a, b.clone()]).unwrap();
    let op = scene.wrap_selection(NodeKind::Combine).unwrap();
    assert!(scene.run_until_idle(Duration::from_secs(30)));

    scene.duplicate_selection(true).unwrap();
    scene.clear_selection();
    assert_eq!(scene.root().child_count(), 2);

    // widen the original; the copy follows
    scene.translate_item(&b, Vec3::new(1.0, 0.0, 0.0)).unwrap();
    assert!(scene.run_until_idle(Duration::from_secs(30)));

    let volumes: Vec<f32> = scene
        .root()
        .children()
        .iter()
        .map(|n| n.mesh().map(|m| m.volume()).unwrap_or(0.0))
        .collect();
    assert_eq!(volumes.len(), 2);
    for volume in volumes {
        assert!((volume - 16.0).abs() < 1e-2, "volume {}", volume);
    }
    assert_eq!(op.parent().as_ref(), Some(scene.root()));
}

#[test]
fn test_deep_copy_of_loaded_tree_has_fresh_ids() {
    let mut scene = Scene::new(test_settings());
    let group = group_of("g", vec![cube_node("x", 1.0, Vec3::ZERO), cube_node("y", 1.0, Vec3::X * 2.0)]);
    scene.add_item(group).unwrap();
    let json = scene.to_json().unwrap();

    let mut loaded = Scene::new(scene.settings().clone());
    loaded.load_json(&json).unwrap();
    let original = loaded.root().children()[0].clone();
    let copy = deep_copy(&original).unwrap();

    let ids: Vec<String> = original.descendants_and_self().iter().map(|n| n.id()).collect();
    assert!(copy.descendants_and_self().iter().all(|n| !ids.contains(&n.id())));
    assert_eq!(copy.children()[1].matrix(), Mat4::from_translation(Vec3::X * 2.0));
    assert!(copy.children().iter().all(|n| n.has_mesh()));
}
