//! Integration tests for the editable scene.
//!
//! Tests selection transitions, undo/redo symmetry, background rebuilds with
//! edits arriving mid-build, and picking.

use std::time::Duration;

use design_scene_lib::bvh::{get_bvh, node_hash};
use design_scene_lib::fixtures::*;
use design_scene_lib::geometry::Ray;
use design_scene_lib::node::{Node, NodeKind};
use design_scene_lib::scene::Scene;
use glam::{Mat4, Vec3};

fn tree_hash(scene: &Scene) -> u64 {
    node_hash(scene.root())
}

fn names(scene: &Scene) -> Vec<String> {
    scene.root().children().iter().map(|n| n.name()).collect()
}

fn three_cubes() -> (Scene, Vec<Node>) {
    let mut scene = Scene::new(test_settings());
    let nodes: Vec<Node> = ["a", "b", "c"]
        .iter()
        .enumerate()
        .map(|(i, n)| cube_node(n, 2.0, Vec3::new(i as f32 * 5.0, 0.0, 0.0)))
        .collect();
    for node in &nodes {
        scene.add_item(node.clone()).unwrap();
    }
    scene.clear_selection();
    (scene, nodes)
}

#[test]
fn test_selection_group_lifecycle() {
    let (mut scene, nodes) = three_cubes();

    scene.set_selected_item(Some(&nodes[0])).unwrap();
    scene.add_to_selection(&nodes[2]).unwrap();
    let group = scene.selected_item().unwrap().clone();
    assert!(group.is_selection_group());
    assert_eq!(names(&scene), ["Selection", "b"]);
    assert!(scene.contains(&nodes[2]));

    // moving the group moves both members once it dissolves
    group.set_matrix(Mat4::from_translation(Vec3::Z));
    scene.clear_selection();
    assert_eq!(names(&scene), ["a", "c", "b"]);
    assert_eq!(nodes[0].matrix(), Mat4::from_translation(Vec3::Z));
    assert_eq!(nodes[2].matrix(), Mat4::from_translation(Vec3::new(10.0, 0.0, 1.0)));
    assert!(group.parent().is_none());
    assert_eq!(group.child_count(), 0);
}

#[test]
fn test_undo_redo_restores_tree_hash() {
    let (mut scene, nodes) = three_cubes();
    let start = tree_hash(&scene);

    scene.set_selection(&nodes[..2]).unwrap();
    scene.group_selection().unwrap();
    let grouped = tree_hash(&scene);
    scene.translate_item(&nodes[2], Vec3::new(0.0, 3.0, 0.0)).unwrap();
    scene.set_selected_item(Some(&nodes[2])).unwrap();
    scene.delete_selection().unwrap();
    let end = tree_hash(&scene);

    assert!(scene.undo());
    assert!(scene.undo());
    scene.clear_selection();
    assert_eq!(tree_hash(&scene), grouped);
    assert!(scene.undo());
    scene.clear_selection();
    assert_eq!(tree_hash(&scene), start);
    assert!(!scene.undo());

    assert!(scene.redo());
    assert!(scene.redo());
    assert!(scene.redo());
    scene.clear_selection();
    assert_eq!(tree_hash(&scene), end);
    assert!(!scene.redo());
}

#[test]
fn test_new_command_discards_redo() {
    let (mut scene, nodes) = three_cubes();
    scene.translate_item(&nodes[0], Vec3::X).unwrap();
    scene.undo();
    assert!(scene.can_redo());
    scene.translate_item(&nodes[1], Vec3::X).unwrap();
    assert!(!scene.can_redo());
}

#[test]
fn test_edit_during_build_is_replayed() {
    let (mut scene, nodes) = three_cubes();
    scene.set_selection(&nodes[..2]).unwrap();
    let op = scene.wrap_selection(NodeKind::Combine).unwrap();

    // the build is running with `b` at x=5; move it while it runs
    scene.translate_item(&nodes[1], Vec3::new(-3.0, 0.0, 0.0)).unwrap();
    assert!(scene.run_until_idle(Duration::from_secs(30)));

    // a at -1..1 and b at 1..3 touch: one 4x2x2 block
    let mesh = op.mesh().unwrap();
    assert!((mesh.volume() - 16.0).abs() < 1e-2, "volume {}", mesh.volume());
    let aabb = mesh.aabb(&Mat4::IDENTITY);
    assert!((aabb.max.x - 3.0).abs() < 1e-4);
    assert_eq!(op.rebuild_lock_count(), 0);
    assert_eq!(scene.scheduler().deferred_count(), 0);
}

#[test]
fn test_undo_wrap_cancels_build() {
    let (mut scene, nodes) = three_cubes();
    scene.set_selection(&nodes).unwrap();
    let op = scene.wrap_selection(NodeKind::Combine).unwrap();
    scene.undo();
    assert!(scene.run_until_idle(Duration::from_secs(30)));
    assert!(op.parent().is_none());
    assert_eq!(names(&scene), ["a", "b", "c"]);
    assert!(scene.root().children().iter().all(|n| n.rebuild_lock_count() == 0));
}

#[test]
fn test_pick_after_translation() {
    let (mut scene, nodes) = three_cubes();
    let ray = Ray::new(Vec3::new(5.0, 0.0, 20.0), Vec3::NEG_Z);
    let (hit, t) = scene.pick(&ray).unwrap();
    assert_eq!(hit, nodes[1]);
    assert!((t - 19.0).abs() < 1e-4);

    let before = get_bvh(&nodes[1]);
    scene.translate_item(&nodes[1], Vec3::new(0.0, 30.0, 0.0)).unwrap();
    assert!(!std::sync::Arc::ptr_eq(&before, &get_bvh(&nodes[1])));
    assert!(scene.pick(&ray).is_none());
}
