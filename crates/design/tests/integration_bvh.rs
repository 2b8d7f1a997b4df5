//! Integration tests for the BVH cache.
//!
//! Tests that unchanged subtrees reuse their cached hierarchy and that the
//! hierarchy traces the same hits as brute force.

use std::sync::Arc;

use design_scene_lib::bvh::{get_bvh, node_hash};
use design_scene_lib::fixtures::*;
use design_scene_lib::geometry::{ray_triangle_intersect, Ray};
use design_scene_lib::node::Node;
use glam::{Mat4, Vec3};

fn brute_force(root: &Node, ray: &Ray) -> Option<f32> {
    root.visible_meshes()
        .iter()
        .flat_map(|n| {
            let matrix = n.world_matrix(Some(root), true);
            let mesh = n.mesh().unwrap_or_default();
            mesh.triangles()
                .map(|[a, b, c]| {
                    [
                        matrix.transform_point3(a),
                        matrix.transform_point3(b),
                        matrix.transform_point3(c),
                    ]
                })
                .collect::<Vec<_>>()
        })
        .filter_map(|[a, b, c]| ray_triangle_intersect(ray, a, b, c))
        .min_by(|a, b| a.total_cmp(b))
}

fn scene_tree() -> Node {
    let left = group_of(
        "left",
        (0..4).map(|i| cube_node("l", 1.0, Vec3::new(i as f32 * 2.0, 0.0, 0.0))).collect(),
    );
    let right = group_of(
        "right",
        (0..4).map(|i| cube_node("r", 1.0, Vec3::new(0.0, i as f32 * 2.0, 0.0))).collect(),
    );
    right.set_matrix(Mat4::from_translation(Vec3::new(20.0, 0.0, 0.0)));
    group_of("root", vec![left, right])
}

#[test]
fn test_unchanged_subtree_reused_after_sibling_edit() {
    let root = scene_tree();
    let children = root.children();
    let (left, right) = (&children[0], &children[1]);

    let first = get_bvh(&root);
    let left_before = get_bvh(left);
    let right_before = get_bvh(right);
    assert!(Arc::ptr_eq(&first, &get_bvh(&root)));

    right.children()[2].set_matrix(Mat4::from_translation(Vec3::new(0.0, 4.0, 5.0)));

    assert!(Arc::ptr_eq(&left_before, &get_bvh(left)));
    assert!(!Arc::ptr_eq(&right_before, &get_bvh(right)));
    assert!(!Arc::ptr_eq(&first, &get_bvh(&root)));
}

#[test]
fn test_hash_tracks_visibility_and_mesh() {
    let root = scene_tree();
    let before = node_hash(&root);
    let item = root.children()[0].children()[1].clone();
    item.set_visible(false);
    assert_ne!(node_hash(&root), before);
    item.set_visible(true);
    assert_eq!(node_hash(&root), before);
}

#[test]
fn test_trace_matches_brute_force() {
    let root = scene_tree();
    let rays = [
        Ray::new(Vec3::new(-10.0, 0.0, 0.0), Vec3::X),
        Ray::new(Vec3::new(20.0, -10.0, 0.0), Vec3::Y),
        Ray::new(Vec3::new(4.0, 0.0, 10.0), Vec3::NEG_Z),
        Ray::new(Vec3::new(3.0, 0.0, 10.0), Vec3::NEG_Z),
        Ray::new(Vec3::new(0.0, 50.0, 0.0), Vec3::new(0.4, -1.0, 0.0).normalize()),
    ];
    let bvh = get_bvh(&root);
    for ray in &rays {
        let expected = brute_force(&root, ray);
        let actual = bvh.trace(ray);
        match (expected, actual) {
            (Some(e), Some(a)) => assert!((e - a).abs() < 1e-4, "{:?}: {} vs {}", ray, e, a),
            (None, None) => {}
            other => panic!("{:?}: mismatch {:?}", ray, other),
        }
    }
}
