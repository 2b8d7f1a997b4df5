//! Per-node trace hierarchy cache.

use std::sync::Arc;

use super::Traceable;
use crate::geometry::{hash_matrix, hash_u64, FNV_SEED};
use crate::node::Node;

/// Triangles per BVH leaf when no setting is given.
pub const DEFAULT_LEAF_SIZE: usize = 4;

/// Content hash of a subtree: matrix, mesh, visibility, then each child's
/// hash in order.
pub fn node_hash(node: &Node) -> u64 {
    let mut hash = hash_matrix(FNV_SEED, &node.matrix());
    if let Some(mesh) = node.mesh() {
        hash = hash_u64(hash, mesh.long_hash());
    }
    hash = hash_u64(hash, node.visible() as u64);
    for child in node.children() {
        hash = hash_u64(hash, node_hash(&child));
    }
    hash
}

pub fn get_bvh(node: &Node) -> Arc<Traceable> {
    get_bvh_with(node, DEFAULT_LEAF_SIZE)
}

/// Trace hierarchy of `node` in its parent's frame, reused while the
/// subtree hash and `leaf_size` are unchanged.
///
/// A node with a mesh traces only that mesh; otherwise the visible
/// children are gathered under one hierarchy level.
pub fn get_bvh_with(node: &Node, leaf_size: usize) -> Arc<Traceable> {
    let hash = hash_u64(node_hash(node), leaf_size as u64);
    if let Some((cached_hash, cached)) = node.trace_cache() {
        if cached_hash == hash {
            return cached;
        }
    }

    let inner = match node.mesh() {
        Some(mesh) => Arc::new(Traceable::Mesh(mesh.bvh(leaf_size))),
        None => {
            let children = node
                .children()
                .iter()
                .filter(|c| c.visible())
                .map(|c| get_bvh_with(c, leaf_size))
                .collect();
            Arc::new(Traceable::hierarchy(children))
        }
    };
    let traceable = Arc::new(Traceable::transform(node.matrix(), inner));
    tracing::trace!("rebuilt trace hierarchy for {}", node.id());
    node.set_trace_cache(hash, traceable.clone());
    traceable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Mesh, Ray};
    use glam::{Mat4, Vec3};

    fn cube_at(x: f32) -> Node {
        let node = Node::with_mesh(Mesh::cube(1.0, 1.0, 1.0));
        node.set_matrix(Mat4::from_translation(Vec3::new(x, 0.0, 0.0)));
        node
    }

    #[test]
    fn test_unchanged_subtree_is_reused() {
        let root = Node::new();
        root.add_child(cube_at(3.0));
        let first = get_bvh(&root);
        let second = get_bvh(&root);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_mesh_change_rebuilds() {
        let root = Node::new();
        let child = cube_at(3.0);
        root.add_child(child.clone());
        let hash_before = node_hash(&root);
        let first = get_bvh(&root);

        child.set_mesh(Some(Arc::new(Mesh::cube(2.0, 2.0, 2.0))));
        assert_ne!(hash_before, node_hash(&root));
        let second = get_bvh(&root);
        assert!(!Arc::ptr_eq(&first, &second));
        let hit = second.trace(&Ray::new(Vec3::ZERO, Vec3::X)).unwrap();
        assert!((hit - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_sibling_change_reuses_untouched_child() {
        let root = Node::new();
        let still = cube_at(3.0);
        let moving = cube_at(-3.0);
        root.add_child(still.clone());
        root.add_child(moving.clone());
        get_bvh(&root);
        let still_before = get_bvh(&still);

        moving.set_matrix(Mat4::from_translation(Vec3::new(-6.0, 0.0, 0.0)));
        get_bvh(&root);
        assert!(Arc::ptr_eq(&still_before, &get_bvh(&still)));
    }

    #[test]
    fn test_hiding_child_rebuilds() {
        let root = Node::new();
        let child = cube_at(3.0);
        root.add_child(child.clone());
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        assert!(get_bvh(&root).trace(&ray).is_some());

        child.set_visible(false);
        assert!(get_bvh(&root).trace(&ray).is_none());
    }

    #[test]
    fn test_leaf_size_change_rebuilds() {
        let root = Node::new();
        root.add_child(cube_at(3.0));
        let default = get_bvh(&root);
        assert!(Arc::ptr_eq(&default, &get_bvh_with(&root, DEFAULT_LEAF_SIZE)));
        let coarse = get_bvh_with(&root, 64);
        assert!(!Arc::ptr_eq(&default, &coarse));
        assert!(coarse.trace(&Ray::new(Vec3::ZERO, Vec3::X)).is_some());
    }

    #[test]
    fn test_mesh_bvh_memoized_on_mesh() {
        let child = cube_at(0.0);
        let mesh = child.mesh().unwrap();
        assert!(!mesh.has_cached_bvh());
        get_bvh(&child);
        assert!(mesh.has_cached_bvh());
    }

    #[test]
    fn test_node_with_mesh_ignores_children_for_tracing() {
        let parent = cube_at(0.0);
        parent.add_child(cube_at(10.0));
        let hit = get_bvh(&parent).trace(&Ray::new(Vec3::new(5.0, 0.0, 0.0), Vec3::X));
        assert!(hit.is_none());
    }
}
