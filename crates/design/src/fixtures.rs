//! Factory functions for creating test data.
//!
//! Provides helpers to construct cube nodes, small scene trees, CSG
//! participants and isolated settings for tests and the agent interface.

use std::path::PathBuf;

use glam::{Mat4, Vec3};
use shared::{NodeDocument, OutputType, SceneDocument};

use crate::csg::Participant;
use crate::geometry::Mesh;
use crate::node::{Node, NodeKind};
use crate::settings::EngineSettings;

// ── Settings ────────────────────────────────────────────────────

/// Fresh assets directory under the system temp dir.
pub fn temp_assets_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("design-scene-{}-{}", label, uuid::Uuid::new_v4()))
}

/// Settings with a short idle interval and a private assets directory.
pub fn test_settings() -> EngineSettings {
    EngineSettings {
        idle_interval_ms: 10,
        asset_timeout_ms: 2000,
        assets_dir: Some(temp_assets_dir("test")),
        ..EngineSettings::default()
    }
}

// ── Node factories ──────────────────────────────────────────────

/// A named cube of edge `size` centred at `position`.
pub fn cube_node(name: &str, size: f32, position: Vec3) -> Node {
    let node = Node::with_mesh(Mesh::cube(size, size, size));
    node.set_name(name);
    node.set_matrix(Mat4::from_translation(position));
    node
}

/// Cube tagged with an output type.
pub fn cube_with_output(name: &str, size: f32, position: Vec3, output_type: OutputType) -> Node {
    let node = cube_node(name, size, position);
    node.set_output_type(output_type);
    node
}

/// Plain group holding `children`.
pub fn group_of(name: &str, children: Vec<Node>) -> Node {
    let group = Node::new();
    group.set_name(name);
    for child in children {
        group.add_child(child);
    }
    group
}

/// Operation node of `kind` holding `children`.
pub fn operation_of(kind: NodeKind, children: Vec<Node>) -> Node {
    let op = Node::with_kind(kind);
    for child in children {
        op.add_child(child);
    }
    op
}

/// A 10 mm block with a 2 mm cube hole through its centre, wrapped in a
/// subtract operation.
pub fn block_with_hole() -> Node {
    let block = cube_node("block", 10.0, Vec3::ZERO);
    let hole = Node::with_mesh(Mesh::cube(2.0, 2.0, 12.0));
    hole.set_name("hole");
    operation_of(NodeKind::Subtract(Default::default()), vec![block, hole])
}

// ── CSG participants ────────────────────────────────────────────

/// Cube participant of edge `size` centred at `position`.
pub fn cube_participant(size: f32, position: Vec3) -> Participant {
    Participant::from_mesh(Mesh::cube(size, size, size), Mat4::from_translation(position))
}

/// A row of `count` cubes of edge `size` spaced `pitch` apart along X.
pub fn cube_row(count: usize, size: f32, pitch: f32) -> Vec<Participant> {
    (0..count)
        .map(|i| cube_participant(size, Vec3::new(i as f32 * pitch, 0.0, 0.0)))
        .collect()
}

// ── Documents ───────────────────────────────────────────────────

/// Document whose root nests `depth` levels deep.
pub fn nested_document(depth: usize) -> SceneDocument {
    let mut node = NodeDocument::new(format!("n{}", depth.saturating_sub(1)));
    for level in (0..depth.saturating_sub(1)).rev() {
        let mut parent = NodeDocument::new(format!("n{level}"));
        parent.children.push(node);
        node = parent;
    }
    SceneDocument::new(node)
}
