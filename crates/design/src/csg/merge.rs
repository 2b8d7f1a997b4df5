//! Flatten a scene into one printable mesh.

use glam::Mat4;
use serde::{Deserialize, Serialize};
use shared::OutputType;

use super::{combine_participants, BooleanKernel, CancellationToken, CsgMode, CsgSettings, Participant, ProgressFn};
use crate::error::CsgError;
use crate::geometry::Mesh;
use crate::node::Node;

/// How [`merge_for_export`] joins the scene's meshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsgOption {
    /// Union solids, union holes, subtract holes from solids.
    #[default]
    DoCsgMerge,
    /// Concatenate transformed meshes without boolean work.
    RawMerge,
}

/// Merge every persistable visible mesh under `root` into world space.
///
/// `Ok(None)` when nothing contributes geometry. With
/// [`CsgOption::DoCsgMerge`] supports are left out; solids are unioned in
/// the first third of the progress range, holes in the second, and the
/// subtraction fills the last third. Without holes only the union runs.
pub fn merge_for_export(
    root: &Node,
    option: CsgOption,
    kernel: &dyn BooleanKernel,
    settings: CsgSettings,
    progress: &mut ProgressFn<'_>,
    cancel: &CancellationToken,
) -> Result<Option<Mesh>, CsgError> {
    let items: Vec<(Participant, OutputType)> = root
        .visible_meshes()
        .into_iter()
        .filter(|item| item.world_persistable(None))
        .filter_map(|item| {
            let mesh = item.mesh()?;
            let participant = Participant::new(mesh, item.world_matrix(None, true));
            Some((participant, item.world_output_type(None)))
        })
        .collect();

    if items.is_empty() {
        return Ok(None);
    }

    if option == CsgOption::RawMerge {
        let mut merged = Mesh::default();
        for (participant, _) in &items {
            merged.copy_all_faces(&participant.world_mesh());
        }
        progress(1.0, None);
        return Ok(Some(merged));
    }

    let solids: Vec<Participant> = items
        .iter()
        .filter(|(_, t)| !matches!(t, OutputType::Hole | OutputType::Support))
        .map(|(p, _)| p.clone())
        .collect();
    let holes: Vec<Participant> = items
        .iter()
        .filter(|(_, t)| *t == OutputType::Hole)
        .map(|(p, _)| p.clone())
        .collect();
    tracing::debug!("export merge: {} solids, {} holes", solids.len(), holes.len());

    if holes.is_empty() {
        let merged = combine_participants(&solids, kernel, progress, cancel)?;
        return Ok(Some(merged));
    }

    let third = 1.0 / 3.0;
    let solids_mesh = combine_participants(
        &solids,
        kernel,
        &mut |r, s| progress(r * third, s),
        cancel,
    )?;
    let holes_mesh = combine_participants(
        &holes,
        kernel,
        &mut |r, s| progress(third + r * third, s),
        cancel,
    )?;
    cancel.check()?;
    if solids_mesh.is_empty() {
        progress(1.0, None);
        return Ok(Some(solids_mesh));
    }

    let merged = kernel.op(
        &solids_mesh,
        Mat4::IDENTITY,
        &holes_mesh,
        Mat4::IDENTITY,
        CsgMode::Subtract,
        settings.input_resolution,
        settings.output_resolution,
        &mut |r| progress(2.0 * third + r.clamp(0.0, 1.0) * third, None),
        cancel,
    )?;
    progress(1.0, None);
    Ok(Some(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csg::ManifoldKernel;
    use glam::Vec3;

    fn cube(size: f32, x: f32) -> Node {
        let node = Node::with_mesh(Mesh::cube(size, size, size));
        node.set_matrix(Mat4::from_translation(Vec3::new(x, 0.0, 0.0)));
        node
    }

    fn merge(root: &Node, option: CsgOption) -> Option<Mesh> {
        merge_for_export(
            root,
            option,
            &ManifoldKernel,
            CsgSettings::default(),
            &mut |_, _| {},
            &CancellationToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_scene() {
        assert!(merge(&Node::new(), CsgOption::DoCsgMerge).is_none());
    }

    #[test]
    fn test_holes_are_subtracted() {
        let root = Node::new();
        root.add_child(cube(10.0, 0.0));
        let hole = Node::with_mesh(Mesh::cube(4.0, 4.0, 12.0));
        hole.set_output_type(OutputType::Hole);
        root.add_child(hole);

        let merged = merge(&root, CsgOption::DoCsgMerge).unwrap();
        assert!((merged.volume() - 840.0).abs() < 1e-2);
    }

    #[test]
    fn test_support_and_hidden_and_transient_are_skipped() {
        let root = Node::new();
        root.add_child(cube(2.0, 0.0));
        let support = cube(2.0, 10.0);
        support.set_output_type(OutputType::Support);
        root.add_child(support);
        let hidden = cube(2.0, 20.0);
        hidden.set_visible(false);
        root.add_child(hidden);
        let transient = cube(2.0, 30.0);
        transient.set_persistable(false);
        root.add_child(transient);

        let merged = merge(&root, CsgOption::DoCsgMerge).unwrap();
        assert!((merged.volume() - 8.0).abs() < 1e-3);
    }

    #[test]
    fn test_raw_merge_keeps_everything_visible() {
        let root = Node::new();
        root.add_child(cube(2.0, 0.0));
        let hole = cube(2.0, 1.0);
        hole.set_output_type(OutputType::Hole);
        root.add_child(hole);

        let merged = merge(&root, CsgOption::RawMerge).unwrap();
        assert_eq!(merged.triangle_count(), 24);
    }

    #[test]
    fn test_progress_reaches_one() {
        let root = Node::new();
        root.add_child(cube(10.0, 0.0));
        let hole = cube(2.0, 0.0);
        hole.set_output_type(OutputType::Hole);
        root.add_child(hole);

        let mut reports = Vec::new();
        merge_for_export(
            &root,
            CsgOption::DoCsgMerge,
            &ManifoldKernel,
            CsgSettings::default(),
            &mut |r, _| reports.push(r),
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(reports.windows(2).all(|w| w[0] <= w[1] + 1e-12));
        assert_eq!(reports.last().copied(), Some(1.0));
    }
}
