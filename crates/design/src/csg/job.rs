//! Thread-safe snapshot of an operation node's inputs.

use shared::OutputType;

use super::{
    combine_participants, subtract_meshes, BooleanKernel, CancellationToken, CsgMode, CsgSettings, Participant,
    ProgressFn,
};
use crate::error::CsgError;
use crate::geometry::Mesh;
use crate::node::{Node, NodeKind};

/// Inputs of one operation rebuild, measured in the operation node's frame.
///
/// Built on the owner thread from the live tree, then run anywhere.
#[derive(Debug, Clone)]
pub enum CsgJob {
    /// Union of the solids, minus the union of the holes. Supports take no part.
    Combine {
        solids: Vec<Participant>,
        holes: Vec<Participant>,
    },
    /// Every `remove` participant subtracted from each `keep` participant.
    Subtract {
        keep: Vec<Participant>,
        remove: Vec<Participant>,
    },
}

impl CsgJob {
    /// Snapshot the children of an operation node; `None` for other kinds.
    pub fn from_node(node: &Node) -> Option<Self> {
        match node.kind() {
            NodeKind::Combine => {
                let mut solids = Vec::new();
                let mut holes = Vec::new();
                for child in node.children() {
                    for (participant, output_type) in child_participants(node, &child) {
                        match output_type {
                            OutputType::Hole => holes.push(participant),
                            OutputType::Support => {}
                            OutputType::Default | OutputType::Solid => solids.push(participant),
                        }
                    }
                }
                Some(CsgJob::Combine { solids, holes })
            }
            NodeKind::Subtract(operation) => {
                let (keep_nodes, remove_nodes) = operation.partition(&node.children());
                let collect = |nodes: &[Node]| -> Vec<Participant> {
                    nodes
                        .iter()
                        .flat_map(|child| child_participants(node, child))
                        .map(|(p, _)| p)
                        .collect()
                };
                Some(CsgJob::Subtract {
                    keep: collect(&keep_nodes),
                    remove: collect(&remove_nodes),
                })
            }
            NodeKind::Object | NodeKind::SelectionGroup => None,
        }
    }

    pub fn participant_count(&self) -> usize {
        match self {
            CsgJob::Combine { solids, holes } => solids.len() + holes.len(),
            CsgJob::Subtract { keep, remove } => keep.len() + remove.len(),
        }
    }

    /// Compute the operation's mesh.
    pub fn run(
        &self,
        kernel: &dyn BooleanKernel,
        settings: CsgSettings,
        progress: &mut ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<Mesh, CsgError> {
        match self {
            CsgJob::Combine { solids, holes } => {
                if solids.is_empty() {
                    progress(1.0, None);
                    return Ok(Mesh::default());
                }
                if holes.is_empty() {
                    let result = combine_participants(solids, kernel, progress, cancel)?;
                    progress(1.0, None);
                    return Ok(result);
                }
                let solid = combine_participants(solids, kernel, &mut |r, s| progress(r * 0.5, s), cancel)?;
                let hole = combine_participants(holes, kernel, &mut |r, s| progress(0.5 + r * 0.25, s), cancel)?;
                cancel.check()?;
                let result = kernel.op(
                    &solid,
                    glam::Mat4::IDENTITY,
                    &hole,
                    glam::Mat4::IDENTITY,
                    CsgMode::Subtract,
                    settings.input_resolution,
                    settings.output_resolution,
                    &mut |r| progress(0.75 + r.clamp(0.0, 1.0) * 0.25, None),
                    cancel,
                )?;
                progress(1.0, None);
                Ok(result)
            }
            CsgJob::Subtract { keep, remove } => {
                if remove.is_empty() {
                    // nothing to cut: the keep geometry passes through
                    let mut result = Mesh::default();
                    for participant in keep {
                        result.copy_all_faces(&participant.world_mesh());
                    }
                    progress(1.0, None);
                    return Ok(result);
                }
                let pieces = subtract_meshes(keep, remove, kernel, settings, progress, cancel)?;
                let mut result = Mesh::default();
                for piece in &pieces {
                    result.copy_all_faces(piece);
                }
                progress(1.0, None);
                Ok(result)
            }
        }
    }
}

/// Visible meshes of `child` in the frame of `operation`, with the output
/// type each one resolves to inside `child`.
fn child_participants(operation: &Node, child: &Node) -> Vec<(Participant, OutputType)> {
    child
        .visible_meshes()
        .into_iter()
        .filter_map(|item| {
            let mesh = item.mesh()?;
            let matrix = item.world_matrix(Some(operation), false);
            Some((Participant::new(mesh, matrix), item.world_output_type(Some(child))))
        })
        .collect()
}
