//! Keep-minus-remove subtraction.

use glam::Mat4;

use super::{BooleanKernel, CancellationToken, CsgMode, CsgSettings, Participant, ProgressFn};
use crate::error::CsgError;
use crate::geometry::Mesh;
use crate::node::{Node, PropertyFlags};

/// Subtract every `remove` participant from each `keep` participant.
///
/// Returns one mesh per keep item, in the common frame. The first kernel call
/// for a keep item carries its matrix; later calls run on the already
/// transformed running result with the identity. Progress advances by
/// `1 / (keep × remove)` per pair, with the kernel's own progress mapped
/// into the pair's slice. With nothing to remove the result is empty.
pub fn subtract_meshes(
    keep: &[Participant],
    remove: &[Participant],
    kernel: &dyn BooleanKernel,
    settings: CsgSettings,
    progress: &mut ProgressFn<'_>,
    cancel: &CancellationToken,
) -> Result<Vec<Mesh>, CsgError> {
    let mut results = Vec::with_capacity(keep.len());
    if keep.is_empty() || remove.is_empty() {
        return Ok(results);
    }

    let amount_per_operation = 1.0 / (keep.len() * remove.len()) as f64;
    let mut ratio_completed = 0.0;

    for keep_item in keep {
        let mut result = keep_item.mesh.as_ref().clone();
        let mut keep_matrix = keep_item.matrix;
        for remove_item in remove {
            cancel.check()?;
            let start = ratio_completed;
            result = kernel.op(
                &result,
                keep_matrix,
                &remove_item.mesh,
                remove_item.matrix,
                CsgMode::Subtract,
                settings.input_resolution,
                settings.output_resolution,
                &mut |inner| progress(start + inner.clamp(0.0, 1.0) * amount_per_operation, None),
                cancel,
            )?;
            keep_matrix = Mat4::IDENTITY;

            ratio_completed += amount_per_operation;
            progress(ratio_completed.min(1.0), None);
        }
        results.push(result);
    }

    Ok(results)
}

/// Node-level subtraction.
///
/// Participants are measured in the frame of `root` when given, otherwise
/// with their local matrices. Each result node carries the keep item's id as
/// `owner_id`, starts hidden, and takes every property of the keep item but
/// its matrix and visibility.
pub fn do_subtract(
    root: Option<&Node>,
    keep: &[Node],
    remove: &[Node],
    kernel: &dyn BooleanKernel,
    settings: CsgSettings,
    progress: &mut ProgressFn<'_>,
    cancel: &CancellationToken,
) -> Result<Vec<Node>, CsgError> {
    let keep_participants = participants(root, keep);
    let remove_participants = participants(root, remove);
    if keep_participants.len() != keep.len() {
        tracing::warn!(
            "{} keep items have no mesh and were skipped",
            keep.len() - keep_participants.len()
        );
    }

    let meshes = subtract_meshes(
        &keep_participants,
        &remove_participants,
        kernel,
        settings,
        progress,
        cancel,
    )?;

    let keep_with_mesh = keep.iter().filter(|k| k.has_mesh());
    Ok(keep_with_mesh
        .zip(meshes)
        .map(|(keep_item, mesh)| {
            let result = Node::with_mesh(mesh);
            result.set_visible(false);
            result.set_owner_id(Some(keep_item.id()));
            result.copy_properties(
                keep_item,
                PropertyFlags::ALL - PropertyFlags::MATRIX - PropertyFlags::VISIBLE,
            );
            if let Some(root) = root {
                result.set_color(keep_item.world_color(Some(root)));
                result.set_output_type(keep_item.world_output_type(Some(root)));
            }
            result
        })
        .collect())
}

fn participants(root: Option<&Node>, items: &[Node]) -> Vec<Participant> {
    items
        .iter()
        .filter_map(|item| {
            let mesh = item.mesh()?;
            let matrix = match root {
                Some(root) => item.world_matrix(Some(root), false),
                None => item.matrix(),
            };
            Some(Participant::new(mesh, matrix))
        })
        .collect()
}
