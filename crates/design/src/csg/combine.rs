//! Union of participants, one kernel call per touching set.

use glam::Mat4;

use super::touching::group_by_touching;
use super::{BooleanKernel, CancellationToken, Participant, ProgressFn};
use crate::error::CsgError;
use crate::geometry::Mesh;

/// Union every participant into one mesh in the common frame.
///
/// Touching sets with more than one member go through the kernel; singletons
/// are only transformed. The per-set results are disjoint, so they are
/// concatenated face by face. Progress advances by `set.len() / total`
/// after each set.
pub fn combine_participants(
    participants: &[Participant],
    kernel: &dyn BooleanKernel,
    progress: &mut ProgressFn<'_>,
    cancel: &CancellationToken,
) -> Result<Mesh, CsgError> {
    let sets = group_by_touching(participants);
    let total: usize = sets.iter().map(|s| s.len()).sum();
    let amount_per_participant = if total > 0 { 1.0 / total as f64 } else { 0.0 };
    let mut ratio_completed = 0.0;

    let mut result = Mesh::default();
    for set in &sets {
        cancel.check()?;
        let set_mesh = if set.len() > 1 {
            let meshes: Vec<(&Mesh, Mat4)> = set.iter().map(|p| (p.mesh.as_ref(), p.matrix)).collect();
            kernel.union(&meshes, cancel)?
        } else {
            set[0].world_mesh()
        };
        result.copy_all_faces(&set_mesh);

        ratio_completed += set.len() as f64 * amount_per_participant;
        progress(ratio_completed.min(1.0), None);
    }

    tracing::debug!(
        "combined {} participants in {} touching sets into {} triangles",
        total,
        sets.len(),
        result.triangle_count()
    );
    Ok(result)
}
