//! Constructive solid geometry over scene participants.
//!
//! Participants are (mesh, matrix) pairs snapshotted from the tree so the
//! work can run off the owner thread. Every entry point takes a progress
//! callback and a [`CancellationToken`] checked between kernel calls.

pub mod combine;
pub mod job;
pub mod kernel;
pub mod merge;
pub mod subtract;
pub mod touching;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::Mat4;

use crate::error::CsgError;
use crate::geometry::{Aabb, Mesh, SharedMesh};

pub use combine::combine_participants;
pub use job::CsgJob;
pub use kernel::{BooleanKernel, CsgMode, ManifoldKernel, ProcessingResolution};
pub use merge::{merge_for_export, CsgOption};
pub use subtract::{do_subtract, subtract_meshes};
pub use touching::group_by_touching;

/// Progress sink: ratio in `[0, 1]` and an optional status label.
pub type ProgressFn<'a> = dyn FnMut(f64, Option<String>) + 'a;

/// Token for cooperative cancellation of long-running boolean work.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation has been signalled.
    pub fn check(&self) -> Result<(), CsgError> {
        if self.is_cancelled() {
            Err(CsgError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One mesh taking part in a boolean operation, with its transform into the
/// frame the operation works in.
#[derive(Debug, Clone)]
pub struct Participant {
    pub mesh: SharedMesh,
    pub matrix: Mat4,
}

impl Participant {
    pub fn new(mesh: SharedMesh, matrix: Mat4) -> Self {
        Self { mesh, matrix }
    }

    pub fn from_mesh(mesh: Mesh, matrix: Mat4) -> Self {
        Self::new(Arc::new(mesh), matrix)
    }

    /// Bounds in the operation frame.
    pub fn aabb(&self) -> Aabb {
        self.mesh.aabb(&self.matrix)
    }

    /// Mesh with the transform applied.
    pub fn world_mesh(&self) -> Mesh {
        self.mesh.transformed(&self.matrix)
    }
}

/// Resolutions forwarded to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CsgSettings {
    pub input_resolution: ProcessingResolution,
    pub output_resolution: ProcessingResolution,
}

impl From<&crate::settings::EngineSettings> for CsgSettings {
    fn from(settings: &crate::settings::EngineSettings) -> Self {
        Self {
            input_resolution: settings.input_resolution,
            output_resolution: settings.output_resolution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_token_shared_between_clones() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());
        other.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(CsgError::Cancelled));
    }

    #[test]
    fn test_participant_aabb_uses_matrix() {
        let p = Participant::from_mesh(
            Mesh::cube(2.0, 2.0, 2.0),
            Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)),
        );
        assert!((p.aabb().center() - Vec3::new(5.0, 0.0, 0.0)).length() < 1e-5);
    }
}
