//! Boolean mesh kernel boundary.

use glam::Mat4;
use serde::{Deserialize, Serialize};

use super::CancellationToken;
use crate::error::CsgError;
use crate::geometry::Mesh;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsgMode {
    Union,
    Subtract,
    Intersect,
}

/// Grid resolution hint for kernels that quantize their input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingResolution {
    R16,
    R32,
    #[default]
    R64,
    R128,
}

/// "Mesh A op mesh B" provider. Implementations may be slow and must be
/// callable from background threads.
pub trait BooleanKernel: Send + Sync {
    /// Union of every (mesh, matrix) pair, in the common frame.
    fn union(&self, meshes: &[(&Mesh, Mat4)], cancel: &CancellationToken) -> Result<Mesh, CsgError>;

    /// `a op b` with both operands transformed into the common frame.
    /// `progress` receives the completed fraction of this one operation.
    #[allow(clippy::too_many_arguments)]
    fn op(
        &self,
        a: &Mesh,
        a_matrix: Mat4,
        b: &Mesh,
        b_matrix: Mat4,
        mode: CsgMode,
        input_resolution: ProcessingResolution,
        output_resolution: ProcessingResolution,
        progress: &mut dyn FnMut(f64),
        cancel: &CancellationToken,
    ) -> Result<Mesh, CsgError>;
}

/// Exact polygon booleans through `manifold-rs`. Resolutions are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifoldKernel;

impl ManifoldKernel {
    fn to_manifold(mesh: &Mesh, matrix: Mat4) -> Result<manifold_rs::Manifold, CsgError> {
        let world = mesh.transformed(&matrix);
        let vertices = world.flat_positions();
        let manifold = manifold_rs::Mesh::new(&vertices, world.indices()).to_manifold();
        if manifold.is_empty() && !mesh.is_empty() {
            return Err(CsgError::Kernel(format!(
                "mesh with {} triangles is not a closed manifold",
                mesh.triangle_count()
            )));
        }
        Ok(manifold)
    }

    fn from_manifold(manifold: &manifold_rs::Manifold) -> Result<Mesh, CsgError> {
        let mesh = manifold.to_mesh();
        let vertices = mesh.vertices();
        let indices = mesh.indices();
        if vertices.len() % 3 != 0 {
            return Err(CsgError::Kernel(format!(
                "unexpected vertex buffer length {}",
                vertices.len()
            )));
        }
        Ok(Mesh::from_flat(&vertices, &indices))
    }
}

impl BooleanKernel for ManifoldKernel {
    fn union(&self, meshes: &[(&Mesh, Mat4)], cancel: &CancellationToken) -> Result<Mesh, CsgError> {
        let mut result: Option<manifold_rs::Manifold> = None;
        for (mesh, matrix) in meshes {
            cancel.check()?;
            let next = Self::to_manifold(mesh, *matrix)?;
            result = Some(match result {
                Some(existing) => existing.union(&next),
                None => next,
            });
        }
        match result {
            Some(manifold) => Self::from_manifold(&manifold),
            None => Ok(Mesh::default()),
        }
    }

    fn op(
        &self,
        a: &Mesh,
        a_matrix: Mat4,
        b: &Mesh,
        b_matrix: Mat4,
        mode: CsgMode,
        _input_resolution: ProcessingResolution,
        _output_resolution: ProcessingResolution,
        progress: &mut dyn FnMut(f64),
        cancel: &CancellationToken,
    ) -> Result<Mesh, CsgError> {
        cancel.check()?;
        let left = Self::to_manifold(a, a_matrix)?;
        let right = Self::to_manifold(b, b_matrix)?;
        let result = match mode {
            CsgMode::Union => left.union(&right),
            CsgMode::Subtract => left.difference(&right),
            CsgMode::Intersect => left.intersection(&right),
        };
        progress(1.0);
        Self::from_manifold(&result)
    }
}
