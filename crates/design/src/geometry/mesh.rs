//! Indexed triangle mesh.
//!
//! Meshes are immutable once shared: nodes hold them through [`SharedMesh`]
//! and replace the whole mesh on change. The content hash and the triangle
//! BVH are computed lazily and memoized on the mesh itself.

use std::sync::{Arc, OnceLock};

use glam::{Mat4, Vec3};

use super::aabb::Aabb;
use super::hash::{hash_f32, hash_u64, FNV_SEED};
use crate::bvh::MeshBvh;

/// Mesh shared between nodes (clone-group siblings, undo entries, caches)
pub type SharedMesh = Arc<Mesh>;

/// Edge length of the placeholder cube used for missing geometry
pub const PLACEHOLDER_SIZE: f32 = 10.0;

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    positions: Vec<Vec3>,
    indices: Vec<u32>,
    hash: OnceLock<u64>,
    bvh: OnceLock<Arc<MeshBvh>>,
}

impl PartialEq for Mesh {
    fn eq(&self, other: &Self) -> bool {
        self.positions == other.positions && self.indices == other.indices
    }
}

impl Mesh {
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices,
            hash: OnceLock::new(),
            bvh: OnceLock::new(),
        }
    }

    /// Build from flat `[x, y, z, x, y, z, ...]` positions.
    pub fn from_flat(positions: &[f32], indices: &[u32]) -> Self {
        let positions = positions
            .chunks_exact(3)
            .map(|c| Vec3::new(c[0], c[1], c[2]))
            .collect();
        Self::new(positions, indices.to_vec())
    }

    /// Axis-aligned box centered at the origin with 8 shared vertices and
    /// outward (counter-clockwise) winding.
    pub fn cube(width: f32, height: f32, depth: f32) -> Self {
        let (x, y, z) = (width / 2.0, height / 2.0, depth / 2.0);
        let positions = vec![
            Vec3::new(-x, -y, -z),
            Vec3::new(x, -y, -z),
            Vec3::new(x, y, -z),
            Vec3::new(-x, y, -z),
            Vec3::new(-x, -y, z),
            Vec3::new(x, -y, z),
            Vec3::new(x, y, z),
            Vec3::new(-x, y, z),
        ];
        let indices = vec![
            0, 3, 2, 0, 2, 1, // -Z
            4, 5, 6, 4, 6, 7, // +Z
            0, 1, 5, 0, 5, 4, // -Y
            3, 7, 6, 3, 6, 2, // +Y
            0, 4, 7, 0, 7, 3, // -X
            1, 2, 6, 1, 6, 5, // +X
        ];
        Self::new(positions, indices)
    }

    /// Stand-in geometry for unresolved assets and lost clone meshes.
    pub fn placeholder() -> Self {
        Self::cube(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, PLACEHOLDER_SIZE)
    }

    /// Whether the content equals [`Mesh::placeholder`].
    pub fn is_placeholder(&self) -> bool {
        static PLACEHOLDER_HASH: OnceLock<u64> = OnceLock::new();
        self.triangle_count() == 12
            && self.long_hash() == *PLACEHOLDER_HASH.get_or_init(|| Mesh::placeholder().long_hash())
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Positions flattened for kernels and file formats.
    pub fn flat_positions(&self) -> Vec<f32> {
        self.positions.iter().flat_map(|p| [p.x, p.y, p.z]).collect()
    }

    /// Vertices of triangle `index`.
    pub fn triangle(&self, index: usize) -> [Vec3; 3] {
        let i = index * 3;
        [
            self.positions[self.indices[i] as usize],
            self.positions[self.indices[i + 1] as usize],
            self.positions[self.indices[i + 2] as usize],
        ]
    }

    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        (0..self.triangle_count()).map(move |i| self.triangle(i))
    }

    /// Copy of the mesh with every vertex transformed. Mirroring matrices
    /// flip the winding so faces keep pointing outward.
    pub fn transformed(&self, matrix: &Mat4) -> Mesh {
        if *matrix == Mat4::IDENTITY {
            return Mesh::new(self.positions.clone(), self.indices.clone());
        }
        let positions = self
            .positions
            .iter()
            .map(|p| matrix.transform_point3(*p))
            .collect();
        let indices = if matrix.determinant() < 0.0 {
            self.indices
                .chunks_exact(3)
                .flat_map(|t| [t[0], t[2], t[1]])
                .collect()
        } else {
            self.indices.clone()
        };
        Mesh::new(positions, indices)
    }

    /// Append every face of `other` without any boolean processing.
    pub fn copy_all_faces(&mut self, other: &Mesh) {
        let offset = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.indices.extend(other.indices.iter().map(|i| i + offset));
        self.hash = OnceLock::new();
        self.bvh = OnceLock::new();
    }

    /// Bounding box after applying `matrix`.
    pub fn aabb(&self, matrix: &Mat4) -> Aabb {
        if *matrix == Mat4::IDENTITY {
            return Aabb::from_points(&self.positions);
        }
        let mut aabb = Aabb::empty();
        for p in &self.positions {
            aabb.expand_point(matrix.transform_point3(*p));
        }
        aabb
    }

    /// Signed volume enclosed by the surface (positive for outward winding).
    pub fn volume(&self) -> f32 {
        self.triangles()
            .map(|[a, b, c]| a.dot(b.cross(c)) / 6.0)
            .sum()
    }

    /// Content hash over positions and indices, computed once.
    pub fn long_hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut hash = hash_u64(FNV_SEED, self.positions.len() as u64);
            for p in &self.positions {
                hash = hash_f32(hash_f32(hash_f32(hash, p.x), p.y), p.z);
            }
            for i in &self.indices {
                hash = hash_u64(hash, *i as u64);
            }
            hash
        })
    }

    /// Triangle BVH with at most `leaf_size` triangles per leaf.
    ///
    /// The first build is memoized; a request for another leaf size builds
    /// an uncached hierarchy.
    pub fn bvh(&self, leaf_size: usize) -> Arc<MeshBvh> {
        let leaf_size = leaf_size.max(1);
        let cached = self.bvh.get_or_init(|| Arc::new(MeshBvh::build(self, leaf_size)));
        if cached.leaf_size() == leaf_size {
            cached.clone()
        } else {
            Arc::new(MeshBvh::build(self, leaf_size))
        }
    }

    pub(crate) fn has_cached_bvh(&self) -> bool {
        self.bvh.get().is_some()
    }
}
