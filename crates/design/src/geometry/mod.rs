//! Geometry primitives shared by the scene graph, the CSG engine and the BVH cache.

pub mod aabb;
pub mod hash;
pub mod matrix;
pub mod mesh;

pub use aabb::{ray_aabb, ray_triangle_intersect, Aabb, Ray};
pub use hash::{hash_f32, hash_matrix, hash_u64, FNV_PRIME, FNV_SEED};
pub use matrix::sanitize_matrix;
pub use mesh::{Mesh, SharedMesh};
