//! Ray-traceable bounding-volume hierarchies over the scene.
//!
//! Each mesh memoizes its own [`MeshBvh`]. Nodes cache a [`Traceable`]
//! keyed by a content hash of their transform, mesh, visibility and
//! children, so unchanged subtrees are reused between queries.

mod cache;
mod mesh_bvh;

pub use cache::{get_bvh, get_bvh_with, node_hash, DEFAULT_LEAF_SIZE};
pub use mesh_bvh::MeshBvh;

use std::sync::Arc;

use glam::Mat4;

use crate::geometry::{ray_aabb, Aabb, Ray};

/// One level of a scene trace hierarchy.
#[derive(Debug, Clone)]
pub enum Traceable {
    /// Triangles of a single mesh, in the mesh's local space.
    Mesh(Arc<MeshBvh>),
    /// Union of child hierarchies sharing one frame.
    Hierarchy { children: Vec<Arc<Traceable>>, aabb: Aabb },
    /// `inner` placed by `matrix`.
    Transform {
        matrix: Mat4,
        inverse: Mat4,
        inner: Arc<Traceable>,
        aabb: Aabb,
    },
}

impl Traceable {
    pub fn hierarchy(children: Vec<Arc<Traceable>>) -> Self {
        let aabb = children.iter().fold(Aabb::empty(), |acc, c| acc.union(&c.aabb()));
        Traceable::Hierarchy { children, aabb }
    }

    pub fn transform(matrix: Mat4, inner: Arc<Traceable>) -> Self {
        let aabb = inner.aabb().transformed(&matrix);
        Traceable::Transform {
            matrix,
            inverse: matrix.inverse(),
            inner,
            aabb,
        }
    }

    /// Bounds in the parent frame.
    pub fn aabb(&self) -> Aabb {
        match self {
            Traceable::Mesh(bvh) => bvh.aabb(),
            Traceable::Hierarchy { aabb, .. } | Traceable::Transform { aabb, .. } => *aabb,
        }
    }

    /// Distance along `ray` to the nearest surface.
    ///
    /// Transforms do not renormalize the ray direction, so distances stay in
    /// the caller's units at every level.
    pub fn trace(&self, ray: &Ray) -> Option<f32> {
        match self {
            Traceable::Mesh(bvh) => bvh.trace(ray),
            Traceable::Hierarchy { children, aabb } => {
                if aabb.is_empty() || (ray_aabb(ray, aabb).is_none() && !contains(aabb, ray)) {
                    return None;
                }
                children
                    .iter()
                    .filter_map(|c| c.trace(ray))
                    .min_by(f32::total_cmp)
            }
            Traceable::Transform { inverse, inner, .. } => {
                let local = Ray::new(inverse.transform_point3(ray.origin), inverse.transform_vector3(ray.direction));
                inner.trace(&local)
            }
        }
    }
}

fn contains(aabb: &Aabb, ray: &Ray) -> bool {
    ray.origin.cmpge(aabb.min).all() && ray.origin.cmple(aabb.max).all()
}
