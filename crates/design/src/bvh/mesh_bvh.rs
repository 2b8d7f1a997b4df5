//! Triangle bounding-volume hierarchy for one mesh.

use glam::Vec3;

use crate::geometry::{ray_aabb, ray_triangle_intersect, Aabb, Mesh, Ray};

#[derive(Debug, Clone)]
enum BvhNode {
    Leaf { aabb: Aabb, start: usize, count: usize },
    Inner { aabb: Aabb, left: usize, right: usize },
}

impl BvhNode {
    fn aabb(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { aabb, .. } | BvhNode::Inner { aabb, .. } => aabb,
        }
    }
}

/// Triangles of a mesh in local space, split by centroid median.
#[derive(Debug, Clone)]
pub struct MeshBvh {
    triangles: Vec<[Vec3; 3]>,
    nodes: Vec<BvhNode>,
    leaf_size: usize,
}

impl MeshBvh {
    /// Build over every triangle of `mesh`, at most `leaf_size` per leaf.
    pub fn build(mesh: &Mesh, leaf_size: usize) -> Self {
        let leaf_size = leaf_size.max(1);
        let mut triangles: Vec<[Vec3; 3]> = mesh.triangles().collect();
        let mut nodes = Vec::new();
        if !triangles.is_empty() {
            let count = triangles.len();
            build_range(&mut triangles, 0, count, leaf_size, &mut nodes);
        }
        Self {
            triangles,
            nodes,
            leaf_size,
        }
    }

    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    pub fn aabb(&self) -> Aabb {
        self.nodes.first().map(|n| *n.aabb()).unwrap_or_else(Aabb::empty)
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Distance to the nearest triangle hit along `ray`.
    pub fn trace(&self, ray: &Ray) -> Option<f32> {
        let mut nearest: Option<f32> = None;
        let mut stack = Vec::new();
        if !self.nodes.is_empty() {
            stack.push(0usize);
        }
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            let entry = if contains(node.aabb(), ray.origin) {
                Some(0.0)
            } else {
                ray_aabb(ray, node.aabb())
            };
            match entry {
                Some(t) if nearest.map_or(true, |n| t <= n) => {}
                _ => continue,
            }
            match node {
                BvhNode::Leaf { start, count, .. } => {
                    for [a, b, c] in &self.triangles[*start..*start + *count] {
                        if let Some(t) = ray_triangle_intersect(ray, *a, *b, *c) {
                            if nearest.map_or(true, |n| t < n) {
                                nearest = Some(t);
                            }
                        }
                    }
                }
                BvhNode::Inner { left, right, .. } => {
                    stack.push(*left);
                    stack.push(*right);
                }
            }
        }
        nearest
    }
}

fn contains(aabb: &Aabb, p: Vec3) -> bool {
    p.cmpge(aabb.min).all() && p.cmple(aabb.max).all()
}

fn centroid(t: &[Vec3; 3]) -> Vec3 {
    (t[0] + t[1] + t[2]) / 3.0
}

/// Append the subtree for `triangles[start..start + count]`; returns its index.
fn build_range(
    triangles: &mut [[Vec3; 3]],
    start: usize,
    count: usize,
    leaf_size: usize,
    nodes: &mut Vec<BvhNode>,
) -> usize {
    let range = &mut triangles[start..start + count];
    let aabb = range
        .iter()
        .fold(Aabb::empty(), |acc, t| acc.union(&Aabb::from_points(t.iter())));

    let index = nodes.len();
    if count <= leaf_size {
        nodes.push(BvhNode::Leaf { aabb, start, count });
        return index;
    }

    let centroids = range
        .iter()
        .fold(Aabb::empty(), |mut acc, t| {
            acc.expand_point(centroid(t));
            acc
        });
    let extent = centroids.size();
    let axis = if extent.x >= extent.y && extent.x >= extent.z {
        0
    } else if extent.y >= extent.z {
        1
    } else {
        2
    };
    let mid = count / 2;
    range.select_nth_unstable_by(mid, |a, b| centroid(a)[axis].total_cmp(&centroid(b)[axis]));

    // reserve the slot, children fill in after it
    nodes.push(BvhNode::Leaf { aabb, start, count });
    let left = build_range(triangles, start, mid, leaf_size, nodes);
    let right = build_range(triangles, start + mid, count - mid, leaf_size, nodes);
    nodes[index] = BvhNode::Inner { aabb, left, right };
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    fn row_of_cubes(n: usize) -> Mesh {
        let mut mesh = Mesh::default();
        for i in 0..n {
            let cube = Mesh::cube(1.0, 1.0, 1.0).transformed(&Mat4::from_translation(Vec3::new(i as f32 * 2.0, 0.0, 0.0)));
            mesh.copy_all_faces(&cube);
        }
        mesh
    }

    #[test]
    fn test_empty_mesh() {
        let bvh = MeshBvh::build(&Mesh::default(), 4);
        assert!(bvh.aabb().is_empty());
        assert_eq!(bvh.trace(&Ray::new(Vec3::ZERO, Vec3::X)), None);
    }

    #[test]
    fn test_leaf_size_respected() {
        let bvh = MeshBvh::build(&row_of_cubes(8), 4);
        assert_eq!(bvh.triangle_count(), 96);
        assert!(bvh.node_count() > 1);
        assert!(bvh.nodes.iter().all(|n| match n {
            BvhNode::Leaf { count, .. } => *count <= 4,
            BvhNode::Inner { .. } => true,
        }));
    }

    #[test]
    fn test_trace_hits_nearest() {
        let bvh = MeshBvh::build(&row_of_cubes(5), 2);
        // from the far end looking back along -X: first face is the last cube's +X face
        let ray = Ray::new(Vec3::new(20.0, 0.1, 0.1), Vec3::NEG_X);
        let t = bvh.trace(&ray).unwrap();
        assert!((t - (20.0 - 8.5)).abs() < 1e-4);
    }

    #[test]
    fn test_trace_matches_brute_force() {
        let mesh = row_of_cubes(6);
        let bvh = MeshBvh::build(&mesh, 3);
        for (origin, dir) in [
            (Vec3::new(-5.0, 0.2, 0.3), Vec3::X),
            (Vec3::new(4.1, 5.0, 0.2), Vec3::NEG_Y),
            (Vec3::new(6.2, 0.0, -3.0), Vec3::Z),
            (Vec3::new(0.0, 5.0, 5.0), Vec3::Y),
        ] {
            let ray = Ray::new(origin, dir);
            let brute = mesh
                .triangles()
                .filter_map(|[a, b, c]| ray_triangle_intersect(&ray, a, b, c))
                .fold(None, |acc: Option<f32>, t| Some(acc.map_or(t, |a| a.min(t))));
            assert_eq!(bvh.trace(&ray), brute);
        }
    }

    #[test]
    fn test_origin_inside_mesh() {
        let bvh = MeshBvh::build(&Mesh::cube(2.0, 2.0, 2.0), 4);
        let t = bvh.trace(&Ray::new(Vec3::ZERO, Vec3::Y)).unwrap();
        assert!((t - 1.0).abs() < 1e-5);
    }
}
