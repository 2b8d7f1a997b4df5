//! Mesh validation utilities.
//!
//! `MeshValidator` checks mesh integrity: index stride and range, closed
//! manifold edges, degenerate faces, bounding-box dimensions and volume.

use std::collections::HashMap;

use crate::geometry::{Aabb, Mesh};

/// Validator for `Mesh` integrity checks.
pub struct MeshValidator<'a> {
    mesh: &'a Mesh,
}

impl<'a> MeshValidator<'a> {
    pub fn new(mesh: &'a Mesh) -> Self {
        Self { mesh }
    }

    pub fn vertex_count(&self) -> usize {
        self.mesh.vertex_count()
    }

    pub fn triangle_count(&self) -> usize {
        self.mesh.indices().len() / 3
    }

    /// Check that the index buffer length is a multiple of 3.
    pub fn is_index_stride_valid(&self) -> bool {
        self.mesh.indices().len() % 3 == 0
    }

    /// Check that all indices are within the valid vertex range.
    pub fn are_indices_in_range(&self) -> bool {
        let max_idx = self.vertex_count() as u32;
        self.mesh.indices().iter().all(|&i| i < max_idx)
    }

    /// Check that every vertex coordinate is finite.
    pub fn are_positions_finite(&self) -> bool {
        self.mesh.positions().iter().all(|p| p.is_finite())
    }

    /// Number of triangles whose area is below `epsilon`.
    pub fn degenerate_triangle_count(&self, epsilon: f32) -> usize {
        self.triangles()
            .filter(|[a, b, c]| (*b - *a).cross(*c - *a).length() * 0.5 < epsilon)
            .count()
    }

    /// Every directed edge is matched by exactly one edge running the
    /// opposite way: the surface is closed and consistently wound.
    pub fn is_closed(&self) -> bool {
        if !self.is_index_stride_valid() || !self.are_indices_in_range() {
            return false;
        }
        let mut edges: HashMap<(u32, u32), i32> = HashMap::new();
        for tri in self.mesh.indices().chunks_exact(3) {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                *edges.entry((a, b)).or_default() += 1;
            }
        }
        edges
            .iter()
            .all(|(&(a, b), &count)| count == 1 && edges.get(&(b, a)) == Some(&1))
    }

    /// Compute the axis-aligned bounding box of the mesh.
    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(self.mesh.positions())
    }

    /// Compute the dimensions (width, height, depth) of the bounding box.
    pub fn dimensions(&self) -> [f32; 3] {
        if self.vertex_count() == 0 {
            return [0.0; 3];
        }
        self.aabb().size().to_array()
    }

    /// Check that the AABB dimensions are approximately equal to `expected`.
    pub fn assert_dimensions_approx(&self, expected: [f32; 3], tolerance: f32) -> bool {
        let dims = self.dimensions();
        (dims[0] - expected[0]).abs() < tolerance
            && (dims[1] - expected[1]).abs() < tolerance
            && (dims[2] - expected[2]).abs() < tolerance
    }

    /// Enclosed volume, or zero when the indices are unusable.
    pub fn volume(&self) -> f32 {
        self.triangles().map(|[a, b, c]| a.dot(b.cross(c)) / 6.0).sum()
    }

    pub fn assert_volume_approx(&self, expected: f32, tolerance: f32) -> bool {
        (self.volume() - expected).abs() < tolerance
    }

    fn triangles(&self) -> impl Iterator<Item = [glam::Vec3; 3]> + '_ {
        let usable = self.is_index_stride_valid() && self.are_indices_in_range();
        let positions = self.mesh.positions();
        self.mesh
            .indices()
            .chunks_exact(3)
            .filter(move |_| usable)
            .map(move |t| [positions[t[0] as usize], positions[t[1] as usize], positions[t[2] as usize]])
    }

    /// Run all validation checks and return a list of error messages.
    /// An empty list means the mesh is valid.
    pub fn validate_all(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !self.is_index_stride_valid() {
            errors.push(format!(
                "Index buffer length {} is not a multiple of 3",
                self.mesh.indices().len()
            ));
        }

        if !self.are_indices_in_range() {
            let max_idx = self.vertex_count() as u32;
            let out_of_range: Vec<_> = self
                .mesh
                .indices()
                .iter()
                .filter(|&&i| i >= max_idx)
                .take(5)
                .collect();
            errors.push(format!(
                "Indices out of range (vertex_count={}): {:?}",
                max_idx, out_of_range
            ));
        }

        if !self.are_positions_finite() {
            errors.push("Some vertex positions are not finite".to_string());
        }

        if self.triangle_count() > 0 && !self.is_closed() {
            errors.push("Surface is not closed".to_string());
        }

        let degenerate = self.degenerate_triangle_count(1e-9);
        if degenerate > 0 {
            errors.push(format!("{} degenerate triangles", degenerate));
        }

        errors
    }
}
