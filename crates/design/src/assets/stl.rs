//! STL mesh codec: binary write, binary and ASCII read.

use std::collections::HashMap;
use std::io::{self, Write};

use glam::Vec3;

use crate::error::PersistenceError;
use crate::geometry::Mesh;

const HEADER_LEN: usize = 80;
const TRIANGLE_LEN: usize = 50;

/// Write `mesh` as binary STL.
pub fn write_binary(mesh: &Mesh, out: &mut impl Write) -> io::Result<()> {
    let mut header = [0u8; HEADER_LEN];
    let label = b"design-scene mesh";
    header[..label.len()].copy_from_slice(label);
    out.write_all(&header)?;
    out.write_all(&(mesh.triangle_count() as u32).to_le_bytes())?;
    for [a, b, c] in mesh.triangles() {
        let normal = (b - a).cross(c - a).normalize_or_zero();
        for v in [normal, a, b, c] {
            for component in v.to_array() {
                out.write_all(&component.to_le_bytes())?;
            }
        }
        out.write_all(&0u16.to_le_bytes())?;
    }
    Ok(())
}

pub fn to_bytes(mesh: &Mesh) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + 4 + mesh.triangle_count() * TRIANGLE_LEN);
    // writing into a Vec cannot fail
    let _ = write_binary(mesh, &mut bytes);
    bytes
}

/// Decode binary or ASCII STL. Coincident vertices are merged.
pub fn read(bytes: &[u8]) -> Result<Mesh, PersistenceError> {
    if let Some(count) = binary_triangle_count(bytes) {
        return read_binary(bytes, count);
    }
    if bytes.trim_ascii_start().starts_with(b"solid") {
        return read_ascii(bytes);
    }
    Err(PersistenceError::InvalidStl(format!(
        "{} bytes is neither binary nor ASCII STL",
        bytes.len()
    )))
}

fn binary_triangle_count(bytes: &[u8]) -> Option<usize> {
    let count_bytes: [u8; 4] = bytes.get(HEADER_LEN..HEADER_LEN + 4)?.try_into().ok()?;
    let count = u32::from_le_bytes(count_bytes) as usize;
    (bytes.len() == HEADER_LEN + 4 + count * TRIANGLE_LEN).then_some(count)
}

fn read_binary(bytes: &[u8], count: usize) -> Result<Mesh, PersistenceError> {
    let mut builder = MeshBuilder::default();
    for i in 0..count {
        let start = HEADER_LEN + 4 + i * TRIANGLE_LEN + 12;
        let mut corners = [Vec3::ZERO; 3];
        for (k, corner) in corners.iter_mut().enumerate() {
            let offset = start + k * 12;
            *corner = Vec3::new(
                read_f32(bytes, offset)?,
                read_f32(bytes, offset + 4)?,
                read_f32(bytes, offset + 8)?,
            );
        }
        builder.add_triangle(corners);
    }
    Ok(builder.build())
}

fn read_f32(bytes: &[u8], offset: usize) -> Result<f32, PersistenceError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(f32::from_le_bytes)
        .ok_or_else(|| PersistenceError::InvalidStl(format!("truncated at byte {offset}")))
}

fn read_ascii(bytes: &[u8]) -> Result<Mesh, PersistenceError> {
    let text = std::str::from_utf8(bytes).map_err(|e| PersistenceError::InvalidStl(e.to_string()))?;
    let mut builder = MeshBuilder::default();
    let mut corners = Vec::with_capacity(3);
    for (line_number, line) in text.lines().enumerate() {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("vertex") => {
                let coords: Vec<f32> = words
                    .map(str::parse::<f32>)
                    .collect::<Result<_, _>>()
                    .map_err(|e| PersistenceError::InvalidStl(format!("line {}: {e}", line_number + 1)))?;
                let [x, y, z] = coords[..] else {
                    return Err(PersistenceError::InvalidStl(format!(
                        "line {}: expected 3 coordinates",
                        line_number + 1
                    )));
                };
                corners.push(Vec3::new(x, y, z));
            }
            Some("endloop") => {
                let [a, b, c] = corners[..] else {
                    return Err(PersistenceError::InvalidStl(format!(
                        "line {}: facet with {} vertices",
                        line_number + 1,
                        corners.len()
                    )));
                };
                builder.add_triangle([a, b, c]);
                corners.clear();
            }
            _ => {}
        }
    }
    Ok(builder.build())
}

#[derive(Default)]
struct MeshBuilder {
    positions: Vec<Vec3>,
    indices: Vec<u32>,
    lookup: HashMap<[u32; 3], u32>,
}

impl MeshBuilder {
    fn add_triangle(&mut self, corners: [Vec3; 3]) {
        for corner in corners {
            let key = [corner.x.to_bits(), corner.y.to_bits(), corner.z.to_bits()];
            let next = self.positions.len() as u32;
            let index = *self.lookup.entry(key).or_insert(next);
            if index == next {
                self.positions.push(corner);
            }
            self.indices.push(index);
        }
    }

    fn build(self) -> Mesh {
        Mesh::new(self.positions, self.indices)
    }
}
