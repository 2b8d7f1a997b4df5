//! FNV-1a style rolling hash used for content-addressed caches.

use glam::Mat4;

/// Initial value of every rolling hash.
pub const FNV_SEED: u64 = 14695981039346656037;
pub const FNV_PRIME: u64 = 1099511628211;

/// Fold a 64-bit value into a running hash.
#[inline]
pub fn hash_u64(hash: u64, value: u64) -> u64 {
    (hash ^ value).wrapping_mul(FNV_PRIME)
}

#[inline]
pub fn hash_f32(hash: u64, value: f32) -> u64 {
    hash_u64(hash, value.to_bits() as u64)
}

/// Fold all 16 matrix elements (column-major) into a running hash.
pub fn hash_matrix(hash: u64, matrix: &Mat4) -> u64 {
    matrix
        .to_cols_array()
        .iter()
        .fold(hash, |h, v| hash_f32(h, *v))
}

pub fn hash_bytes(hash: u64, bytes: &[u8]) -> u64 {
    bytes.iter().fold(hash, |h, b| hash_u64(h, *b as u64))
}
