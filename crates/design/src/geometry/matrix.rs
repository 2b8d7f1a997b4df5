use glam::{Mat4, Vec3};

/// Replace a matrix holding NaN or infinite values, or one that cannot be
/// inverted, with the identity.
pub fn sanitize_matrix(matrix: Mat4) -> Mat4 {
    if !matrix.is_finite() {
        tracing::debug!("non-finite matrix replaced with identity");
        Mat4::IDENTITY
    } else if matrix.determinant().abs() < f32::EPSILON {
        tracing::debug!("singular matrix replaced with identity");
        Mat4::IDENTITY
    } else {
        matrix
    }
}

/// Translation component of an affine matrix.
pub fn translation_of(matrix: &Mat4) -> Vec3 {
    matrix.w_axis.truncate()
}

pub fn from_cols_array(cols: &[f32; 16]) -> Mat4 {
    sanitize_matrix(Mat4::from_cols_array(cols))
}
