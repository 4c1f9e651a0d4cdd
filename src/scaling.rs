use crate::resources::MAX_VECTOR_FRACTION;

/// Display scale factor keeping the longest vector arrow within a fixed
/// fraction of the viewport height.
///
/// `max_magnitude` is the largest magnitude among the vectors being drawn,
/// `zoom` the camera zoom (screen pixels = world length × `cell_size` ×
/// `zoom`). Purely presentational; never touches physics. Degenerate input
/// (zero or non-finite maximum) falls back to 1.0, and short vectors are
/// never inflated.
pub fn compute_scale(max_magnitude: f32, cell_size: f32, zoom: f32, viewport_height: f32) -> f32 {
    if !max_magnitude.is_finite() || max_magnitude <= 0.0 {
        return 1.0;
    }
    let screen_length = max_magnitude * cell_size * zoom;
    if screen_length <= 0.0 || !screen_length.is_finite() {
        return 1.0;
    }
    (viewport_height * MAX_VECTOR_FRACTION / screen_length).min(1.0)
}
