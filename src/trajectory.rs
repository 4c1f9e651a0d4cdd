use bevy::math::Vec2;

/// Rounds a point to 3 decimals, matching the precision shown in the UI and
/// used for track deduplication.
pub fn round3(v: Vec2) -> Vec2 {
    Vec2::new(
        (v.x * 1000.0).round() / 1000.0,
        (v.y * 1000.0).round() / 1000.0,
    )
}

/// Forward-Euler preview of where a body will travel if the current net
/// force estimate stays constant.
///
/// This is deliberately approximate: it does not replicate the solver's
/// integrator, it just has to stay qualitatively right for constant-force
/// regimes (a projectile must trace a parabola to visual tolerance). The
/// returned path starts at the current position and is recomputed from
/// scratch on every call; nothing is persisted.
///
/// Returns an empty path for degenerate input (non-positive mass, any
/// non-finite component) so a single bad body cannot feed NaN positions to
/// the renderer.
pub fn predict_path(
    position: Vec2,
    velocity: Vec2,
    mass: f32,
    force: Vec2,
    dt: f32,
    steps: usize,
) -> Vec<Vec2> {
    if mass <= 0.0 || !position.is_finite() || !velocity.is_finite() || !force.is_finite() {
        return Vec::new();
    }

    let acceleration = force / mass;
    let mut position = position;
    let mut velocity = velocity;
    let mut path = Vec::with_capacity(steps + 1);
    path.push(position);
    for _ in 0..steps {
        velocity += acceleration * dt;
        position += velocity * dt;
        path.push(position);
    }
    path
}
