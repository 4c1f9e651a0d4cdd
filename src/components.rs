use bevy::prelude::*;
use rapier2d::prelude::RigidBodyHandle;

use crate::physics::BodySnapshot;
use crate::trajectory::round3;

/// How a body participates in the solver.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BodyKind {
    Static,
    Dynamic,
}

/// Collision shape of a body, in local coordinates (meters).
#[derive(Clone, Copy, Debug)]
pub enum BodyShape {
    Rectangle { half_extents: Vec2 },
    Circle { radius: f32 },
    Triangle { vertices: [Vec2; 3] },
    PointParticle,
}

/// Material and initial-motion parameters for a new body.
#[derive(Clone, Copy, Debug)]
pub struct BodyFeatures {
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub fixed_rotation: bool,
}

impl Default for BodyFeatures {
    fn default() -> Self {
        Self {
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            density: 1.0,
            friction: 0.3,
            restitution: 0.0,
            fixed_rotation: false,
        }
    }
}

/// Link between a rendered entity and its rigid body in the physics world.
///
/// The physics world owns the authoritative kinematic state; this component
/// only carries the handle, so systems re-read state each frame instead of
/// caching copies. `start` is the state restored by a simulation reset.
#[derive(Component)]
pub struct Body {
    pub handle: RigidBodyHandle,
    pub kind: BodyKind,
    pub shape: BodyShape,
    pub start: BodySnapshot,
}

/// Per-body force bookkeeping, one per dynamic body.
///
/// `applied` persists across frames until the user changes it. `gravity` and
/// `total` are recomputed every tick; `total` folds in the contact force
/// estimate recovered from the solver's impulses.
#[derive(Component, Default)]
pub struct ForceBook {
    pub applied: Vec2,
    pub gravity: Vec2,
    pub total: Vec2,
}

/// Positions a body actually visited while the simulation ran.
///
/// Append-only until explicitly cleared; points are rounded to 3 decimals so
/// consecutive near-identical samples deduplicate.
#[derive(Component, Default)]
pub struct Track {
    pub points: Vec<Vec2>,
    pub visible: bool,
}

impl Track {
    pub fn record(&mut self, point: Vec2) {
        let point = round3(point);
        if self.points.last() != Some(&point) {
            self.points.push(point);
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

/// Per-body toggles for the vector overlays and the predicted path.
#[derive(Component, Default)]
pub struct VectorDisplay {
    pub show_forces: bool,
    pub show_velocity: bool,
    pub show_predicted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_deduplicates_consecutive_points() {
        let mut track = Track::default();
        track.record(Vec2::new(1.00049, 2.0));
        track.record(Vec2::new(1.00012, 2.0));
        track.record(Vec2::new(1.5, 2.0));
        assert_eq!(
            track.points,
            vec![Vec2::new(1.0, 2.0), Vec2::new(1.5, 2.0)]
        );
    }

    #[test]
    fn clear_empties_the_track() {
        let mut track = Track::default();
        track.record(Vec2::new(0.5, -0.5));
        track.clear();
        assert!(track.points.is_empty());
    }
}
