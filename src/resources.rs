use bevy::prelude::*;

use crate::components::{BodyFeatures, BodyKind, BodyShape};

// --- Simulation Defaults ---
/// Milliseconds of simulated time per physics tick.
pub const TICK_MS: u32 = 5;
/// Fixed solver timestep. Kept equal to `TICK_MS` so the impulse-to-force
/// conversion in the force bookkeeping matches the step that produced the
/// impulses.
pub const PHYSICS_DT: f32 = TICK_MS as f32 / 1000.0;
/// Default world gravity in m/s².
pub const DEFAULT_GRAVITY: Vec2 = Vec2::new(0.0, -9.81);
/// Timestep used by the trajectory preview.
pub const PREDICT_DT: f32 = 1.0 / 60.0;
/// Number of Euler steps in the trajectory preview.
pub const PREDICT_STEPS: usize = 60;
/// Solver iteration count handed to rapier.
pub const SOLVER_ITERATIONS: usize = 8;
/// Internal PGS iterations per solver iteration.
pub const INTERNAL_PGS_ITERATIONS: usize = 3;
/// Screen pixels covered by one world meter at zoom 1.
pub const CELL_SIZE: f32 = 50.0;
/// The longest force/velocity arrow may cover at most this fraction of the
/// viewport height.
pub const MAX_VECTOR_FRACTION: f32 = 0.45;
/// Collider radius given to point particles.
pub const POINT_PARTICLE_RADIUS: f32 = 1e-4;

/// Monotonic simulation clock and playback state.
///
/// `time_ms` advances by `TICK_MS` per physics tick while `running` is set.
/// `skip_force` is a one-shot flag that suppresses user-force application on
/// the first tick after a resume or a collision rollback.
#[derive(Resource, Default)]
pub struct SimClock {
    pub time_ms: u32,
    pub running: bool,
    pub stop_at_ms: Option<u32>,
    pub skip_force: bool,
}

/// User-facing toggles that drive stepping behavior.
#[derive(Resource, Default)]
pub struct SimSettings {
    pub pause_on_collision: bool,
}

/// Per-frame display scale for the force and velocity arrow overlays.
#[derive(Resource)]
pub struct VectorScale {
    pub force: f32,
    pub velocity: f32,
}

impl Default for VectorScale {
    fn default() -> Self {
        Self {
            force: 1.0,
            velocity: 1.0,
        }
    }
}

/// Pending play/pause request from the UI. `Some(true)` asks to run,
/// `Some(false)` to pause.
#[derive(Resource, Default)]
pub struct PlaybackRequest {
    pub pending: Option<bool>,
}

/// Marker resource to request a simulation reset from the UI.
#[derive(Resource, Default)]
pub struct ResetRequest {
    pub pending: bool,
}

/// Marker resource to request deletion of the selected body.
#[derive(Resource, Default)]
pub struct DeleteRequest {
    pub pending: bool,
}

/// One body the UI asked to create.
pub struct SpawnBody {
    pub kind: BodyKind,
    pub shape: BodyShape,
    pub position: Vec2,
    pub angle: f32,
    pub features: BodyFeatures,
    pub color: Color,
}

/// Bodies queued for creation by the UI.
#[derive(Resource, Default)]
pub struct SpawnRequests {
    pub pending: Vec<SpawnBody>,
}

/// Body currently selected by the pointer, if any.
#[derive(Resource, Default)]
pub struct SelectedBody(pub Option<Entity>);

/// Why the stepper left the running state on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltReason {
    Collision,
    StopTimeReached,
}

/// Emitted by the stepper whenever it pauses the simulation itself, so the
/// UI can release the play toggle without being wired in as a callback.
#[derive(Message)]
pub struct SimulationHalted {
    pub reason: HaltReason,
}
