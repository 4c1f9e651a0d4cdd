mod components;
mod physics;
mod resources;
mod scaling;
mod systems;
mod trajectory;

use bevy::prelude::*;
use bevy::window::WindowResolution;
use bevy_egui::{EguiPlugin, EguiPrimaryContextPass};

use crate::physics::PhysicsWorld;
use crate::resources::{
    DeleteRequest, PHYSICS_DT, PlaybackRequest, ResetRequest, SelectedBody, SimClock, SimSettings,
    SimulationHalted, SpawnRequests, VectorScale,
};
use crate::systems::*;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Mechanika 2D Sandbox".into(),
                resolution: WindowResolution::new(1280, 800),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(EguiPlugin::default())
        .insert_resource(ClearColor(Color::srgb(0.86, 0.86, 0.86)))
        .init_resource::<PhysicsWorld>()
        .init_resource::<SimClock>()
        .init_resource::<SimSettings>()
        .init_resource::<VectorScale>()
        .init_resource::<PlaybackRequest>()
        .init_resource::<ResetRequest>()
        .init_resource::<DeleteRequest>()
        .init_resource::<SpawnRequests>()
        .init_resource::<SelectedBody>()
        .add_message::<SimulationHalted>()
        .add_systems(EguiPrimaryContextPass, ui_controls)
        .add_systems(Startup, setup_scene)
        .add_systems(
            FixedUpdate,
            (
                apply_playback_request,
                apply_forces,
                step_physics,
                update_force_books,
                record_tracks,
            )
                .chain(),
        )
        .add_systems(
            Update,
            (
                apply_spawn_requests,
                apply_reset_request,
                apply_delete_request,
                (
                    camera_controls,
                    select_and_drag,
                    sync_transforms,
                    update_vector_scale,
                    draw_tracks,
                    draw_predicted_paths,
                    draw_vectors,
                )
                    .chain()
                    .after(apply_delete_request),
            ),
        )
        .insert_resource(Time::<Fixed>::from_seconds(PHYSICS_DT as f64))
        .run();
}
