use bevy::ecs::system::SystemParam;
use bevy::input::mouse::MouseWheel;
use bevy::prelude::MessageReader;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_egui::input::EguiWantsInput;

use crate::components::*;
use crate::physics::{PhysicsWorld, na_to_vec2, vec2_to_na};
use crate::resources::*;
use crate::scaling::compute_scale;
use crate::trajectory::{predict_path, round3};

/// Bundled system params used when creating bodies.
#[derive(SystemParam)]
pub struct SpawnParams<'w, 's> {
    pub commands: Commands<'w, 's>,
    pub meshes: ResMut<'w, Assets<Mesh>>,
    pub materials: ResMut<'w, Assets<ColorMaterial>>,
    pub physics: ResMut<'w, PhysicsWorld>,
}

/// Creates one rigid body in the physics world plus its rendered entity.
pub fn spawn_body(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<ColorMaterial>,
    physics: &mut PhysicsWorld,
    kind: BodyKind,
    shape: BodyShape,
    position: Vec2,
    angle: f32,
    features: &BodyFeatures,
    color: Color,
) -> Entity {
    let handle = physics.spawn_body(kind, shape, position, angle, features);
    let start = physics.snapshot(handle).unwrap_or_default();

    let mesh = match shape {
        BodyShape::Rectangle { half_extents } => meshes.add(Rectangle::new(
            half_extents.x * 2.0 * CELL_SIZE,
            half_extents.y * 2.0 * CELL_SIZE,
        )),
        BodyShape::Circle { radius } => meshes.add(Circle::new(radius * CELL_SIZE)),
        BodyShape::Triangle { vertices } => meshes.add(Triangle2d::new(
            vertices[0] * CELL_SIZE,
            vertices[1] * CELL_SIZE,
            vertices[2] * CELL_SIZE,
        )),
        // Point particles have a near-zero collider; draw a small dot.
        BodyShape::PointParticle => meshes.add(Circle::new(4.0)),
    };

    let mut entity = commands.spawn((
        Mesh2d(mesh),
        MeshMaterial2d(materials.add(ColorMaterial::from(color))),
        Transform::from_translation((position * CELL_SIZE).extend(0.0))
            .with_rotation(Quat::from_rotation_z(angle)),
        Body {
            handle,
            kind,
            shape,
            start,
        },
        Track::default(),
        VectorDisplay::default(),
    ));
    if kind == BodyKind::Dynamic || matches!(shape, BodyShape::PointParticle) {
        entity.insert(ForceBook::default());
    }
    entity.id()
}

/// Sets up camera and a small demo scene: a static ground slab and a couple
/// of dynamic bodies to poke at.
pub fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<ColorMaterial>>,
    mut physics: ResMut<PhysicsWorld>,
) {
    commands.spawn(Camera2d);

    spawn_body(
        &mut commands,
        &mut meshes,
        &mut materials,
        &mut physics,
        BodyKind::Static,
        BodyShape::Rectangle {
            half_extents: Vec2::new(8.0, 0.25),
        },
        Vec2::new(0.0, -3.0),
        0.0,
        &BodyFeatures::default(),
        Color::srgb(0.35, 0.35, 0.4),
    );
    spawn_body(
        &mut commands,
        &mut meshes,
        &mut materials,
        &mut physics,
        BodyKind::Dynamic,
        BodyShape::Circle { radius: 0.5 },
        Vec2::new(-2.0, 1.0),
        0.0,
        &BodyFeatures::default(),
        Color::hsl(200.0, 0.8, 0.6),
    );
    spawn_body(
        &mut commands,
        &mut meshes,
        &mut materials,
        &mut physics,
        BodyKind::Dynamic,
        BodyShape::Rectangle {
            half_extents: Vec2::new(0.6, 0.4),
        },
        Vec2::new(2.0, 2.0),
        0.3,
        &BodyFeatures::default(),
        Color::hsl(25.0, 0.8, 0.55),
    );
}

/// Drains queued body creations requested by the UI.
pub fn apply_spawn_requests(mut params: SpawnParams, mut requests: ResMut<SpawnRequests>) {
    for request in requests.pending.drain(..) {
        spawn_body(
            &mut params.commands,
            &mut params.meshes,
            &mut params.materials,
            &mut params.physics,
            request.kind,
            request.shape,
            request.position,
            request.angle,
            &request.features,
            request.color,
        );
    }
}

/// Applies a pending play/pause request. Starting playback wakes every body
/// and arms the one-shot force skip so a stale applied force is not pushed
/// into the first tick.
pub fn apply_playback_request(
    mut request: ResMut<PlaybackRequest>,
    mut clock: ResMut<SimClock>,
    mut physics: ResMut<PhysicsWorld>,
) {
    let Some(run) = request.pending.take() else {
        return;
    };
    if run && !clock.running {
        physics.wake_all();
        clock.skip_force = true;
        clock.running = true;
    } else if !run {
        clock.running = false;
    }
}

/// Restores every body to its start snapshot, clears tracks, and rewinds the
/// clock to zero.
pub fn apply_reset_request(
    mut request: ResMut<ResetRequest>,
    mut clock: ResMut<SimClock>,
    mut physics: ResMut<PhysicsWorld>,
    mut query: Query<(&Body, &mut Track)>,
) {
    if !request.pending {
        return;
    }
    request.pending = false;

    for (body, mut track) in query.iter_mut() {
        physics.restore(body.handle, &body.start);
        track.clear();
    }
    physics.collector.clear();
    clock.time_ms = 0;
    clock.running = false;
    clock.skip_force = false;
}

/// Removes the selected body from both the physics world and the scene.
pub fn apply_delete_request(
    mut commands: Commands,
    mut request: ResMut<DeleteRequest>,
    mut selected: ResMut<SelectedBody>,
    mut physics: ResMut<PhysicsWorld>,
    query: Query<&Body>,
) {
    if !request.pending {
        return;
    }
    request.pending = false;

    let Some(entity) = selected.0.take() else {
        return;
    };
    if let Ok(body) = query.get(entity) {
        physics.remove_body(body.handle);
        commands.entity(entity).despawn();
    }
}

/// Pushes each body's user-applied force into the solver for the upcoming
/// step. Runs before `step_physics` so the forces shape the motion computed
/// this tick. The whole application is skipped once after a resume or a
/// collision rollback (`SimClock::skip_force`).
pub fn apply_forces(
    mut clock: ResMut<SimClock>,
    mut physics: ResMut<PhysicsWorld>,
    query: Query<(&Body, &ForceBook)>,
) {
    if !clock.running {
        return;
    }
    let skip = clock.skip_force;
    clock.skip_force = false;

    for (body, forces) in query.iter() {
        let Some(rigid_body) = physics.bodies.get_mut(body.handle) else {
            continue;
        };
        rigid_body.reset_forces(false);
        if !skip && forces.applied != Vec2::ZERO && !rigid_body.is_sleeping() {
            rigid_body.add_force(vec2_to_na(forces.applied), true);
        }
    }
}

/// Advances the physics world by one fixed tick.
///
/// Handles the two self-pausing transitions: an exact-stop target is hit
/// with one final partial step so the clock lands on the target without
/// overshoot, and a flagged collision (with the pause-on-collision policy
/// enabled) rolls every body back to its pre-step snapshot and rewinds the
/// clock by one tick.
pub fn step_physics(
    mut clock: ResMut<SimClock>,
    mut physics: ResMut<PhysicsWorld>,
    settings: Res<SimSettings>,
    query: Query<&Body>,
    mut halted: MessageWriter<SimulationHalted>,
) {
    if !clock.running {
        return;
    }

    // A target at or below the current time is inert: the clock only ever
    // moves forward, so a passed target must not rewind it or trap playback.
    if let Some(target) = clock.stop_at_ms
        && clock.time_ms < target
        && clock.time_ms + TICK_MS >= target
    {
        let remainder = (target - clock.time_ms) as f32 / 1000.0;
        physics.collector.clear();
        physics.step_with_dt(remainder);
        physics.collector.clear();
        clock.time_ms = target;
        clock.running = false;
        halted.write(SimulationHalted {
            reason: HaltReason::StopTimeReached,
        });
        return;
    }

    let snapshots: Vec<_> = query
        .iter()
        .filter_map(|body| {
            physics
                .snapshot(body.handle)
                .map(|snapshot| (body.handle, snapshot))
        })
        .collect();

    physics.collector.clear();
    physics.step();
    clock.time_ms += TICK_MS;

    if physics.collector.take_collision_flag() && settings.pause_on_collision {
        for (handle, snapshot) in &snapshots {
            physics.restore(*handle, snapshot);
        }
        // The impulses belong to the step just undone; drop them so the
        // force books do not report contact force for motion that never
        // happened.
        physics.collector.clear();
        clock.time_ms -= TICK_MS;
        clock.skip_force = true;
        clock.running = false;
        halted.write(SimulationHalted {
            reason: HaltReason::Collision,
        });
    }
}

/// Rebuilds each dynamic body's force estimate after a step.
///
/// The solver reports collision response as impulses (momentum deltas);
/// dividing the per-step sum by the fixed timestep recovers an average force
/// over that step. This is an estimate, not an exact quantity, and it trails
/// the motion by one frame by construction.
pub fn update_force_books(
    physics: Res<PhysicsWorld>,
    mut query: Query<(&Body, &mut ForceBook)>,
) {
    let gravity = physics.gravity;
    for (body, mut forces) in query.iter_mut() {
        let Some(rigid_body) = physics.bodies.get(body.handle) else {
            continue;
        };
        forces.gravity = gravity * rigid_body.mass();
        let contact: Vec2 =
            physics.collector.take(body.handle).into_iter().sum::<Vec2>() / PHYSICS_DT;
        forces.total = round3(forces.applied + forces.gravity + contact);
    }
}

/// Appends each body's current position to its track while running.
pub fn record_tracks(
    clock: Res<SimClock>,
    physics: Res<PhysicsWorld>,
    mut query: Query<(&Body, &mut Track)>,
) {
    if !clock.running {
        return;
    }
    for (body, mut track) in query.iter_mut() {
        let Some(rigid_body) = physics.bodies.get(body.handle) else {
            continue;
        };
        track.record(na_to_vec2(rigid_body.translation()));
    }
}

/// Copies post-step physics state onto the rendered transforms.
pub fn sync_transforms(physics: Res<PhysicsWorld>, mut query: Query<(&Body, &mut Transform)>) {
    for (body, mut transform) in query.iter_mut() {
        let Some(rigid_body) = physics.bodies.get(body.handle) else {
            continue;
        };
        let position = na_to_vec2(rigid_body.translation()) * CELL_SIZE;
        transform.translation = position.extend(0.0);
        transform.rotation = Quat::from_rotation_z(rigid_body.rotation().angle());
    }
}

/// Applies a direct user move to a body: shifts it in the physics world,
/// invalidates its track (a stale track would connect old and new positions),
/// and, while the clock is still at zero, re-bases the snapshot a reset
/// restores to.
pub fn move_body(
    physics: &mut PhysicsWorld,
    body: &mut Body,
    track: &mut Track,
    delta: Vec2,
    time_ms: u32,
) {
    let handle = body.handle;
    if let Some(rigid_body) = physics.bodies.get_mut(handle) {
        let target = na_to_vec2(rigid_body.translation()) + delta;
        rigid_body.set_translation(vec2_to_na(target), false);
    }
    track.clear();
    if time_ms == 0
        && let Some(snapshot) = physics.snapshot(handle)
    {
        body.start = snapshot;
    }
}

/// Click-selects the body under the cursor and drags the selection around.
pub fn select_and_drag(
    buttons: Res<ButtonInput<MouseButton>>,
    egui_input: Res<EguiWantsInput>,
    window: Query<&Window, With<PrimaryWindow>>,
    camera: Query<(&Camera, &GlobalTransform), With<Camera2d>>,
    mut physics: ResMut<PhysicsWorld>,
    clock: Res<SimClock>,
    mut selected: ResMut<SelectedBody>,
    mut bodies: Query<(Entity, &mut Body, &mut Track)>,
    mut last_cursor: Local<Option<Vec2>>,
) {
    if egui_input.wants_any_pointer_input() {
        *last_cursor = None;
        return;
    }
    let Ok(window) = window.single() else { return };
    let Ok((camera, camera_transform)) = camera.single() else {
        return;
    };
    let Some(cursor) = window.cursor_position() else {
        *last_cursor = None;
        return;
    };
    let Ok(world_px) = camera.viewport_to_world_2d(camera_transform, cursor) else {
        return;
    };
    let world = world_px / CELL_SIZE;

    if buttons.just_pressed(MouseButton::Left) {
        selected.0 = None;
        *last_cursor = None;
        if let Some(handle) = physics.body_at_point(world) {
            for (entity, body, _) in bodies.iter() {
                if body.handle == handle {
                    selected.0 = Some(entity);
                    *last_cursor = Some(world);
                    break;
                }
            }
        }
    } else if buttons.pressed(MouseButton::Left) {
        if let (Some(entity), Some(previous)) = (selected.0, *last_cursor) {
            let delta = world - previous;
            if delta != Vec2::ZERO
                && let Ok((_, mut body, mut track)) = bodies.get_mut(entity)
            {
                move_body(&mut physics, &mut body, &mut track, delta, clock.time_ms);
            }
            *last_cursor = Some(world);
        }
    } else {
        *last_cursor = None;
    }
}

/// Handles manual camera pan/zoom input unless blocked by UI focus.
pub fn camera_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut mouse_wheel: MessageReader<MouseWheel>,
    mut query: Query<&mut Transform, With<Camera>>,
    time: Res<Time>,
    egui_input: Res<EguiWantsInput>,
) {
    if egui_input.wants_any_pointer_input() {
        return;
    }

    if let Ok(mut transform) = query.single_mut() {
        let mut scale = transform.scale.x;

        let mut direction = Vec3::ZERO;
        if keyboard.pressed(KeyCode::ArrowLeft) || keyboard.pressed(KeyCode::KeyA) {
            direction.x -= 1.0;
        }
        if keyboard.pressed(KeyCode::ArrowRight) || keyboard.pressed(KeyCode::KeyD) {
            direction.x += 1.0;
        }
        if keyboard.pressed(KeyCode::ArrowUp) || keyboard.pressed(KeyCode::KeyW) {
            direction.y += 1.0;
        }
        if keyboard.pressed(KeyCode::ArrowDown) || keyboard.pressed(KeyCode::KeyS) {
            direction.y -= 1.0;
        }
        if direction.length_squared() > 0.0 {
            transform.translation += direction.normalize() * 500.0 * scale * time.delta_secs();
        }

        for event in mouse_wheel.read() {
            if event.y.abs() == 0.0 {
                continue;
            }
            let zoom_factor = 1.1;
            if event.y > 0.0 {
                scale /= zoom_factor;
            } else {
                scale *= zoom_factor;
            }
        }

        let zoom_speed = 1.0 * time.delta_secs();
        if keyboard.pressed(KeyCode::KeyZ) {
            scale *= 1.0 - zoom_speed;
        }
        if keyboard.pressed(KeyCode::KeyX) {
            scale *= 1.0 + zoom_speed;
        }

        scale = scale.clamp(0.1, 10.0);
        transform.scale = Vec3::splat(scale);
    }
}

/// Normalizes the force and velocity arrow overlays into a common on-screen
/// scale band so the longest arrow stays inside the viewport.
pub fn update_vector_scale(
    mut scale: ResMut<VectorScale>,
    window: Query<&Window, With<PrimaryWindow>>,
    camera: Query<&Transform, With<Camera>>,
    physics: Res<PhysicsWorld>,
    query: Query<(&Body, Option<&ForceBook>)>,
) {
    let Ok(window) = window.single() else { return };
    let Ok(camera_transform) = camera.single() else {
        return;
    };
    let zoom = 1.0 / camera_transform.scale.x.max(f32::EPSILON);

    let mut max_force = 0.0f32;
    let mut max_velocity = 0.0f32;
    for (body, forces) in query.iter() {
        if let Some(forces) = forces {
            max_force = max_force
                .max(forces.gravity.length())
                .max(forces.applied.length())
                .max(forces.total.length());
        }
        if let Some(rigid_body) = physics.bodies.get(body.handle) {
            max_velocity = max_velocity.max(na_to_vec2(rigid_body.linvel()).length());
        }
    }

    scale.force = compute_scale(max_force, CELL_SIZE, zoom, window.height());
    scale.velocity = compute_scale(max_velocity, CELL_SIZE, zoom, window.height());
}

/// Draws the traveled path of every body whose track is visible.
pub fn draw_tracks(mut gizmos: Gizmos, query: Query<&Track>) {
    for track in query.iter() {
        if !track.visible || track.points.len() < 2 {
            continue;
        }
        gizmos.linestrip_2d(
            track.points.iter().map(|point| *point * CELL_SIZE),
            Color::srgba(0.85, 0.55, 0.1, 0.8),
        );
    }
}

/// Recomputes and draws the forward trajectory preview for bodies that have
/// it enabled. Sleeping bodies have no motion to predict.
pub fn draw_predicted_paths(
    mut gizmos: Gizmos,
    physics: Res<PhysicsWorld>,
    query: Query<(&Body, &ForceBook, &VectorDisplay)>,
) {
    for (body, forces, display) in query.iter() {
        if !display.show_predicted {
            continue;
        }
        let Some(rigid_body) = physics.bodies.get(body.handle) else {
            continue;
        };
        if rigid_body.is_sleeping() {
            continue;
        }
        let path = predict_path(
            na_to_vec2(rigid_body.translation()),
            na_to_vec2(rigid_body.linvel()),
            rigid_body.mass(),
            forces.total,
            PREDICT_DT,
            PREDICT_STEPS,
        );
        if path.len() >= 2 {
            gizmos.linestrip_2d(
                path.iter().map(|point| *point * CELL_SIZE),
                Color::srgba(0.3, 0.5, 0.9, 0.6),
            );
        }
    }
}

/// Draws force and velocity arrows for bodies with the overlays enabled,
/// using the per-frame display scales.
pub fn draw_vectors(
    mut gizmos: Gizmos,
    scale: Res<VectorScale>,
    physics: Res<PhysicsWorld>,
    query: Query<(&Body, Option<&ForceBook>, &VectorDisplay)>,
) {
    for (body, forces, display) in query.iter() {
        if !display.show_forces && !display.show_velocity {
            continue;
        }
        let Some(rigid_body) = physics.bodies.get(body.handle) else {
            continue;
        };
        let origin = na_to_vec2(&rigid_body.center_of_mass().coords) * CELL_SIZE;

        if display.show_velocity {
            arrow(
                &mut gizmos,
                origin,
                na_to_vec2(rigid_body.linvel()) * scale.velocity,
                Color::BLACK,
            );
        }
        if display.show_forces && let Some(forces) = forces {
            arrow(
                &mut gizmos,
                origin,
                forces.gravity * scale.force,
                Color::srgb(0.9, 0.1, 0.1),
            );
            arrow(
                &mut gizmos,
                origin,
                forces.applied * scale.force,
                Color::srgb(0.1, 0.2, 0.9),
            );
            arrow(
                &mut gizmos,
                origin,
                forces.total * scale.force,
                Color::srgb(0.15, 0.15, 0.15),
            );
        }
    }
}

fn arrow(gizmos: &mut Gizmos, origin: Vec2, vector: Vec2, color: Color) {
    if vector == Vec2::ZERO || !vector.is_finite() {
        return;
    }
    gizmos.arrow_2d(origin, origin + vector * CELL_SIZE, color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::ecs::system::SystemState;
    use rapier2d::prelude::RigidBodyHandle;

    fn ball_body(physics: &mut PhysicsWorld, position: Vec2, velocity: Vec2) -> Body {
        let features = BodyFeatures {
            linear_velocity: velocity,
            ..Default::default()
        };
        let shape = BodyShape::Circle { radius: 0.5 };
        let handle = physics.spawn_body(BodyKind::Dynamic, shape, position, 0.0, &features);
        let start = physics.snapshot(handle).expect("body exists");
        Body {
            handle,
            kind: BodyKind::Dynamic,
            shape,
            start,
        }
    }

    fn ground_body(physics: &mut PhysicsWorld) -> Body {
        let shape = BodyShape::Rectangle {
            half_extents: Vec2::new(10.0, 0.5),
        };
        let handle = physics.spawn_body(
            BodyKind::Static,
            shape,
            Vec2::new(0.0, -0.5),
            0.0,
            &BodyFeatures::default(),
        );
        let start = physics.snapshot(handle).expect("body exists");
        Body {
            handle,
            kind: BodyKind::Static,
            shape,
            start,
        }
    }

    fn stepper_world(pause_on_collision: bool) -> World {
        let mut world = World::new();
        world.insert_resource(SimClock {
            running: true,
            ..Default::default()
        });
        world.insert_resource(SimSettings { pause_on_collision });
        world.init_resource::<Messages<SimulationHalted>>();
        world
    }

    fn run_step(world: &mut World) {
        let mut system_state: SystemState<(
            ResMut<SimClock>,
            ResMut<PhysicsWorld>,
            Res<SimSettings>,
            Query<&Body>,
            MessageWriter<SimulationHalted>,
        )> = SystemState::new(world);
        {
            let (clock, physics, settings, query, halted) = system_state.get_mut(world);
            step_physics(clock, physics, settings, query, halted);
        }
        system_state.apply(world);
    }

    fn drain_halts(world: &mut World) -> Vec<HaltReason> {
        world
            .resource_mut::<Messages<SimulationHalted>>()
            .drain()
            .map(|message| message.reason)
            .collect()
    }

    #[test]
    fn collision_pause_rolls_back_to_the_pre_step_snapshot() {
        let mut world = stepper_world(true);
        let mut physics = PhysicsWorld::default();
        let ground = ground_body(&mut physics);
        let ball = ball_body(&mut physics, Vec2::new(0.0, 2.0), Vec2::new(0.0, -5.0));
        let ball_handle = ball.handle;
        world.spawn(ground);
        world.spawn(ball);
        world.insert_resource(physics);

        let mut rolled_back = None;
        for _ in 0..2000 {
            let pre_step = world
                .resource::<PhysicsWorld>()
                .snapshot(ball_handle)
                .expect("ball exists");
            let time_before = world.resource::<SimClock>().time_ms;

            run_step(&mut world);

            let clock = world.resource::<SimClock>();
            if !clock.running {
                assert_eq!(
                    clock.time_ms, time_before,
                    "clock must be rewound by exactly the colliding tick"
                );
                rolled_back = Some(pre_step);
                break;
            }
        }

        let pre_step = rolled_back.expect("the falling ball should trigger a collision pause");
        assert_eq!(
            world.resource::<PhysicsWorld>().snapshot(ball_handle),
            Some(pre_step),
            "rollback must restore the pre-step state bit-exactly"
        );
        assert!(world.resource::<SimClock>().skip_force);
        assert_eq!(drain_halts(&mut world), vec![HaltReason::Collision]);
        assert!(
            world
                .resource::<PhysicsWorld>()
                .collector
                .take(ball_handle)
                .is_empty(),
            "impulses from the undone step must not leak into the force books"
        );
    }

    #[test]
    fn collisions_do_not_pause_when_the_policy_is_off() {
        let mut world = stepper_world(false);
        let mut physics = PhysicsWorld::default();
        let ground = ground_body(&mut physics);
        let ball = ball_body(&mut physics, Vec2::new(0.0, 1.0), Vec2::new(0.0, -5.0));
        world.spawn(ground);
        world.spawn(ball);
        world.insert_resource(physics);

        for _ in 0..200 {
            run_step(&mut world);
        }
        assert!(world.resource::<SimClock>().running);
        assert!(drain_halts(&mut world).is_empty());
    }

    #[test]
    fn stop_target_is_hit_exactly() {
        let mut world = stepper_world(false);
        let mut physics = PhysicsWorld::default();
        let ball = ball_body(&mut physics, Vec2::new(0.0, 5.0), Vec2::ZERO);
        let ball_handle = ball.handle;
        world.spawn(ball);
        world.insert_resource(physics);
        world.resource_mut::<SimClock>().stop_at_ms = Some(12);

        for _ in 0..5 {
            run_step(&mut world);
        }

        let clock = world.resource::<SimClock>();
        assert_eq!(clock.time_ms, 12, "clock must land on the target, not overshoot");
        assert!(!clock.running);
        assert_eq!(drain_halts(&mut world), vec![HaltReason::StopTimeReached]);
        assert!(
            world
                .resource::<PhysicsWorld>()
                .collector
                .take(ball_handle)
                .is_empty(),
            "impulses from the partial step must not leak into the force books"
        );
    }

    #[test]
    fn passed_stop_target_never_rewinds_the_clock() {
        let mut world = stepper_world(false);
        let mut physics = PhysicsWorld::default();
        let ball = ball_body(&mut physics, Vec2::new(0.0, 5.0), Vec2::ZERO);
        world.spawn(ball);
        world.insert_resource(physics);
        {
            let mut clock = world.resource_mut::<SimClock>();
            clock.time_ms = 5000;
            clock.stop_at_ms = Some(1000);
        }

        run_step(&mut world);

        let clock = world.resource::<SimClock>();
        assert_eq!(clock.time_ms, 5000 + TICK_MS, "a passed target must be inert");
        assert!(clock.running);
        assert!(drain_halts(&mut world).is_empty());

        // A target equal to the current time has already been reached and
        // must not re-halt every resume.
        world.resource_mut::<SimClock>().stop_at_ms = Some(5000 + TICK_MS);
        run_step(&mut world);
        let clock = world.resource::<SimClock>();
        assert_eq!(clock.time_ms, 5000 + 2 * TICK_MS);
        assert!(clock.running);
        assert!(drain_halts(&mut world).is_empty());
    }

    #[test]
    fn force_book_matches_weight_without_contacts() {
        let mut world = World::new();
        let mut physics = PhysicsWorld::default();
        let ball = ball_body(&mut physics, Vec2::new(0.0, 5.0), Vec2::ZERO);
        let mass = physics.bodies.get(ball.handle).expect("ball exists").mass();
        let entity = world.spawn((ball, ForceBook::default())).id();
        world.insert_resource(physics);

        let mut system_state: SystemState<(
            Res<PhysicsWorld>,
            Query<(&Body, &mut ForceBook)>,
        )> = SystemState::new(&mut world);
        {
            let (physics, query) = system_state.get_mut(&mut world);
            update_force_books(physics, query);
        }
        system_state.apply(&mut world);

        let forces = world.get::<ForceBook>(entity).expect("force book present");
        assert_eq!(forces.gravity, DEFAULT_GRAVITY * mass);
        assert_eq!(forces.total, round3(forces.gravity));
    }

    #[test]
    fn force_book_folds_in_contact_impulses_divided_by_dt() {
        let mut world = World::new();
        let mut physics = PhysicsWorld::default();
        let ball = ball_body(&mut physics, Vec2::new(0.0, 5.0), Vec2::ZERO);
        let other = ball_body(&mut physics, Vec2::new(3.0, 5.0), Vec2::ZERO);
        let mass = physics.bodies.get(ball.handle).expect("ball exists").mass();

        // Impulse of 0.02 N·s along +y over a 5 ms step is a 4 N average force.
        physics
            .collector
            .record(ball.handle, other.handle, 0.02, 0.0, Vec2::new(0.0, 1.0));

        let applied = Vec2::new(1.0, 0.0);
        let entity = world
            .spawn((
                ball,
                ForceBook {
                    applied,
                    ..Default::default()
                },
            ))
            .id();
        world.spawn((other, ForceBook::default()));
        world.insert_resource(physics);

        let mut system_state: SystemState<(
            Res<PhysicsWorld>,
            Query<(&Body, &mut ForceBook)>,
        )> = SystemState::new(&mut world);
        {
            let (physics, query) = system_state.get_mut(&mut world);
            update_force_books(physics, query);
        }
        system_state.apply(&mut world);

        let forces = world.get::<ForceBook>(entity).expect("force book present");
        let expected = round3(applied + DEFAULT_GRAVITY * mass + Vec2::new(0.0, 4.0));
        assert_eq!(forces.total, expected);
    }

    #[test]
    fn skip_force_suppresses_exactly_one_application() {
        let mut world = World::new();
        let mut physics = PhysicsWorld::default();
        let ball = ball_body(&mut physics, Vec2::new(0.0, 5.0), Vec2::ZERO);
        let handle = ball.handle;
        world.spawn((
            ball,
            ForceBook {
                applied: Vec2::new(10.0, 0.0),
                ..Default::default()
            },
        ));
        world.insert_resource(physics);
        world.insert_resource(SimClock {
            running: true,
            skip_force: true,
            ..Default::default()
        });

        let user_force = |world: &World, handle: RigidBodyHandle| {
            let physics = world.resource::<PhysicsWorld>();
            na_to_vec2(&physics.bodies.get(handle).expect("ball exists").user_force())
        };

        let mut system_state: SystemState<(
            ResMut<SimClock>,
            ResMut<PhysicsWorld>,
            Query<(&Body, &ForceBook)>,
        )> = SystemState::new(&mut world);

        {
            let (clock, physics, query) = system_state.get_mut(&mut world);
            apply_forces(clock, physics, query);
        }
        system_state.apply(&mut world);
        assert_eq!(user_force(&world, handle), Vec2::ZERO);
        assert!(!world.resource::<SimClock>().skip_force);

        {
            let (clock, physics, query) = system_state.get_mut(&mut world);
            apply_forces(clock, physics, query);
        }
        system_state.apply(&mut world);
        assert_eq!(user_force(&world, handle), Vec2::new(10.0, 0.0));
    }

    #[test]
    fn tracks_record_only_while_running() {
        let mut world = World::new();
        let mut physics = PhysicsWorld::default();
        let ball = ball_body(&mut physics, Vec2::new(0.0, 5.0), Vec2::new(1.0, 0.0));
        let entity = world.spawn((ball, Track::default())).id();
        world.insert_resource(physics);
        world.insert_resource(SimClock::default());

        let mut system_state: SystemState<(
            Res<SimClock>,
            Res<PhysicsWorld>,
            Query<(&Body, &mut Track)>,
        )> = SystemState::new(&mut world);

        {
            let (clock, physics, query) = system_state.get_mut(&mut world);
            record_tracks(clock, physics, query);
        }
        system_state.apply(&mut world);
        assert!(world.get::<Track>(entity).expect("track present").points.is_empty());

        world.resource_mut::<SimClock>().running = true;
        {
            let (clock, physics, query) = system_state.get_mut(&mut world);
            record_tracks(clock, physics, query);
        }
        system_state.apply(&mut world);
        assert_eq!(
            world.get::<Track>(entity).expect("track present").points,
            vec![Vec2::new(0.0, 5.0)]
        );
    }

    #[test]
    fn direct_move_clears_the_track_and_re_bases_the_start() {
        let mut physics = PhysicsWorld::default();
        let mut ball = ball_body(&mut physics, Vec2::new(0.0, 5.0), Vec2::ZERO);
        let mut track = Track::default();
        track.record(Vec2::new(0.0, 5.0));
        track.record(Vec2::new(0.1, 4.9));

        move_body(&mut physics, &mut ball, &mut track, Vec2::new(2.0, -1.0), 0);

        assert!(track.points.is_empty(), "a manual move must invalidate the track");
        let moved = physics.snapshot(ball.handle).expect("ball exists");
        assert_eq!(
            na_to_vec2(&moved.position.translation.vector),
            Vec2::new(2.0, 4.0)
        );
        assert_eq!(ball.start, moved, "at t = 0 the reset snapshot follows the move");

        // Once the simulation has run, a move no longer rewrites the snapshot.
        track.record(Vec2::new(2.0, 4.0));
        move_body(&mut physics, &mut ball, &mut track, Vec2::new(1.0, 0.0), 50);
        assert!(track.points.is_empty());
        assert_eq!(ball.start, moved, "after t > 0 the reset snapshot is frozen");
    }
}
