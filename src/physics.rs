use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use bevy::log::warn;
use bevy::math::Vec2;
use bevy::prelude::Resource;
use rapier2d::prelude::*;

use crate::components::{BodyFeatures, BodyKind, BodyShape};
use crate::resources::{
    DEFAULT_GRAVITY, INTERNAL_PGS_ITERATIONS, PHYSICS_DT, POINT_PARTICLE_RADIUS,
    SOLVER_ITERATIONS,
};

pub fn vec2_to_na(v: Vec2) -> Vector<Real> {
    vector![v.x, v.y]
}

pub fn na_to_vec2(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

/// Kinematic state of one body, captured before a step so the step can be
/// rolled back bit-exactly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodySnapshot {
    pub position: Isometry<Real>,
    pub linvel: Vector<Real>,
    pub angvel: Real,
}

impl Default for BodySnapshot {
    fn default() -> Self {
        Self {
            position: Isometry::identity(),
            linvel: vector![0.0, 0.0],
            angvel: 0.0,
        }
    }
}

/// Sink for the solver's contact events.
///
/// Rapier invokes the `EventHandler` callbacks through `&self` from inside
/// `PhysicsPipeline::step`, so the state sits behind a mutex even though the
/// whole simulation is single-threaded.
#[derive(Default)]
pub struct ImpulseCollector {
    inner: Mutex<CollectorInner>,
}

#[derive(Default)]
struct CollectorInner {
    impulses: HashMap<RigidBodyHandle, Vec<Vec2>>,
    collision_detected: bool,
}

impl ImpulseCollector {
    /// Converts one resolved contact into an equal-and-opposite force pair
    /// and files it under both bodies.
    pub fn record(
        &self,
        body_a: RigidBodyHandle,
        body_b: RigidBodyHandle,
        normal_impulse: f32,
        tangent_impulse: f32,
        normal: Vec2,
    ) {
        let tangent = Vec2::new(-normal.y, normal.x);
        let force = normal * normal_impulse + tangent * tangent_impulse;
        eprintln!("DEBUG n={normal_impulse} t={tangent_impulse} force={force:?}");
        if !force.is_finite() {
            warn!("dropping non-finite contact impulse between {body_a:?} and {body_b:?}");
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.impulses.entry(body_a).or_default().push(force);
        inner.impulses.entry(body_b).or_default().push(-force);
    }

    /// Removes and returns everything accumulated for `body` this step.
    /// A second call without an intervening contact returns nothing.
    pub fn take(&self, body: RigidBodyHandle) -> Vec<Vec2> {
        self.inner
            .lock()
            .unwrap()
            .impulses
            .remove(&body)
            .unwrap_or_default()
    }

    /// Reads and clears the "a contact began this step" latch.
    pub fn take_collision_flag(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let detected = inner.collision_detected;
        inner.collision_detected = false;
        detected
    }

    /// Drops all accumulated impulses and the collision latch. Called before
    /// every step so nothing survives a step boundary.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.impulses.clear();
        inner.collision_detected = false;
    }
}

impl EventHandler for ImpulseCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if let CollisionEvent::Started(..) = event {
            self.inner.lock().unwrap().collision_detected = true;
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        colliders: &ColliderSet,
        contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
        let parent = |handle| colliders.get(handle).and_then(|c| c.parent());
        let (Some(body_a), Some(body_b)) = (
            parent(contact_pair.collider1),
            parent(contact_pair.collider2),
        ) else {
            return;
        };
        for manifold in &contact_pair.manifolds {
            let normal_impulse: f32 = manifold.points.iter().map(|p| p.data.impulse).sum();
            let tangent_impulse: f32 =
                manifold.points.iter().map(|p| p.data.tangent_impulse.x).sum();
            self.record(
                body_a,
                body_b,
                normal_impulse,
                tangent_impulse,
                na_to_vec2(&manifold.data.normal),
            );
        }
    }
}

/// Wraps all rapier boilerplate plus the contact collector into one Bevy
/// resource. The stepper is the only mutator of kinematic state during a
/// tick; everything else holds handles and reads through this resource.
#[derive(Resource)]
pub struct PhysicsWorld {
    pub gravity: Vec2,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    pub collector: ImpulseCollector,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = PHYSICS_DT;
        if let Some(iterations) = NonZeroUsize::new(SOLVER_ITERATIONS) {
            integration_parameters.num_solver_iterations = iterations;
        }
        integration_parameters.num_internal_pgs_iterations = INTERNAL_PGS_ITERATIONS;

        Self {
            gravity: DEFAULT_GRAVITY,
            integration_parameters,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            collector: ImpulseCollector::default(),
        }
    }
}

impl PhysicsWorld {
    /// Advances the solver by one fixed tick.
    pub fn step(&mut self) {
        self.step_with_dt(self.integration_parameters.dt);
    }

    /// Advances the solver by an arbitrary (partial) timestep. Used for the
    /// final step when an exact stop time would otherwise be overshot.
    pub fn step_with_dt(&mut self, dt: f32) {
        let mut parameters = self.integration_parameters;
        parameters.dt = dt;
        self.pipeline.step(
            &vec2_to_na(self.gravity),
            &parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &self.collector,
        );
    }

    /// Creates a rigid body and its collider, returning the body handle.
    pub fn spawn_body(
        &mut self,
        kind: BodyKind,
        shape: BodyShape,
        position: Vec2,
        angle: f32,
        features: &BodyFeatures,
    ) -> RigidBodyHandle {
        let builder = match (kind, shape) {
            // Point particles are always dynamic: a tiny sensor ball with a
            // fixed unit mass and no rotation.
            (_, BodyShape::PointParticle) => RigidBodyBuilder::dynamic()
                .translation(vec2_to_na(position))
                .linvel(vec2_to_na(features.linear_velocity))
                .locked_axes(LockedAxes::ROTATION_LOCKED)
                .additional_mass(1.0),
            (BodyKind::Static, _) => RigidBodyBuilder::fixed()
                .translation(vec2_to_na(position))
                .rotation(angle),
            (BodyKind::Dynamic, _) => RigidBodyBuilder::dynamic()
                .translation(vec2_to_na(position))
                .rotation(angle)
                .linvel(vec2_to_na(features.linear_velocity))
                .angvel(features.angular_velocity)
                .linear_damping(features.linear_damping)
                .angular_damping(features.angular_damping)
                .locked_axes(if features.fixed_rotation {
                    LockedAxes::ROTATION_LOCKED
                } else {
                    LockedAxes::empty()
                }),
        };
        let handle = self.bodies.insert(builder.build());

        let collider = match shape {
            BodyShape::Rectangle { half_extents } => {
                ColliderBuilder::cuboid(half_extents.x, half_extents.y)
                    .density(features.density)
            }
            BodyShape::Circle { radius } => {
                ColliderBuilder::ball(radius).density(features.density)
            }
            BodyShape::Triangle { vertices } => ColliderBuilder::triangle(
                point![vertices[0].x, vertices[0].y],
                point![vertices[1].x, vertices[1].y],
                point![vertices[2].x, vertices[2].y],
            )
            .density(features.density),
            BodyShape::PointParticle => ColliderBuilder::ball(POINT_PARTICLE_RADIUS)
                .density(0.0)
                .sensor(true),
        };
        let collider = collider
            .friction(features.friction)
            .restitution(features.restitution)
            .active_events(ActiveEvents::COLLISION_EVENTS | ActiveEvents::CONTACT_FORCE_EVENTS)
            .contact_force_event_threshold(0.0);
        self.colliders
            .insert_with_parent(collider.build(), handle, &mut self.bodies);
        handle
    }

    /// Removes a body and its collider. Safe to call with a stale handle.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    /// Captures the kinematic state of a body, or `None` if it no longer
    /// exists.
    pub fn snapshot(&self, handle: RigidBodyHandle) -> Option<BodySnapshot> {
        self.bodies.get(handle).map(|body| BodySnapshot {
            position: *body.position(),
            linvel: *body.linvel(),
            angvel: body.angvel(),
        })
    }

    /// Restores a previously captured snapshot. No-op for stale handles.
    pub fn restore(&mut self, handle: RigidBodyHandle, snapshot: &BodySnapshot) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_position(snapshot.position, false);
            body.set_linvel(snapshot.linvel, false);
            body.set_angvel(snapshot.angvel, false);
        }
    }

    /// Wakes every body. Used when playback (re)starts so resting bodies
    /// pick up force changes made while paused.
    pub fn wake_all(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.wake_up(true);
        }
    }

    /// Overrides a dynamic body's mass by scaling its collider densities,
    /// falling back to an additional-mass override for density-less bodies
    /// (point particles).
    pub fn set_mass(&mut self, handle: RigidBodyHandle, mass: f32) {
        if mass <= 0.0 {
            return;
        }
        let Some(body) = self.bodies.get(handle) else {
            return;
        };
        if !body.is_dynamic() || body.mass() <= 0.0 {
            return;
        }
        let scale = mass / body.mass();
        let attached: Vec<ColliderHandle> = body.colliders().to_vec();
        let mut scaled = false;
        for collider_handle in attached {
            if let Some(collider) = self.colliders.get_mut(collider_handle) {
                let density = collider.density();
                if density > 0.0 {
                    collider.set_density(density * scale);
                    scaled = true;
                }
            }
        }
        if !scaled && let Some(body) = self.bodies.get_mut(handle) {
            body.set_additional_mass(mass, true);
        }
    }

    /// Topmost body whose collider contains the given world point.
    pub fn body_at_point(&mut self, point: Vec2) -> Option<RigidBodyHandle> {
        let Self {
            query_pipeline,
            bodies,
            colliders,
            ..
        } = self;
        // Keep the query structures current even when the world has not
        // stepped since the last spawn or drag.
        query_pipeline.update(colliders);
        let mut found = None;
        query_pipeline.intersections_with_point(
            bodies,
            colliders,
            &point![point.x, point.y],
            QueryFilter::default(),
            |handle| {
                found = colliders.get(handle).and_then(|c| c.parent());
                found.is_none()
            },
        );
        found
    }
}
