use bevy::prelude::*;
use bevy_egui::EguiContexts;
use bevy_egui::egui;

use crate::components::{Body, BodyFeatures, BodyKind, BodyShape, ForceBook, Track, VectorDisplay};
use crate::physics::{PhysicsWorld, na_to_vec2};
use crate::resources::{
    DeleteRequest, HaltReason, PlaybackRequest, ResetRequest, SelectedBody, SimClock, SimSettings,
    SimulationHalted, SpawnBody, SpawnRequests,
};

pub fn ui_controls(
    mut contexts: EguiContexts,
    mut clock: ResMut<SimClock>,
    mut settings: ResMut<SimSettings>,
    mut physics: ResMut<PhysicsWorld>,
    mut playback: ResMut<PlaybackRequest>,
    mut reset: ResMut<ResetRequest>,
    mut delete: ResMut<DeleteRequest>,
    mut spawns: ResMut<SpawnRequests>,
    selected: Res<SelectedBody>,
    mut bodies: Query<(&Body, Option<&mut ForceBook>, &mut Track, &mut VectorDisplay)>,
    mut halted: MessageReader<SimulationHalted>,
    mut last_halt: Local<Option<HaltReason>>,
    mut frames_rendered: Local<usize>,
) {
    if *frames_rendered < 5 {
        *frames_rendered += 1;
        return;
    }

    for message in halted.read() {
        *last_halt = Some(message.reason);
    }

    if let Ok(ctx) = contexts.ctx_mut() {
        egui::Window::new("Simulation")
            .default_pos(egui::pos2(10.0, 10.0))
            .max_size([340.0, 560.0])
            .vscroll(true)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    let label = if clock.running { "Pause" } else { "Play" };
                    if ui.button(label).clicked() {
                        playback.pending = Some(!clock.running);
                        *last_halt = None;
                    }
                    if ui.button("Reset").clicked() {
                        reset.pending = true;
                        *last_halt = None;
                    }
                    ui.label(format!("t = {:05.2} s", clock.time_ms as f32 / 1000.0));
                });
                if let Some(reason) = *last_halt {
                    ui.label(match reason {
                        HaltReason::Collision => "stopped: collision",
                        HaltReason::StopTimeReached => "stopped: timer",
                    });
                }

                ui.horizontal(|ui| {
                    ui.label("Stop at");
                    let mut stop_seconds = clock
                        .stop_at_ms
                        .map(|ms| ms as f32 / 1000.0)
                        .unwrap_or(0.0);
                    ui.add(
                        egui::DragValue::new(&mut stop_seconds)
                            .speed(0.01)
                            .range(0.0..=600.0)
                            .suffix(" s"),
                    );
                    // 0 disables the timer.
                    clock.stop_at_ms =
                        (stop_seconds > 0.0).then(|| (stop_seconds * 1000.0).round() as u32);
                });
                ui.checkbox(&mut settings.pause_on_collision, "Pause on collision");

                ui.separator();
                ui.heading("World");
                ui.horizontal(|ui| {
                    ui.label("Gravity");
                    ui.add(egui::DragValue::new(&mut physics.gravity.x).speed(0.1));
                    ui.add(egui::DragValue::new(&mut physics.gravity.y).speed(0.1));
                    ui.label("m/s²");
                });

                ui.separator();
                ui.heading("Add body");
                ui.horizontal_wrapped(|ui| {
                    if ui.button("Rectangle").clicked() {
                        spawns.pending.push(SpawnBody {
                            kind: BodyKind::Dynamic,
                            shape: BodyShape::Rectangle {
                                half_extents: Vec2::new(0.5, 0.5),
                            },
                            position: Vec2::new(0.0, 3.0),
                            angle: 0.0,
                            features: BodyFeatures::default(),
                            color: Color::hsl(140.0, 0.7, 0.5),
                        });
                    }
                    if ui.button("Circle").clicked() {
                        spawns.pending.push(SpawnBody {
                            kind: BodyKind::Dynamic,
                            shape: BodyShape::Circle { radius: 0.5 },
                            position: Vec2::new(0.0, 3.0),
                            angle: 0.0,
                            features: BodyFeatures::default(),
                            color: Color::hsl(200.0, 0.7, 0.5),
                        });
                    }
                    if ui.button("Triangle").clicked() {
                        spawns.pending.push(SpawnBody {
                            kind: BodyKind::Dynamic,
                            shape: BodyShape::Triangle {
                                vertices: [
                                    Vec2::new(-0.5, -0.4),
                                    Vec2::new(0.5, -0.4),
                                    Vec2::new(0.0, 0.5),
                                ],
                            },
                            position: Vec2::new(0.0, 3.0),
                            angle: 0.0,
                            features: BodyFeatures::default(),
                            color: Color::hsl(50.0, 0.8, 0.5),
                        });
                    }
                    if ui.button("Point particle").clicked() {
                        spawns.pending.push(SpawnBody {
                            kind: BodyKind::Dynamic,
                            shape: BodyShape::PointParticle,
                            position: Vec2::new(0.0, 3.0),
                            angle: 0.0,
                            features: BodyFeatures::default(),
                            color: Color::hsl(320.0, 0.8, 0.5),
                        });
                    }
                    if ui.button("Static slab").clicked() {
                        spawns.pending.push(SpawnBody {
                            kind: BodyKind::Static,
                            shape: BodyShape::Rectangle {
                                half_extents: Vec2::new(2.0, 0.2),
                            },
                            position: Vec2::new(0.0, 0.0),
                            angle: 0.0,
                            features: BodyFeatures::default(),
                            color: Color::srgb(0.35, 0.35, 0.4),
                        });
                    }
                });

                ui.separator();
                ui.heading("Selected body");
                if let Some(entity) = selected.0
                    && let Ok((body, forces, mut track, mut display)) = bodies.get_mut(entity)
                {
                    let state = physics
                        .bodies
                        .get(body.handle)
                        .map(|rb| (rb.mass(), na_to_vec2(rb.linvel())));
                    if let Some((current_mass, velocity)) = state {
                        ui.label(format!("v = ({:.3}, {:.3}) m/s", velocity.x, velocity.y));
                        if body.kind == BodyKind::Dynamic {
                            let mut mass = current_mass;
                            ui.horizontal(|ui| {
                                ui.label("Mass");
                                ui.add(egui::DragValue::new(&mut mass).speed(0.1).suffix(" kg"));
                            });
                            if mass != current_mass {
                                physics.set_mass(body.handle, mass);
                            }
                        }
                    }

                    if let Some(mut forces) = forces {
                        ui.horizontal(|ui| {
                            ui.label("Applied force");
                            ui.add(egui::DragValue::new(&mut forces.applied.x).speed(0.1));
                            ui.add(egui::DragValue::new(&mut forces.applied.y).speed(0.1));
                            ui.label("N");
                        });
                    }

                    ui.checkbox(&mut display.show_forces, "Show force vectors");
                    ui.checkbox(&mut display.show_velocity, "Show velocity vector");
                    ui.checkbox(&mut display.show_predicted, "Show predicted path");
                    ui.checkbox(&mut track.visible, "Show track");
                    ui.horizontal(|ui| {
                        if ui.button("Clear track").clicked() {
                            track.clear();
                        }
                        if ui.button("Delete").clicked() {
                            delete.pending = true;
                        }
                    });
                } else {
                    ui.label("Click a body to select it.");
                }

                ui.separator();
                ui.heading("Controls");
                ui.label("Pan: Arrow Keys / WASD");
                ui.label("Zoom: Scroll Wheel / Z & X");
                ui.label("Drag a body with the left mouse button.");
            });
    }
}
