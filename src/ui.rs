use bevy::diagnostic::{DiagnosticsStore, EntityCountDiagnosticsPlugin, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPlugin};

use crate::camera::CameraFade;
use crate::particles::{Particle, ParticleEmitter};
use crate::physics::DebugDraw;
use crate::scene::{AppState, PlatformerSettings, RestartScene, Score};

pub struct UiPlugin;
impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(EguiPlugin)
            .init_resource::<Overlays>()
            .add_systems(
                Update,
                (hud_system, settings_ui).run_if(in_state(AppState::Playing)),
            )
            .add_systems(Update, overlays_ui)
            .add_systems(Update, loading_ui.run_if(in_state(AppState::Loading)))
            .add_systems(Update, load_failed_ui.run_if(in_state(AppState::LoadFailed)));
    }
}

#[derive(Resource)]
pub struct Overlays {
    pub show_settings: bool,
    pub show_help: bool,
    pub show_diagnostics: bool,
}

impl Default for Overlays {
    fn default() -> Self {
        Self {
            show_settings: true,
            show_help: false,
            show_diagnostics: false,
        }
    }
}

fn fade_color32(fade: &CameraFade) -> egui::Color32 {
    let c = fade.color.to_srgba();
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    egui::Color32::from_rgba_unmultiplied(
        channel(c.red),
        channel(c.green),
        channel(c.blue),
        channel(fade.progress()),
    )
}

fn hud_system(mut contexts: EguiContexts, score: Res<Score>, fade: Res<CameraFade>) {
    let ctx = contexts.ctx_mut();

    egui::Area::new(egui::Id::new("score"))
        .anchor(egui::Align2::LEFT_TOP, egui::vec2(16.0, 12.0))
        .interactable(false)
        .show(ctx, |ui| {
            ui.label(
                egui::RichText::new(format!("Score: {}", score.0))
                    .font(egui::FontId::proportional(14.0))
                    .color(egui::Color32::WHITE),
            );
        });

    if fade.progress() > 0.0 {
        let painter = ctx.layer_painter(egui::LayerId::new(
            egui::Order::Foreground,
            egui::Id::new("fade"),
        ));
        painter.rect_filled(ctx.screen_rect(), 0.0, fade_color32(&fade));
    }
}

fn settings_ui(
    mut contexts: EguiContexts,
    mut settings: ResMut<PlatformerSettings>,
    mut debug: ResMut<DebugDraw>,
    mut overlays: ResMut<Overlays>,
    mut ev_restart: EventWriter<RestartScene>,
) {
    if !overlays.show_settings {
        return;
    }
    let mut open = true;
    egui::Window::new("Settings")
        .open(&mut open)
        .default_pos(egui::pos2(16.0, 48.0))
        .show(contexts.ctx_mut(), |ui| {
            ui.add(egui::Slider::new(&mut settings.acceleration, 0.0..=1500.0).text("Acceleration"));
            ui.add(egui::Slider::new(&mut settings.drag, 0.0..=2000.0).text("Drag"));
            ui.add(egui::Slider::new(&mut settings.gravity, 0.0..=4000.0).text("Gravity"));
            ui.add(egui::Slider::new(&mut settings.jump_velocity, 0.0..=1200.0).text("Jump velocity"));
            ui.add(
                egui::Slider::new(&mut settings.particle_velocity, 0.0..=200.0)
                    .text("Particle velocity"),
            );
            ui.add(egui::Slider::new(&mut settings.zoom, 0.5..=4.0).text("Zoom"));

            ui.separator();

            ui.checkbox(&mut debug.0, "Debug draw");
            if ui.button("Restart").clicked() {
                ev_restart.send(RestartScene);
            }
        });
    overlays.show_settings = open;
}

fn overlays_ui(
    mut contexts: EguiContexts,
    overlays: Res<Overlays>,
    diagnostics: Res<DiagnosticsStore>,
    emitters: Query<&ParticleEmitter>,
    particles: Query<(), With<Particle>>,
) {
    let ctx = contexts.ctx_mut();

    if overlays.show_help {
        egui::Window::new("Help").show(ctx, |ui| {
            ui.label("Left/Right: Walk");
            ui.label("Up: Jump");
            ui.label("Gamepad: Stick/D-Pad to walk, South to jump");
            ui.label("R: Restart Level");
            ui.label("D: Toggle Debug Draw");
            ui.label("H: Toggle Help");
            ui.label("F3: Toggle Diagnostics");
        });
    }

    if overlays.show_diagnostics {
        egui::Window::new("Diagnostics").show(ctx, |ui| {
            if let Some(fps) = diagnostics.get(&FrameTimeDiagnosticsPlugin::FPS) {
                if let Some(value) = fps.smoothed() {
                    ui.label(format!("FPS: {:.1}", value));
                }
            }
            if let Some(entity_count) = diagnostics.get(&EntityCountDiagnosticsPlugin::ENTITY_COUNT)
            {
                if let Some(value) = entity_count.value() {
                    ui.label(format!("Entities: {}", value));
                }
            }
            let active = emitters.iter().filter(|e| e.is_emitting()).count();
            ui.label(format!(
                "Particles: {} ({} emitters running)",
                particles.iter().count(),
                active
            ));
        });
    }
}

fn loading_ui(mut contexts: EguiContexts) {
    egui::CentralPanel::default().show(contexts.ctx_mut(), |ui| {
        ui.centered_and_justified(|ui| {
            ui.heading("Loading level...");
        });
    });
}

fn load_failed_ui(mut contexts: EguiContexts, settings: Res<PlatformerSettings>) {
    egui::CentralPanel::default().show(contexts.ctx_mut(), |ui| {
        ui.vertical_centered(|ui| {
            ui.add_space(80.0);
            ui.heading(egui::RichText::new("Level failed to load").color(egui::Color32::RED));
            ui.label(format!("Could not load `{}`; see the log for details.", settings.map_path));
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_overlay_follows_progress() {
        let mut fade = CameraFade::default();
        assert_eq!(fade_color32(&fade).a(), 0);

        fade.start(1.0, Color::srgb_u8(0, 0, 255));
        fade.tick(0.5);
        let c = fade_color32(&fade);
        assert_eq!(c.a(), 128);

        fade.tick(0.5);
        let c = fade_color32(&fade);
        assert_eq!(c.a(), 255);
        assert_eq!(c, egui::Color32::from_rgb(0, 0, 255));
    }
}
