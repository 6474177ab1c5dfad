mod camera;
mod input;
mod particles;
mod physics;
mod scene;
mod tilemap;
mod ui;

use bevy::diagnostic::{EntityCountDiagnosticsPlugin, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use camera::{CameraFollow, CameraPlugin};
use input::InputPlugin;
use particles::ParticlesPlugin;
use physics::PhysicsPlugin;
use scene::{AppState, PlatformerSettings, ScenePlugin};
use tilemap::TilemapPlugin;
use ui::UiPlugin;

fn main() {
    App::new()
        .insert_resource(ClearColor(Color::srgb(0.42, 0.65, 0.88)))
        .insert_resource(Msaa::Off)
        .add_plugins(FrameTimeDiagnosticsPlugin)
        .add_plugins(EntityCountDiagnosticsPlugin)
        .add_plugins(
            DefaultPlugins
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "platformer-rs".into(),
                        resolution: (960., 600.).into(),
                        ..default()
                    }),
                    ..default()
                })
                .set(ImagePlugin::default_nearest()),
        )
        .init_state::<AppState>()
        .add_plugins((
            TilemapPlugin,
            ScenePlugin,
            PhysicsPlugin,
            ParticlesPlugin,
            CameraPlugin,
            InputPlugin,
            UiPlugin,
        ))
        .add_systems(Startup, setup_camera)
        .run();
}

fn setup_camera(mut commands: Commands, settings: Res<PlatformerSettings>) {
    let mut camera = Camera2dBundle::default();
    camera.projection.scale = 1.0 / settings.zoom;
    commands.spawn((camera, CameraFollow::default(), MainCamera));
}

#[derive(Component)]
pub struct MainCamera;
