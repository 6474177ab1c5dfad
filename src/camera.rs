use bevy::prelude::*;

use crate::scene::{GameSet, Level, PlatformerSettings, Player, RestartScene};
use crate::MainCamera;

pub struct CameraPlugin;
impl Plugin for CameraPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CameraFade>()
            .add_systems(Update, apply_zoom)
            .add_systems(
                Update,
                (follow_player, tick_fade).chain().in_set(GameSet::Effects),
            );
    }
}

#[derive(Component, Default)]
pub struct CameraFollow {
    pub center: Option<Vec2>,
}

// Stays opaque once complete until reset.
#[derive(Resource, Debug)]
pub struct CameraFade {
    pub color: Color,
    duration: f32,
    elapsed: f32,
    running: bool,
    done: bool,
}

impl Default for CameraFade {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            duration: 0.0,
            elapsed: 0.0,
            running: false,
            done: false,
        }
    }
}

impl CameraFade {
    pub fn start(&mut self, duration: f32, color: Color) -> bool {
        if self.running || self.done {
            return false;
        }
        self.color = color;
        self.duration = duration.max(0.0);
        self.elapsed = 0.0;
        self.running = true;
        true
    }

    pub fn tick(&mut self, dt: f32) -> bool {
        if !self.running {
            return false;
        }
        self.elapsed += dt;
        if self.elapsed >= self.duration {
            self.elapsed = self.duration;
            self.running = false;
            self.done = true;
            return true;
        }
        false
    }

    pub fn progress(&self) -> f32 {
        if self.done {
            1.0
        } else if self.running && self.duration > 0.0 {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

pub fn follow_axis(camera: f32, target: f32, deadzone: f32, lerp: f32) -> f32 {
    let half = deadzone / 2.0;
    let (lo, hi) = (camera - half, camera + half);
    if target < lo {
        camera - (lo - target) * lerp
    } else if target > hi {
        camera + (target - hi) * lerp
    } else {
        camera
    }
}

pub fn follow(camera: Vec2, target: Vec2, deadzone: Vec2, lerp: Vec2) -> Vec2 {
    Vec2::new(
        follow_axis(camera.x, target.x, deadzone.x, lerp.x),
        follow_axis(camera.y, target.y, deadzone.y, lerp.y),
    )
}

fn clamp_axis(center: f32, half_view: f32, min: f32, max: f32) -> f32 {
    if max - min <= half_view * 2.0 {
        (min + max) / 2.0
    } else {
        center.clamp(min + half_view, max - half_view)
    }
}

pub fn clamp_to_bounds(center: Vec2, half_view: Vec2, bounds: Rect) -> Vec2 {
    Vec2::new(
        clamp_axis(center.x, half_view.x, bounds.min.x, bounds.max.x),
        clamp_axis(center.y, half_view.y, bounds.min.y, bounds.max.y),
    )
}

pub fn round_to_pixels(pos: Vec2, zoom: f32) -> Vec2 {
    if zoom <= 0.0 {
        return pos.round();
    }
    (pos * zoom).round() / zoom
}

// World rectangle covered by a map of `pixel_size`, top-left at the origin.
pub fn world_bounds(pixel_size: Vec2) -> Rect {
    Rect::new(0.0, -pixel_size.y, pixel_size.x, 0.0)
}

fn apply_zoom(
    settings: Res<PlatformerSettings>,
    mut camera_q: Query<&mut OrthographicProjection, With<MainCamera>>,
) {
    if !settings.is_changed() || settings.zoom <= 0.0 {
        return;
    }
    for mut projection in &mut camera_q {
        projection.scale = 1.0 / settings.zoom;
    }
}

fn follow_player(
    settings: Res<PlatformerSettings>,
    level: Option<Res<Level>>,
    player_q: Query<&Transform, (With<Player>, Without<MainCamera>)>,
    mut camera_q: Query<
        (&mut Transform, &mut CameraFollow, &OrthographicProjection),
        With<MainCamera>,
    >,
) {
    let Some(level) = level else {
        return;
    };
    let Ok(target) = player_q.get_single() else {
        return;
    };
    let Ok((mut t, mut follow_state, projection)) = camera_q.get_single_mut() else {
        return;
    };

    let target = target.translation.truncate();
    let bounds = world_bounds(level.map.pixel_size());
    let half_view = projection.area.half_size();

    let center = match follow_state.center {
        Some(center) => follow(center, target, settings.camera_deadzone, settings.camera_lerp),
        None => target,
    };
    let center = clamp_to_bounds(center, half_view, bounds);
    follow_state.center = Some(center);

    let rounded = round_to_pixels(center, settings.zoom);
    t.translation.x = rounded.x;
    t.translation.y = rounded.y;
}

fn tick_fade(
    time: Res<Time>,
    mut fade: ResMut<CameraFade>,
    mut ev_restart: EventWriter<RestartScene>,
) {
    if fade.tick(time.delta_seconds()) {
        info!("fade complete");
        ev_restart.send(RestartScene);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::time::TimeUpdateStrategy;
    use std::time::Duration;

    #[test]
    fn finished_fade_requests_one_restart() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(100)))
            .init_resource::<CameraFade>()
            .add_event::<RestartScene>()
            .add_systems(Update, tick_fade);
        app.world_mut()
            .resource_mut::<CameraFade>()
            .start(1.0, Color::srgb_u8(0, 0, 255));

        let mut reader = app.world().resource::<Events<RestartScene>>().get_reader();
        let mut restarts = 0;
        for frame in 0..20 {
            app.update();
            let events = app.world().resource::<Events<RestartScene>>();
            restarts += reader.read(events).count();
            if frame < 5 {
                assert_eq!(restarts, 0);
            }
        }
        assert_eq!(restarts, 1);
        assert_eq!(app.world().resource::<CameraFade>().progress(), 1.0);
    }

    #[test]
    fn deadzone_holds_camera_still() {
        assert_eq!(follow_axis(100.0, 120.0, 50.0, 0.25), 100.0);
        assert_eq!(follow_axis(100.0, 75.0, 50.0, 0.25), 100.0);
    }

    #[test]
    fn camera_lerps_towards_overshoot() {
        // Window is 75..125; target 145 overshoots by 20.
        assert_eq!(follow_axis(100.0, 145.0, 50.0, 0.25), 105.0);
        assert_eq!(follow_axis(100.0, 35.0, 50.0, 0.25), 90.0);
        assert_eq!(follow_axis(100.0, 145.0, 50.0, 1.0), 120.0);

        let next = follow(
            Vec2::ZERO,
            Vec2::new(45.0, -45.0),
            Vec2::splat(50.0),
            Vec2::splat(0.25),
        );
        assert_eq!(next, Vec2::new(5.0, -5.0));
    }

    #[test]
    fn view_stays_inside_bounds() {
        let bounds = world_bounds(Vec2::new(810.0, 450.0));
        assert_eq!(bounds, Rect::new(0.0, -450.0, 810.0, 0.0));

        let half = Vec2::new(200.0, 100.0);
        let c = clamp_to_bounds(Vec2::new(30.0, -345.0), half, bounds);
        assert_eq!(c, Vec2::new(200.0, -350.0));
        let c = clamp_to_bounds(Vec2::new(400.0, -200.0), half, bounds);
        assert_eq!(c, Vec2::new(400.0, -200.0));
        let c = clamp_to_bounds(Vec2::new(900.0, 10.0), half, bounds);
        assert_eq!(c, Vec2::new(610.0, -100.0));
    }

    #[test]
    fn oversized_view_centres_on_bounds() {
        let bounds = world_bounds(Vec2::new(100.0, 100.0));
        let c = clamp_to_bounds(Vec2::new(10.0, -90.0), Vec2::new(80.0, 20.0), bounds);
        assert_eq!(c, Vec2::new(50.0, -80.0));
    }

    #[test]
    fn rounding_snaps_to_screen_pixels() {
        assert_eq!(round_to_pixels(Vec2::new(10.3, -4.8), 2.0), Vec2::new(10.5, -5.0));
        assert_eq!(round_to_pixels(Vec2::new(10.3, -4.8), 1.0), Vec2::new(10.0, -5.0));
    }

    #[test]
    fn fade_completes_once() {
        let mut fade = CameraFade::default();
        assert_eq!(fade.progress(), 0.0);
        assert!(!fade.tick(1.0));

        assert!(fade.start(1.0, Color::srgb_u8(0, 0, 255)));
        assert_eq!(fade.progress(), 0.0);
        assert!(!fade.tick(0.5));
        assert!((fade.progress() - 0.5).abs() < 1e-6);
        assert!(fade.tick(0.6));
        assert_eq!(fade.progress(), 1.0);
        assert!(!fade.tick(0.1));
        assert_eq!(fade.progress(), 1.0);
    }

    #[test]
    fn fade_start_ignored_while_running_or_done() {
        let mut fade = CameraFade::default();
        assert!(fade.start(1.0, Color::srgb_u8(0, 0, 255)));
        assert!(!fade.start(5.0, Color::WHITE));
        assert!(!fade.tick(0.5));
        assert!(fade.tick(0.5));
        assert!(!fade.start(1.0, Color::WHITE));

        fade.reset();
        assert_eq!(fade.progress(), 0.0);
        assert!(fade.start(1.0, Color::WHITE));
    }
}
