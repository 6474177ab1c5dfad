use bevy::prelude::*;

use crate::scene::{GameSet, Level, PlatformerSettings};
use crate::tilemap::{LevelMap, TileLayer};

pub const MAX_DT: f32 = 1.0 / 30.0;
const EPS: f32 = 0.01;

pub struct PhysicsPlugin;
impl Plugin for PhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DebugDraw>()
            .add_systems(Update, physics_step.in_set(GameSet::Physics))
            .add_systems(
                Update,
                draw_debug
                    .in_set(GameSet::Effects)
                    .run_if(|debug: Res<DebugDraw>| debug.0),
            );
    }
}

#[derive(Resource, Default)]
pub struct DebugDraw(pub bool);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Blocked {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

#[derive(Component, Clone, Debug)]
pub struct ArcadeBody {
    pub size: Vec2,
    pub velocity: Vec2,
    pub acceleration: Vec2,
    pub drag: Vec2,
    pub allow_gravity: bool,
    pub collide_world_bounds: bool,
    pub blocked: Blocked,
}

impl ArcadeBody {
    pub fn new(size: Vec2) -> Self {
        Self {
            size,
            velocity: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            drag: Vec2::ZERO,
            allow_gravity: true,
            collide_world_bounds: false,
            blocked: Blocked::default(),
        }
    }

    pub fn on_floor(&self) -> bool {
        self.blocked.down
    }
}

#[derive(Component, Clone, Copy, Debug)]
pub struct StaticBody {
    pub size: Vec2,
}

pub struct CollisionGrid<'a> {
    layer: &'a TileLayer,
    tile_size: Vec2,
    bounds: Vec2,
}

impl<'a> CollisionGrid<'a> {
    pub fn new(map: &'a LevelMap, layer: &str) -> Option<Self> {
        Some(Self {
            layer: map.tile_layer(layer)?,
            tile_size: map.tile_size,
            bounds: map.pixel_size(),
        })
    }

    fn solid(&self, col: i32, row: i32) -> bool {
        self.layer.is_solid(col, row)
    }

    // Touching edges do not count as covering.
    fn cells(&self, min: Vec2, max: Vec2) -> (i32, i32, i32, i32) {
        let ts = self.tile_size;
        (
            (min.x / ts.x).floor() as i32,
            ((max.x - EPS) / ts.x).floor() as i32,
            (-max.y / ts.y).floor() as i32,
            ((-min.y - EPS) / ts.y).floor() as i32,
        )
    }
}

pub fn aabb_overlap(a_center: Vec2, a_size: Vec2, b_center: Vec2, b_size: Vec2) -> bool {
    let d = (a_center - b_center).abs();
    let reach = (a_size + b_size) * 0.5;
    d.x < reach.x && d.y < reach.y
}

fn apply_drag(v: f32, drag: f32, dt: f32) -> f32 {
    if v > 0.0 {
        (v - drag * dt).max(0.0)
    } else {
        (v + drag * dt).min(0.0)
    }
}

pub fn integrate_velocity(body: &mut ArcadeBody, gravity: Vec2, dt: f32) {
    let g = if body.allow_gravity { gravity } else { Vec2::ZERO };
    body.velocity += (body.acceleration + g) * dt;
    if body.acceleration.x == 0.0 && body.drag.x != 0.0 {
        body.velocity.x = apply_drag(body.velocity.x, body.drag.x, dt);
    }
    if body.acceleration.y == 0.0 && body.drag.y != 0.0 {
        body.velocity.y = apply_drag(body.velocity.y, body.drag.y, dt);
    }
}

pub fn step(
    body: &mut ArcadeBody,
    pos: &mut Vec2,
    gravity: Vec2,
    grid: Option<&CollisionGrid>,
    dt: f32,
) {
    let dt = dt.clamp(0.0, MAX_DT);
    body.blocked = Blocked::default();
    integrate_velocity(body, gravity, dt);

    let delta = body.velocity * dt;
    // Sub-steps of at most half a tile so fast falls cannot skip a row.
    let max_move = grid.map_or(f32::INFINITY, |g| g.tile_size.min_element() * 0.5);
    let steps = ((delta.abs().max_element() / max_move).ceil() as u32).max(1);
    let sub = delta / steps as f32;

    for _ in 0..steps {
        if body.velocity.x != 0.0 {
            pos.x += sub.x;
            if let Some(grid) = grid {
                resolve_x(body, pos, sub.x, grid);
            }
        }
        if body.velocity.y != 0.0 {
            pos.y += sub.y;
            if let Some(grid) = grid {
                resolve_y(body, pos, sub.y, grid);
            }
        }
    }

    if body.collide_world_bounds {
        if let Some(grid) = grid {
            clamp_to_bounds(body, pos, grid.bounds);
        }
    }
}

fn resolve_x(body: &mut ArcadeBody, pos: &mut Vec2, dx: f32, grid: &CollisionGrid) {
    if dx == 0.0 {
        return;
    }
    let half = body.size * 0.5;
    let (min, max) = (*pos - half, *pos + half);
    let (c0, c1, r0, r1) = grid.cells(min, max);
    let tw = grid.tile_size.x;

    let mut face: Option<f32> = None;
    for row in r0..=r1 {
        for col in c0..=c1 {
            if !grid.solid(col, row) {
                continue;
            }
            if dx > 0.0 {
                let left = col as f32 * tw;
                if left >= max.x - dx - EPS {
                    face = Some(face.map_or(left, |f| f.min(left)));
                }
            } else {
                let right = (col + 1) as f32 * tw;
                if right <= min.x - dx + EPS {
                    face = Some(face.map_or(right, |f| f.max(right)));
                }
            }
        }
    }

    if let Some(face) = face {
        body.velocity.x = 0.0;
        if dx > 0.0 {
            pos.x = face - half.x;
            body.blocked.right = true;
        } else {
            pos.x = face + half.x;
            body.blocked.left = true;
        }
    }
}

fn resolve_y(body: &mut ArcadeBody, pos: &mut Vec2, dy: f32, grid: &CollisionGrid) {
    if dy == 0.0 {
        return;
    }
    let half = body.size * 0.5;
    let (min, max) = (*pos - half, *pos + half);
    let (c0, c1, r0, r1) = grid.cells(min, max);
    let th = grid.tile_size.y;

    let mut face: Option<f32> = None;
    for row in r0..=r1 {
        for col in c0..=c1 {
            if !grid.solid(col, row) {
                continue;
            }
            if dy < 0.0 {
                let top = -(row as f32) * th;
                if top <= min.y - dy + EPS {
                    face = Some(face.map_or(top, |f| f.max(top)));
                }
            } else {
                let bottom = -((row + 1) as f32) * th;
                if bottom >= max.y - dy - EPS {
                    face = Some(face.map_or(bottom, |f| f.min(bottom)));
                }
            }
        }
    }

    if let Some(face) = face {
        body.velocity.y = 0.0;
        if dy < 0.0 {
            pos.y = face + half.y;
            body.blocked.down = true;
        } else {
            pos.y = face - half.y;
            body.blocked.up = true;
        }
    }
}

// Keeps the body inside `(0, 0)..(size.x, -size.y)` in world space.
fn clamp_to_bounds(body: &mut ArcadeBody, pos: &mut Vec2, size: Vec2) {
    let half = body.size * 0.5;
    if pos.x - half.x < 0.0 {
        pos.x = half.x;
        body.velocity.x = body.velocity.x.max(0.0);
        body.blocked.left = true;
    } else if pos.x + half.x > size.x {
        pos.x = size.x - half.x;
        body.velocity.x = body.velocity.x.min(0.0);
        body.blocked.right = true;
    }
    if pos.y + half.y > 0.0 {
        pos.y = -half.y;
        body.velocity.y = body.velocity.y.min(0.0);
        body.blocked.up = true;
    } else if pos.y - half.y < -size.y {
        pos.y = -size.y + half.y;
        body.velocity.y = body.velocity.y.max(0.0);
        body.blocked.down = true;
    }
}

fn physics_step(
    time: Res<Time>,
    settings: Res<PlatformerSettings>,
    level: Option<Res<Level>>,
    mut bodies: Query<(&mut ArcadeBody, &mut Transform)>,
) {
    let gravity = Vec2::new(0.0, -settings.gravity);
    let grid = level
        .as_deref()
        .and_then(|l| CollisionGrid::new(&l.map, &settings.ground_layer));

    for (mut body, mut t) in &mut bodies {
        let mut pos = t.translation.truncate();
        step(&mut body, &mut pos, gravity, grid.as_ref(), time.delta_seconds());
        t.translation.x = pos.x;
        t.translation.y = pos.y;
    }
}

fn draw_debug(
    mut gizmos: Gizmos,
    settings: Res<PlatformerSettings>,
    level: Option<Res<Level>>,
    bodies: Query<(&Transform, &ArcadeBody)>,
    statics: Query<(&Transform, &StaticBody)>,
) {
    if let Some(level) = level.as_deref() {
        if let Some(layer) = level.map.tile_layer(&settings.ground_layer) {
            for (col, row, tile) in layer.tiles() {
                if tile.collides {
                    gizmos.rect_2d(
                        level.map.tile_center(col as i32, row as i32),
                        0.0,
                        level.map.tile_size,
                        Color::srgb(0.9, 0.6, 0.1),
                    );
                }
            }
        }
    }

    let touch = Color::srgb(1.0, 0.1, 0.1);
    for (t, body) in &bodies {
        let center = t.translation.truncate();
        gizmos.rect_2d(center, 0.0, body.size, Color::srgb(1.0, 0.0, 1.0));
        gizmos.line_2d(center, center + body.velocity * 0.1, Color::srgb(0.0, 1.0, 0.0));

        let (min, max) = (center - body.size * 0.5, center + body.size * 0.5);
        let b = body.blocked;
        if b.up {
            gizmos.line_2d(Vec2::new(min.x, max.y), max, touch);
        }
        if b.down {
            gizmos.line_2d(min, Vec2::new(max.x, min.y), touch);
        }
        if b.left {
            gizmos.line_2d(min, Vec2::new(min.x, max.y), touch);
        }
        if b.right {
            gizmos.line_2d(Vec2::new(max.x, min.y), max, touch);
        }
    }
    for (t, body) in &statics {
        gizmos.rect_2d(t.translation.truncate(), 0.0, body.size, Color::srgb(0.0, 0.0, 1.0));
    }
}
