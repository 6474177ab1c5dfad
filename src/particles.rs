use bevy::prelude::*;
use rand::Rng;
use std::collections::HashMap;

use crate::scene::GameSet;

pub struct ParticlesPlugin;
impl Plugin for ParticlesPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<EmitParticles>().add_systems(
            Update,
            (follow_targets, emit_particles, update_particles)
                .chain()
                .in_set(GameSet::Effects),
        );
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Speed {
    Fixed(f32),
    Range(f32, f32),
}

impl Speed {
    pub fn sample(&self, rng: &mut impl Rng) -> f32 {
        match *self {
            Speed::Fixed(v) => v,
            Speed::Range(a, b) if a == b => a,
            Speed::Range(a, b) => rng.gen_range(a.min(b)..a.max(b)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FrameOrder {
    #[default]
    Sequential,
    Random,
}

// World axes, y up.
#[derive(Clone, Debug)]
pub struct EmitterConfig {
    pub frames: Vec<Color>,
    pub frame_order: FrameOrder,
    pub base_size: f32,
    pub scale: (f32, f32),
    pub alpha: (f32, f32),
    pub lifespan: f32,
    pub max_alive: Option<usize>,
    pub gravity_y: f32,
    pub speed_x: Speed,
    pub speed_y: Speed,
    // Seconds between flow emissions; 0 emits every frame.
    pub frequency: f32,
    pub quantity: usize,
    pub z: f32,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            frames: vec![Color::WHITE],
            frame_order: FrameOrder::Sequential,
            base_size: 512.0,
            scale: (1.0, 1.0),
            alpha: (1.0, 1.0),
            lifespan: 1.0,
            max_alive: None,
            gravity_y: 0.0,
            speed_x: Speed::Fixed(0.0),
            speed_y: Speed::Fixed(0.0),
            frequency: 0.0,
            quantity: 1,
            z: 5.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Follow {
    pub target: Entity,
    pub offset: Vec2,
}

#[derive(Component, Debug)]
pub struct ParticleEmitter {
    pub config: EmitterConfig,
    pub position: Vec2,
    pub follow: Option<Follow>,
    emitting: bool,
    cooldown: f32,
    next_frame: usize,
}

impl ParticleEmitter {
    pub fn new(config: EmitterConfig) -> Self {
        Self {
            config,
            position: Vec2::ZERO,
            follow: None,
            emitting: false,
            cooldown: 0.0,
            next_frame: 0,
        }
    }

    pub fn is_emitting(&self) -> bool {
        self.emitting
    }

    pub fn start(&mut self) {
        if !self.emitting {
            self.emitting = true;
            self.cooldown = 0.0;
        }
    }

    pub fn stop(&mut self) {
        self.emitting = false;
    }

    pub fn start_follow(&mut self, target: Entity, offset: Vec2) {
        self.follow = Some(Follow { target, offset });
    }

    pub fn set_particle_speed(&mut self, x: f32, y: f32) {
        self.config.speed_x = Speed::Fixed(x);
        self.config.speed_y = Speed::Fixed(y);
    }

    pub fn due(&mut self, dt: f32) -> usize {
        if !self.emitting {
            return 0;
        }
        if self.config.frequency <= 0.0 {
            return self.config.quantity;
        }
        let mut count = 0;
        self.cooldown -= dt;
        while self.cooldown <= 0.0 {
            count += self.config.quantity;
            self.cooldown += self.config.frequency;
        }
        count
    }

    pub fn allowance(&self, alive: usize, requested: usize) -> usize {
        match self.config.max_alive {
            Some(max) => requested.min(max.saturating_sub(alive)),
            None => requested,
        }
    }

    fn next_color(&mut self, rng: &mut impl Rng) -> Color {
        let frames = &self.config.frames;
        if frames.is_empty() {
            return Color::WHITE;
        }
        match self.config.frame_order {
            FrameOrder::Random => frames[rng.gen_range(0..frames.len())],
            FrameOrder::Sequential => {
                let color = frames[self.next_frame % frames.len()];
                self.next_frame = (self.next_frame + 1) % frames.len();
                color
            }
        }
    }
}

#[derive(Component, Debug)]
pub struct Particle {
    pub emitter: Entity,
    pub age: f32,
    pub lifespan: f32,
    pub velocity: Vec2,
    pub gravity_y: f32,
    pub scale: (f32, f32),
    pub alpha: (f32, f32),
    pub base_size: f32,
}

impl Particle {
    pub fn progress(&self) -> f32 {
        if self.lifespan <= 0.0 {
            return 1.0;
        }
        (self.age / self.lifespan).clamp(0.0, 1.0)
    }

    pub fn current_scale(&self) -> f32 {
        lerp(self.scale, self.progress())
    }

    pub fn current_alpha(&self) -> f32 {
        lerp(self.alpha, self.progress())
    }

    pub fn expired(&self) -> bool {
        self.age >= self.lifespan
    }
}

fn lerp((start, end): (f32, f32), t: f32) -> f32 {
    start + (end - start) * t
}

#[derive(Event, Clone, Copy, Debug)]
pub struct EmitParticles {
    pub emitter: Entity,
    pub at: Vec2,
    pub count: usize,
}

fn spawn_particle(
    commands: &mut Commands,
    emitter_entity: Entity,
    emitter: &mut ParticleEmitter,
    at: Vec2,
    rng: &mut impl Rng,
) {
    let color = emitter.next_color(rng);
    let cfg = &emitter.config;
    let velocity = Vec2::new(cfg.speed_x.sample(rng), cfg.speed_y.sample(rng));
    commands.spawn((
        SpriteBundle {
            sprite: Sprite {
                color: color.with_alpha(cfg.alpha.0),
                custom_size: Some(Vec2::splat(cfg.base_size * cfg.scale.0)),
                ..default()
            },
            transform: Transform::from_translation(at.extend(cfg.z)),
            ..default()
        },
        Particle {
            emitter: emitter_entity,
            age: 0.0,
            lifespan: cfg.lifespan,
            velocity,
            gravity_y: cfg.gravity_y,
            scale: cfg.scale,
            alpha: cfg.alpha,
            base_size: cfg.base_size,
        },
    ));
}

fn follow_targets(
    mut emitters: Query<&mut ParticleEmitter>,
    targets: Query<&Transform, Without<ParticleEmitter>>,
) {
    for mut emitter in &mut emitters {
        let Some(follow) = emitter.follow else {
            continue;
        };
        match targets.get(follow.target) {
            Ok(t) => emitter.position = t.translation.truncate() + follow.offset,
            Err(_) => emitter.follow = None,
        }
    }
}

fn emit_particles(
    mut commands: Commands,
    time: Res<Time>,
    mut bursts: EventReader<EmitParticles>,
    mut emitters: Query<(Entity, &mut ParticleEmitter)>,
    particles: Query<&Particle>,
) {
    let mut alive: HashMap<Entity, usize> = HashMap::new();
    for p in &particles {
        *alive.entry(p.emitter).or_default() += 1;
    }

    let mut rng = rand::thread_rng();
    let dt = time.delta_seconds();

    for burst in bursts.read() {
        let Ok((entity, mut emitter)) = emitters.get_mut(burst.emitter) else {
            continue;
        };
        let count = alive.entry(entity).or_default();
        let n = emitter.allowance(*count, burst.count);
        for _ in 0..n {
            spawn_particle(&mut commands, entity, &mut emitter, burst.at, &mut rng);
        }
        *count += n;
    }

    for (entity, mut emitter) in &mut emitters {
        let due = emitter.due(dt);
        if due == 0 {
            continue;
        }
        let count = alive.entry(entity).or_default();
        let n = emitter.allowance(*count, due);
        let at = emitter.position;
        for _ in 0..n {
            spawn_particle(&mut commands, entity, &mut emitter, at, &mut rng);
        }
        *count += n;
    }
}

fn update_particles(
    mut commands: Commands,
    time: Res<Time>,
    mut particles: Query<(Entity, &mut Particle, &mut Transform, &mut Sprite)>,
) {
    let dt = time.delta_seconds();
    for (e, mut p, mut t, mut sprite) in &mut particles {
        p.age += dt;
        if p.expired() {
            commands.entity(e).despawn();
            continue;
        }
        p.velocity.y += p.gravity_y * dt;
        t.translation.x += p.velocity.x * dt;
        t.translation.y += p.velocity.y * dt;
        sprite.custom_size = Some(Vec2::splat(p.base_size * p.current_scale()));
        sprite.color.set_alpha(p.current_alpha());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn particle(age: f32) -> Particle {
        Particle {
            emitter: Entity::PLACEHOLDER,
            age,
            lifespan: 0.35,
            velocity: Vec2::ZERO,
            gravity_y: 0.0,
            scale: (0.03, 0.25),
            alpha: (1.0, 0.1),
            base_size: 512.0,
        }
    }

    #[test]
    fn particle_interpolates_over_its_life() {
        let start = particle(0.0);
        assert_eq!(start.current_scale(), 0.03);
        assert_eq!(start.current_alpha(), 1.0);
        assert!(!start.expired());

        let mid = particle(0.175);
        assert!((mid.current_scale() - 0.14).abs() < 1e-5);
        assert!((mid.current_alpha() - 0.55).abs() < 1e-5);

        let end = particle(0.5);
        assert_eq!(end.progress(), 1.0);
        assert!((end.current_alpha() - 0.1).abs() < 1e-6);
        assert!(end.expired());
    }

    #[test]
    fn stopped_emitter_releases_nothing() {
        let mut emitter = ParticleEmitter::new(EmitterConfig::default());
        assert!(!emitter.is_emitting());
        assert_eq!(emitter.due(1.0), 0);
        emitter.start();
        assert_eq!(emitter.due(1.0 / 60.0), 1);
        emitter.stop();
        assert_eq!(emitter.due(1.0 / 60.0), 0);
    }

    #[test]
    fn frequency_spaces_out_emissions() {
        let mut emitter = ParticleEmitter::new(EmitterConfig {
            frequency: 0.1,
            ..default()
        });
        emitter.start();
        // First particle leaves immediately, then one per 100 ms.
        assert_eq!(emitter.due(0.0), 1);
        assert_eq!(emitter.due(0.05), 0);
        assert_eq!(emitter.due(0.06), 1);
        assert_eq!(emitter.due(0.25), 2);

        // Restarting while running keeps the current cadence.
        emitter.start();
        assert_eq!(emitter.due(0.0), 0);
    }

    #[test]
    fn max_alive_caps_bursts() {
        let emitter = ParticleEmitter::new(EmitterConfig {
            max_alive: Some(4),
            ..default()
        });
        assert_eq!(emitter.allowance(0, 15), 4);
        assert_eq!(emitter.allowance(3, 15), 1);
        assert_eq!(emitter.allowance(6, 15), 0);

        let unbounded = ParticleEmitter::new(EmitterConfig::default());
        assert_eq!(unbounded.allowance(100, 15), 15);
    }

    #[test]
    fn particle_speed_and_follow_are_settable() {
        let mut emitter = ParticleEmitter::new(EmitterConfig {
            speed_y: Speed::Range(20.0, 50.0),
            ..default()
        });
        emitter.set_particle_speed(50.0, 0.0);
        assert_eq!(emitter.config.speed_x, Speed::Fixed(50.0));
        assert_eq!(emitter.config.speed_y, Speed::Fixed(0.0));

        emitter.start_follow(Entity::PLACEHOLDER, Vec2::new(2.0, -7.0));
        assert_eq!(
            emitter.follow,
            Some(Follow {
                target: Entity::PLACEHOLDER,
                offset: Vec2::new(2.0, -7.0)
            })
        );
    }

    #[test]
    fn frames_cycle_or_randomize() {
        let mut rng = StdRng::seed_from_u64(7);
        let red = Color::srgb(1.0, 0.0, 0.0);
        let blue = Color::srgb(0.0, 0.0, 1.0);
        let mut seq = ParticleEmitter::new(EmitterConfig {
            frames: vec![red, blue],
            ..default()
        });
        assert_eq!(seq.next_color(&mut rng), red);
        assert_eq!(seq.next_color(&mut rng), blue);
        assert_eq!(seq.next_color(&mut rng), red);

        let mut random = ParticleEmitter::new(EmitterConfig {
            frames: vec![red, blue],
            frame_order: FrameOrder::Random,
            ..default()
        });
        for _ in 0..20 {
            let c = random.next_color(&mut rng);
            assert!(c == red || c == blue);
        }
    }

    #[test]
    fn ranged_speed_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let v = Speed::Range(20.0, 50.0).sample(&mut rng);
            assert!((20.0..50.0).contains(&v));
        }
        assert_eq!(Speed::Fixed(3.0).sample(&mut rng), 3.0);
    }
}
