use bevy::asset::LoadState;
use bevy::prelude::*;

use crate::camera::{CameraFade, CameraFollow};
use crate::input::ControlState;
use crate::particles::{EmitParticles, EmitterConfig, FrameOrder, Particle, ParticleEmitter, Speed};
use crate::physics::{aabb_overlap, ArcadeBody, StaticBody};
use crate::tilemap::{map_to_world, LevelMap, Tile, TiledMap};

#[derive(States, Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum AppState {
    #[default]
    Loading,
    Playing,
    LoadFailed,
}

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum GameSet {
    Input,
    Control,
    Physics,
    Overlap,
    Effects,
}

pub struct ScenePlugin;
impl Plugin for ScenePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PlatformerSettings>()
            .init_resource::<Score>()
            .add_event::<RestartScene>()
            .configure_sets(
                Update,
                (
                    GameSet::Input,
                    GameSet::Control,
                    GameSet::Physics,
                    GameSet::Overlap,
                    GameSet::Effects,
                )
                    .chain()
                    .run_if(in_state(AppState::Playing)),
            )
            .add_systems(Startup, load_level)
            .add_systems(Update, wait_for_level.run_if(in_state(AppState::Loading)))
            .add_systems(OnEnter(AppState::Playing), spawn_level)
            .add_systems(
                Update,
                (handle_restart, player_control)
                    .chain()
                    .in_set(GameSet::Control),
            )
            .add_systems(Update, collect_coins.in_set(GameSet::Overlap))
            .add_systems(Update, (animate_player, animate_coins).in_set(GameSet::Effects));
    }
}

#[derive(Resource, Clone)]
pub struct PlatformerSettings {
    pub acceleration: f32,
    pub drag: f32,
    pub gravity: f32,
    pub jump_velocity: f32,
    pub particle_velocity: f32,
    pub zoom: f32,
    pub sink_speed: f32,
    pub fade_duration: f32,
    pub fade_color: [u8; 3],
    pub camera_lerp: Vec2,
    pub camera_deadzone: Vec2,
    // Map pixels, y down.
    pub player_spawn: Vec2,
    pub player_size: Vec2,
    pub map_path: String,
    pub ground_layer: String,
    pub object_layer: String,
    pub coin_name: String,
    pub coin_burst: usize,
}

impl Default for PlatformerSettings {
    fn default() -> Self {
        Self {
            acceleration: 400.0,
            drag: 500.0, // drag < acceleration = icy slide
            gravity: 1500.0,
            jump_velocity: 600.0,
            particle_velocity: 50.0,
            zoom: 2.0,
            sink_speed: 100.0,
            fade_duration: 1.0,
            fade_color: [0, 0, 255],
            camera_lerp: Vec2::splat(0.25),
            camera_deadzone: Vec2::splat(50.0),
            player_spawn: Vec2::new(30.0, 345.0),
            player_size: Vec2::splat(24.0),
            map_path: "maps/platformer-level-1.tmj".into(),
            ground_layer: "Ground-n-Platforms".into(),
            object_layer: "Objects".into(),
            coin_name: "coin".into(),
            coin_burst: 15,
        }
    }
}

#[derive(Resource, Default, Deref, DerefMut)]
pub struct Score(pub u32);

#[derive(Event, Default)]
pub struct RestartScene;

#[derive(Resource)]
pub struct LevelHandle(pub Handle<TiledMap>);

#[derive(Resource)]
pub struct Level {
    pub map: LevelMap,
}

#[derive(Resource)]
pub struct Vfx {
    pub walking: Entity,
    pub coin: Entity,
    pub drowning: Entity,
}

#[derive(Component)]
pub struct LevelEntity;

#[derive(Component)]
pub struct Player {
    pub facing: Facing,
}

#[derive(Component)]
struct PlayerEye;

#[derive(Component)]
pub struct Coin;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Facing {
    #[default]
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Anim {
    #[default]
    Idle,
    Walk,
    Jump,
    Spin,
}

impl Anim {
    fn frames(self) -> usize {
        match self {
            Anim::Idle | Anim::Jump => 1,
            Anim::Walk | Anim::Spin => 2,
        }
    }

    fn fps(self) -> f32 {
        match self {
            Anim::Walk => 15.0,
            Anim::Spin => 6.0,
            Anim::Idle | Anim::Jump => 0.0,
        }
    }
}

#[derive(Component, Debug, Default)]
pub struct Animation {
    pub current: Anim,
    pub frame: usize,
    timer: f32,
}

impl Animation {
    pub fn new(anim: Anim) -> Self {
        Self {
            current: anim,
            ..default()
        }
    }

    pub fn play(&mut self, anim: Anim, ignore_if_playing: bool) {
        if ignore_if_playing && self.current == anim {
            return;
        }
        self.current = anim;
        self.frame = 0;
        self.timer = 0.0;
    }

    pub fn tick(&mut self, dt: f32) {
        let fps = self.current.fps();
        if fps <= 0.0 {
            return;
        }
        self.timer += dt;
        let step = 1.0 / fps;
        while self.timer >= step {
            self.timer -= step;
            self.frame = (self.frame + 1) % self.current.frames();
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkDust {
    Emit,
    Stop,
    Unchanged,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerCommand {
    pub acceleration_x: f32,
    pub drag_x: Option<f32>,
    pub velocity_y: Option<f32>,
    pub facing: Option<Facing>,
    pub anim: Anim,
    pub ignore_if_playing: bool,
    pub walk_dust: WalkDust,
    pub drowning: bool,
}

pub fn control_player(
    input: &ControlState,
    on_floor: bool,
    in_water: bool,
    settings: &PlatformerSettings,
) -> PlayerCommand {
    if in_water {
        return PlayerCommand {
            acceleration_x: 0.0,
            drag_x: None,
            velocity_y: Some(-settings.sink_speed),
            facing: None,
            anim: Anim::Idle,
            ignore_if_playing: false,
            walk_dust: WalkDust::Stop,
            drowning: true,
        };
    }

    let dust = if on_floor {
        WalkDust::Emit
    } else {
        WalkDust::Unchanged
    };
    let mut cmd = if input.left {
        PlayerCommand {
            acceleration_x: -settings.acceleration,
            drag_x: None,
            velocity_y: None,
            facing: Some(Facing::Left),
            anim: Anim::Walk,
            ignore_if_playing: true,
            walk_dust: dust,
            drowning: false,
        }
    } else if input.right {
        PlayerCommand {
            acceleration_x: settings.acceleration,
            drag_x: None,
            velocity_y: None,
            facing: Some(Facing::Right),
            anim: Anim::Walk,
            ignore_if_playing: true,
            walk_dust: dust,
            drowning: false,
        }
    } else {
        PlayerCommand {
            acceleration_x: 0.0,
            drag_x: Some(settings.drag),
            velocity_y: None,
            facing: None,
            anim: Anim::Idle,
            ignore_if_playing: false,
            walk_dust: WalkDust::Stop,
            drowning: false,
        }
    };

    if !on_floor {
        cmd.anim = Anim::Jump;
        cmd.ignore_if_playing = false;
    }
    if on_floor && input.jump_pressed {
        cmd.velocity_y = Some(settings.jump_velocity);
    }
    cmd
}

// Water is sampled a third of the player's height above its centre.
pub fn water_sample_point(center: Vec2, size: Vec2) -> Vec2 {
    center + Vec2::new(0.0, size.y / 3.0)
}

pub fn is_water(tile: Option<&Tile>) -> bool {
    tile.is_some_and(|t| t.bool_property("water"))
}

// Offset of the walking dust from the player's centre, in world axes.
fn dust_offset(size: Vec2) -> Vec2 {
    Vec2::new(size.x / 2.0 - 10.0, -(size.y / 2.0 - 5.0))
}

fn load_level(mut commands: Commands, asset_server: Res<AssetServer>, settings: Res<PlatformerSettings>) {
    info!("loading level {}", settings.map_path);
    commands.insert_resource(LevelHandle(asset_server.load(settings.map_path.clone())));
}

fn wait_for_level(
    asset_server: Res<AssetServer>,
    handle: Res<LevelHandle>,
    mut next_state: ResMut<NextState<AppState>>,
) {
    match asset_server.load_state(handle.0.id()) {
        LoadState::Loaded => next_state.set(AppState::Playing),
        LoadState::Failed(err) => {
            error!("level failed to load: {err}");
            next_state.set(AppState::LoadFailed);
        }
        _ => {}
    }
}

fn tile_color(tile: &Tile) -> Color {
    let shade = (tile.index % 3) as f32 * 0.04;
    if tile.bool_property("water") {
        Color::srgba(0.2, 0.45 + shade, 0.9, 0.8)
    } else if tile.collides {
        Color::srgb(0.55 + shade, 0.38 + shade, 0.22)
    } else {
        Color::srgb(0.4, 0.6 + shade, 0.35)
    }
}

fn walking_dust() -> EmitterConfig {
    EmitterConfig {
        frames: vec![Color::srgb(0.85, 0.85, 0.85), Color::srgb(0.7, 0.7, 0.7)],
        frame_order: FrameOrder::Random,
        scale: (0.03, 0.1),
        alpha: (1.0, 0.1),
        lifespan: 0.35,
        max_alive: Some(8),
        ..default()
    }
}

fn coin_sparkle() -> EmitterConfig {
    EmitterConfig {
        frames: vec![Color::srgb(1.0, 0.95, 0.4), Color::srgb(1.0, 0.8, 0.2)],
        scale: (0.03, 0.25),
        alpha: (1.0, 0.1),
        lifespan: 0.35,
        max_alive: Some(4),
        gravity_y: 100.0,
        ..default()
    }
}

fn drowning_bubbles() -> EmitterConfig {
    EmitterConfig {
        frames: vec![Color::srgb(0.8, 0.9, 1.0), Color::srgb(0.6, 0.8, 1.0)],
        scale: (0.01, 0.03),
        alpha: (1.0, 0.0),
        speed_y: Speed::Range(20.0, 50.0),
        lifespan: 1.0,
        frequency: 0.1,
        ..default()
    }
}

fn spawn_level_inner(commands: &mut Commands, source: &LevelMap, settings: &PlatformerSettings) {
    let mut map = source.clone();
    let Some(ground) = map.tile_layer_mut(&settings.ground_layer) else {
        error!("map has no tile layer named `{}`", settings.ground_layer);
        return;
    };
    let solid = ground.set_collision_by_property("collides");
    debug!("{solid} colliding tiles in `{}`", settings.ground_layer);

    // Hidden layers still collide.
    if let Some(ground) = map.tile_layer(&settings.ground_layer).filter(|l| l.visible) {
        for (col, row, tile) in ground.tiles() {
            let pos = map.tile_center(col as i32, row as i32);
            commands.spawn((
                SpriteBundle {
                    sprite: Sprite {
                        color: tile_color(tile),
                        custom_size: Some(map.tile_size),
                        ..default()
                    },
                    transform: Transform::from_translation(pos.extend(0.0)),
                    ..default()
                },
                LevelEntity,
            ));
        }
    }

    if map.object_layer(&settings.object_layer).is_none() {
        warn!("map has no object layer named `{}`", settings.object_layer);
    }
    let mut coins = 0;
    for obj in map.objects_named(&settings.object_layer, &settings.coin_name) {
        let size = if obj.size() == Vec2::ZERO {
            map.tile_size
        } else {
            obj.size()
        };
        commands.spawn((
            SpriteBundle {
                sprite: Sprite {
                    color: Color::srgb(1.0, 0.82, 0.2),
                    custom_size: Some(size * 0.7),
                    ..default()
                },
                transform: Transform::from_translation(obj.world_center().extend(1.0)),
                ..default()
            },
            StaticBody { size },
            Animation::new(Anim::Spin),
            Coin,
            LevelEntity,
        ));
        debug!("coin {} at {:?}", obj.id, obj.center());
        coins += 1;
    }

    let mut body = ArcadeBody::new(settings.player_size);
    body.collide_world_bounds = true;
    let player = commands
        .spawn((
            SpriteBundle {
                sprite: Sprite {
                    color: Color::srgb(0.95, 0.45, 0.35),
                    custom_size: Some(settings.player_size),
                    ..default()
                },
                transform: Transform::from_translation(
                    map_to_world(settings.player_spawn).extend(2.0),
                ),
                ..default()
            },
            body,
            Player {
                facing: Facing::Left,
            },
            Animation::new(Anim::Idle),
            LevelEntity,
        ))
        .with_children(|parent| {
            parent.spawn((
                SpriteBundle {
                    sprite: Sprite {
                        color: Color::srgb(0.1, 0.1, 0.15),
                        custom_size: Some(Vec2::splat(4.0)),
                        ..default()
                    },
                    transform: Transform::from_xyz(-5.0, 5.0, 0.1),
                    ..default()
                },
                PlayerEye,
            ));
        })
        .id();

    let walking = commands
        .spawn((ParticleEmitter::new(walking_dust()), LevelEntity))
        .id();
    let coin = commands
        .spawn((ParticleEmitter::new(coin_sparkle()), LevelEntity))
        .id();
    let drowning = commands
        .spawn((ParticleEmitter::new(drowning_bubbles()), LevelEntity))
        .id();
    commands.insert_resource(Vfx {
        walking,
        coin,
        drowning,
    });

    info!(
        "level ready: {}x{} tiles, {coins} coins, player {player:?}",
        map.width, map.height
    );
    commands.insert_resource(Level { map });
}

fn spawn_level(
    mut commands: Commands,
    handle: Res<LevelHandle>,
    maps: Res<Assets<TiledMap>>,
    settings: Res<PlatformerSettings>,
) {
    let Some(level) = maps.get(&handle.0) else {
        error!("level asset missing after load");
        return;
    };
    spawn_level_inner(&mut commands, &level.map, &settings);
}

#[allow(clippy::too_many_arguments)]
fn handle_restart(
    mut commands: Commands,
    mut ev_restart: EventReader<RestartScene>,
    handle: Res<LevelHandle>,
    maps: Res<Assets<TiledMap>>,
    level_q: Query<Entity, Or<(With<LevelEntity>, With<Particle>)>>,
    mut settings: ResMut<PlatformerSettings>,
    mut score: ResMut<Score>,
    mut fade: ResMut<CameraFade>,
    mut follow_q: Query<&mut CameraFollow>,
) {
    if ev_restart.is_empty() {
        return;
    }
    ev_restart.clear();

    for e in &level_q {
        commands.entity(e).despawn_recursive();
    }
    *settings = PlatformerSettings::default();
    score.0 = 0;
    fade.reset();
    for mut follow in &mut follow_q {
        follow.center = None;
    }
    info!("restarting level");

    if let Some(level) = maps.get(&handle.0) {
        spawn_level_inner(&mut commands, &level.map, &settings);
    }
}

#[allow(clippy::too_many_arguments)]
fn player_control(
    controls: Res<ControlState>,
    settings: Res<PlatformerSettings>,
    level: Option<Res<Level>>,
    vfx: Option<Res<Vfx>>,
    mut fade: ResMut<CameraFade>,
    mut player_q: Query<(Entity, &Transform, &mut ArcadeBody, &mut Player, &mut Animation)>,
    mut emitters: Query<&mut ParticleEmitter>,
) {
    let (Some(level), Some(vfx)) = (level, vfx) else {
        return;
    };
    let Ok((player, t, mut body, mut state, mut anim)) = player_q.get_single_mut() else {
        return;
    };

    let sample = water_sample_point(t.translation.truncate(), body.size);
    let in_water = is_water(level.map.tile_at_world(&settings.ground_layer, sample));
    let cmd = control_player(&controls, body.on_floor(), in_water, &settings);

    body.acceleration.x = cmd.acceleration_x;
    if let Some(drag) = cmd.drag_x {
        body.drag.x = drag;
    }
    if let Some(vy) = cmd.velocity_y {
        body.velocity.y = vy;
    }
    if let Some(facing) = cmd.facing {
        state.facing = facing;
    }
    anim.play(cmd.anim, cmd.ignore_if_playing);

    if let Ok(mut walking) = emitters.get_mut(vfx.walking) {
        match cmd.walk_dust {
            WalkDust::Emit => {
                walking.start_follow(player, dust_offset(body.size));
                walking.set_particle_speed(settings.particle_velocity, 0.0);
                walking.start();
            }
            WalkDust::Stop => walking.stop(),
            WalkDust::Unchanged => {}
        }
    }

    if let Ok(mut drowning) = emitters.get_mut(vfx.drowning) {
        if cmd.drowning {
            drowning.start_follow(player, Vec2::ZERO);
            drowning.start();
        } else {
            drowning.stop();
        }
    }

    if cmd.drowning {
        let [r, g, b] = settings.fade_color;
        if fade.start(settings.fade_duration, Color::srgb_u8(r, g, b)) {
            info!("player fell into water");
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn collect_coins(
    mut commands: Commands,
    settings: Res<PlatformerSettings>,
    vfx: Option<Res<Vfx>>,
    player_q: Query<(&Transform, &ArcadeBody), With<Player>>,
    coins: Query<(Entity, &Transform, &StaticBody), With<Coin>>,
    mut emitters: Query<&mut ParticleEmitter>,
    mut bursts: EventWriter<EmitParticles>,
    mut score: ResMut<Score>,
) {
    let Ok((pt, body)) = player_q.get_single() else {
        return;
    };
    let player_pos = pt.translation.truncate();

    for (coin, ct, coin_body) in &coins {
        let coin_pos = ct.translation.truncate();
        if !aabb_overlap(player_pos, body.size, coin_pos, coin_body.size) {
            continue;
        }
        if let Some(vfx) = vfx.as_deref() {
            if let Ok(mut sparkle) = emitters.get_mut(vfx.coin) {
                sparkle.set_particle_speed(settings.particle_velocity, 0.0);
            }
            bursts.send(EmitParticles {
                emitter: vfx.coin,
                at: coin_pos,
                count: settings.coin_burst,
            });
        }
        score.0 += 1;
        debug!("coin collected, score {}", score.0);
        commands.entity(coin).despawn_recursive();
    }
}

fn animate_player(
    time: Res<Time>,
    settings: Res<PlatformerSettings>,
    mut player_q: Query<(&Player, &mut Animation, &mut Sprite, &Children)>,
    mut eyes: Query<&mut Transform, With<PlayerEye>>,
) {
    let Ok((player, mut anim, mut sprite, children)) = player_q.get_single_mut() else {
        return;
    };
    anim.tick(time.delta_seconds());

    // Second walk frame and the jump pose share the crouched sprite.
    let crouched = matches!(
        (anim.current, anim.frame),
        (Anim::Jump, _) | (Anim::Walk, 1)
    );
    let size = settings.player_size;
    sprite.custom_size = Some(if crouched {
        Vec2::new(size.x, size.y * 0.9)
    } else {
        size
    });
    sprite.flip_x = player.facing == Facing::Right;

    for &child in children {
        if let Ok(mut eye) = eyes.get_mut(child) {
            eye.translation.x = match player.facing {
                Facing::Left => -5.0,
                Facing::Right => 5.0,
            };
        }
    }
}

fn animate_coins(time: Res<Time>, mut coins: Query<(&mut Animation, &mut Transform), With<Coin>>) {
    for (mut anim, mut t) in &mut coins {
        anim.tick(time.delta_seconds());
        t.scale.x = if anim.frame == 0 { 1.0 } else { 0.4 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::ParticlesPlugin;

    fn shipped_level() -> LevelMap {
        LevelMap::from_json(include_bytes!("../assets/maps/platformer-level-1.tmj")).unwrap()
    }

    fn scene_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .init_resource::<PlatformerSettings>()
            .init_resource::<Score>()
            .init_resource::<CameraFade>()
            .init_resource::<Assets<TiledMap>>()
            .add_event::<RestartScene>();
        app
    }

    #[test]
    fn touching_a_coin_scores_and_bursts() {
        let mut app = scene_app();
        app.add_plugins(ParticlesPlugin)
            .add_systems(Update, collect_coins.before(GameSet::Effects));

        let world = app.world_mut();
        let walking = world.spawn(ParticleEmitter::new(walking_dust())).id();
        let sparkle = world.spawn(ParticleEmitter::new(coin_sparkle())).id();
        let drowning = world.spawn(ParticleEmitter::new(drowning_bubbles())).id();
        world.insert_resource(Vfx {
            walking,
            coin: sparkle,
            drowning,
        });
        world.spawn((
            Transform::from_xyz(100.0, -100.0, 0.0),
            ArcadeBody::new(Vec2::splat(24.0)),
            Player {
                facing: Facing::Left,
            },
        ));
        let touched = world
            .spawn((
                Transform::from_xyz(110.0, -100.0, 0.0),
                StaticBody {
                    size: Vec2::splat(18.0),
                },
                Coin,
            ))
            .id();
        let far = world
            .spawn((
                Transform::from_xyz(300.0, -100.0, 0.0),
                StaticBody {
                    size: Vec2::splat(18.0),
                },
                Coin,
            ))
            .id();

        app.update();

        let world = app.world();
        assert_eq!(world.resource::<Score>().0, 1);
        assert!(world.get_entity(touched).is_none());
        assert!(world.get_entity(far).is_some());

        let events = world.resource::<Events<EmitParticles>>();
        let bursts: Vec<EmitParticles> = events.get_reader().read(events).copied().collect();
        assert_eq!(bursts.len(), 1);
        assert_eq!(bursts[0].emitter, sparkle);
        assert_eq!(bursts[0].count, 15);
        assert_eq!(bursts[0].at, Vec2::new(110.0, -100.0));

        let emitter = world.get::<ParticleEmitter>(sparkle).unwrap();
        assert_eq!(emitter.config.speed_x, Speed::Fixed(50.0));

        // Fifteen requested, four allowed alive.
        let mut particles = app.world_mut().query::<&Particle>();
        let alive = particles
            .iter(app.world())
            .filter(|p| p.emitter == sparkle)
            .count();
        assert_eq!(alive, 4);
    }

    #[test]
    fn restart_respawns_level_and_resets_session() {
        let mut app = scene_app();
        let handle = app
            .world_mut()
            .resource_mut::<Assets<TiledMap>>()
            .add(TiledMap {
                map: shipped_level(),
            });
        app.insert_resource(LevelHandle(handle))
            .add_systems(Startup, spawn_level)
            .add_systems(Update, handle_restart);
        let follow = app
            .world_mut()
            .spawn(CameraFollow {
                center: Some(Vec2::ONE),
            })
            .id();
        app.update();

        let mut level_q = app.world_mut().query_filtered::<Entity, With<LevelEntity>>();
        let mut player_q = app.world_mut().query_filtered::<Entity, With<Player>>();
        let spawned = level_q.iter(app.world()).count();
        assert!(spawned > 0);
        let old_player = player_q.single(app.world());

        let world = app.world_mut();
        world.resource_mut::<PlatformerSettings>().gravity = 10.0;
        world.resource_mut::<Score>().0 = 7;
        world
            .resource_mut::<CameraFade>()
            .start(1.0, Color::srgb_u8(0, 0, 255));
        let stray = world
            .spawn(Particle {
                emitter: Entity::PLACEHOLDER,
                age: 0.0,
                lifespan: 1.0,
                velocity: Vec2::ZERO,
                gravity_y: 0.0,
                scale: (1.0, 1.0),
                alpha: (1.0, 1.0),
                base_size: 1.0,
            })
            .id();
        world.send_event(RestartScene);
        app.update();

        let world = app.world();
        assert_eq!(world.resource::<PlatformerSettings>().gravity, 1500.0);
        assert_eq!(world.resource::<Score>().0, 0);
        assert_eq!(world.resource::<CameraFade>().progress(), 0.0);
        assert_eq!(world.get::<CameraFollow>(follow).unwrap().center, None);
        assert!(world.get_entity(stray).is_none());
        assert!(world.get_entity(old_player).is_none());

        assert_eq!(level_q.iter(app.world()).count(), spawned);
        let new_player = player_q.single(app.world());
        assert_ne!(new_player, old_player);
        let vfx = app.world().resource::<Vfx>();
        assert!(app.world().get::<ParticleEmitter>(vfx.coin).is_some());
    }

    fn input(left: bool, right: bool, jump: bool) -> ControlState {
        ControlState {
            left,
            right,
            jump_pressed: jump,
        }
    }

    #[test]
    fn walking_left_on_floor() {
        let s = PlatformerSettings::default();
        let cmd = control_player(&input(true, false, false), true, false, &s);
        assert_eq!(cmd.acceleration_x, -400.0);
        assert_eq!(cmd.facing, Some(Facing::Left));
        assert_eq!(cmd.anim, Anim::Walk);
        assert!(cmd.ignore_if_playing);
        assert_eq!(cmd.walk_dust, WalkDust::Emit);
        assert_eq!(cmd.velocity_y, None);
        assert!(!cmd.drowning);
    }

    #[test]
    fn left_wins_over_right() {
        let s = PlatformerSettings::default();
        let cmd = control_player(&input(true, true, false), true, false, &s);
        assert_eq!(cmd.acceleration_x, -400.0);
        let cmd = control_player(&input(false, true, false), true, false, &s);
        assert_eq!(cmd.acceleration_x, 400.0);
        assert_eq!(cmd.facing, Some(Facing::Right));
    }

    #[test]
    fn idle_applies_drag_and_stops_dust() {
        let s = PlatformerSettings::default();
        let cmd = control_player(&input(false, false, false), true, false, &s);
        assert_eq!(cmd.acceleration_x, 0.0);
        assert_eq!(cmd.drag_x, Some(500.0));
        assert_eq!(cmd.anim, Anim::Idle);
        assert_eq!(cmd.walk_dust, WalkDust::Stop);
    }

    #[test]
    fn airborne_plays_jump_and_keeps_dust() {
        let s = PlatformerSettings::default();
        let cmd = control_player(&input(false, true, true), false, false, &s);
        assert_eq!(cmd.anim, Anim::Jump);
        assert_eq!(cmd.walk_dust, WalkDust::Unchanged);
        // No double jump.
        assert_eq!(cmd.velocity_y, None);
    }

    #[test]
    fn jump_only_from_floor() {
        let s = PlatformerSettings::default();
        let cmd = control_player(&input(false, false, true), true, false, &s);
        assert_eq!(cmd.velocity_y, Some(600.0));
        assert_eq!(cmd.anim, Anim::Idle);
    }

    #[test]
    fn water_sinks_and_ignores_input() {
        let s = PlatformerSettings::default();
        for on_floor in [true, false] {
            let cmd = control_player(&input(true, false, true), on_floor, true, &s);
            assert!(cmd.drowning);
            assert_eq!(cmd.velocity_y, Some(-100.0));
            assert_eq!(cmd.acceleration_x, 0.0);
            assert_eq!(cmd.anim, Anim::Idle);
            assert_eq!(cmd.walk_dust, WalkDust::Stop);
            assert_eq!(cmd.facing, None);
        }
    }

    #[test]
    fn water_sample_is_in_upper_body() {
        let sample = water_sample_point(Vec2::new(30.0, -384.0), Vec2::splat(24.0));
        assert_eq!(sample, Vec2::new(30.0, -376.0));
        assert_eq!(dust_offset(Vec2::splat(24.0)), Vec2::new(2.0, -7.0));
    }

    #[test]
    fn animation_loops_and_restarts() {
        let mut anim = Animation::new(Anim::Idle);
        anim.play(Anim::Walk, true);
        assert_eq!(anim.current, Anim::Walk);
        anim.tick(1.0 / 15.0 + 1e-4);
        assert_eq!(anim.frame, 1);
        anim.play(Anim::Walk, true);
        assert_eq!(anim.frame, 1);
        anim.tick(1.0 / 15.0);
        assert_eq!(anim.frame, 0);

        anim.tick(1.0 / 15.0 + 1e-4);
        anim.play(Anim::Walk, false);
        assert_eq!(anim.frame, 0);

        anim.play(Anim::Idle, false);
        anim.tick(10.0);
        assert_eq!(anim.frame, 0);
    }

    #[test]
    fn shipped_level_spawn_is_dry_and_pool_is_wet() {
        let s = PlatformerSettings::default();
        let bytes = include_bytes!("../assets/maps/platformer-level-1.tmj");
        let map = LevelMap::from_json(bytes).unwrap();
        let spawn = map_to_world(s.player_spawn);
        let dry = map.tile_at_world(&s.ground_layer, water_sample_point(spawn, s.player_size));
        assert!(!is_water(dry));

        let ground = map.tile_layer(&s.ground_layer).unwrap();
        let (col, row, _) = ground
            .tiles()
            .find(|(_, _, t)| t.bool_property("water"))
            .unwrap();
        let wet = map.tile_at_world(&s.ground_layer, map.tile_center(col as i32, row as i32));
        assert!(is_water(wet));
    }
}
