use crate::physics::DebugDraw;
use crate::scene::{GameSet, RestartScene};
use crate::ui::Overlays;
use bevy::input::gamepad::{GamepadConnection, GamepadEvent};
use bevy::prelude::*;

const STICK_THRESHOLD: f32 = 0.5;

#[derive(Resource)]
pub struct Keybinds {
    pub left: KeyCode,
    pub right: KeyCode,
    pub jump: KeyCode,
    pub restart: KeyCode,
    pub debug: KeyCode,
    pub help: KeyCode,
    pub diagnostics: KeyCode,
}

impl Default for Keybinds {
    fn default() -> Self {
        Self {
            left: KeyCode::ArrowLeft,
            right: KeyCode::ArrowRight,
            jump: KeyCode::ArrowUp,
            restart: KeyCode::KeyR,
            debug: KeyCode::KeyD,
            help: KeyCode::KeyH,
            diagnostics: KeyCode::F3,
        }
    }
}

#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub left: bool,
    pub right: bool,
    pub jump_pressed: bool,
}

#[derive(Resource)]
struct MyGamepad(Gamepad);

pub struct InputPlugin;
impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Keybinds>()
            .init_resource::<ControlState>()
            .add_systems(Update, (gamepad_connections, help_toggle, diagnostics_toggle))
            .add_systems(
                Update,
                (read_controls, restart_trigger, debug_toggle).in_set(GameSet::Input),
            );
    }
}

pub fn keyboard_controls(keys: &ButtonInput<KeyCode>, keybinds: &Keybinds) -> ControlState {
    ControlState {
        left: keys.pressed(keybinds.left),
        right: keys.pressed(keybinds.right),
        jump_pressed: keys.just_pressed(keybinds.jump),
    }
}

fn read_controls(
    keys: Res<ButtonInput<KeyCode>>,
    keybinds: Res<Keybinds>,
    my_gamepad: Option<Res<MyGamepad>>,
    axes: Res<Axis<GamepadAxis>>,
    buttons: Res<ButtonInput<GamepadButton>>,
    mut controls: ResMut<ControlState>,
) {
    let mut state = keyboard_controls(&keys, &keybinds);

    if let Some(MyGamepad(gamepad)) = my_gamepad.as_deref() {
        let axis_lx = GamepadAxis {
            gamepad: *gamepad,
            axis_type: GamepadAxisType::LeftStickX,
        };
        let x = axes.get(axis_lx).unwrap_or(0.0);
        let button = |button_type| GamepadButton {
            gamepad: *gamepad,
            button_type,
        };

        state.left |= x < -STICK_THRESHOLD || buttons.pressed(button(GamepadButtonType::DPadLeft));
        state.right |= x > STICK_THRESHOLD || buttons.pressed(button(GamepadButtonType::DPadRight));
        state.jump_pressed |= buttons.just_pressed(button(GamepadButtonType::South));
    }

    *controls = state;
}

fn restart_trigger(
    mut ev_restart: EventWriter<RestartScene>,
    keys: Res<ButtonInput<KeyCode>>,
    keybinds: Res<Keybinds>,
) {
    if keys.just_pressed(keybinds.restart) {
        ev_restart.send(RestartScene);
    }
}

fn debug_toggle(
    mut debug: ResMut<DebugDraw>,
    keys: Res<ButtonInput<KeyCode>>,
    keybinds: Res<Keybinds>,
) {
    if keys.just_pressed(keybinds.debug) {
        debug.0 = !debug.0;
    }
}

fn help_toggle(
    mut overlays: ResMut<Overlays>,
    keys: Res<ButtonInput<KeyCode>>,
    keybinds: Res<Keybinds>,
) {
    if keys.just_pressed(keybinds.help) {
        overlays.show_help = !overlays.show_help;
    }
}

fn diagnostics_toggle(
    mut overlays: ResMut<Overlays>,
    keys: Res<ButtonInput<KeyCode>>,
    keybinds: Res<Keybinds>,
) {
    if keys.just_pressed(keybinds.diagnostics) {
        overlays.show_diagnostics = !overlays.show_diagnostics;
    }
}

fn gamepad_connections(
    mut commands: Commands,
    my_gamepad: Option<Res<MyGamepad>>,
    mut evr_gamepad: EventReader<GamepadEvent>,
) {
    for ev in evr_gamepad.read() {
        let GamepadEvent::Connection(ev_conn) = ev else {
            continue;
        };
        match &ev_conn.connection {
            GamepadConnection::Connected(info) => {
                debug!(
                    "New gamepad connected: {:?}, name: {}",
                    ev_conn.gamepad, info.name,
                );
                // first pad wins
                if my_gamepad.is_none() {
                    commands.insert_resource(MyGamepad(ev_conn.gamepad));
                }
            }
            GamepadConnection::Disconnected => {
                debug!("Lost connection with gamepad: {:?}", ev_conn.gamepad);
                if let Some(MyGamepad(old_id)) = my_gamepad.as_deref() {
                    if *old_id == ev_conn.gamepad {
                        commands.remove_resource::<MyGamepad>();
                    }
                }
            }
        }
    }
}
