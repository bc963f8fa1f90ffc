use crate::prelude::*;

use crate::fixed_update_utils::did_fixed_timestep_run_this_frame;

pub(super) fn plugin(app: &mut App) {
    app.add_observer(apply_movement)
        .add_observer(apply_jump)
        .add_observer(apply_sprint)
        .add_observer(apply_wall_jump)
        .add_systems(
            RunFixedMainLoop,
            clear_accumulated_input
                .run_if(did_fixed_timestep_run_this_frame)
                .in_set(RunFixedMainLoopSystems::AfterFixedMainLoop),
        );
}

/// Directional movement. Raw axes in `[-1, 1]²`, unsmoothed.
#[derive(Debug, InputAction)]
#[action_output(Vec2)]
pub struct Movement;

#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct Jump;

/// Held to raise the grounded speed cap.
#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct Sprint;

/// Jump away from the wall while wall-running.
#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct WallJump;

/// Input accumulated since the last fixed update loop. Is cleared after
/// every fixed update loop, so "pressed this tick" is unambiguous: a press
/// is visible to exactly one run of the fixed-rate systems.
#[derive(Component, Clone, Reflect, Default, Debug)]
#[reflect(Component)]
pub struct AccumulatedInput {
    /// The last non-zero move that was input since the last fixed update loop
    pub last_movement: Option<Vec2>,
    /// Whether jump was pressed since the last fixed update loop.
    pub jumped: bool,
    /// Whether wall-jump was pressed since the last fixed update loop.
    pub wall_jumped: bool,
    /// Whether any frame since the last fixed update loop held sprint.
    pub sprinting: bool,
}

impl AccumulatedInput {
    pub fn movement(&self) -> Vec2 {
        self.last_movement.unwrap_or_default()
    }
}

fn apply_movement(
    movement: On<Fire<Movement>>,
    mut accumulated_inputs: Query<&mut AccumulatedInput>,
) {
    if let Ok(mut accumulated_input) = accumulated_inputs.get_mut(movement.context) {
        accumulated_input.last_movement = Some(movement.value);
    }
}

fn apply_jump(jump: On<Start<Jump>>, mut accumulated_inputs: Query<&mut AccumulatedInput>) {
    if let Ok(mut accumulated_input) = accumulated_inputs.get_mut(jump.context) {
        accumulated_input.jumped = true;
    }
}

fn apply_sprint(sprint: On<Fire<Sprint>>, mut accumulated_inputs: Query<&mut AccumulatedInput>) {
    if let Ok(mut accumulated_input) = accumulated_inputs.get_mut(sprint.context) {
        accumulated_input.sprinting = true;
    }
}

fn apply_wall_jump(
    wall_jump: On<Start<WallJump>>,
    mut accumulated_inputs: Query<&mut AccumulatedInput>,
) {
    if let Ok(mut accumulated_input) = accumulated_inputs.get_mut(wall_jump.context) {
        accumulated_input.wall_jumped = true;
    }
}

fn clear_accumulated_input(mut accumulated_inputs: Query<&mut AccumulatedInput>) {
    for mut accumulated_input in &mut accumulated_inputs {
        *accumulated_input = AccumulatedInput::default();
    }
}
