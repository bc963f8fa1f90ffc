//! Wall-running: a two-state machine fed by the wall sensors.
//!
//! While running along a wall, the body's default gravity is swapped for a
//! configurable constant downward force, which gives a tunable fall rate
//! independent of the physics engine's gravity. Leaving the state always
//! restores default gravity.

use bevy_ecs::{
    intern::Interned, lifecycle::HookContext, relationship::RelationshipSourceCollection as _,
    schedule::ScheduleLabel, world::DeferredWorld,
};

use crate::{input::AccumulatedInput, prelude::*};

pub(super) fn plugin(schedule: Interned<dyn ScheduleLabel>) -> impl Fn(&mut App) {
    move |app: &mut App| {
        app.add_systems(schedule, wall_run.in_set(FreerunSystems::WallRun));
    }
}

/// Wall-run configuration. Add next to a [`CharacterController`]; without
/// this component the wall sensors never fire and the character cannot
/// wall-run.
#[derive(Component, Clone, Reflect, Debug)]
#[reflect(Component)]
#[require(WallRunState, GravityScale)]
#[component(on_add = WallRunner::on_add)]
pub struct WallRunner {
    /// Reach of the left/right wall rays.
    pub wall_distance: f32,
    /// Clearance below the body center required before wall-running can
    /// start, independent of wall detection.
    pub min_jump_height: f32,
    /// Scales the wall-jump impulse. See [`wall_jump_impulse`].
    pub wall_run_jump_force: f32,
    /// Whether default gravity stays enabled while wall-running.
    pub use_gravity: bool,
    /// Constant downward force substituted for default gravity while
    /// wall-running.
    pub custom_gravity: f32,
    /// Colliders that count as walls.
    pub wall_filter: SpatialQueryFilter,
    /// Colliders that count as ground for the clearance probe.
    pub ground_filter: SpatialQueryFilter,
}

impl Default for WallRunner {
    fn default() -> Self {
        Self {
            wall_distance: 0.7,
            min_jump_height: 1.5,
            wall_run_jump_force: 0.12,
            use_gravity: false,
            custom_gravity: 9.0,
            wall_filter: SpatialQueryFilter::default(),
            ground_filter: SpatialQueryFilter::default(),
        }
    }
}

impl WallRunner {
    fn on_add(mut world: DeferredWorld, ctx: HookContext) {
        let Some(mut cfg) = world.get_mut::<Self>(ctx.entity) else {
            return;
        };
        cfg.wall_filter.excluded_entities.add(ctx.entity);
        cfg.ground_filter.excluded_entities.add(ctx.entity);
    }
}

/// The two mutually exclusive wall-run states. Cycles for the character's
/// lifetime; there is no terminal state.
#[derive(Component, Clone, Copy, PartialEq, Eq, Reflect, Default, Debug)]
#[reflect(Component)]
pub enum WallRunState {
    #[default]
    Idle,
    WallRunning,
}

impl WallRunState {
    /// Pure transition function. Running requires the full gate (clearance
    /// below and a wall in reach); losing any part of it drops back to
    /// [`Self::Idle`].
    pub fn next(self, can_wall_run: bool) -> Self {
        if can_wall_run {
            Self::WallRunning
        } else {
            Self::Idle
        }
    }
}

fn wall_run(
    mut characters: Query<(
        &WallRunner,
        &mut WallRunState,
        &SensorSnapshot,
        &mut AccumulatedInput,
        &mut LinearVelocity,
        &mut GravityScale,
    )>,
    time: Res<Time>,
) {
    let dt = time.delta_secs();
    for (cfg, mut state, snapshot, mut input, mut velocity, mut gravity) in &mut characters {
        let next = state.next(snapshot.can_wall_run());
        let stopped = *state == WallRunState::WallRunning && next == WallRunState::Idle;
        *state = next;

        match *state {
            WallRunState::Idle => {
                if stopped {
                    // Restored unconditionally, whatever the configured
                    // wall-run gravity was.
                    gravity.0 = 1.0;
                }
            }
            WallRunState::WallRunning => {
                gravity.0 = if cfg.use_gravity { 1.0 } else { 0.0 };
                velocity.0 += Vec3::NEG_Y * cfg.custom_gravity * dt;

                if input.wall_jumped
                    && let Some(normal) = snapshot.wall_normal()
                {
                    input.wall_jumped = false;
                    velocity.0.y = 0.0;
                    velocity.0 += wall_jump_impulse(cfg, normal);
                }
            }
        }
    }
}

/// Impulse along `up + wall_normal`, scaled by `wall_run_jump_force * 100`.
pub(crate) fn wall_jump_impulse(cfg: &WallRunner, wall_normal: Vec3) -> Vec3 {
    (Vec3::Y + wall_normal) * cfg.wall_run_jump_force * 100.0
}
