#![doc = include_str!("../readme.md")]

/// Everything you need to get started with `bevy_freerun`
pub mod prelude {
    pub(crate) use {
        avian3d::prelude::*,
        bevy_app::prelude::*,
        bevy_derive::{Deref, DerefMut},
        bevy_ecs::prelude::*,
        bevy_enhanced_input::prelude::*,
        bevy_math::prelude::*,
        bevy_reflect::prelude::*,
        bevy_time::prelude::*,
        bevy_transform::prelude::*,
        bevy_utils::prelude::*,
    };

    pub use crate::{
        CharacterController, CharacterControllerState, FreerunPlugin, FreerunSystems,
        input::{Jump, Movement, Sprint, WallJump},
        orientation::{LookOrientation, LookOrientationOf},
        sensors::SensorSnapshot,
        wall_run::{WallRunState, WallRunner},
    };
}

use crate::{input::AccumulatedInput, prelude::*};
use bevy_ecs::{
    intern::Interned, lifecycle::HookContext, relationship::RelationshipSourceCollection as _,
    schedule::ScheduleLabel, world::DeferredWorld,
};

mod fixed_update_utils;
pub mod input;
mod movement;
pub mod orientation;
pub mod sensors;
pub mod wall_run;

pub use movement::MotionRegime;

/// Also requires you to add [`PhysicsPlugins`] and [`EnhancedInputPlugin`] to work properly.
pub struct FreerunPlugin {
    schedule: Interned<dyn ScheduleLabel>,
}

impl FreerunPlugin {
    /// Create a new plugin whose fixed-rate systems run in the given
    /// schedule. The default is [`FixedPostUpdate`].
    pub fn new(schedule: impl ScheduleLabel) -> Self {
        Self {
            schedule: schedule.intern(),
        }
    }
}

impl Default for FreerunPlugin {
    fn default() -> Self {
        Self {
            schedule: FixedPostUpdate.intern(),
        }
    }
}

impl Plugin for FreerunPlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            self.schedule,
            (FreerunSystems::MoveCharacters, FreerunSystems::WallRun)
                .chain()
                .in_set(PhysicsSystems::First),
        )
        .configure_sets(
            RunFixedMainLoop,
            FreerunSystems::Sense.in_set(RunFixedMainLoopSystems::BeforeFixedMainLoop),
        )
        .add_plugins((
            input::plugin,
            sensors::plugin,
            movement::plugin(self.schedule),
            wall_run::plugin(self.schedule),
            fixed_update_utils::plugin,
        ));
    }
}

/// System sets used by all systems of `bevy_freerun`.
///
/// [`Self::Sense`] runs at frame rate and produces the per-character
/// [`SensorSnapshot`] plus the frame-sampled decisions (speed cap
/// selection, jump queueing). [`Self::MoveCharacters`] and
/// [`Self::WallRun`] run on the fixed timestep and consume the latest
/// snapshot, which may be up to one frame old by then. That staleness
/// window is part of the contract, not an accident of scheduling.
#[derive(SystemSet, Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum FreerunSystems {
    Sense,
    MoveCharacters,
    WallRun,
}

/// Movement configuration for one character. Immutable at runtime.
///
/// The character is a dynamic rigid body with locked rotation; all
/// locomotion is expressed as velocity changes on its [`LinearVelocity`],
/// and Avian does the collision resolution and integration.
#[derive(Component, Clone, Reflect, Debug)]
#[reflect(Component)]
#[require(
    AccumulatedInput,
    CharacterControllerState,
    SensorSnapshot,
    TranslationInterpolation,
    RigidBody = RigidBody::Dynamic,
    Collider = Collider::capsule(0.4, 1.0),
    LockedAxes = LockedAxes::ROTATION_LOCKED,
    LinearVelocity,
    Transform,
)]
#[component(on_add = CharacterController::on_add)]
pub struct CharacterController {
    /// Base locomotion speed. Also scales counter-movement braking.
    pub move_speed: f32,
    /// Multiplier on `move_speed` for the continuous movement force.
    pub move_multiplier: f32,
    /// Fraction of ground control retained while airborne.
    pub air_multiplier: f32,
    /// Counter-sliding friction coefficient.
    pub counter_movement: f32,
    /// Upward impulse applied on jump.
    pub jump_force: f32,
    /// Horizontal speed cap while grounded and walking.
    pub walk_max_speed: f32,
    /// Horizontal speed cap while grounded and sprinting.
    pub sprint_max_speed: f32,
    /// Half the character's height. The slope probe reaches
    /// `half_height + 0.5` below the body center.
    pub half_height: f32,
    /// Position of the ground contact probe relative to the body center,
    /// usually at the feet.
    pub ground_probe_offset: Vec3,
    /// Radius of the ground contact probe.
    pub ground_probe_radius: f32,
    /// Colliders that count as ground for the contact probe.
    pub ground_filter: SpatialQueryFilter,
    /// Colliders the slope probe may hit.
    pub slope_filter: SpatialQueryFilter,
    /// Re-check ground contact on the fixed tick before consuming a queued
    /// jump. Off by default: a jump queued on a frame where the character
    /// was grounded fires even if contact has been lost since.
    pub revalidate_jump_grounding: bool,
}

impl Default for CharacterController {
    fn default() -> Self {
        Self {
            move_speed: 30.0,
            move_multiplier: 10.0,
            air_multiplier: 0.4,
            counter_movement: 0.175,
            jump_force: 11.0,
            walk_max_speed: 12.0,
            sprint_max_speed: 20.0,
            half_height: 0.9,
            ground_probe_offset: Vec3::new(0.0, -0.9, 0.0),
            ground_probe_radius: 0.3,
            ground_filter: SpatialQueryFilter::default(),
            slope_filter: SpatialQueryFilter::default(),
            revalidate_jump_grounding: false,
        }
    }
}

impl CharacterController {
    fn on_add(mut world: DeferredWorld, ctx: HookContext) {
        let Some(mut cfg) = world.get_mut::<Self>(ctx.entity) else {
            return;
        };
        cfg.ground_filter.excluded_entities.add(ctx.entity);
        cfg.slope_filter.excluded_entities.add(ctx.entity);
    }
}

/// Mutable per-character movement state.
#[derive(Component, Clone, Reflect, Debug)]
#[reflect(Component)]
pub struct CharacterControllerState {
    /// Current horizontal speed cap. Reselected every frame while grounded
    /// (walk vs sprint); keeps its last grounded value while airborne.
    pub max_speed: f32,
    /// A jump waiting to be consumed by the next fixed tick.
    pub jump_queued: bool,
}

impl Default for CharacterControllerState {
    fn default() -> Self {
        Self {
            max_speed: CharacterController::default().walk_max_speed,
            jump_queued: false,
        }
    }
}
