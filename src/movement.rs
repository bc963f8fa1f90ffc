//! Ground, slope, and air locomotion.
//!
//! The fixed-rate half of the controller: reads the latest
//! [`SensorSnapshot`] and the accumulated input, applies counter-sliding
//! friction and exactly one movement force regime per tick, consumes any
//! queued jump, and hard-clamps the resulting horizontal speed.

use bevy_ecs::{intern::Interned, schedule::ScheduleLabel};
use core::f32::consts::{FRAC_PI_2, PI, TAU};
use tracing::warn;

use crate::{input::AccumulatedInput, orientation, prelude::*, sensors};

/// Residual velocity below this magnitude is left alone by counter-movement.
const COUNTER_THRESHOLD: f32 = 0.01;
/// Input below this magnitude counts as not pushing on an axis.
const INPUT_DEADZONE: f32 = 0.05;

pub(super) fn plugin(schedule: Interned<dyn ScheduleLabel>) -> impl Fn(&mut App) {
    move |app: &mut App| {
        app.add_systems(
            RunFixedMainLoop,
            (control_speed, queue_jump)
                .chain()
                .after(sensors::sense)
                .in_set(FreerunSystems::Sense),
        )
        .add_systems(
            schedule,
            move_characters.in_set(FreerunSystems::MoveCharacters),
        );
    }
}

/// Reselects the speed cap at frame rate. Airborne characters keep
/// whatever cap they last had on the ground; there is deliberately no air
/// cap of its own.
fn control_speed(
    mut characters: Query<(
        &CharacterController,
        &mut CharacterControllerState,
        &AccumulatedInput,
        &SensorSnapshot,
    )>,
) {
    for (cfg, mut state, input, snapshot) in &mut characters {
        state.max_speed =
            select_max_speed(cfg, snapshot.grounded, input.sprinting, state.max_speed);
    }
}

fn select_max_speed(
    cfg: &CharacterController,
    grounded: bool,
    sprinting: bool,
    current: f32,
) -> f32 {
    if grounded && sprinting {
        cfg.sprint_max_speed
    } else if grounded {
        cfg.walk_max_speed
    } else {
        current
    }
}

/// Jump-edge handling at frame rate. The grounded flag consumed here is
/// the frame-rate reading; by the time the fixed tick applies the impulse,
/// contact may have been lost. [`CharacterController::revalidate_jump_grounding`]
/// opts into re-checking at that point.
fn queue_jump(
    mut characters: Query<(
        &mut AccumulatedInput,
        &SensorSnapshot,
        &mut CharacterControllerState,
    )>,
) {
    for (mut input, snapshot, mut state) in &mut characters {
        if input.jumped && snapshot.grounded {
            input.jumped = false;
            state.jump_queued = true;
        }
    }
}

fn move_characters(
    mut characters: Query<(
        &CharacterController,
        &mut CharacterControllerState,
        &AccumulatedInput,
        &SensorSnapshot,
        &Transform,
        &mut LinearVelocity,
        Option<&LookOrientation>,
    )>,
    orientations: Query<&Transform, Without<CharacterController>>,
    time: Res<Time>,
) {
    let dt = time.delta_secs();
    for (cfg, mut state, input, snapshot, transform, mut velocity, look) in &mut characters {
        let orientation = look
            .and_then(|e| orientations.get(e.get()).copied().ok())
            .unwrap_or(*transform);

        let mut input_axes = input.movement();
        let (forward, right) = orientation::flat_basis(&orientation);
        let relative = velocity_relative_to_look(orientation::yaw(&orientation), velocity.0);

        // Counteract sliding and sloppy movement.
        if snapshot.grounded {
            if counter_axis(relative.x, input_axes.x) {
                velocity.0 += right * counter_force(cfg, relative.x, dt) * dt;
            }
            if counter_axis(relative.y, input_axes.y) {
                velocity.0 += forward * counter_force(cfg, relative.y, dt) * dt;
            }
        }

        // Cancel input that would accelerate an already saturated axis.
        input_axes.x = cancel_overspeed(input_axes.x, relative.x, state.max_speed);
        input_axes.y = cancel_overspeed(input_axes.y, relative.y, state.max_speed);

        let move_direction = forward * input_axes.y + right * input_axes.x;
        let regime = MotionRegime::select(snapshot);
        velocity.0 += regime.force(cfg, move_direction) * dt;

        if state.jump_queued {
            state.jump_queued = false;
            if !cfg.revalidate_jump_grounding || snapshot.grounded {
                consume_jump(&mut velocity.0, cfg.jump_force);
            }
        }

        clamp_horizontal(&mut velocity.0, state.max_speed);
        validate_velocity(&mut velocity.0);
    }
}

/// The mutually exclusive choice of how the movement force is computed
/// this tick. Slope contact wins over plain ground contact; anything else
/// is air.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionRegime {
    Slope(Vec3),
    Ground,
    Air,
}

impl MotionRegime {
    pub fn select(snapshot: &SensorSnapshot) -> Self {
        if let Some(normal) = snapshot.slope_normal {
            Self::Slope(normal)
        } else if snapshot.grounded {
            Self::Ground
        } else {
            Self::Air
        }
    }

    /// Continuous movement force for this regime. On a slope, the desired
    /// direction is projected onto the slope plane so motion stays tangent
    /// to the incline.
    pub fn force(self, cfg: &CharacterController, move_direction: Vec3) -> Vec3 {
        let magnitude = cfg.move_speed * cfg.move_multiplier;
        match self {
            Self::Slope(normal) => {
                project_onto_plane(move_direction, normal).normalize_or_zero() * magnitude
            }
            Self::Ground => move_direction.normalize_or_zero() * magnitude,
            Self::Air => move_direction.normalize_or_zero() * magnitude * cfg.air_multiplier,
        }
    }
}

/// Decompose flat velocity into look-relative `(strafe, forward)`
/// magnitudes via the angle between velocity heading and look heading:
/// `forward = |v|·cos(Δ)`, `strafe = |v|·cos(90° − Δ)`.
pub(crate) fn velocity_relative_to_look(look_yaw: f32, velocity: Vec3) -> Vec2 {
    let flat = Vec3::new(velocity.x, 0.0, velocity.z);
    let magnitude = flat.length();
    if magnitude == 0.0 {
        return Vec2::ZERO;
    }
    // Heading convention: yaw 0 faces -Z, positive yaw turns left.
    let move_yaw = f32::atan2(-velocity.x, -velocity.z);
    let delta = delta_angle(look_yaw, move_yaw);
    Vec2::new(
        magnitude * (FRAC_PI_2 + delta).cos(),
        magnitude * delta.cos(),
    )
}

/// Shortest signed angle from `from` to `to`, in `[-π, π]`.
fn delta_angle(from: f32, to: f32) -> f32 {
    (to - from + PI).rem_euclid(TAU) - PI
}

/// Per-axis predicate for counter-movement: true when the axis is coasting
/// with no input behind it, or when velocity and input point in opposite
/// directions.
pub(crate) fn counter_axis(velocity_mag: f32, input: f32) -> bool {
    (velocity_mag.abs() > COUNTER_THRESHOLD && input.abs() < INPUT_DEADZONE)
        || (velocity_mag < -COUNTER_THRESHOLD && input > 0.0)
        || (velocity_mag > COUNTER_THRESHOLD && input < 0.0)
}

/// Proportional braking force opposing a residual velocity component. A
/// brake, not a hard stop: the magnitude scales linearly with the residual
/// velocity and the counter-movement coefficient.
pub(crate) fn counter_force(cfg: &CharacterController, velocity_mag: f32, dt: f32) -> f32 {
    cfg.move_speed * dt * cfg.counter_movement * -velocity_mag
}

/// Zero an input axis that is pushing into an already saturated direction.
/// Does not reduce existing velocity, only withholds further acceleration.
pub(crate) fn cancel_overspeed(input: f32, velocity_mag: f32, max_speed: f32) -> f32 {
    if (input > 0.0 && velocity_mag > max_speed) || (input < 0.0 && velocity_mag < -max_speed) {
        0.0
    } else {
        input
    }
}

/// Remove the component of `direction` along `normal`.
pub(crate) fn project_onto_plane(direction: Vec3, normal: Vec3) -> Vec3 {
    direction - normal * direction.dot(normal)
}

/// Zero the vertical velocity, then apply the upward jump impulse.
pub(crate) fn consume_jump(velocity: &mut Vec3, jump_force: f32) {
    velocity.y = 0.0;
    *velocity += Vec3::Y * jump_force;
}

/// Rescale flat velocity to exactly `max_speed` when it exceeds it. The
/// vertical component is never touched.
pub(crate) fn clamp_horizontal(velocity: &mut Vec3, max_speed: f32) {
    let flat = Vec3::new(velocity.x, 0.0, velocity.z);
    if flat.length() > max_speed {
        let flat = flat.normalize() * max_speed;
        velocity.x = flat.x;
        velocity.z = flat.z;
    }
}

fn validate_velocity(velocity: &mut Vec3) {
    for i in 0..3 {
        if !velocity[i].is_finite() {
            warn!("velocity[{i}] is not finite: {}, setting to 0", velocity[i]);
            velocity[i] = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn cfg() -> CharacterController {
        CharacterController::default()
    }

    #[test]
    fn forward_velocity_decomposes_to_forward() {
        // Yaw 0 faces -Z.
        let relative = velocity_relative_to_look(0.0, Vec3::new(0.0, 0.0, -8.0));
        assert!((relative.y - 8.0).abs() < EPS);
        assert!(relative.x.abs() < EPS);
    }

    #[test]
    fn rightward_velocity_decomposes_to_strafe() {
        let relative = velocity_relative_to_look(0.0, Vec3::new(8.0, 0.0, 0.0));
        assert!((relative.x - 8.0).abs() < EPS);
        assert!(relative.y.abs() < EPS);

        let relative = velocity_relative_to_look(0.0, Vec3::new(-8.0, 0.0, 0.0));
        assert!((relative.x + 8.0).abs() < EPS);
    }

    #[test]
    fn backward_velocity_is_negative_forward() {
        let relative = velocity_relative_to_look(0.0, Vec3::new(0.0, 0.0, 5.0));
        assert!((relative.y + 5.0).abs() < EPS);
        assert!(relative.x.abs() < EPS);
    }

    #[test]
    fn decomposition_follows_the_look_yaw() {
        // Looking along +X (yaw -90°), velocity along +X is pure forward.
        let relative = velocity_relative_to_look(-FRAC_PI_2, Vec3::new(6.0, 0.0, 0.0));
        assert!((relative.y - 6.0).abs() < EPS);
        assert!(relative.x.abs() < EPS);
    }

    #[test]
    fn vertical_velocity_does_not_leak_into_the_decomposition() {
        let relative = velocity_relative_to_look(0.0, Vec3::new(0.0, 9.0, -3.0));
        assert!((relative.y - 3.0).abs() < EPS);
        assert!(relative.x.abs() < EPS);
    }

    #[test]
    fn coasting_axis_is_braked() {
        assert!(counter_axis(4.0, 0.0));
        assert!(counter_axis(-4.0, 0.0));
        // Input in the deadzone still counts as no input.
        assert!(counter_axis(4.0, 0.04));
    }

    #[test]
    fn driven_axis_is_not_braked() {
        assert!(!counter_axis(4.0, 1.0));
        assert!(!counter_axis(-4.0, -1.0));
        // Below the velocity threshold, nothing to brake.
        assert!(!counter_axis(0.005, 0.0));
    }

    #[test]
    fn opposing_input_is_braked() {
        assert!(counter_axis(4.0, -1.0));
        assert!(counter_axis(-4.0, 1.0));
    }

    #[test]
    fn counter_force_opposes_velocity_and_scales_linearly() {
        let cfg = cfg();
        let dt = 1.0 / 60.0;
        let force = counter_force(&cfg, 4.0, dt);
        assert!(force < 0.0);
        assert!((counter_force(&cfg, 8.0, dt) - 2.0 * force).abs() < EPS);

        let mut doubled = cfg.clone();
        doubled.counter_movement *= 2.0;
        assert!((counter_force(&doubled, 4.0, dt) - 2.0 * force).abs() < EPS);
    }

    #[test]
    fn saturated_axis_cancels_input() {
        assert_eq!(cancel_overspeed(1.0, 13.0, 12.0), 0.0);
        assert_eq!(cancel_overspeed(-1.0, -13.0, 12.0), 0.0);
    }

    #[test]
    fn unsaturated_or_opposing_input_passes_through() {
        assert_eq!(cancel_overspeed(1.0, 5.0, 12.0), 1.0);
        // Pushing against the saturated direction is allowed.
        assert_eq!(cancel_overspeed(1.0, -13.0, 12.0), 1.0);
        assert_eq!(cancel_overspeed(-1.0, 13.0, 12.0), -1.0);
    }

    #[test]
    fn slope_wins_regime_selection() {
        let normal = Vec3::new(0.3, 1.0, 0.0).normalize();
        let snapshot = SensorSnapshot {
            grounded: true,
            slope_normal: Some(normal),
            ..default()
        };
        assert_eq!(MotionRegime::select(&snapshot), MotionRegime::Slope(normal));

        let snapshot = SensorSnapshot {
            grounded: true,
            ..default()
        };
        assert_eq!(MotionRegime::select(&snapshot), MotionRegime::Ground);
        assert_eq!(
            MotionRegime::select(&SensorSnapshot::default()),
            MotionRegime::Air
        );
    }

    #[test]
    fn slope_force_is_tangent_to_the_incline() {
        let cfg = cfg();
        let normal = Vec3::new(0.4, 1.0, 0.0).normalize();
        let force = MotionRegime::Slope(normal).force(&cfg, Vec3::NEG_Z);
        assert!(force.dot(normal).abs() < EPS);
        assert!(force.length() > 0.0);
    }

    #[test]
    fn air_force_is_reduced_by_the_air_multiplier() {
        let cfg = cfg();
        let ground = MotionRegime::Ground.force(&cfg, Vec3::NEG_Z).length();
        let air = MotionRegime::Air.force(&cfg, Vec3::NEG_Z).length();
        assert!((air - ground * cfg.air_multiplier).abs() < EPS);
    }

    #[test]
    fn zero_input_degrades_to_zero_force_in_every_regime() {
        let cfg = cfg();
        let normal = Vec3::new(0.4, 1.0, 0.0).normalize();
        for regime in [MotionRegime::Slope(normal), MotionRegime::Ground, MotionRegime::Air] {
            assert_eq!(regime.force(&cfg, Vec3::ZERO), Vec3::ZERO);
        }
    }

    #[test]
    fn projection_removes_the_normal_component() {
        let normal = Vec3::new(0.3, 0.9, 0.1).normalize();
        let projected = project_onto_plane(Vec3::new(1.0, 0.0, 1.0), normal);
        assert!(projected.dot(normal).abs() < EPS);
    }

    #[test]
    fn jump_replaces_vertical_velocity_only() {
        let mut velocity = Vec3::new(3.0, -6.0, 1.0);
        consume_jump(&mut velocity, 11.0);
        assert!((velocity.y - 11.0).abs() < EPS);
        assert!((velocity.x - 3.0).abs() < EPS);
        assert!((velocity.z - 1.0).abs() < EPS);
    }

    #[test]
    fn clamp_rescales_horizontal_and_leaves_vertical() {
        let mut velocity = Vec3::new(30.0, -7.0, 40.0);
        clamp_horizontal(&mut velocity, 10.0);
        let flat = Vec3::new(velocity.x, 0.0, velocity.z);
        assert!((flat.length() - 10.0).abs() < EPS);
        assert_eq!(velocity.y, -7.0);
        // Direction is preserved.
        assert!((velocity.x / velocity.z - 0.75).abs() < EPS);
    }

    #[test]
    fn clamp_leaves_slow_velocity_alone() {
        let mut velocity = Vec3::new(3.0, 2.0, 4.0);
        clamp_horizontal(&mut velocity, 10.0);
        assert_eq!(velocity, Vec3::new(3.0, 2.0, 4.0));
    }

    #[test]
    fn speed_cap_follows_sprint_on_the_ground() {
        let cfg = cfg();
        assert_eq!(
            select_max_speed(&cfg, true, true, cfg.walk_max_speed),
            cfg.sprint_max_speed
        );
        assert_eq!(
            select_max_speed(&cfg, true, false, cfg.sprint_max_speed),
            cfg.walk_max_speed
        );
    }

    #[test]
    fn speed_cap_is_retained_while_airborne() {
        let cfg = cfg();
        assert_eq!(
            select_max_speed(&cfg, false, false, cfg.sprint_max_speed),
            cfg.sprint_max_speed
        );
        assert_eq!(
            select_max_speed(&cfg, false, true, cfg.walk_max_speed),
            cfg.walk_max_speed
        );
    }
}
