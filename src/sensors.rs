//! Frame-rate environment sensing.
//!
//! Every frame, each character's surroundings are probed and the results
//! written into an immutable [`SensorSnapshot`]. The fixed-rate systems
//! only ever read the latest snapshot, so a reading may be up to one frame
//! old by the time forces are applied. Probing the same unchanged
//! environment twice yields identical snapshots; there is no hysteresis or
//! debouncing, and flicker at contact boundaries is accepted behavior.

use crate::{orientation, prelude::*, wall_run::WallRunner};

pub(super) fn plugin(app: &mut App) {
    app.add_systems(RunFixedMainLoop, sense.in_set(FreerunSystems::Sense));
}

/// Per-frame sensor readings for one character. Read-only to the fixed
/// phase.
#[derive(Component, Clone, Copy, Reflect, Default, Debug)]
#[reflect(Component)]
pub struct SensorSnapshot {
    /// The contact probe currently overlaps a ground collider.
    pub grounded: bool,
    /// Normal of the surface below, when it deviates from world up.
    pub slope_normal: Option<Vec3>,
    /// Normal of a wall within reach on the left.
    pub wall_left: Option<Vec3>,
    /// Normal of a wall within reach on the right.
    pub wall_right: Option<Vec3>,
    /// No ground within the wall-runner's minimum jump height.
    pub clear_below: bool,
}

impl SensorSnapshot {
    /// Wall-run gate: enough clearance below, and at least one wall in
    /// reach.
    pub fn can_wall_run(&self) -> bool {
        self.clear_below && (self.wall_left.is_some() || self.wall_right.is_some())
    }

    /// Normal used for a wall jump. The left wall wins when both are in
    /// reach.
    pub fn wall_normal(&self) -> Option<Vec3> {
        self.wall_left.or(self.wall_right)
    }
}

pub(crate) fn sense(
    mut characters: Query<(
        &CharacterController,
        Option<&WallRunner>,
        &mut SensorSnapshot,
        &Transform,
        Option<&LookOrientation>,
    )>,
    orientations: Query<&Transform, Without<CharacterController>>,
    spatial: SpatialQuery,
) {
    for (cfg, wall_runner, mut snapshot, transform, look) in &mut characters {
        let orientation = look
            .and_then(|e| orientations.get(e.get()).copied().ok())
            .unwrap_or(*transform);

        let grounded = ground_contact(&spatial, cfg, transform.translation);
        let slope_normal = slope_probe(&spatial, cfg, transform.translation);

        let (wall_left, wall_right, clear_below) = match wall_runner {
            Some(runner) => wall_probe(&spatial, runner, transform.translation, &orientation),
            None => (None, None, false),
        };

        *snapshot = SensorSnapshot {
            grounded,
            slope_normal,
            wall_left,
            wall_right,
            clear_below,
        };
    }
}

/// Sphere-overlap test at the contact probe. Boolean only; the first hit
/// short-circuits the query.
fn ground_contact(
    spatial: &SpatialQuery,
    cfg: &CharacterController,
    translation: Vec3,
) -> bool {
    let probe = Collider::sphere(cfg.ground_probe_radius);
    let mut contact = false;
    spatial.shape_intersections_callback(
        &probe,
        translation + cfg.ground_probe_offset,
        Quat::IDENTITY,
        &cfg.ground_filter,
        |_| {
            contact = true;
            false
        },
    );
    contact
}

/// Ray down from the body center, `half_height + 0.5` long. Returns the
/// surface normal only when it marks an incline.
fn slope_probe(
    spatial: &SpatialQuery,
    cfg: &CharacterController,
    translation: Vec3,
) -> Option<Vec3> {
    let hit = spatial.cast_ray(
        translation,
        Dir3::NEG_Y,
        cfg.half_height + 0.5,
        true,
        &cfg.slope_filter,
    )?;
    is_slope(hit.normal).then_some(hit.normal)
}

/// Left/right wall rays plus the airborne gate probe.
fn wall_probe(
    spatial: &SpatialQuery,
    runner: &WallRunner,
    translation: Vec3,
    orientation: &Transform,
) -> (Option<Vec3>, Option<Vec3>, bool) {
    let (_, right) = orientation::flat_basis(orientation);

    let cast_wall = |direction: Vec3| {
        let direction = Dir3::new(direction).ok()?;
        let hit = spatial.cast_ray(
            translation,
            direction,
            runner.wall_distance,
            true,
            &runner.wall_filter,
        )?;
        Some(hit.normal)
    };

    let wall_left = cast_wall(-right);
    let wall_right = cast_wall(right);

    let clear_below = spatial
        .cast_ray(
            translation,
            Dir3::NEG_Y,
            runner.min_jump_height,
            true,
            &runner.ground_filter,
        )
        .is_none();

    (wall_left, wall_right, clear_below)
}

/// A surface counts as a slope when its normal deviates from world up.
pub(crate) fn is_slope(normal: Vec3) -> bool {
    normal.distance_squared(Vec3::Y) > 1e-6
}
