//! The look-orientation collaborator.
//!
//! Movement is relative to where the player is looking, which is usually
//! driven by a camera this crate does not control. The relationship below
//! wires an external orientation entity to a character; without one, the
//! character's own [`Transform`] is used.

use crate::prelude::*;

/// Insert on the entity whose transform defines where the character is
/// looking (usually the camera), pointing at the character entity.
#[derive(Component, Clone, Copy)]
#[relationship(relationship_target = LookOrientation)]
pub struct LookOrientationOf(pub Entity);

/// Automatically managed counterpart of [`LookOrientationOf`] on the
/// character.
#[derive(Component, Clone, Copy)]
#[relationship_target(relationship = LookOrientationOf)]
pub struct LookOrientation(Entity);

impl LookOrientation {
    pub fn get(self) -> Entity {
        self.0
    }
}

/// Yaw-only basis of an orientation: flat forward and right unit vectors.
pub(crate) fn flat_basis(orientation: &Transform) -> (Vec3, Vec3) {
    let mut forward = Vec3::from(orientation.forward());
    forward.y = 0.0;
    forward = forward.normalize_or_zero();
    let mut right = Vec3::from(orientation.right());
    right.y = 0.0;
    right = right.normalize_or_zero();
    (forward, right)
}

/// Look heading around the world up axis, in radians.
pub(crate) fn yaw(orientation: &Transform) -> f32 {
    orientation.rotation.to_euler(EulerRot::YXZ).0
}
