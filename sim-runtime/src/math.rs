// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Spatial math shared by entities and the physics layer
//!
//! Everything is double precision. Rotations are unit quaternions; euler
//! accessors use XYZ order to match the snapshot format.

pub use glam::{DMat3, DQuat, DVec3, EulerRot};

/// Local transform owned by every entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Translation
    pub position: DVec3,
    /// Orientation
    pub rotation: DQuat,
    /// Per-axis scale
    pub scale: DVec3,
}

impl Transform {
    /// Identity transform
    pub const IDENTITY: Transform = Transform {
        position: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
        scale: DVec3::ONE,
    };

    /// Create a transform at the given position
    pub fn from_position(position: DVec3) -> Self {
        Transform {
            position,
            ..Self::IDENTITY
        }
    }

    /// Set the rotation
    pub fn with_rotation(mut self, rotation: DQuat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set the scale
    pub fn with_scale(mut self, scale: DVec3) -> Self {
        self.scale = scale;
        self
    }

    /// Rotation as XYZ euler angles in radians
    pub fn euler(&self) -> DVec3 {
        let (x, y, z) = self.rotation.to_euler(EulerRot::XYZ);
        DVec3::new(x, y, z)
    }

    /// Replace the rotation from XYZ euler angles in radians
    pub fn set_euler(&mut self, angles: DVec3) {
        self.rotation = DQuat::from_euler(EulerRot::XYZ, angles.x, angles.y, angles.z);
    }

    /// Move by `offset`
    pub fn translate(&mut self, offset: DVec3) {
        self.position += offset;
    }

    /// Map a point from local space into the parent space
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.position + self.rotation * (self.scale * point)
    }

    /// Rigid part of this transform
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }

    /// Copy position and rotation from a pose, keeping scale
    pub fn set_pose(&mut self, pose: Pose) {
        self.position = pose.position;
        self.rotation = pose.rotation;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Rigid placement of a body: position and orientation, no scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// World position
    pub position: DVec3,
    /// World orientation
    pub rotation: DQuat,
}

impl Pose {
    /// Identity pose
    pub const IDENTITY: Pose = Pose {
        position: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
    };

    /// Create a pose
    pub fn new(position: DVec3, rotation: DQuat) -> Self {
        Pose { position, rotation }
    }

    /// Map a body-local point to world space
    pub fn transform_point(&self, local: DVec3) -> DVec3 {
        self.position + self.rotation * local
    }

    /// Rotate a body-local direction into world space
    pub fn transform_vector(&self, local: DVec3) -> DVec3 {
        self.rotation * local
    }

    /// Map a world point into body-local space
    pub fn inverse_transform_point(&self, world: DVec3) -> DVec3 {
        self.rotation.inverse() * (world - self.position)
    }

    /// Compose `self * other` (apply `other` in this pose's frame)
    pub fn mul_pose(&self, other: &Pose) -> Pose {
        Pose {
            position: self.transform_point(other.position),
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Convert a vector to a plain array
pub(crate) fn to_array(v: DVec3) -> [f64; 3] {
    [v.x, v.y, v.z]
}

/// Convert a plain array to a vector
pub(crate) fn from_array(a: [f64; 3]) -> DVec3 {
    DVec3::new(a[0], a[1], a[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_euler_round_trip() {
        let mut t = Transform::default();
        t.set_euler(DVec3::new(0.1, -0.4, 0.7));
        let e = t.euler();
        assert_abs_diff_eq!(e.x, 0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(e.y, -0.4, epsilon = 1e-9);
        assert_abs_diff_eq!(e.z, 0.7, epsilon = 1e-9);
    }

    #[test]
    fn test_pose_round_trip_point() {
        let pose = Pose::new(DVec3::new(1.0, 2.0, 3.0), DQuat::from_rotation_y(FRAC_PI_2));
        let local = DVec3::new(0.5, -1.0, 2.0);
        let back = pose.inverse_transform_point(pose.transform_point(local));
        assert_abs_diff_eq!(back.x, local.x, epsilon = 1e-12);
        assert_abs_diff_eq!(back.y, local.y, epsilon = 1e-12);
        assert_abs_diff_eq!(back.z, local.z, epsilon = 1e-12);
    }

    #[test]
    fn test_transform_point_applies_scale() {
        let t = Transform::from_position(DVec3::X).with_scale(DVec3::splat(2.0));
        assert_eq!(t.transform_point(DVec3::Y), DVec3::new(1.0, 2.0, 0.0));
    }
}
