//! Rigid-body math shared between peers.
//!
//! These are the canonical representations used when a grab is captured on one
//! peer and replayed on another. Only rotation and translation are modelled;
//! the physics collaborator owns scale.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 3D Vector - position, direction
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Unit X vector
    pub const X: Self = Self::new(1.0, 0.0, 0.0);

    /// Unit Y vector
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);

    /// Unit Z vector
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Creates from array
    #[must_use]
    pub const fn from_array(arr: [f32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product
    #[must_use]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Length squared (avoids sqrt)
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Distance to another point
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl std::ops::Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Quaternion for rotations
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quaternion {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W component
    pub w: f32,
}

impl Quaternion {
    /// Creates a new quaternion
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Rotation of `angle` radians around `axis`.
    #[must_use]
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let len = axis.length();
        if len <= f32::EPSILON {
            return Self::IDENTITY;
        }
        let (sin, cos) = (angle * 0.5).sin_cos();
        let axis = axis * (sin / len);
        Self::new(axis.x, axis.y, axis.z, cos)
    }

    /// Squared norm.
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    /// Returns the unit quaternion pointing the same way, or identity for a
    /// degenerate input.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length_squared().sqrt();
        if len <= f32::EPSILON || !len.is_finite() {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    /// Conjugate. Equal to the inverse for unit quaternions.
    #[must_use]
    pub const fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Multiplicative inverse.
    #[must_use]
    pub fn inverse(self) -> Self {
        let len_sq = self.length_squared();
        if len_sq <= f32::EPSILON {
            return Self::IDENTITY;
        }
        let c = self.conjugate();
        Self::new(c.x / len_sq, c.y / len_sq, c.z / len_sq, c.w / len_sq)
    }

    /// Rotates a vector.
    #[must_use]
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let u = Vec3::new(self.x, self.y, self.z);
        let t = u.cross(v) * 2.0;
        v + t * self.w + u.cross(t)
    }

    /// Packs a rotation into three components.
    ///
    /// The quaternion is normalized and flipped into the `w >= 0` hemisphere
    /// so [`Quaternion::expand`] can rebuild `w` from the other three.
    #[must_use]
    pub fn compress(self) -> [f32; 3] {
        let q = self.normalize();
        if q.w < 0.0 {
            [-q.x, -q.y, -q.z]
        } else {
            [q.x, q.y, q.z]
        }
    }

    /// Rebuilds a unit quaternion packed by [`Quaternion::compress`].
    #[must_use]
    pub fn expand(xyz: [f32; 3]) -> Self {
        let [x, y, z] = xyz;
        let w = (1.0 - (x * x + y * y + z * z)).max(0.0).sqrt();
        Self::new(x, y, z, w).normalize()
    }

    /// Returns true if both quaternions describe the same rotation within `epsilon`.
    #[must_use]
    pub fn same_rotation(self, other: Self, epsilon: f32) -> bool {
        let a = self.normalize();
        let b = other.normalize();
        let dot = a.x * b.x + a.y * b.y + a.z * b.z + a.w * b.w;
        (1.0 - dot.abs()) <= epsilon
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl std::ops::Mul for Quaternion {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }
}

/// Transform - position + rotation
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Transform {
    /// Position
    pub position: Vec3,
    /// Rotation
    pub rotation: Quaternion,
}

impl Transform {
    /// Creates a new transform
    #[must_use]
    pub const fn new(position: Vec3, rotation: Quaternion) -> Self {
        Self { position, rotation }
    }

    /// Identity transform
    pub const IDENTITY: Self = Self::new(Vec3::ZERO, Quaternion::IDENTITY);

    /// Maps a point from this frame's local space into world space.
    #[must_use]
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation.rotate(local)
    }

    /// Maps a world-space point into this frame's local space.
    #[must_use]
    pub fn inverse_transform_point(&self, world: Vec3) -> Vec3 {
        self.rotation.inverse().rotate(world - self.position)
    }

    /// Maps a local rotation into world space.
    #[must_use]
    pub fn transform_rotation(&self, local: Quaternion) -> Quaternion {
        (self.rotation * local).normalize()
    }

    /// Maps a world rotation into this frame's local space.
    #[must_use]
    pub fn inverse_transform_rotation(&self, world: Quaternion) -> Quaternion {
        (self.rotation.inverse() * world).normalize()
    }

    /// Returns true if both transforms match within `epsilon`.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.position.distance(other.position) <= epsilon
            && self.rotation.same_rotation(other.rotation, epsilon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EPS: f32 = 1e-4;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);

        let sum = a + b;
        assert_eq!(sum, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(a.dot(b), 32.0);
        assert_eq!(Vec3::X.cross(Vec3::Y), Vec3::Z);
    }

    #[test]
    fn test_vec3_bytemuck() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let bytes: &[u8] = bytemuck::bytes_of(&v);
        assert_eq!(bytes.len(), 12);
    }

    #[test]
    fn test_quarter_turn_rotates_x_to_y() {
        let q = Quaternion::from_axis_angle(Vec3::Z, FRAC_PI_2);
        let v = q.rotate(Vec3::X);
        assert!(v.distance(Vec3::Y) < EPS, "got {v:?}");
    }

    #[test]
    fn test_compress_expand_keeps_rotation() {
        let q = Quaternion::from_axis_angle(Vec3::new(1.0, 2.0, -0.5), 2.9);
        let flipped = Quaternion::new(-q.x, -q.y, -q.z, -q.w);

        for input in [q, flipped] {
            let rebuilt = Quaternion::expand(input.compress());
            assert!(rebuilt.w >= 0.0);
            assert!(rebuilt.same_rotation(q, EPS));
        }
    }

    #[test]
    fn test_inverse_transform_point_undoes_transform_point() {
        let frame = Transform::new(
            Vec3::new(3.0, -1.0, 2.0),
            Quaternion::from_axis_angle(Vec3::Y, 1.1),
        );
        let local = Vec3::new(0.25, 0.5, -2.0);
        let world = frame.transform_point(local);
        assert!(frame.inverse_transform_point(world).distance(local) < EPS);
    }

    #[test]
    fn test_rotation_round_trip_through_frame() {
        let frame = Transform::new(Vec3::ZERO, Quaternion::from_axis_angle(Vec3::X, -0.7));
        let world = Quaternion::from_axis_angle(Vec3::Z, 0.3);
        let local = frame.inverse_transform_rotation(world);
        assert!(frame.transform_rotation(local).same_rotation(world, EPS));
    }
}
