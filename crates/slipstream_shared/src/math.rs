//! Mathematical types shared between client and server.
//!
//! On the wire both types are flat float sequences; in TOML they are plain
//! arrays (`[x, y, z]`, `[x, y, z, w]`).

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use slipstream_net::{ProtocolResult, WireReader, WireWriter};

/// 3D Vector - position, velocity, direction
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
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

    /// Unit Y vector
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);

    /// Unit Z vector (forward)
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

    /// Length
    #[must_use]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Distance to another point
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    /// Writes three floats.
    pub fn encode(self, writer: &mut WireWriter) {
        writer.write_f32s(&self.to_array());
    }

    /// Reads three floats.
    ///
    /// # Errors
    ///
    /// Fails on truncated input.
    pub fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self::from_array(reader.read_f32s::<3>()?))
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(arr: [f32; 3]) -> Self {
        Self::from_array(arr)
    }
}

impl From<Vec3> for [f32; 3] {
    fn from(v: Vec3) -> Self {
        v.to_array()
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
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

/// Quaternion for rotations
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
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

    /// Rotation of `yaw` radians about the Y axis.
    #[must_use]
    pub fn from_yaw(yaw: f32) -> Self {
        let (sin, cos) = (yaw * 0.5).sin_cos();
        Self::new(0.0, sin, 0.0, cos)
    }

    /// Heading about the Y axis, in radians.
    #[must_use]
    pub fn yaw(self) -> f32 {
        let siny = 2.0 * (self.w * self.y + self.z * self.x);
        let cosy = 1.0 - 2.0 * (self.x * self.x + self.y * self.y);
        siny.atan2(cosy)
    }

    /// Unit vector the rotation points +Z at.
    #[must_use]
    pub fn forward(self) -> Vec3 {
        let yaw = self.yaw();
        Vec3::new(yaw.sin(), 0.0, yaw.cos())
    }

    /// Writes four floats.
    pub fn encode(self, writer: &mut WireWriter) {
        writer.write_f32s(&[self.x, self.y, self.z, self.w]);
    }

    /// Reads four floats.
    ///
    /// # Errors
    ///
    /// Fails on truncated input.
    pub fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        let [x, y, z, w] = reader.read_f32s::<4>()?;
        Ok(Self::new(x, y, z, w))
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<[f32; 4]> for Quaternion {
    fn from([x, y, z, w]: [f32; 4]) -> Self {
        Self::new(x, y, z, w)
    }
}

impl From<Quaternion> for [f32; 4] {
    fn from(q: Quaternion) -> Self {
        [q.x, q.y, q.z, q.w]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);

        let sum = a + b;
        assert_eq!(sum, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(a.dot(b), 32.0); // 1*4 + 2*5 + 3*6

        let mut c = a;
        c += Vec3::Y * 2.0;
        assert_eq!(c, Vec3::new(1.0, 4.0, 3.0));
        assert_eq!(Vec3::ZERO.distance(Vec3::new(3.0, 4.0, 0.0)), 5.0);
    }

    #[test]
    fn test_yaw_round_trip() {
        let q = Quaternion::from_yaw(0.5);
        assert!((q.yaw() - 0.5).abs() < 1e-5);
        assert!((Quaternion::IDENTITY.forward().z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_wire_layout_is_flat_floats() {
        let mut writer = WireWriter::new();
        Vec3::new(1.0, 2.0, 3.0).encode(&mut writer);
        Quaternion::IDENTITY.encode(&mut writer);
        assert_eq!(writer.len(), 28);

        let mut reader = WireReader::new(writer.as_slice());
        assert_eq!(Vec3::decode(&mut reader), Ok(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(Quaternion::decode(&mut reader), Ok(Quaternion::IDENTITY));
    }

    #[test]
    fn test_toml_arrays() {
        #[derive(Deserialize)]
        struct Spawn {
            at: Vec3,
            facing: Quaternion,
        }
        let spawn: Spawn = toml::from_str("at = [1.0, 0.0, -2.5]\nfacing = [0.0, 0.0, 0.0, 1.0]").unwrap();
        assert_eq!(spawn.at, Vec3::new(1.0, 0.0, -2.5));
        assert_eq!(spawn.facing, Quaternion::IDENTITY);
    }
}
