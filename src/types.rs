//! Value types shared by the simulator and the environment.
//!
//! The frame-tagged [`Vec3`] keeps world and body quantities apart at
//! compile time. The array newtypes carry a range guarantee established by
//! their constructor:
//! - [`UnitQuaternion`] is unit norm, scalar first `[w, x, y, z]`
//! - [`NormalizedAction`] is `[throttle, roll, pitch, yaw]` in `[-1, 1]`
//! - [`MotorSpeeds`] is one fraction of full speed per motor, in `[0, 1]`

use std::marker::PhantomData;

/// Clamp each component to `[lo, hi]`; NaN becomes 0.
#[inline]
fn clamp_components(raw: [f64; 4], lo: f64, hi: f64) -> [f64; 4] {
    raw.map(|v| if v.is_nan() { 0.0 } else { v.clamp(lo, hi) })
}

// ============================================================================
// Attitude
// ============================================================================

/// Body-to-world rotation. Every orientation crossing a module boundary in
/// this crate uses scalar-first order; the viewer reorders at its own edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitQuaternion([f64; 4]);

impl UnitQuaternion {
    const IDENTITY: [f64; 4] = [1.0, 0.0, 0.0, 0.0];

    /// Normalize `q`. A zero or non-finite input becomes the identity.
    pub fn from_array(q: [f64; 4]) -> Self {
        let norm = q.iter().map(|c| c * c).sum::<f64>().sqrt();
        if norm.is_finite() && norm > 1e-10 {
            Self(q.map(|c| c / norm))
        } else {
            Self::identity()
        }
    }

    #[inline]
    pub const fn identity() -> Self {
        Self(Self::IDENTITY)
    }

    #[inline(always)]
    pub fn as_array(&self) -> [f64; 4] {
        self.0
    }

    /// Drifts from 1 only through integration error.
    #[inline]
    pub fn norm(&self) -> f64 {
        self.0.iter().map(|c| c * c).sum::<f64>().sqrt()
    }
}

impl Default for UnitQuaternion {
    fn default() -> Self {
        Self::identity()
    }
}

// ============================================================================
// Coordinate Frame Markers (Zero-Size Types)
// ============================================================================

/// Marker type for world frame coordinates.
/// World frame is inertial, with Z pointing up (against gravity).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct WorldFrame;

/// Marker type for body frame coordinates.
/// Body frame is attached to the airframe: X toward motor 0, Z along thrust.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BodyFrame;

// ============================================================================
// Frame-Typed 3D Vector
// ============================================================================

/// Three components expressed in `Frame`. Adding a body vector to a world
/// vector does not type-check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vec3<Frame> {
    data: [f64; 3],
    _frame: PhantomData<Frame>,
}

impl<F> Vec3<F> {
    #[inline(always)]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self::from_array([x, y, z])
    }

    #[inline(always)]
    pub const fn from_array(data: [f64; 3]) -> Self {
        Self {
            data,
            _frame: PhantomData,
        }
    }

    #[inline(always)]
    pub const fn zero() -> Self {
        Self::from_array([0.0; 3])
    }

    #[inline(always)]
    pub const fn as_array(&self) -> [f64; 3] {
        self.data
    }

    #[inline(always)]
    pub const fn x(&self) -> f64 {
        self.data[0]
    }

    #[inline(always)]
    pub const fn y(&self) -> f64 {
        self.data[1]
    }

    #[inline(always)]
    pub const fn z(&self) -> f64 {
        self.data[2]
    }

    #[inline]
    pub fn norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    #[inline(always)]
    fn zip_with(&self, other: &Vec3<F>, f: impl Fn(f64, f64) -> f64) -> Vec3<F> {
        let [a, b, c] = self.data;
        let [d, e, g] = other.data;
        Vec3::new(f(a, d), f(b, e), f(c, g))
    }
}

macro_rules! impl_vec3_binop {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident, $op:tt) => {
        impl<F> std::ops::$trait for Vec3<F> {
            type Output = Vec3<F>;
            #[inline(always)]
            fn $method(self, rhs: Vec3<F>) -> Vec3<F> {
                self.zip_with(&rhs, |a, b| a $op b)
            }
        }

        impl<F> std::ops::$assign_trait for Vec3<F> {
            #[inline(always)]
            fn $assign_method(&mut self, rhs: Vec3<F>) {
                *self = self.zip_with(&rhs, |a, b| a $op b);
            }
        }
    };
}

impl_vec3_binop!(Add, add, AddAssign, add_assign, +);
impl_vec3_binop!(Sub, sub, SubAssign, sub_assign, -);

impl<F> std::ops::Mul<f64> for Vec3<F> {
    type Output = Vec3<F>;
    #[inline(always)]
    fn mul(self, k: f64) -> Vec3<F> {
        Vec3::from_array(self.data.map(|v| v * k))
    }
}

impl<F> std::ops::Neg for Vec3<F> {
    type Output = Vec3<F>;
    #[inline(always)]
    fn neg(self) -> Vec3<F> {
        self * -1.0
    }
}

impl<F> Default for Vec3<F> {
    fn default() -> Self {
        Self::zero()
    }
}

// ============================================================================
// Rotation (Frame Transformation)
// ============================================================================

/// Body-to-world rotation matrix built from a `UnitQuaternion`.
#[derive(Clone, Copy, Debug)]
pub struct Rotation {
    rows: [[f64; 3]; 3],
}

impl Rotation {
    /// Wrap a row-major matrix. The caller guarantees it is a proper rotation.
    #[inline]
    pub const fn from_matrix_unchecked(m: [f64; 9]) -> Self {
        Self {
            rows: [[m[0], m[1], m[2]], [m[3], m[4], m[5]], [m[6], m[7], m[8]]],
        }
    }

    /// `R * v`.
    #[inline]
    pub fn body_to_world(&self, v: Vec3<BodyFrame>) -> Vec3<WorldFrame> {
        let v = v.as_array();
        Vec3::from_array(self.rows.map(|row| row[0] * v[0] + row[1] * v[1] + row[2] * v[2]))
    }

    /// `R^T * v`.
    #[inline]
    pub fn world_to_body(&self, v: Vec3<WorldFrame>) -> Vec3<BodyFrame> {
        let v = v.as_array();
        let r = &self.rows;
        Vec3::from_array([0usize, 1, 2].map(|c| r[0][c] * v[0] + r[1][c] * v[1] + r[2][c] * v[2]))
    }
}

// ============================================================================
// Actuation
// ============================================================================

/// Policy command after clipping: `[throttle, roll, pitch, yaw]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedAction([f64; 4]);

impl NormalizedAction {
    #[inline]
    pub fn new(raw: [f64; 4]) -> Self {
        Self(clamp_components(raw, -1.0, 1.0))
    }

    /// Curriculum scaling happens before the clip.
    #[inline]
    pub fn scaled(raw: [f64; 4], scale: f64) -> Self {
        Self::new(raw.map(|v| v * scale))
    }

    #[inline(always)]
    pub fn as_array(&self) -> [f64; 4] {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct MotorSpeeds([f64; 4]);

impl MotorSpeeds {
    #[inline]
    pub fn new(speeds: [f64; 4]) -> Self {
        Self(clamp_components(speeds, 0.0, 1.0))
    }

    #[inline(always)]
    pub fn as_array(&self) -> [f64; 4] {
        self.0
    }
}
