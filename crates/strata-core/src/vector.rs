//! Fixed-size 3-vector and 3×3 tensor algebra.
//!
//! Coordinates are `(x, y, z)` with `x` along `i`, `y` along `j` and
//! `z` the depth axis, positive downward. "Straight up" is therefore
//! `(0, 0, -1)`.

use std::ops::{Add, Index, Mul, Neg, Sub};

use crate::constants::{is_undefined, UNDEFINED};

/// A 3-component vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3(pub [f64; 3]);

impl Vec3 {
    /// The zero vector.
    pub const ZERO: Vec3 = Vec3([0.0; 3]);

    /// Unit vector pointing toward shallower depth.
    pub const UP: Vec3 = Vec3([0.0, 0.0, -1.0]);

    /// Vector with every component set to [`UNDEFINED`].
    pub const UNDEFINED: Vec3 = Vec3([UNDEFINED; 3]);

    /// Create a vector from components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self([x, y, z])
    }

    /// Inner product.
    pub fn dot(self, other: Vec3) -> f64 {
        self.0[0] * other.0[0] + self.0[1] * other.0[1] + self.0[2] * other.0[2]
    }

    /// Cross product.
    pub fn cross(self, other: Vec3) -> Vec3 {
        let [a1, a2, a3] = self.0;
        let [b1, b2, b3] = other.0;
        Vec3([a2 * b3 - a3 * b2, a3 * b1 - a1 * b3, a1 * b2 - a2 * b1])
    }

    /// Euclidean length.
    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction; the zero vector stays zero.
    pub fn normalized(self) -> Vec3 {
        let len = self.length();
        if len == 0.0 {
            self
        } else {
            self * (1.0 / len)
        }
    }

    /// `true` if the first component carries the undefined sentinel.
    pub fn is_undefined(self) -> bool {
        is_undefined(self.0[0])
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3([self.0[0] + rhs.0[0], self.0[1] + rhs.0[1], self.0[2] + rhs.0[2]])
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3([self.0[0] - rhs.0[0], self.0[1] - rhs.0[1], self.0[2] - rhs.0[2]])
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3([self.0[0] * rhs, self.0[1] * rhs, self.0[2] * rhs])
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        self * -1.0
    }
}

impl Index<usize> for Vec3 {
    type Output = f64;
    fn index(&self, idx: usize) -> &f64 {
        &self.0[idx]
    }
}

/// A 3×3 tensor stored row-major.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tensor3(pub [[f64; 3]; 3]);

impl Tensor3 {
    /// The identity tensor.
    pub const IDENTITY: Tensor3 = Tensor3([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    /// Transversely anisotropic tensor: `normal_value` along `normal`,
    /// `plane_value` in the plane orthogonal to it.
    ///
    /// A zero normal yields the isotropic tensor `plane_value * I`.
    pub fn anisotropic(normal: Vec3, normal_value: f64, plane_value: f64) -> Tensor3 {
        let len_sq = normal.dot(normal);
        let diff = if len_sq == 0.0 {
            0.0
        } else {
            (normal_value - plane_value) / len_sq
        };
        let mut rows = [[0.0; 3]; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = diff * normal.0[r] * normal.0[c];
                if r == c {
                    *cell += plane_value;
                }
            }
        }
        Tensor3(rows)
    }

    /// Matrix-vector product.
    pub fn apply(&self, v: Vec3) -> Vec3 {
        let m = &self.0;
        Vec3([
            m[0][0] * v.0[0] + m[0][1] * v.0[1] + m[0][2] * v.0[2],
            m[1][0] * v.0[0] + m[1][1] * v.0[1] + m[1][2] * v.0[2],
            m[2][0] * v.0[0] + m[2][1] * v.0[1] + m[2][2] * v.0[2],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalized_zero_stays_zero() {
        assert_eq!(Vec3::ZERO.normalized(), Vec3::ZERO);
        assert_eq!(Vec3::new(0.0, 0.0, -4.0).normalized(), Vec3::UP);
    }

    #[test]
    fn cross_of_axes() {
        let x = Vec3::new(1.0, 0.0, 0.0);
        let y = Vec3::new(0.0, 1.0, 0.0);
        assert_eq!(x.cross(y), Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn vertical_normal_tensor_is_diagonal() {
        let t = Tensor3::anisotropic(Vec3::new(0.0, 0.0, 2.0), 1.0, 10.0);
        assert_eq!(t.0, [[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 1.0]]);
        assert_eq!(t.apply(Vec3::UP), Vec3::UP);
    }

    #[test]
    fn zero_normal_is_isotropic() {
        let t = Tensor3::anisotropic(Vec3::ZERO, 1.0, 3.0);
        assert_eq!(t.apply(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(3.0, 6.0, 9.0));
    }

    proptest! {
        #[test]
        fn normalized_has_unit_length(x in -1.0e3f64..1.0e3, y in -1.0e3f64..1.0e3, z in 1.0e-3f64..1.0e3) {
            let n = Vec3::new(x, y, z).normalized();
            prop_assert!((n.length() - 1.0).abs() < 1.0e-9);
        }

        #[test]
        fn isotropic_tensor_scales(v in -1.0e3f64..1.0e3, k in 0.1f64..100.0) {
            let t = Tensor3::anisotropic(Vec3::new(0.3, -0.2, 0.9), k, k);
            let out = t.apply(Vec3::new(v, v, v));
            for c in 0..3 {
                prop_assert!((out[c] - k * v).abs() <= 1.0e-9 * (k * v).abs().max(1.0));
            }
        }
    }
}
