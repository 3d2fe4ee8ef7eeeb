//! Trilinear hexahedral element spanning one formation node.
//!
//! Reference coordinates are `(xi, eta, zeta)` in `[-1, 1]^3`, with `xi`
//! along `i`, `eta` along `j` and `zeta` pointing down: `zeta = +1` is
//! the base of the node, `zeta = -1` its top. Corners follow
//! [`NODE_CORNERS`]. Physical coordinates are `(x, y, depth)`.

use strata_core::{is_undefined, Tensor3, Vec3, UNDEFINED};

use crate::offsets::NODE_CORNERS;

/// A point in reference coordinates.
pub type RefPoint = [f64; 3];

/// The element centre.
pub const CENTRE: RefPoint = [0.0, 0.0, 0.0];

/// Reference point named by a grid offset `(di, dj, dk)`: a corner, edge
/// or face midpoint of the element.
///
/// The depth axis is not mirrored, so `dk = +1` lands on the base.
/// Callers negate `dk` to reach the face toward a shallower neighbour.
pub fn offset_point(di: i32, dj: i32, dk: i32) -> RefPoint {
    [f64::from(di), f64::from(dj), f64::from(dk)]
}

/// Geometry of one node: lateral spacing plus its eight corner depths.
#[derive(Clone, Debug, PartialEq)]
pub struct HexElement {
    dx: f64,
    dy: f64,
    depths: [f64; 8],
}

impl HexElement {
    /// An element of lateral size `dx x dy` with the given corner depths.
    pub fn new(dx: f64, dy: f64, depths: [f64; 8]) -> Self {
        Self { dx, dy, depths }
    }

    /// Corner depths in [`NODE_CORNERS`] order.
    pub fn depths(&self) -> &[f64; 8] {
        &self.depths
    }

    /// `true` when every corner depth is defined.
    pub fn is_defined(&self) -> bool {
        self.depths.iter().all(|&d| !is_undefined(d))
    }

    /// Reference coordinates of corner `a`.
    pub fn corner_point(a: usize) -> RefPoint {
        let (ci, cj, ck) = NODE_CORNERS[a];
        [
            f64::from(2 * ci - 1),
            f64::from(2 * cj - 1),
            f64::from(1 - 2 * ck),
        ]
    }

    /// Trilinear shape functions at `at`.
    pub fn shape(at: RefPoint) -> [f64; 8] {
        let mut n = [0.0; 8];
        for (a, value) in n.iter_mut().enumerate() {
            let c = Self::corner_point(a);
            *value = 0.125 * (1.0 + at[0] * c[0]) * (1.0 + at[1] * c[1]) * (1.0 + at[2] * c[2]);
        }
        n
    }

    /// Shape function derivatives `[d/dxi, d/deta, d/dzeta]` at `at`.
    fn shape_derivatives(at: RefPoint) -> [[f64; 8]; 3] {
        let mut d = [[0.0; 8]; 3];
        for a in 0..8 {
            let c = Self::corner_point(a);
            let fx = 1.0 + at[0] * c[0];
            let fy = 1.0 + at[1] * c[1];
            let fz = 1.0 + at[2] * c[2];
            d[0][a] = 0.125 * c[0] * fy * fz;
            d[1][a] = 0.125 * fx * c[1] * fz;
            d[2][a] = 0.125 * fx * fy * c[2];
        }
        d
    }

    /// Interpolate corner values at `at`; [`UNDEFINED`] if any corner is.
    pub fn interpolate(values: &[f64; 8], at: RefPoint) -> f64 {
        if values.iter().any(|&v| is_undefined(v)) {
            return UNDEFINED;
        }
        Self::shape(at)
            .iter()
            .zip(values)
            .map(|(n, v)| n * v)
            .sum()
    }

    /// Smallest corner value; [`UNDEFINED`] if any corner is.
    pub fn minimum(values: &[f64; 8]) -> f64 {
        if values.iter().any(|&v| is_undefined(v)) {
            return UNDEFINED;
        }
        values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Rows of the Jacobian at `at`: the physical tangents along `xi`,
    /// `eta` and `zeta`.
    pub fn jacobian(&self, at: RefPoint) -> [Vec3; 3] {
        let d = Self::shape_derivatives(at);
        let mut rows = [Vec3::ZERO; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            for a in 0..8 {
                let (ci, cj, _) = NODE_CORNERS[a];
                let corner = Vec3::new(
                    f64::from(ci) * self.dx,
                    f64::from(cj) * self.dy,
                    self.depths[a],
                );
                *row = *row + corner * d[r][a];
            }
        }
        rows
    }

    /// Physical gradient of a corner-valued field at `at`.
    ///
    /// `None` when a corner value or depth is undefined, or when the
    /// element is degenerate (zero thickness) at that point.
    pub fn gradient(&self, values: &[f64; 8], at: RefPoint) -> Option<Vec3> {
        if !self.is_defined() || values.iter().any(|&v| is_undefined(v)) {
            return None;
        }
        let d = Self::shape_derivatives(at);
        let mut reference = [0.0; 3];
        for (r, g) in reference.iter_mut().enumerate() {
            *g = d[r].iter().zip(values).map(|(dn, v)| dn * v).sum();
        }
        let j = self.jacobian(at);
        solve3([j[0].0, j[1].0, j[2].0], reference).map(Vec3)
    }

    /// Structural normal `t_xi x t_eta` at `at`; it points down.
    pub fn normal(&self, at: RefPoint) -> Vec3 {
        let [t_xi, t_eta, _] = self.jacobian(at);
        t_xi.cross(t_eta)
    }

    /// Conductivity tensor at the centre with `normal_value` across the
    /// layering and `plane_value` along it.
    pub fn tensor(&self, normal_value: f64, plane_value: f64) -> Tensor3 {
        Tensor3::anisotropic(self.normal(CENTRE), normal_value, plane_value)
    }
}

/// Solve `m x = b` by Cramer's rule; `None` for a singular matrix.
fn solve3(m: [[f64; 3]; 3], b: [f64; 3]) -> Option<[f64; 3]> {
    let det = det3(&m);
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let mut x = [0.0; 3];
    for (c, out) in x.iter_mut().enumerate() {
        let mut mc = m;
        for (r, row) in mc.iter_mut().enumerate() {
            row[c] = b[r];
        }
        *out = det3(&mc) / det;
    }
    Some(x)
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}
