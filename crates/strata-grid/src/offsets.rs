//! Neighbour offset tables.
//!
//! Index order is significant: ranking sorts are stable, so equal
//! scores keep this order, and the straight-up offset at index 0 is the
//! fixed choice of wasting faults and zero-thickness nodes.

/// All 17 upward and lateral neighbour offsets `(di, dj, dk)`.
///
/// `dk = +1` is shallower. Index 0 is straight up, 1-8 are
/// lateral-upward, 9-16 are pure lateral in [`LATERAL_OFFSETS`] order.
pub const NEIGHBOUR_OFFSETS: [(i32, i32, i32); 17] = [
    (0, 0, 1),
    (-1, 0, 1),
    (1, 0, 1),
    (0, -1, 1),
    (0, 1, 1),
    (-1, -1, 1),
    (-1, 1, 1),
    (1, -1, 1),
    (1, 1, 1),
    (-1, 0, 0),
    (1, 0, 0),
    (0, -1, 0),
    (0, 1, 0),
    (-1, -1, 0),
    (-1, 1, 0),
    (1, -1, 0),
    (1, 1, 0),
];

/// Number of leading entries of [`NEIGHBOUR_OFFSETS`] with `dk = +1`.
pub const UPWARD_OFFSETS: usize = 9;

/// The 8 lateral offsets: W, E, S, N, then the diagonals.
pub const LATERAL_OFFSETS: [(i32, i32); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (-1, 1),
    (1, -1),
    (1, 1),
];

/// Index into [`NEIGHBOUR_OFFSETS`] of the lateral offset at `lateral`.
pub const fn lateral_to_neighbour(lateral: usize) -> usize {
    UPWARD_OFFSETS + lateral
}

/// Corner offsets of a node: the base quad, then the top quad.
///
/// Node `(i, j, k)` spans corners `i..=i+1`, `j..=j+1` and property
/// levels `k` (base) to `k + 1` (top).
pub const NODE_CORNERS: [(i32, i32, i32); 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (1, 1, 0),
    (0, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (1, 1, 1),
    (0, 1, 1),
];

/// Horizontal distance spanned by a lateral offset on a `dx x dy` grid.
pub fn lateral_distance(di: i32, dj: i32, dx: f64, dy: f64) -> f64 {
    let x = f64::from(di) * dx;
    let y = f64::from(dj) * dy;
    (x * x + y * y).sqrt()
}
