//! Rectangular partitioning of the `(i, j)` column grid across ranks.
//!
//! Every rank owns one rectangle of columns across the full depth of
//! every formation, so vertical neighbours are always local. Each axis is
//! split with the base-plus-remainder rule: the first `len % parts`
//! slabs receive one extra index.

use strata_core::Rank;

use crate::error::GridError;

/// An inclusive rectangle of `(i, j)` columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rect {
    /// First owned `i`.
    pub first_i: i32,
    /// Last owned `i` (inclusive).
    pub last_i: i32,
    /// First owned `j`.
    pub first_j: i32,
    /// Last owned `j` (inclusive).
    pub last_j: i32,
}

impl Rect {
    /// `true` if `(i, j)` lies inside the rectangle.
    pub fn contains(&self, i: i32, j: i32) -> bool {
        (self.first_i..=self.last_i).contains(&i) && (self.first_j..=self.last_j).contains(&j)
    }

    /// Columns along `i`.
    pub fn width_i(&self) -> i32 {
        self.last_i - self.first_i + 1
    }

    /// Columns along `j`.
    pub fn width_j(&self) -> i32 {
        self.last_j - self.first_j + 1
    }

    /// Number of owned columns.
    pub fn len(&self) -> usize {
        (self.width_i() * self.width_j()) as usize
    }

    /// `true` if the rectangle owns no column.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owned columns in sweep order: `i` outer, `j` inner.
    pub fn columns(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        (self.first_i..=self.last_i).flat_map(move |i| (self.first_j..=self.last_j).map(move |j| (i, j)))
    }
}

/// The split of an `ni x nj` column grid into `px * py` rectangles.
///
/// Rank `r` owns the rectangle at `(r / py, r % py)` in partition space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionLayout {
    ni: i32,
    nj: i32,
    i_starts: Vec<i32>,
    j_starts: Vec<i32>,
}

impl PartitionLayout {
    /// Split `ni x nj` columns across `ranks` partitions.
    ///
    /// The partition count along `i` is the divisor of `ranks` closest
    /// to `sqrt(ranks * ni / nj)`, so partitions stay roughly square.
    pub fn new(ni: i32, nj: i32, ranks: u32) -> Result<Self, GridError> {
        if ranks == 0 {
            return Err(GridError::ZeroRanks);
        }
        if ni <= 0 || nj <= 0 {
            return Err(GridError::EmptyGrid { ni, nj });
        }
        let ideal = (f64::from(ranks) * f64::from(ni) / f64::from(nj)).sqrt();
        let px = (1..=ranks)
            .filter(|d| ranks % d == 0)
            .filter(|&d| d as i32 <= ni && (ranks / d) as i32 <= nj)
            .min_by(|&a, &b| {
                let da = (f64::from(a) - ideal).abs();
                let db = (f64::from(b) - ideal).abs();
                da.total_cmp(&db).then(a.cmp(&b))
            })
            .ok_or(GridError::TooManyRanks { ranks, ni, nj })?;
        let py = ranks / px;
        Ok(Self {
            ni,
            nj,
            i_starts: split(ni, px),
            j_starts: split(nj, py),
        })
    }

    /// A single partition owning the whole grid.
    pub fn single(ni: i32, nj: i32) -> Result<Self, GridError> {
        Self::new(ni, nj, 1)
    }

    /// Total rank count.
    pub fn ranks(&self) -> u32 {
        (self.parts_i() * self.parts_j()) as u32
    }

    /// Global grid size `(ni, nj)`.
    pub fn grid_size(&self) -> (i32, i32) {
        (self.ni, self.nj)
    }

    /// Partition counts along `i` and `j`.
    pub fn parts(&self) -> (usize, usize) {
        (self.parts_i(), self.parts_j())
    }

    /// `true` if `(i, j)` is inside the global grid.
    pub fn in_global_range(&self, i: i32, j: i32) -> bool {
        (0..self.ni).contains(&i) && (0..self.nj).contains(&j)
    }

    /// The rectangle owned by `rank`.
    pub fn rect(&self, rank: Rank) -> Result<Rect, GridError> {
        let ranks = self.ranks();
        if rank.0 >= ranks {
            return Err(GridError::UnknownRank { rank: rank.0, ranks });
        }
        let pi = rank.index() / self.parts_j();
        let pj = rank.index() % self.parts_j();
        Ok(Rect {
            first_i: self.i_starts[pi],
            last_i: self.i_starts[pi + 1] - 1,
            first_j: self.j_starts[pj],
            last_j: self.j_starts[pj + 1] - 1,
        })
    }

    /// The rank owning column `(i, j)`, or `None` outside the grid.
    pub fn owner(&self, i: i32, j: i32) -> Option<Rank> {
        if !self.in_global_range(i, j) {
            return None;
        }
        let pi = self.i_starts.partition_point(|&s| s <= i) - 1;
        let pj = self.j_starts.partition_point(|&s| s <= j) - 1;
        Some(Rank((pi * self.parts_j() + pj) as u32))
    }

    fn parts_i(&self) -> usize {
        self.i_starts.len() - 1
    }

    fn parts_j(&self) -> usize {
        self.j_starts.len() - 1
    }
}

/// Slab start offsets for `len` indices over `parts` slabs, plus the end.
fn split(len: i32, parts: u32) -> Vec<i32> {
    let parts = parts as i32;
    let base = len / parts;
    let rem = len % parts;
    (0..=parts).map(|p| p * base + p.min(rem)).collect()
}
