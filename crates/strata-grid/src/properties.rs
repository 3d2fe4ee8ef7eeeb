//! Property storage consumed by formation nodes.
//!
//! Property maps are indexed by corner column `(i, j)` and level
//! `0..=depth`, where level `k + 1` is the top surface of node `k`. Every
//! rank reads the same read-only source, so corner values of a node on a
//! partition boundary need no exchange.

use strata_core::{FaultStatus, FormationId, PropertyId, UNDEFINED};

use crate::error::GridError;

/// Read access to per-formation property maps.
pub trait PropertySource: Send + Sync {
    /// Value of `property` at corner `(i, j)` and `level`, or
    /// [`UNDEFINED`] outside the map.
    fn value(&self, formation: FormationId, property: PropertyId, i: i32, j: i32, level: i32)
        -> f64;

    /// Fault classification of column `(i, j)`.
    fn fault_status(&self, formation: FormationId, i: i32, j: i32) -> FaultStatus;

    /// Brooks-Corey pore-size exponent of the formation lithology.
    fn lambda_pc(&self, formation: FormationId) -> f64;

    /// Element layer count of the formation, `None` if unknown.
    fn depth(&self, formation: FormationId) -> Option<i32>;
}

#[derive(Clone, Debug)]
struct FormationVolume {
    depth: i32,
    lambda_pc: f64,
    values: Vec<f64>,
    faults: Vec<FaultStatus>,
}

/// Dense in-memory [`PropertySource`].
#[derive(Clone, Debug)]
pub struct PropertyVolume {
    ni: i32,
    nj: i32,
    formations: Vec<FormationVolume>,
}

impl PropertyVolume {
    /// Start a volume over `ni x nj` corner columns.
    pub fn builder(ni: i32, nj: i32) -> PropertyVolumeBuilder {
        PropertyVolumeBuilder {
            ni,
            nj,
            formations: Vec::new(),
        }
    }

    /// Corner grid size `(ni, nj)`.
    pub fn grid_size(&self) -> (i32, i32) {
        (self.ni, self.nj)
    }

    /// Number of formations.
    pub fn formation_count(&self) -> usize {
        self.formations.len()
    }

    /// Set one value. Returns `false` if the address is outside the volume.
    pub fn set(
        &mut self,
        formation: FormationId,
        property: PropertyId,
        i: i32,
        j: i32,
        level: i32,
        value: f64,
    ) -> bool {
        match self.slot(formation, property, i, j, level) {
            Some(idx) => {
                self.formations[formation.index()].values[idx] = value;
                true
            }
            None => false,
        }
    }

    /// Fill every `(i, j, level)` of one property from a closure.
    pub fn fill(
        &mut self,
        formation: FormationId,
        property: PropertyId,
        mut f: impl FnMut(i32, i32, i32) -> f64,
    ) {
        let Some(depth) = self.depth(formation) else {
            return;
        };
        for level in 0..=depth {
            for i in 0..self.ni {
                for j in 0..self.nj {
                    self.set(formation, property, i, j, level, f(i, j, level));
                }
            }
        }
    }

    /// Set the fault status of column `(i, j)`.
    pub fn set_fault(&mut self, formation: FormationId, i: i32, j: i32, status: FaultStatus) -> bool {
        let Some(idx) = self.column(i, j) else {
            return false;
        };
        match self.formations.get_mut(formation.index()) {
            Some(volume) => {
                volume.faults[idx] = status;
                true
            }
            None => false,
        }
    }

    fn column(&self, i: i32, j: i32) -> Option<usize> {
        if (0..self.ni).contains(&i) && (0..self.nj).contains(&j) {
            Some((i * self.nj + j) as usize)
        } else {
            None
        }
    }

    fn slot(
        &self,
        formation: FormationId,
        property: PropertyId,
        i: i32,
        j: i32,
        level: i32,
    ) -> Option<usize> {
        let volume = self.formations.get(formation.index())?;
        if !(0..=volume.depth).contains(&level) {
            return None;
        }
        let column = self.column(i, j)?;
        let levels = (volume.depth + 1) as usize;
        let per_level = (self.ni * self.nj) as usize;
        Some((property.index() * levels + level as usize) * per_level + column)
    }
}

impl PropertySource for PropertyVolume {
    fn value(
        &self,
        formation: FormationId,
        property: PropertyId,
        i: i32,
        j: i32,
        level: i32,
    ) -> f64 {
        self.slot(formation, property, i, j, level)
            .map_or(UNDEFINED, |idx| self.formations[formation.index()].values[idx])
    }

    fn fault_status(&self, formation: FormationId, i: i32, j: i32) -> FaultStatus {
        match (self.formations.get(formation.index()), self.column(i, j)) {
            (Some(volume), Some(idx)) => volume.faults[idx],
            _ => FaultStatus::NoFault,
        }
    }

    fn lambda_pc(&self, formation: FormationId) -> f64 {
        self.formations
            .get(formation.index())
            .map_or(0.0, |v| v.lambda_pc)
    }

    fn depth(&self, formation: FormationId) -> Option<i32> {
        self.formations.get(formation.index()).map(|v| v.depth)
    }
}

/// Builder for [`PropertyVolume`]. Formations are numbered in the order
/// they are added, shallowest first.
#[derive(Clone, Debug)]
pub struct PropertyVolumeBuilder {
    ni: i32,
    nj: i32,
    formations: Vec<(i32, f64)>,
}

impl PropertyVolumeBuilder {
    /// Add a formation with `depth` element layers and Brooks-Corey
    /// exponent `lambda_pc`.
    pub fn formation(mut self, depth: i32, lambda_pc: f64) -> Self {
        self.formations.push((depth, lambda_pc));
        self
    }

    /// Allocate the volume with every value undefined and no faults.
    pub fn build(self) -> Result<PropertyVolume, GridError> {
        if self.ni <= 0 || self.nj <= 0 {
            return Err(GridError::EmptyGrid {
                ni: self.ni,
                nj: self.nj,
            });
        }
        let columns = (self.ni * self.nj) as usize;
        let formations = self
            .formations
            .into_iter()
            .enumerate()
            .map(|(n, (depth, lambda_pc))| {
                if depth <= 0 {
                    return Err(GridError::ZeroDepth {
                        name: format!("formation {n}"),
                    });
                }
                let levels = (depth + 1) as usize;
                Ok(FormationVolume {
                    depth,
                    lambda_pc,
                    values: vec![UNDEFINED; PropertyId::COUNT * levels * columns],
                    faults: vec![FaultStatus::NoFault; columns],
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PropertyVolume {
            ni: self.ni,
            nj: self.nj,
            formations,
        })
    }
}
