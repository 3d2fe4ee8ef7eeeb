//! Hydrocarbon species and the [`Composition`] mass vector.

use std::fmt;

/// One of the fixed, closed set of migrated chemical species.
///
/// The discriminant is the storage index inside a [`Composition`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum Species {
    Asphaltenes = 0,
    Resins,
    C15Aro,
    C15Sat,
    C6To14Aro,
    C6To14Sat,
    C5,
    C4,
    C3,
    C2,
    C1,
    Cox,
    N2,
    H2s,
    Lsc,
    C15At,
    C6To14Bt,
    C6To14Dbt,
    C6To14Bp,
    C15AroS,
    C15SatS,
    C6To14SatS,
    C6To14AroS,
}

impl Species {
    /// Number of species.
    pub const COUNT: usize = 23;

    /// All species in storage order.
    pub const ALL: [Species; Self::COUNT] = [
        Species::Asphaltenes,
        Species::Resins,
        Species::C15Aro,
        Species::C15Sat,
        Species::C6To14Aro,
        Species::C6To14Sat,
        Species::C5,
        Species::C4,
        Species::C3,
        Species::C2,
        Species::C1,
        Species::Cox,
        Species::N2,
        Species::H2s,
        Species::Lsc,
        Species::C15At,
        Species::C6To14Bt,
        Species::C6To14Dbt,
        Species::C6To14Bp,
        Species::C15AroS,
        Species::C15SatS,
        Species::C6To14SatS,
        Species::C6To14AroS,
    ];

    /// Storage index of this species.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short display name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Asphaltenes => "asphaltenes",
            Self::Resins => "resins",
            Self::C15Aro => "C15+Aro",
            Self::C15Sat => "C15+Sat",
            Self::C6To14Aro => "C6-14Aro",
            Self::C6To14Sat => "C6-14Sat",
            Self::C5 => "C5",
            Self::C4 => "C4",
            Self::C3 => "C3",
            Self::C2 => "C2",
            Self::C1 => "C1",
            Self::Cox => "COx",
            Self::N2 => "N2",
            Self::H2s => "H2S",
            Self::Lsc => "LSC",
            Self::C15At => "C15+AT",
            Self::C6To14Bt => "C6-14BT",
            Self::C6To14Dbt => "C6-14DBT",
            Self::C6To14Bp => "C6-14BP",
            Self::C15AroS => "C15+AroS",
            Self::C15SatS => "C15+SatS",
            Self::C6To14SatS => "C6-14SatS",
            Self::C6To14AroS => "C6-14AroS",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mass in kilograms per species.
///
/// Masses are never negative; callers must not subtract below zero.
#[derive(Clone, Debug, PartialEq)]
pub struct Composition {
    masses: [f64; Species::COUNT],
}

impl Composition {
    /// An empty composition.
    pub fn new() -> Self {
        Self {
            masses: [0.0; Species::COUNT],
        }
    }

    /// Add `mass` kilograms of one species.
    pub fn add(&mut self, species: Species, mass: f64) {
        debug_assert!(mass >= 0.0, "negative mass {mass} for {species}");
        self.masses[species.index()] += mass;
    }

    /// Add every species of `other` into `self`.
    pub fn merge(&mut self, other: &Composition) {
        for (mine, theirs) in self.masses.iter_mut().zip(other.masses.iter()) {
            *mine += *theirs;
        }
    }

    /// Mass of a single species.
    pub fn weight(&self, species: Species) -> f64 {
        self.masses[species.index()]
    }

    /// Total mass over all species.
    pub fn total(&self) -> f64 {
        self.masses.iter().sum()
    }

    /// `true` if every species has zero mass.
    pub fn is_empty(&self) -> bool {
        self.masses.iter().all(|&m| m == 0.0)
    }

    /// A copy with every mass multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Composition {
        let mut out = self.clone();
        for m in &mut out.masses {
            *m *= factor;
        }
        out
    }

    /// Species with non-zero mass, in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (Species, f64)> + '_ {
        Species::ALL
            .iter()
            .zip(self.masses.iter())
            .filter(|&(_, &m)| m != 0.0)
            .map(|(&s, &m)| (s, m))
    }

    /// Raw masses in storage order.
    pub fn as_slice(&self) -> &[f64] {
        &self.masses
    }
}

impl Default for Composition {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<(Species, f64)> for Composition {
    fn from_iter<I: IntoIterator<Item = (Species, f64)>>(iter: I) -> Self {
        let mut c = Composition::new();
        for (species, mass) in iter {
            c.add(species, mass);
        }
        c
    }
}
