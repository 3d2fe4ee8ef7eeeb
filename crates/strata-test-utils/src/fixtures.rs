//! Synthetic basins for tests and benchmarks.
//!
//! Every fixture stacks formations of uniform thickness under a shared
//! surface, starting at 1000 m:
//!
//! - [`flat_basin`]: seal, designated reservoir, source rock.
//! - [`tilted_basin`]: seal, carrier, source rock dipping towards `+i`.
//! - [`dome_basin`]: seal, carrier, source rock under a centred dome.
//! - [`random_basin`]: four formations with seeded noise in depth,
//!   impermeable patches, sealing faults and charge.
//!
//! Carriers are not designated reservoirs; the seal above them holds a
//! column of several hundred metres, so reservoir detection flags them.

use std::sync::Arc;

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use strata_core::{Composition, FaultStatus, FormationId, PropertyId, Species};
use strata_grid::{FormationSpec, PropertyVolume};
use strata_migration::{BasinModel, ChargeMap};

/// Lateral node spacing of every fixture, in metres.
pub const SPACING: f64 = 100.0;

/// Depth of the top of the shallowest formation, in metres.
pub const SURFACE_DEPTH: f64 = 1000.0;

/// Rock type of a fixture formation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rock {
    /// Low permeability, high capillary entry pressure.
    Seal,
    /// Permeable rock with low entry pressure.
    Carrier,
}

/// One formation of a [`BasinBuilder`].
#[derive(Clone, Debug)]
pub struct Layer {
    pub spec: FormationSpec,
    pub rock: Rock,
    /// Thickness of one element layer, in metres.
    pub thickness: f64,
}

/// Builder for layered fixture basins.
pub struct BasinBuilder {
    n: i32,
    layers: Vec<Layer>,
    surface: Box<dyn Fn(i32, i32) -> f64>,
    charge_per_column: f64,
}

impl BasinBuilder {
    /// An `n x n` basin with a flat surface and no formations.
    pub fn new(n: i32) -> Self {
        Self {
            n,
            layers: Vec::new(),
            surface: Box::new(|_, _| 0.0),
            charge_per_column: 1.0,
        }
    }

    /// Depth offset of corner column `(i, j)`, added to every level.
    pub fn surface(mut self, surface: impl Fn(i32, i32) -> f64 + 'static) -> Self {
        self.surface = Box::new(surface);
        self
    }

    /// Append a formation below the ones already added.
    pub fn layer(mut self, spec: FormationSpec, rock: Rock, thickness: f64) -> Self {
        self.layers.push(Layer {
            spec,
            rock,
            thickness,
        });
        self
    }

    /// Methane placed on every valid column of every source rock.
    pub fn charge(mut self, mass: f64) -> Self {
        self.charge_per_column = mass;
        self
    }

    /// The property volume alone.
    pub fn volume(&self) -> PropertyVolume {
        let mut builder = PropertyVolume::builder(self.n, self.n);
        for layer in &self.layers {
            builder = builder.formation(layer.spec.depth(), 2.0);
        }
        let mut volume = builder.build().expect("fixture grid is not empty");
        let mut top = SURFACE_DEPTH;
        for (f, layer) in self.layers.iter().enumerate() {
            let id = FormationId(f as u32);
            let depth = layer.spec.depth();
            let base = top + layer.thickness * f64::from(depth);
            let thickness = layer.thickness;
            let surface = &self.surface;
            volume.fill(id, PropertyId::Depth, |i, j, l| {
                base + surface(i, j) - thickness * f64::from(l)
            });
            fill_rock(&mut volume, id, layer.rock);
            top = base;
        }
        volume
    }

    /// Build the basin model.
    pub fn build(self) -> BasinModel {
        let volume = self.volume();
        let charges = self
            .layers
            .iter()
            .enumerate()
            .filter(|(_, l)| l.spec.is_source_rock())
            .flat_map(|(f, _)| valid_columns(self.n).map(move |(i, j)| (f, i, j)))
            .map(|(f, i, j)| (FormationId(f as u32), i, j, methane(self.charge_per_column)))
            .collect();
        BasinModel {
            properties: Arc::new(volume),
            grid: (self.n, self.n),
            spacing: (SPACING, SPACING),
            formations: self.layers.into_iter().map(|l| l.spec).collect(),
            charges,
        }
    }
}

/// Columns whose nodes have all four corners.
pub fn valid_columns(n: i32) -> impl Iterator<Item = (i32, i32)> {
    (0..n - 1).flat_map(move |i| (0..n - 1).map(move |j| (i, j)))
}

/// A composition of `mass` methane.
pub fn methane(mass: f64) -> Composition {
    let mut c = Composition::new();
    c.add(Species::C1, mass);
    c
}

fn fill_rock(volume: &mut PropertyVolume, id: FormationId, rock: Rock) {
    let (permeability, porosity, capillary) = match rock {
        Rock::Seal => (1.0e-3, 0.05, 5.0e6),
        Rock::Carrier => (1.0, 0.2, 1.0e4),
    };
    let constant = |v: f64| move |_: i32, _: i32, _: i32| v;
    volume.fill(id, PropertyId::VerticalPermeability, constant(permeability));
    volume.fill(id, PropertyId::HorizontalPermeability, constant(permeability));
    volume.fill(id, PropertyId::Porosity, constant(porosity));
    volume.fill(id, PropertyId::CapillaryPressureGas100, constant(capillary));
    volume.fill(id, PropertyId::CapillaryPressureOil100, constant(capillary));
    volume.fill(id, PropertyId::WaterDensity, constant(1030.0));
    volume.fill(id, PropertyId::OilDensity, constant(800.0));
    volume.fill(id, PropertyId::GasDensity, constant(250.0));
    volume.fill(id, PropertyId::Temperature, |_, _, l| 60.0 - f64::from(l));
    volume.fill(id, PropertyId::Pressure, |_, _, l| 20.0 - 0.1 * f64::from(l));
    volume.fill(id, PropertyId::Overpressure, constant(0.0));
}

/// Seal over a designated reservoir over a source rock, all flat.
pub fn flat_basin(n: i32) -> BasinModel {
    BasinBuilder::new(n)
        .layer(FormationSpec::new("seal", 1), Rock::Seal, 10.0)
        .layer(FormationSpec::new("reservoir", 2).reservoir(), Rock::Carrier, 10.0)
        .layer(FormationSpec::new("source", 1).source_rock(), Rock::Carrier, 10.0)
        .build()
}

/// Seal over a carrier over a source rock, deepening by `dip` metres
/// per column towards `+i`.
pub fn tilted_basin(n: i32, dip: f64) -> BasinModel {
    BasinBuilder::new(n)
        .surface(move |i, _| dip * f64::from(i))
        .layer(FormationSpec::new("seal", 1), Rock::Seal, 10.0)
        .layer(FormationSpec::new("carrier", 3), Rock::Carrier, 10.0)
        .layer(FormationSpec::new("source", 1).source_rock(), Rock::Carrier, 10.0)
        .build()
}

/// Seal over a carrier over a source rock, arched into a dome of
/// `relief` metres whose crest lies near the centre.
pub fn dome_basin(n: i32, relief: f64) -> BasinModel {
    BasinBuilder::new(n)
        .surface(move |i, j| dome(n, relief, i, j))
        .layer(FormationSpec::new("seal", 1), Rock::Seal, 10.0)
        .layer(FormationSpec::new("carrier", 3), Rock::Carrier, 10.0)
        .layer(FormationSpec::new("source", 1).source_rock(), Rock::Carrier, 10.0)
        .build()
}

/// A designated reservoir capping a [`dome_basin`]: the dome's seal,
/// carrier and source rock sit below it. Unless crest detection runs,
/// the carrier's trap goes unnoticed and charge stalls at its crest.
pub fn capped_dome_basin(n: i32, relief: f64) -> BasinModel {
    BasinBuilder::new(n)
        .surface(move |i, j| dome(n, relief, i, j))
        .layer(FormationSpec::new("reservoir", 1).reservoir(), Rock::Carrier, 10.0)
        .layer(FormationSpec::new("seal", 1), Rock::Seal, 10.0)
        .layer(FormationSpec::new("carrier", 3), Rock::Carrier, 10.0)
        .layer(FormationSpec::new("source", 1).source_rock(), Rock::Carrier, 10.0)
        .build()
}

fn dome(n: i32, relief: f64, i: i32, j: i32) -> f64 {
    let centre = f64::from(n - 1) / 2.0;
    let r2 = (f64::from(i) - centre).powi(2) + (f64::from(j) - centre).powi(2);
    relief * r2 / (2.0 * centre * centre).max(1.0)
}

/// Four formations with seeded structure.
///
/// The surface is a gentle dome with noise; the two middle formations
/// carry impermeable patches, and a few of their columns are cut by
/// sealing or passing faults. Every valid source column holds a seeded
/// charge between 1 and 11.
pub fn random_basin(n: i32, seed: u64) -> BasinModel {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let corners = (n * n) as usize;
    let noise: Vec<f64> = (0..corners).map(|_| 20.0 * unit(&mut rng) - 10.0).collect();
    let builder = BasinBuilder::new(n)
        .surface(move |i, j| dome(n, 150.0, i, j) + noise[(i * n + j) as usize])
        .layer(FormationSpec::new("seal", 1), Rock::Seal, 15.0)
        .layer(FormationSpec::new("upper carrier", 2), Rock::Carrier, 12.0)
        .layer(FormationSpec::new("lower carrier", 2), Rock::Carrier, 12.0)
        .layer(FormationSpec::new("source", 1).source_rock(), Rock::Carrier, 10.0);

    let mut volume = builder.volume();
    for f in [FormationId(1), FormationId(2)] {
        for (i, j) in valid_columns(n) {
            let roll = unit(&mut rng);
            if roll < 0.08 {
                for k in 0..2 {
                    volume.set(f, PropertyId::Porosity, i, j, k, 0.0);
                }
            } else if roll < 0.11 {
                volume.set_fault(f, i, j, FaultStatus::Seal);
            } else if roll < 0.13 {
                volume.set_fault(f, i, j, FaultStatus::Pass);
            }
        }
    }

    let source = FormationId(3);
    let charges: ChargeMap = valid_columns(n)
        .map(|(i, j)| (source, i, j, methane(1.0 + 10.0 * unit(&mut rng))))
        .collect();
    let mut model = builder.build();
    model.properties = Arc::new(volume);
    model.charges = charges;
    model
}

/// Uniform sample in `[0, 1)`.
fn unit(rng: &mut ChaCha8Rng) -> f64 {
    (rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64
}
