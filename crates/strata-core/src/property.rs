//! Property identifiers, hydrocarbon phases and fault status.

use std::fmt;

/// A volume property looked up per `(i, j, level)` grid point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyId {
    /// Depth below datum in metres, positive downward.
    Depth = 0,
    /// Pore pressure in MPa.
    Pressure,
    /// Temperature in °C.
    Temperature,
    /// Porosity as a fraction.
    Porosity,
    /// Horizontal permeability in mD.
    HorizontalPermeability,
    /// Vertical permeability in mD.
    VerticalPermeability,
    /// Overpressure in MPa.
    Overpressure,
    /// Brine density in kg/m³.
    WaterDensity,
    /// Vapour-phase density in kg/m³.
    GasDensity,
    /// Liquid-phase density in kg/m³.
    OilDensity,
    /// Gas capillary entry pressure at 100% water saturation, in Pa.
    CapillaryPressureGas100,
    /// Oil capillary entry pressure at 100% water saturation, in Pa.
    CapillaryPressureOil100,
}

impl PropertyId {
    /// Number of properties.
    pub const COUNT: usize = 12;

    /// All properties in storage order.
    pub const ALL: [PropertyId; Self::COUNT] = [
        PropertyId::Depth,
        PropertyId::Pressure,
        PropertyId::Temperature,
        PropertyId::Porosity,
        PropertyId::HorizontalPermeability,
        PropertyId::VerticalPermeability,
        PropertyId::Overpressure,
        PropertyId::WaterDensity,
        PropertyId::GasDensity,
        PropertyId::OilDensity,
        PropertyId::CapillaryPressureGas100,
        PropertyId::CapillaryPressureOil100,
    ];

    /// Storage index of this property.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`index`](Self::index).
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Hydrocarbon phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Vapour.
    Gas,
    /// Liquid.
    Oil,
}

impl Phase {
    /// Gas is always evaluated before oil.
    pub const ALL: [Phase; 2] = [Phase::Gas, Phase::Oil];

    /// Density property of this phase.
    pub fn density(self) -> PropertyId {
        match self {
            Self::Gas => PropertyId::GasDensity,
            Self::Oil => PropertyId::OilDensity,
        }
    }

    /// Capillary entry pressure property of this phase.
    pub fn capillary_pressure(self) -> PropertyId {
        match self {
            Self::Gas => PropertyId::CapillaryPressureGas100,
            Self::Oil => PropertyId::CapillaryPressureOil100,
        }
    }
}

/// Fault classification of a column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FaultStatus {
    /// No fault.
    #[default]
    NoFault,
    /// Seals both phases.
    Seal,
    /// Passes both phases.
    Pass,
    /// Wastes charge straight up.
    Waste,
    /// Seals oil only.
    SealOil,
    /// Passes oil only.
    PassOil,
}

impl FaultStatus {
    /// `true` for a fault that blocks flow into the node.
    pub fn blocks_flow(self) -> bool {
        matches!(self, Self::Seal | Self::SealOil)
    }

    /// `true` if the fault seals the given phase.
    pub fn is_sealing(self, phase: Phase) -> bool {
        match phase {
            Phase::Gas => self == Self::Seal,
            Phase::Oil => matches!(self, Self::Seal | Self::SealOil),
        }
    }

    /// Wire code.
    pub fn code(self) -> u8 {
        match self {
            Self::NoFault => 0,
            Self::Seal => 1,
            Self::Pass => 2,
            Self::Waste => 3,
            Self::SealOil => 4,
            Self::PassOil => 5,
        }
    }
}
