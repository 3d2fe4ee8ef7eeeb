//! Request and response vocabulary for remote node access.

use std::fmt;

use strata_core::{Composition, FaultStatus, NodeKey, PropertyId, Vec3};

use crate::error::CommError;

/// Selects which field of a node a request asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueSpec {
    /// Resolved target node, `None` while unresolved.
    TargetFormationNode,
    /// The node charge moves to next.
    AdjacentNode,
    /// Centre depth.
    Depth,
    /// All corner depths defined.
    IsValid,
    /// Blocks flow by permeability, porosity or fault.
    IsImpermeable,
    /// Impermeable or without a neighbour to move to.
    HasNowhereToGo,
    /// Top and base coincide.
    HasNoThickness,
    /// The selected neighbour lies outside the grid.
    GoesOutOfBounds,
    /// Gas reservoir flag.
    IsReservoirGas,
    /// Oil reservoir flag.
    IsReservoirOil,
    /// Migration terminus flag.
    IsEndOfPath,
    /// Charge reaching the node is discarded.
    IsEliminated,
    /// Supported gas column height.
    HeightGas,
    /// Supported oil column height.
    HeightOil,
    /// Fault classification.
    FaultStatus,
    /// Smallest corner value of a property.
    FiniteElementMinimumValue(PropertyId),
    /// Preferred migration direction.
    AnalogFlowDirection,
    /// Physical gradient of a property at the node centre.
    FiniteElementGrad(PropertyId),
    /// Property interpolated at a reference offset.
    FiniteElementValue {
        /// The property.
        property: PropertyId,
        /// Reference point, each component in `-1..=1`.
        offset: [i8; 3],
    },
    /// Charge waiting to migrate.
    Composition,
}

impl ValueSpec {
    /// Stable name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TargetFormationNode => "TargetFormationNode",
            Self::AdjacentNode => "AdjacentNode",
            Self::Depth => "Depth",
            Self::IsValid => "IsValid",
            Self::IsImpermeable => "IsImpermeable",
            Self::HasNowhereToGo => "HasNowhereToGo",
            Self::HasNoThickness => "HasNoThickness",
            Self::GoesOutOfBounds => "GoesOutOfBounds",
            Self::IsReservoirGas => "IsReservoirGas",
            Self::IsReservoirOil => "IsReservoirOil",
            Self::IsEndOfPath => "IsEndOfPath",
            Self::IsEliminated => "IsEliminated",
            Self::HeightGas => "HeightGas",
            Self::HeightOil => "HeightOil",
            Self::FaultStatus => "FaultStatus",
            Self::FiniteElementMinimumValue(_) => "FiniteElementMinimumValue",
            Self::AnalogFlowDirection => "AnalogFlowDirection",
            Self::FiniteElementGrad(_) => "FiniteElementGrad",
            Self::FiniteElementValue { .. } => "FiniteElementValue",
            Self::Composition => "Composition",
        }
    }
}

impl fmt::Display for ValueSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FiniteElementMinimumValue(p) | Self::FiniteElementGrad(p) => {
                write!(f, "{}({p})", self.name())
            }
            Self::FiniteElementValue { property, offset } => {
                write!(f, "{}({property}, {offset:?})", self.name())
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// A payload answering one [`ValueSpec`].
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// The addressed node does not exist.
    Invalid,
    /// A scalar, possibly [`strata_core::UNDEFINED`].
    Scalar(f64),
    /// A boolean flag.
    Flag(bool),
    /// A three-vector, [`Vec3::UNDEFINED`] when not computable.
    Vector(Vec3),
    /// A node reference.
    Node(Option<NodeKey>),
    /// A fault classification.
    Fault(FaultStatus),
    /// A composition.
    Composition(Box<Composition>),
}

impl Value {
    /// Variant name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Invalid => "Invalid",
            Self::Scalar(_) => "Scalar",
            Self::Flag(_) => "Flag",
            Self::Vector(_) => "Vector",
            Self::Node(_) => "Node",
            Self::Fault(_) => "Fault",
            Self::Composition(_) => "Composition",
        }
    }

    /// `true` for [`Value::Invalid`].
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }

    fn unexpected(&self, expected: &'static str) -> CommError {
        CommError::UnexpectedValue {
            expected,
            found: self.kind(),
        }
    }

    /// The scalar payload.
    pub fn scalar(&self) -> Result<f64, CommError> {
        match self {
            Self::Scalar(v) => Ok(*v),
            other => Err(other.unexpected("Scalar")),
        }
    }

    /// The flag payload.
    pub fn flag(&self) -> Result<bool, CommError> {
        match self {
            Self::Flag(v) => Ok(*v),
            other => Err(other.unexpected("Flag")),
        }
    }

    /// The vector payload.
    pub fn vector(&self) -> Result<Vec3, CommError> {
        match self {
            Self::Vector(v) => Ok(*v),
            other => Err(other.unexpected("Vector")),
        }
    }

    /// The node payload.
    pub fn node(&self) -> Result<Option<NodeKey>, CommError> {
        match self {
            Self::Node(v) => Ok(*v),
            other => Err(other.unexpected("Node")),
        }
    }

    /// The fault payload.
    pub fn fault(&self) -> Result<FaultStatus, CommError> {
        match self {
            Self::Fault(v) => Ok(*v),
            other => Err(other.unexpected("Fault")),
        }
    }

    /// The composition payload.
    pub fn into_composition(self) -> Result<Composition, CommError> {
        match self {
            Self::Composition(c) => Ok(*c),
            other => Err(other.unexpected("Composition")),
        }
    }
}

/// Asks the owner of `address` for one field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Request {
    /// The addressed node.
    pub address: NodeKey,
    /// The wanted field.
    pub spec: ValueSpec,
}

impl Request {
    /// Create a request.
    pub fn new(address: NodeKey, spec: ValueSpec) -> Self {
        Self { address, spec }
    }
}

/// Answer to a [`Request`], echoing its address.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    /// The address the request named.
    pub address: NodeKey,
    /// The payload.
    pub value: Value,
}

/// Answers requests for nodes owned by this rank.
///
/// Implementations read authoritative local state only and never issue
/// requests of their own.
pub trait RequestHandler {
    /// Answer one request.
    fn handle(&self, request: &Request) -> Value;
}
