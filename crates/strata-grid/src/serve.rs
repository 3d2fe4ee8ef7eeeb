//! Answering peer requests from the local stack.

use strata_comm::{Request, RequestHandler, Value, ValueSpec};
use strata_core::Phase;

use crate::element::offset_point;
use crate::stack::FormationStack;

impl RequestHandler for FormationStack {
    fn handle(&self, request: &Request) -> Value {
        let key = request.address;
        if self.local(key).is_none() {
            return Value::Invalid;
        }
        match request.spec {
            ValueSpec::TargetFormationNode => Value::Node(self.target_of(key)),
            ValueSpec::AdjacentNode => Value::Node(self.adjacent_of(key)),
            ValueSpec::Depth => Value::Scalar(self.depth_of(key)),
            ValueSpec::IsValid => Value::Flag(self.is_valid(key)),
            ValueSpec::IsImpermeable => Value::Flag(self.is_impermeable(key)),
            ValueSpec::HasNowhereToGo => Value::Flag(self.has_nowhere_to_go(key)),
            ValueSpec::HasNoThickness => Value::Flag(self.has_no_thickness(key)),
            ValueSpec::GoesOutOfBounds => Value::Flag(self.goes_out_of_bounds(key)),
            ValueSpec::IsReservoirGas => Value::Flag(self.is_reservoir(key, Phase::Gas)),
            ValueSpec::IsReservoirOil => Value::Flag(self.is_reservoir(key, Phase::Oil)),
            ValueSpec::IsEndOfPath => Value::Flag(self.is_end_of_path(key)),
            ValueSpec::IsEliminated => Value::Flag(self.is_eliminated(key)),
            ValueSpec::HeightGas => Value::Scalar(self.height_of(key, Phase::Gas)),
            ValueSpec::HeightOil => Value::Scalar(self.height_of(key, Phase::Oil)),
            ValueSpec::FaultStatus => Value::Fault(self.fault_of(key)),
            ValueSpec::FiniteElementMinimumValue(property) => {
                Value::Scalar(self.fe_minimum(key, property))
            }
            ValueSpec::AnalogFlowDirection => Value::Vector(self.flow_direction_of(key)),
            ValueSpec::FiniteElementGrad(property) => Value::Vector(self.fe_gradient(key, property)),
            ValueSpec::FiniteElementValue { property, offset } => {
                let [di, dj, dk] = offset.map(i32::from);
                Value::Scalar(self.fe_value(key, property, offset_point(di, dj, dk)))
            }
            ValueSpec::Composition => Value::Composition(Box::new(self.composition_of(key))),
        }
    }
}
