//! Analog flow directions.
//!
//! The preferred migration direction of a node follows Darcy flow through
//! its permeability tensor. Depth grows downward, so straight up is
//! [`Vec3::UP`] `= (0, 0, -1)`.

use strata_core::{is_undefined, FormationId, NodeKey, PropertyId, Vec3, GRAVITY, PA_TO_MPA};
use strata_grid::FormationStack;

use crate::config::MigrationConfig;

/// Flow direction of the owned node at `key`, `None` for invalid nodes.
pub fn analog_flow_direction(
    stack: &FormationStack,
    key: NodeKey,
    config: &MigrationConfig,
) -> Option<Vec3> {
    let node = stack.local(key)?;
    if !node.is_valid() {
        return None;
    }
    if config.vertical_migration || !node.has_thickness() {
        return Some(Vec3::UP);
    }
    let element = stack.element(key)?;
    let ratio = node.props.horizontal_permeability / node.props.vertical_permeability;
    if !ratio.is_finite() || is_undefined(node.props.horizontal_permeability) {
        return Some(Vec3::UP);
    }
    let tensor = element.tensor(1.0, ratio);

    let phase = config.flow_phase;
    let capillary = stack.fe_gradient(key, phase.capillary_pressure());
    let pressure = stack.fe_gradient(key, PropertyId::Pressure);
    let density = node.props.density(phase);
    let force = if !config.dynamic
        || capillary.is_undefined()
        || pressure.is_undefined()
        || is_undefined(density)
    {
        Vec3::UP
    } else {
        let gradient = pressure + capillary * PA_TO_MPA;
        let buoyancy = Vec3::new(0.0, 0.0, density * GRAVITY * PA_TO_MPA);
        buoyancy - gradient
    };
    Some(tensor.apply(force).normalized())
}

/// Compute and store the flow direction of every owned node in layer
/// `k` of `formation`.
pub fn compute_layer(
    stack: &mut FormationStack,
    formation: FormationId,
    k: i32,
    config: &MigrationConfig,
) {
    let keys: Vec<NodeKey> = match stack.formation(formation) {
        Some(f) => f.array().layer_keys(k).collect(),
        None => return,
    };
    for key in keys {
        let direction = analog_flow_direction(stack, key, config);
        if let (Some(direction), Some(node)) = (direction, stack.local_mut(key)) {
            node.path.flow_direction = direction;
        }
    }
}
