// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Demo plant model served by `run` and printed by `browse`.
//!
//! ```text
//! Plant
//! ├── Name         "Demo Plant"
//! ├── Supervisor   -> Operator
//! ├── Operators    dictionary of Operator (keyed by badge)
//! └── Lines        collection of Line
//!     └── Line
//!         ├── Name, Throughput
//!         └── Machines  collection of Machine
//!             └── Machine
//!                 ├── Name, Temperature, Running (writable), Setpoint (writable)
//!                 └── Temperature@Unit  attribute
//! ```

use std::sync::Arc;

use trellis_core::{
    GraphResult, PropertyDescriptor, PropertyKind, Subject, SubjectContext, SubjectType,
    TypeRegistry, Value,
};

/// Builds the `Plant` root type.
pub fn plant_type() -> Arc<SubjectType> {
    Arc::new(
        SubjectType::new("Plant")
            .with_property(PropertyDescriptor::value("Name"))
            .with_property(PropertyDescriptor::reference("Supervisor").of_type("Operator"))
            .with_property(PropertyDescriptor::dictionary("Operators").of_type("Operator"))
            .with_property(PropertyDescriptor::collection("Lines").of_type("Line")),
    )
}

/// Builds the `Line` type.
pub fn line_type() -> Arc<SubjectType> {
    Arc::new(
        SubjectType::new("Line")
            .with_property(PropertyDescriptor::value("Name").writable())
            .with_property(PropertyDescriptor::value("Throughput"))
            .with_property(PropertyDescriptor::collection("Machines").of_type("Machine")),
    )
}

/// Builds the `Machine` type.
pub fn machine_type() -> Arc<SubjectType> {
    Arc::new(
        SubjectType::new("Machine")
            .with_property(PropertyDescriptor::value("Name"))
            .with_property(PropertyDescriptor::value("Temperature"))
            .with_property(PropertyDescriptor::attribute("Temperature", "Unit", PropertyKind::Value))
            .with_property(PropertyDescriptor::value("Running").writable())
            .with_property(PropertyDescriptor::value("Setpoint").writable()),
    )
}

/// Builds the `Operator` type.
pub fn operator_type() -> Arc<SubjectType> {
    Arc::new(
        SubjectType::new("Operator")
            .with_property(PropertyDescriptor::value("Name"))
            .with_property(PropertyDescriptor::value("Shift").writable()),
    )
}

/// Types clients may create through AddNodes.
pub fn type_registry() -> Arc<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    registry
        .register("Line", line_type())
        .register("Machine", machine_type())
        .register("Operator", operator_type());
    Arc::new(registry)
}

/// A populated demo plant.
#[derive(Debug)]
pub struct DemoPlant {
    /// Root subject.
    pub root: Arc<Subject>,
    /// Every machine, in line order.
    pub machines: Vec<Arc<Subject>>,
}

impl DemoPlant {
    /// Creates two lines with three machines each and two operators.
    pub fn build(context: &SubjectContext) -> GraphResult<Self> {
        let root = context.create_subject(plant_type());
        context.set_value(&root, "Name", "Demo Plant")?;

        let mut operators = Vec::new();
        for (badge, name, shift) in [("op-17", "Ada", "Early"), ("op-42", "Grace", "Late")] {
            let operator = context.create_subject(operator_type());
            context.set_value(&operator, "Name", name)?;
            context.set_value(&operator, "Shift", shift)?;
            context.insert_key(&root, "Operators", badge, operator.clone())?;
            operators.push(operator);
        }
        if let Some(first) = operators.first() {
            context.set_reference(&root, "Supervisor", Some(first.clone()))?;
        }

        let mut machines = Vec::new();
        for line_no in 1..=2 {
            let line = context.create_subject(line_type());
            context.set_value(&line, "Name", format!("Line {line_no}"))?;
            context.set_value(&line, "Throughput", 0.0_f64)?;
            for machine_no in 1..=3 {
                let machine = context.create_subject(machine_type());
                context.set_value(&machine, "Name", format!("M{line_no}{machine_no}"))?;
                context.set_value(&machine, "Temperature", 20.0_f64)?;
                context.set_value(&machine, "Temperature@Unit", "degC")?;
                context.set_value(&machine, "Running", true)?;
                context.set_value(&machine, "Setpoint", 65.0_f64)?;
                context.append(&line, "Machines", machine.clone())?;
                machines.push(machine);
            }
            context.append(&root, "Lines", line)?;
        }

        Ok(Self { root, machines })
    }

    /// Writes one round of simulated readings.
    ///
    /// Running machines drift towards their setpoint; stopped machines
    /// cool towards ambient.
    pub fn simulate_tick(&self, context: &SubjectContext, step: u64) -> GraphResult<()> {
        for (index, machine) in self.machines.iter().enumerate() {
            let current = as_f64(&machine.value("Temperature")?).unwrap_or(20.0);
            let running = matches!(machine.value("Running")?, Value::Bool(true));
            let target = if running {
                as_f64(&machine.value("Setpoint")?).unwrap_or(20.0)
            } else {
                20.0
            };
            let ripple = ((step + index as u64 * 7) % 5) as f64 * 0.1 - 0.2;
            let next = current + (target - current) * 0.25 + ripple;
            context.set_value(machine, "Temperature", (next * 10.0).round() / 10.0)?;
        }
        Ok(())
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float64(v) => Some(*v),
        Value::Float32(v) => Some(f64::from(*v)),
        Value::Int32(v) => Some(f64::from(*v)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_demo_plant() {
        let context = SubjectContext::new();
        let plant = DemoPlant::build(&context).unwrap();

        assert_eq!(plant.machines.len(), 6);
        assert_eq!(plant.root.child_count("Lines").unwrap(), 2);
        assert_eq!(plant.root.dictionary("Operators").unwrap().len(), 2);
        let supervisor = plant.root.reference("Supervisor").unwrap().unwrap();
        assert_eq!(supervisor.value("Name").unwrap(), Value::from("Ada"));
    }

    #[test]
    fn test_simulation_moves_towards_setpoint() {
        let context = SubjectContext::new();
        let plant = DemoPlant::build(&context).unwrap();
        for step in 0..20 {
            plant.simulate_tick(&context, step).unwrap();
        }

        let temperature = as_f64(&plant.machines[0].value("Temperature").unwrap()).unwrap();
        assert!((temperature - 65.0).abs() < 2.0, "{temperature}");
    }

    #[test]
    fn test_registry_resolves_creatable_types() {
        let registry = type_registry();
        assert!(registry.resolve("Machine").is_some());
        assert!(registry.resolve("Plant").is_none());
    }
}
