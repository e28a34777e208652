//! In-memory periodic table used as the demo's pooled service.

use svcpool_core::{
    into_instance, DescriptorError, Instance, InterfaceType, OperationDescriptor,
    ServiceInterface, Value, ValueType,
};

pub const SERVICE_ID: &str = "PeriodicTable";

/// (name, symbol, atomic number, atomic weight)
type Element = (&'static str, &'static str, i64, f64);

const ELEMENTS: &[Element] = &[
    ("Hydrogen", "H", 1, 1.008),
    ("Helium", "He", 2, 4.0026),
    ("Lithium", "Li", 3, 6.94),
    ("Beryllium", "Be", 4, 9.0122),
    ("Boron", "B", 5, 10.81),
    ("Carbon", "C", 6, 12.011),
    ("Nitrogen", "N", 7, 14.007),
    ("Oxygen", "O", 8, 15.999),
    ("Fluorine", "F", 9, 18.998),
    ("Neon", "Ne", 10, 20.180),
    ("Sodium", "Na", 11, 22.990),
    ("Magnesium", "Mg", 12, 24.305),
    ("Aluminium", "Al", 13, 26.982),
    ("Silicon", "Si", 14, 28.085),
    ("Phosphorus", "P", 15, 30.974),
    ("Sulfur", "S", 16, 32.06),
    ("Chlorine", "Cl", 17, 35.45),
    ("Argon", "Ar", 18, 39.948),
    ("Potassium", "K", 19, 39.098),
    ("Calcium", "Ca", 20, 40.078),
];

pub trait PeriodicTable: Send {
    fn atoms(&mut self) -> Vec<String>;
    fn atomic_weight(&mut self, element: &str) -> anyhow::Result<f64>;
    fn atomic_number(&mut self, element: &str) -> anyhow::Result<i64>;
    fn element_symbol(&mut self, element: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Default)]
pub struct InMemoryPeriodicTable;

impl InMemoryPeriodicTable {
    fn find(element: &str) -> anyhow::Result<&'static Element> {
        ELEMENTS
            .iter()
            .find(|(name, symbol, ..)| name.eq_ignore_ascii_case(element) || *symbol == element)
            .ok_or_else(|| anyhow::anyhow!("unknown element {element}"))
    }
}

impl PeriodicTable for InMemoryPeriodicTable {
    fn atoms(&mut self) -> Vec<String> {
        ELEMENTS.iter().map(|(name, ..)| (*name).to_string()).collect()
    }

    fn atomic_weight(&mut self, element: &str) -> anyhow::Result<f64> {
        Ok(Self::find(element)?.3)
    }

    fn atomic_number(&mut self, element: &str) -> anyhow::Result<i64> {
        Ok(Self::find(element)?.2)
    }

    fn element_symbol(&mut self, element: &str) -> anyhow::Result<String> {
        Ok(Self::find(element)?.1.to_string())
    }
}

impl ServiceInterface for dyn PeriodicTable {
    fn operations() -> Result<Vec<OperationDescriptor>, DescriptorError> {
        Ok(vec![
            OperationDescriptor::builder("atoms")
                .result(ValueType::Array)
                .bind::<dyn PeriodicTable, _>(|table, _| {
                    Ok(Value::Array(table.atoms().into_iter().map(Value::from).collect()))
                })
                .build()?,
            OperationDescriptor::builder("atomic_weight")
                .parameter(ValueType::String)
                .result(ValueType::Float)
                .bind::<dyn PeriodicTable, _>(|table, args| {
                    Ok(table.atomic_weight(Value::str_at(args, 0)?)?.into())
                })
                .build()?,
            OperationDescriptor::builder("atomic_number")
                .parameter(ValueType::String)
                .result(ValueType::Int)
                .bind::<dyn PeriodicTable, _>(|table, args| {
                    Ok(table.atomic_number(Value::str_at(args, 0)?)?.into())
                })
                .build()?,
            OperationDescriptor::builder("element_symbol")
                .parameter(ValueType::String)
                .result(ValueType::String)
                .bind::<dyn PeriodicTable, _>(|table, args| {
                    Ok(table.element_symbol(Value::str_at(args, 0)?)?.into())
                })
                .build()?,
        ])
    }
}

/// Instance factory for the registry.
#[allow(clippy::unnecessary_wraps)]
pub fn create(_interface: &InterfaceType) -> anyhow::Result<Instance> {
    let table: Box<dyn PeriodicTable> = Box::<InMemoryPeriodicTable>::default();
    Ok(into_instance(table))
}

/// Element names, for spreading demo calls across the table.
pub fn element_names() -> impl Iterator<Item = &'static str> {
    ELEMENTS.iter().map(|(name, ..)| *name)
}
