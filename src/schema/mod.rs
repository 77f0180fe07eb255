//! Field schema definitions and registry.

pub mod definition;
pub mod registry;

pub use definition::{
    parse_date, parse_number, split_list, Condition, FieldConstraints, FieldDef, FieldProblem,
    FieldRole, FieldType, Schema,
};
pub use registry::{default_schema, SchemaRegistry, DEFAULT_SCHEMA};
