//! Declarative descriptor table.
//!
//! Entity types are keyed by [`EntityTag`]; every type lists its fields,
//! associations, optional parent type and the derived-field rules it
//! declares. Nothing here is discovered at runtime: hosts build the table in
//! code (builder methods) or load it from config (`crate::config`).

pub mod entity;
pub mod field;
pub mod rule;

pub use entity::{EntityModel, EntityTag};
pub use field::{AssociationModel, FieldKind, FieldModel};
pub use rule::{AggregateFunction, AggregateRule, ExclusiveRule};
