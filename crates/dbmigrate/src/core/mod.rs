//! Core abstractions shared by the builder, drivers and migration engine.
//!
//! - [`schema`]: entity schema and field metadata
//! - [`value`]: entities, bound parameters and rendered statements
//! - [`traits`]: dialect, provider and connector traits
//! - [`catalog`]: driver registry for dependency injection
//! - [`identifier`]: identifier validation and quoting

pub mod catalog;
pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use catalog::DriverCatalog;
pub use schema::{Field, FieldType, Schema};
pub use traits::{Connector, Dialect, Provider, SelectQueryOptions};
pub use value::{from_entity, to_entity, BoundParam, Entity, Statement};
