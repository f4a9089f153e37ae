pub mod connectors;
pub mod schema;
pub mod type_mapper;
