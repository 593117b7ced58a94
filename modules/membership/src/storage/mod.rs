//! Storage layer: `SeaORM` entities, field mappings and the repository.

pub mod entity;
pub mod fields;
pub mod repository;
