//! Application layer: render orchestration over the domain model.

pub mod context;
pub mod include;
pub mod repos;
