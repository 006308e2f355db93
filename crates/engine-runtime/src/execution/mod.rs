pub mod collectors;
pub mod executor;
pub mod factory;
pub mod workers;
