pub mod core;
pub mod period;
pub mod records;
pub mod snapshot;
