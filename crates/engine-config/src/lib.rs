pub mod env;
pub mod error;
pub mod report;
pub mod settings;
