pub mod aggregate;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod retry;
pub mod selector;
pub mod source;
pub mod stage;

#[cfg(test)]
pub(crate) mod testing;
