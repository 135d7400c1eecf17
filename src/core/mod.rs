pub mod capability;
pub mod capacity;
pub mod client;
pub mod config;
pub mod context;
pub mod helper;
pub mod installer;
pub mod lifecycle;
pub mod queue;
pub mod retry;
pub mod status;
pub mod store;
pub mod terminal;
pub mod workflow;

#[cfg(test)]
pub(crate) mod tests;
