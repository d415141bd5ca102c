//! Connection state machine and the data contracts it enforces

pub mod error;
pub mod events;
pub mod manager;
pub mod state_machine;
pub mod types;
