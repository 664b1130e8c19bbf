//! Session lifecycle and state core for running many AI coding agents inside
//! tmux across several projects.

pub mod agents;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod store;
pub mod ticker;
pub mod tmux;

pub use crate::core::SessionCore;
pub use config::Config;
pub use error::CoreError;
