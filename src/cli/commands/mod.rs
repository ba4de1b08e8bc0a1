//! Subcommand implementations

mod config;
mod import;
mod serve;

pub use config::config;
pub use import::import;
pub use serve::serve;
