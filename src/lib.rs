pub mod cli;
pub mod icloud;
pub mod keep;
pub mod load_config;
pub mod server;

pub use cli::{run, Cli, Commands};
