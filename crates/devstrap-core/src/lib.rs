pub mod config;
pub mod manifest;
pub mod observability;
pub mod platform;
pub mod state;
