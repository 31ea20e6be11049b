pub mod common;
pub mod config;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod server;
