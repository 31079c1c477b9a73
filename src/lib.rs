pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod query;
pub mod table_display;
pub mod wire;
