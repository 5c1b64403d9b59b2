pub mod api;
pub mod chat;
pub mod config;
pub mod session;
pub mod telemetry;
pub mod transport;
