//! HTTP API module
//!
//! Provides the report submission endpoint, health reporting, and the
//! peripheral routes (preflight, devtools probe, favicon, SPA hosting).

pub mod handlers;
pub mod server;

pub use server::ApiServer;
