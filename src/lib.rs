//! mailer-rs: ForensicLens report mailer
//!
//! A small backend service that accepts a generated PDF report over HTTP
//! and relays it as an email attachment through an outbound SMTP relay.
//!
//! # Features
//!
//! - **Report endpoint**: JSON API accepting a base64-encoded PDF plus
//!   descriptive metadata
//! - **Message assembly**: subject/body derivation and MIME rendering with
//!   the PDF attached
//! - **Secure relay transport**: direct TLS or STARTTLS upgrade, with
//!   SMTP authentication
//! - **Bounded retry**: transient failures retried with exponential
//!   backoff; authentication and configuration failures never retried
//!
//! # Example
//!
//! ```no_run
//! use mailer_rs::api::ApiServer;
//! use mailer_rs::config::AppConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(AppConfig::from_env());
//!     let server = ApiServer::new(config);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Environment-sourced configuration
//! - [`error`]: Error types and retry classification
//! - [`message`]: Outbound message assembly
//! - [`smtp`]: Relay transport and delivery engine
//! - [`api`]: HTTP surface
//! - [`utils`]: Validation helpers

pub mod api;
pub mod config;
pub mod error;
pub mod message;
pub mod smtp;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{MailerError, Result};
