//! Environment-sourced configuration
//!
//! The whole configuration is read once at startup into an immutable
//! [`AppConfig`] and shared by reference. Missing relay credentials are a
//! valid (but non-functional) state: the service starts, reports
//! `smtp_configured: false` on its health endpoint, and only fails when a
//! send is attempted.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{MailerError, Result};

/// Sender identity used when neither SMTP_FROM nor a username is set.
const DEFAULT_FROM: &str = "no-reply@forensiclens.com";

/// Dev-server origins allowed by default for cross-origin requests.
const DEFAULT_ORIGINS: &str =
    "http://localhost:3000,http://127.0.0.1:3000,http://localhost:5173,http://127.0.0.1:5173";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub listen_addr: String,
    pub allowed_origins: Vec<String>,
    /// Pre-built frontend bundle directory, mounted when it exists on disk.
    pub frontend_dist: String,
    pub favicon_path: String,
}

/// Connection parameters for the outbound mail relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Envelope and header sender identity.
    pub from_addr: String,
    /// true: TLS immediately on connect (conventionally port 465).
    /// false: plaintext connect upgraded in place via STARTTLS.
    pub use_ssl: bool,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let username = env_first(&["SMTP_USER", "EMAIL_USER"]);
        let password = env_first(&["SMTP_PASS", "EMAIL_PASSWORD"]);
        let from_addr = env_first(&["SMTP_FROM"])
            .or_else(|| username.clone())
            .unwrap_or_else(|| DEFAULT_FROM.to_string());

        Self {
            http: HttpConfig {
                listen_addr: env_or("HTTP_ADDR", "0.0.0.0:8000"),
                allowed_origins: parse_origins(&env_or("CORS_ORIGINS", DEFAULT_ORIGINS)),
                frontend_dist: env_or("FRONTEND_DIST", "dist"),
                favicon_path: env_or("FAVICON_PATH", "static/favicon.ico"),
            },
            relay: RelayConfig {
                host: env_first(&["SMTP_HOST", "EMAIL_HOST"])
                    .unwrap_or_else(|| "smtp.gmail.com".to_string()),
                port: env_or("SMTP_PORT", "587").parse().unwrap_or(587),
                username,
                password,
                from_addr,
                use_ssl: parse_bool(&env_or("SMTP_SECURE", "false")),
                max_retries: env_or("EMAIL_MAX_RETRIES", "3").parse().unwrap_or(3),
                timeout_secs: env_or("EMAIL_TIMEOUT", "15").parse().unwrap_or(15),
            },
        }
    }
}

impl RelayConfig {
    /// Whether enough is configured for delivery to be attempted at all.
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && self.username.is_some() && self.password.is_some()
    }

    /// Returns the credential pair, or a configuration error describing
    /// which fields are unset. The password value is never included.
    pub fn require_credentials(&self) -> Result<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) if !self.host.is_empty() => Ok((user, pass)),
            _ => Err(MailerError::Config(format!(
                "HOST={}, USER={}, PASS={}",
                if self.host.is_empty() { "unset" } else { &self.host },
                self.username.as_deref().unwrap_or("unset"),
                if self.password.is_some() { "***" } else { "unset" },
            ))),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            allowed_origins: parse_origins(DEFAULT_ORIGINS),
            frontend_dist: "dist".to_string(),
            favicon_path: "static/favicon.ico".to_string(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            username: None,
            password: None,
            from_addr: DEFAULT_FROM.to_string(),
            use_ssl: false,
            max_retries: 3,
            timeout_secs: 15,
        }
    }
}

fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| std::env::var(key).ok().filter(|value| !value.is_empty()))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}
