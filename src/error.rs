use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("SMTP attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("SMTP relay rejected command: {code} {message}")]
    SmtpReject { code: u16, message: String },

    #[error("SMTP authentication failed: {0}. Check your credentials.")]
    AuthenticationFailed(String),

    #[error("SMTP not configured. Current values: {0}")]
    Config(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Invalid base64 PDF data: {0}")]
    InvalidPayload(String),

    #[error("Failed to send email after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        source: Box<MailerError>,
    },

    #[error("Failed to assemble message: {0}")]
    Message(String),
}

impl MailerError {
    /// Errors that must never be retried. Everything else is eligible for
    /// bounded retry with backoff.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_)
                | Self::Config(_)
                | Self::InvalidEmail(_)
                | Self::InvalidPayload(_)
                | Self::Message(_)
        )
    }

    /// Errors caused by the caller's input, mapped to 4xx at the HTTP
    /// boundary. These never reach the relay.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidEmail(_) | Self::InvalidPayload(_))
    }
}

pub type Result<T> = std::result::Result<T, MailerError>;
