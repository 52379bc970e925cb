//! Delivery engine with bounded retry
//!
//! Owns the authenticated send: each attempt acquires a fresh relay
//! connection, submits the whole message, and closes the connection before
//! the next attempt. The retry decision is a switch over the tagged error
//! returned by the transport: permanent errors abort immediately, transient
//! ones back off exponentially up to the configured bound.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::{MailerError, Result};
use crate::message::OutboundMessage;
use crate::smtp::transport::SmtpConnection;

/// One complete delivery attempt. Implementations open and fully close
/// whatever resources they need; nothing is reused between attempts.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, message: &OutboundMessage) -> Result<()>;
}

/// Production transport: one SMTP transaction per attempt against the
/// configured relay.
pub struct SmtpTransport {
    config: Arc<RelayConfig>,
}

impl SmtpTransport {
    pub fn new(config: Arc<RelayConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn deliver(&self, message: &OutboundMessage) -> Result<()> {
        let data = message.to_mime()?;

        let mut conn = SmtpConnection::open(&self.config).await?;
        conn.submit(&message.from_addr, &message.to_addr, &data)
            .await?;
        conn.quit().await;

        Ok(())
    }
}

/// Outcome of a successful delivery.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryReceipt {
    /// 1-based number of the attempt that succeeded.
    pub attempts: u32,
}

pub struct MailSender {
    config: Arc<RelayConfig>,
    transport: Arc<dyn Transport>,
}

impl MailSender {
    pub fn new(config: Arc<RelayConfig>) -> Self {
        let transport = Arc::new(SmtpTransport::new(Arc::clone(&config)));
        Self { config, transport }
    }

    /// Replaces the relay transport, used by tests to script outcomes.
    pub fn with_transport(config: Arc<RelayConfig>, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Sends the message, retrying transient failures with exponential
    /// backoff. Attempts are numbered 0..=max_retries; each one is bounded
    /// by the configured per-attempt timeout.
    pub async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt> {
        self.config.require_credentials()?;

        info!(
            "Sending report to {} via {}:{} (ssl={})",
            message.to_addr, self.config.host, self.config.port, self.config.use_ssl
        );

        let mut attempt: u32 = 0;
        loop {
            let result = match timeout(self.config.timeout(), self.transport.deliver(message)).await
            {
                Ok(result) => result,
                Err(_) => Err(MailerError::Timeout(self.config.timeout())),
            };

            match result {
                Ok(()) => {
                    info!("Report sent to {} on attempt {}", message.to_addr, attempt + 1);
                    return Ok(DeliveryReceipt {
                        attempts: attempt + 1,
                    });
                }
                Err(e) if e.is_permanent() => {
                    error!("Delivery aborted, not retrying: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Attempt {} failed: {}", attempt + 1, e);
                    if attempt >= self.config.max_retries {
                        return Err(MailerError::RetriesExhausted {
                            attempts: attempt + 1,
                            source: Box::new(e),
                        });
                    }

                    let delay = Duration::from_secs(2_u64.saturating_pow(attempt).min(10));
                    debug!("Retrying in {:?}", delay);
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
