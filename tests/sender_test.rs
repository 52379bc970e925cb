//! Delivery engine retry and classification behavior, driven through
//! scripted transports under paused tokio time.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use mailer_rs::config::RelayConfig;
use mailer_rs::error::{MailerError, Result};
use mailer_rs::message::OutboundMessage;
use mailer_rs::smtp::{MailSender, Transport};

fn test_config(max_retries: u32) -> Arc<RelayConfig> {
    Arc::new(RelayConfig {
        host: "smtp.example.com".to_string(),
        username: Some("reports@example.com".to_string()),
        password: Some("hunter2".to_string()),
        max_retries,
        ..RelayConfig::default()
    })
}

fn test_message() -> OutboundMessage {
    OutboundMessage::build(
        "reports@example.com",
        "detective@example.com",
        "report.pdf",
        b"%PDF-1.4".to_vec(),
        None,
    )
}

/// Records the instant of every attempt and always fails transiently.
struct AlwaysTransient {
    calls: AtomicU32,
    attempt_times: Mutex<Vec<Instant>>,
}

impl AlwaysTransient {
    fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            attempt_times: Mutex::new(Vec::new()),
        }
    }

    fn gaps(&self) -> Vec<Duration> {
        let times = self.attempt_times.lock().unwrap();
        times.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }
}

#[async_trait]
impl Transport for AlwaysTransient {
    async fn deliver(&self, _message: &OutboundMessage) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.attempt_times.lock().unwrap().push(Instant::now());
        Err(MailerError::SmtpReject {
            code: 451,
            message: "try again later".to_string(),
        })
    }
}

/// Rejects the credentials on every attempt.
struct AuthRejecting {
    calls: AtomicU32,
}

#[async_trait]
impl Transport for AuthRejecting {
    async fn deliver(&self, _message: &OutboundMessage) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(MailerError::AuthenticationFailed(
            "535 bad credentials".to_string(),
        ))
    }
}

/// Fails transiently until the configured attempt number, then succeeds.
struct SucceedsOnAttempt {
    calls: AtomicU32,
    succeed_on: u32,
}

#[async_trait]
impl Transport for SucceedsOnAttempt {
    async fn deliver(&self, _message: &OutboundMessage) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call < self.succeed_on {
            Err(MailerError::SmtpReject {
                code: 421,
                message: "service not available".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[tokio::test(start_paused = true)]
async fn transient_failures_exhaust_retries_with_backoff() {
    let transport = Arc::new(AlwaysTransient::new());
    let sender = MailSender::with_transport(test_config(4), transport.clone());

    let err = sender.send(&test_message()).await.unwrap_err();

    match err {
        MailerError::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 5);
            assert!(matches!(*source, MailerError::SmtpReject { code: 451, .. }));
        }
        other => panic!("expected RetriesExhausted, got {other}"),
    }

    assert_eq!(transport.calls.load(Ordering::SeqCst), 5);
    assert_eq!(
        transport.gaps(),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn backoff_is_capped_at_ten_seconds() {
    let transport = Arc::new(AlwaysTransient::new());
    let sender = MailSender::with_transport(test_config(6), transport.clone());

    let err = sender.send(&test_message()).await.unwrap_err();
    assert!(matches!(
        err,
        MailerError::RetriesExhausted { attempts: 7, .. }
    ));

    assert_eq!(
        transport.gaps(),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
            Duration::from_secs(10),
            Duration::from_secs(10),
        ]
    );
}

#[tokio::test]
async fn authentication_failure_is_never_retried() {
    let transport = Arc::new(AuthRejecting {
        calls: AtomicU32::new(0),
    });
    let sender = MailSender::with_transport(test_config(3), transport.clone());

    let err = sender.send(&test_message()).await.unwrap_err();

    assert!(matches!(err, MailerError::AuthenticationFailed(_)));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn success_on_third_attempt_reports_attempt_number() {
    let transport = Arc::new(SucceedsOnAttempt {
        calls: AtomicU32::new(0),
        succeed_on: 3,
    });
    let sender = MailSender::with_transport(test_config(3), transport.clone());

    let receipt = sender.send(&test_message()).await.unwrap();

    assert_eq!(receipt.attempts, 3);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn success_on_first_attempt() {
    let transport = Arc::new(SucceedsOnAttempt {
        calls: AtomicU32::new(0),
        succeed_on: 1,
    });
    let sender = MailSender::with_transport(test_config(3), transport.clone());

    let receipt = sender.send(&test_message()).await.unwrap();
    assert_eq!(receipt.attempts, 1);
}

#[tokio::test]
async fn missing_credentials_fail_before_any_attempt() {
    let transport = Arc::new(AlwaysTransient::new());
    let config = Arc::new(RelayConfig {
        host: "smtp.example.com".to_string(),
        username: Some("reports@example.com".to_string()),
        password: None,
        ..RelayConfig::default()
    });
    let sender = MailSender::with_transport(config, transport.clone());

    let err = sender.send(&test_message()).await.unwrap_err();

    assert!(matches!(err, MailerError::Config(_)));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
}
