//! SMTP delivery towards the outbound relay
//!
//! - [`transport`]: relay session negotiation (TLS/STARTTLS, AUTH) and the
//!   command dialogue for a single transaction
//! - [`sender`]: retry/backoff orchestration over the transport

pub mod sender;
pub mod transport;

pub use sender::{DeliveryReceipt, MailSender, SmtpTransport, Transport};
pub use transport::SmtpConnection;
