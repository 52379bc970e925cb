//! SMTP client transport towards the outbound relay
//!
//! Negotiates an authenticated, encrypted session in one of two modes:
//! - direct TLS: the socket is wrapped in TLS immediately on connect
//!   (conventionally port 465)
//! - upgrade in place: a plaintext session is promoted to TLS via STARTTLS
//!   after the first capability handshake, then the handshake is repeated
//!   over the encrypted channel
//!
//! Authentication rejections are surfaced as a permanent error so the
//! delivery layer never retries them. Every connection is opened for a
//! single transaction and fully closed afterwards; dropping the connection
//! closes the socket on failure paths.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rustls::{ClientConfig, RootCertStore, ServerName};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::error::{MailerError, Result};

/// Upper bound on a single relay reply.
const REPLY_BUFFER_LIMIT: usize = 16 * 1024;

/// Unified stream over plaintext and encrypted relay connections, so the
/// command dialogue reads the same before and after a STARTTLS upgrade.
enum SmtpStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    /// Transient state while the plaintext socket is being wrapped in TLS.
    Upgrading,
}

impl SmtpStream {
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
            Self::Tls(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
            Self::Upgrading => {
                return Err(MailerError::Tls(
                    "stream unavailable during TLS upgrade".to_string(),
                ))
            }
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
            Self::Upgrading => {
                return Err(MailerError::Tls(
                    "stream unavailable during TLS upgrade".to_string(),
                ))
            }
        };
        if n == 0 {
            return Err(MailerError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "relay closed the connection",
            )));
        }
        Ok(n)
    }
}

/// A parsed relay reply. For multi-line replies the code is taken from the
/// final line, matching how relays terminate a reply group.
#[derive(Debug)]
pub(crate) struct Reply {
    pub code: u16,
    pub message: String,
}

impl Reply {
    fn parse(text: &str) -> Result<Self> {
        let last = text.lines().last().ok_or_else(|| {
            MailerError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "empty reply from relay",
            ))
        })?;

        let code = last
            .get(..3)
            .and_then(|digits| digits.parse::<u16>().ok())
            .ok_or_else(|| {
                MailerError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("malformed reply from relay: {}", last.trim()),
                ))
            })?;

        let message = text
            .lines()
            .map(|line| line.get(4..).unwrap_or("").trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(Self { code, message })
    }
}

/// A reply group is complete once the last received line uses the
/// `NNN<space>` form rather than the `NNN-` continuation form.
fn reply_complete(text: &str) -> bool {
    if !text.ends_with('\n') {
        return false;
    }
    match text.lines().last() {
        Some(line) if line.len() >= 4 => line.as_bytes()[3] == b' ',
        Some(line) => line.len() == 3 && line.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// An authenticated session with the relay, ready for message submission.
pub struct SmtpConnection {
    stream: SmtpStream,
}

impl SmtpConnection {
    /// Connects, negotiates encryption according to the configured mode,
    /// and authenticates. Fails with a permanent error on rejected
    /// credentials and a transient error on everything else.
    pub async fn open(config: &RelayConfig) -> Result<Self> {
        let (username, password) = config.require_credentials()?;

        debug!(
            "Connecting to relay {}:{} (ssl={})",
            config.host, config.port, config.use_ssl
        );
        let tcp = TcpStream::connect((config.host.as_str(), config.port)).await?;

        let mut conn = if config.use_ssl {
            let tls = tls_connect(&config.host, tcp).await?;
            Self {
                stream: SmtpStream::Tls(Box::new(tls)),
            }
        } else {
            Self {
                stream: SmtpStream::Plain(tcp),
            }
        };

        let greeting = conn.read_reply().await?;
        if greeting.code != 220 {
            return Err(MailerError::SmtpReject {
                code: greeting.code,
                message: greeting.message,
            });
        }

        let hostname = local_hostname();
        conn.command(&format!("EHLO {hostname}"), 250).await?;

        if !config.use_ssl {
            conn.command("STARTTLS", 220).await?;

            let previous = std::mem::replace(&mut conn.stream, SmtpStream::Upgrading);
            let SmtpStream::Plain(tcp) = previous else {
                return Err(MailerError::Tls(
                    "connection already encrypted before STARTTLS".to_string(),
                ));
            };
            let tls = tls_connect(&config.host, tcp).await?;
            conn.stream = SmtpStream::Tls(Box::new(tls));
            debug!("STARTTLS upgrade complete");

            // Capabilities must be re-read over the encrypted channel.
            conn.command(&format!("EHLO {hostname}"), 250).await?;
        }

        conn.authenticate(username, password).await?;
        info!("Authenticated with relay {}:{}", config.host, config.port);

        Ok(conn)
    }

    /// Submits one message in a single transaction.
    pub async fn submit(&mut self, from: &str, to: &str, data: &[u8]) -> Result<()> {
        self.command(&format!("MAIL FROM:<{from}>"), 250).await?;
        self.command(&format!("RCPT TO:<{to}>"), 250).await?;
        self.command("DATA", 354).await?;

        self.stream.write_all(data).await?;

        // End with CRLF.CRLF if not already present
        if !data.ends_with(b"\r\n.\r\n") {
            if !data.ends_with(b"\r\n") {
                self.stream.write_all(b"\r\n").await?;
            }
            self.stream.write_all(b".\r\n").await?;
        }

        let reply = self.read_reply().await?;
        if reply.code != 250 {
            return Err(MailerError::SmtpReject {
                code: reply.code,
                message: reply.message,
            });
        }

        Ok(())
    }

    /// Polite teardown. Failures are ignored; dropping the connection
    /// closes the socket either way.
    pub async fn quit(mut self) {
        if self.stream.write_all(b"QUIT\r\n").await.is_ok() {
            let _ = self.read_reply().await;
        }
    }

    async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        let token = BASE64.encode(format!("\0{username}\0{password}"));
        debug!("> AUTH PLAIN ****");
        self.stream
            .write_all(format!("AUTH PLAIN {token}\r\n").as_bytes())
            .await?;

        let reply = self.read_reply().await?;
        match reply.code {
            235 => Ok(()),
            534 | 535 => {
                warn!("Relay rejected credentials: {} {}", reply.code, reply.message);
                Err(MailerError::AuthenticationFailed(format!(
                    "{} {}",
                    reply.code, reply.message
                )))
            }
            _ => Err(MailerError::SmtpReject {
                code: reply.code,
                message: reply.message,
            }),
        }
    }

    /// Sends one command line and checks the reply against the expected code.
    async fn command(&mut self, line: &str, expected: u16) -> Result<Reply> {
        debug!("> {line}");
        self.stream
            .write_all(format!("{line}\r\n").as_bytes())
            .await?;

        let reply = self.read_reply().await?;
        if reply.code != expected {
            return Err(MailerError::SmtpReject {
                code: reply.code,
                message: reply.message,
            });
        }
        Ok(reply)
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        loop {
            let n = self.stream.read(&mut chunk).await?;
            buf.extend_from_slice(&chunk[..n]);

            if buf.len() > REPLY_BUFFER_LIMIT {
                return Err(MailerError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "relay reply exceeded buffer limit",
                )));
            }

            if reply_complete(&String::from_utf8_lossy(&buf)) {
                break;
            }
        }

        let text = String::from_utf8_lossy(&buf);
        let reply = Reply::parse(&text)?;
        debug!("< {} {}", reply.code, reply.message);
        Ok(reply)
    }
}

/// Wraps a TCP stream in client-side TLS, trusting the system roots.
async fn tls_connect(host: &str, tcp: TcpStream) -> Result<TlsStream<TcpStream>> {
    let mut roots = RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs()
        .map_err(|e| MailerError::Tls(format!("failed to load system trust roots: {e}")))?;
    for cert in certs {
        if let Err(e) = roots.add(&rustls::Certificate(cert.0)) {
            warn!("Skipping unusable trust root: {}", e);
        }
    }
    if roots.is_empty() {
        return Err(MailerError::Tls(
            "no usable system trust roots".to_string(),
        ));
    }

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let server_name = ServerName::try_from(host)
        .map_err(|e| MailerError::Tls(format!("invalid relay hostname '{host}': {e}")))?;

    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| MailerError::Tls(e.to_string()))
}

fn local_hostname() -> String {
    gethostname::gethostname().to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_complete() {
        assert!(reply_complete("220 relay ready\r\n"));
        assert!(reply_complete("250-SIZE 10240000\r\n250 AUTH PLAIN LOGIN\r\n"));
        assert!(reply_complete("220\r\n"));
        assert!(!reply_complete("250-SIZE 10240000\r\n"));
        assert!(!reply_complete("250 partial"));
        assert!(!reply_complete(""));
    }

    #[test]
    fn test_parse_single_line_reply() {
        let reply = Reply::parse("250 OK\r\n").unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.message, "OK");
    }

    #[test]
    fn test_parse_multiline_reply_uses_last_code() {
        let reply = Reply::parse("250-relay.example.com\r\n250-SIZE 10240000\r\n250 AUTH PLAIN\r\n")
            .unwrap();
        assert_eq!(reply.code, 250);
        assert!(reply.message.contains("AUTH PLAIN"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Reply::parse("not an smtp reply\r\n").is_err());
        assert!(Reply::parse("").is_err());
    }

    #[test]
    fn test_auth_plain_token_format() {
        let token = BASE64.encode(format!("\0{}\0{}", "user@example.com", "secret"));
        let decoded = BASE64.decode(&token).unwrap();
        assert_eq!(decoded, b"\0user@example.com\0secret");
    }
}
