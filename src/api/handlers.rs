//! API request handlers

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::{MailerError, Result};
use crate::message::{OutboundMessage, ReportMetadata};
use crate::smtp::MailSender;
use crate::utils::validate_email;

/// Shared application state
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sender: MailSender,
}

/// Send-report request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReportRequest {
    pub recipient_email: String,
    pub filename: String,
    pub pdf_base64: String,
    #[serde(default)]
    pub metadata: Option<ReportMetadata>,
}

/// Delivery outcome echoed inside the success response
#[derive(Debug, Serialize)]
pub struct DeliveryDetails {
    pub ok: bool,
    pub message: String,
    pub attempt: u32,
}

/// Send-report success response
#[derive(Debug, Serialize)]
pub struct SendReportResponse {
    pub ok: bool,
    pub message: String,
    pub recipient: String,
    pub filename: String,
    pub details: DeliveryDetails,
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub detail: String,
}

impl ErrorDetail {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Health response; reports credential presence, never the credential value.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub smtp_configured: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_from: String,
    pub smtp_use_ssl: bool,
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let relay = &state.config.relay;
    Json(HealthResponse {
        ok: true,
        smtp_configured: relay.is_configured(),
        smtp_host: relay.host.clone(),
        smtp_port: relay.port,
        smtp_user: relay.username.clone(),
        smtp_from: relay.from_addr.clone(),
        smtp_use_ssl: relay.use_ssl,
    })
}

/// POST /api/send-report - decode, build, and relay a report
pub async fn send_report(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SendReportRequest>,
) -> Response {
    // Recipient syntax is checked before the payload is even decoded.
    if let Err(e) = validate_email(&payload.recipient_email) {
        warn!("Rejected send request: {}", e);
        return (StatusCode::BAD_REQUEST, Json(ErrorDetail::new(e.to_string()))).into_response();
    }

    let pdf_bytes = match decode_pdf(&payload.pdf_base64) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Rejected send request: {}", e);
            return (StatusCode::BAD_REQUEST, Json(ErrorDetail::new(e.to_string())))
                .into_response();
        }
    };

    let message = OutboundMessage::build(
        &state.config.relay.from_addr,
        &payload.recipient_email,
        &payload.filename,
        pdf_bytes,
        payload.metadata.as_ref(),
    );

    match state.sender.send(&message).await {
        Ok(receipt) => {
            info!(
                "Report {} delivered to {}",
                payload.filename, payload.recipient_email
            );
            (
                StatusCode::OK,
                Json(SendReportResponse {
                    ok: true,
                    message: "Report sent successfully".to_string(),
                    recipient: payload.recipient_email,
                    filename: payload.filename,
                    details: DeliveryDetails {
                        ok: true,
                        message: "Email sent successfully".to_string(),
                        attempt: receipt.attempts,
                    },
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to send report: {}", e);
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(ErrorDetail::new(e.to_string()))).into_response()
        }
    }
}

/// OPTIONS /api/send-report - cross-origin preflight no-op
pub async fn send_report_preflight() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

/// GET /.well-known/appspecific/com.chrome.devtools.json
pub async fn devtools_probe() -> impl IntoResponse {
    Json(serde_json::json!({}))
}

/// GET /favicon.ico - the icon file when present, an empty 204 otherwise
pub async fn favicon(State(state): State<Arc<AppState>>) -> Response {
    match tokio::fs::read(&state.config.http.favicon_path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/x-icon")], bytes).into_response(),
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Strict base64 decode of the report payload; empty results are rejected
/// so no delivery is ever attempted for a contentless request.
fn decode_pdf(encoded: &str) -> Result<Vec<u8>> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| MailerError::InvalidPayload(e.to_string()))?;
    if bytes.is_empty() {
        return Err(MailerError::InvalidPayload("PDF is empty".to_string()));
    }
    Ok(bytes)
}
