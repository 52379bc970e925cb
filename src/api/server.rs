//! API Server - router assembly and HTTP serving

use axum::{
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::api::handlers::{self, AppState, ErrorDetail};
use crate::config::AppConfig;
use crate::smtp::MailSender;

pub struct ApiServer {
    state: Arc<AppState>,
    addr: String,
}

impl ApiServer {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let sender = MailSender::new(Arc::new(config.relay.clone()));
        Self::with_sender(config, sender)
    }

    /// Builds the server around an externally constructed sender, used by
    /// tests to inject a scripted transport.
    pub fn with_sender(config: Arc<AppConfig>, sender: MailSender) -> Self {
        let addr = config.http.listen_addr.clone();
        Self {
            state: Arc::new(AppState { config, sender }),
            addr,
        }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let cors = cors_layer(&self.state.config.http.allowed_origins);

        let api_routes = Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/send-report",
                post(handlers::send_report).options(handlers::send_report_preflight),
            );

        let mut router = Router::new()
            .nest("/api", api_routes)
            .route(
                "/.well-known/appspecific/com.chrome.devtools.json",
                get(handlers::devtools_probe),
            )
            .route("/favicon.ico", get(handlers::favicon))
            .with_state(Arc::clone(&self.state))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::custom(handle_panic));

        // SPA bundle mounts attach after the API routes so API paths always
        // take precedence.
        let dist = Path::new(&self.state.config.http.frontend_dist);
        if dist.is_dir() {
            let assets = dist.join("assets");
            if assets.is_dir() {
                router = router.nest_service("/assets", ServeDir::new(assets));
            }
            let statics = dist.join("static");
            if statics.is_dir() {
                router = router.nest_service("/static", ServeDir::new(statics));
            }
            info!("Serving frontend bundle from {}", dist.display());
            router = router
                .fallback_service(ServeDir::new(dist).append_index_html_on_directories(true));
        }

        router
    }

    /// Start the API server
    pub async fn run(&self) -> std::io::Result<()> {
        let router = self.router();

        info!("Starting API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, router).await
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// Outermost error boundary: anything that escapes a handler is converted
/// to a generic server-error body instead of tearing down the connection.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unexpected internal error".to_string());

    error!("Request handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorDetail::new(format!(
            "Internal server error while sending email: {detail}"
        ))),
    )
        .into_response()
}
