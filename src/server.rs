use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, Method},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::app::App;
use crate::config::AppConfig;
use crate::dispatch::{ApiHandler, Reply, RequestContext};
use crate::error::ApiError;
use crate::middleware::{rate_limit_middleware, RateLimiter};

/// The HTTP front of the service: one catch-all API route plus health
pub struct UserServer {
    app: App,
}

impl UserServer {
    pub fn new(app: App) -> Self {
        Self { app }
    }

    pub fn router(&self) -> Router {
        let config = &self.app.config;

        let mut api = Router::new()
            .route("/api/:module_name/:fn_name", any(api_entry))
            .with_state(self.app.api.clone());

        if config.api.enable_rate_limiting {
            let limiter = Arc::new(RateLimiter::from_config(&config.api));
            api = api.layer(from_fn_with_state(limiter, rate_limit_middleware));
        }

        Router::new()
            .route("/health", get(health))
            .with_state(Arc::clone(config))
            .merge(api)
            .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes))
            .layer(cors_layer(config))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured port and serve until Ctrl-C or SIGTERM
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.app.config.server.port));
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(
            "{} is running on port: {}",
            self.app.config.server.service_name.to_uppercase(),
            addr.port()
        );
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let router = self.router();
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        tracing::info!("Server stopped");
        Ok(())
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins = &config.security.cors_origins;
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health(State(config): State<Arc<AppConfig>>) -> Response {
    Reply::ok(json!({
        "service": config.server.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
    .into_response()
}

async fn api_entry(
    State(api): State<ApiHandler>,
    Path((module_name, fn_name)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let query = query.as_deref().map(parse_form).unwrap_or_default();

    let body = match parse_body(&headers, &body) {
        Ok(body) => body,
        Err(e) => return e.into_response(),
    };

    let ctx = RequestContext::new(method, module_name, fn_name)
        .with_headers(headers)
        .with_query(query)
        .with_body(body);

    api.handle(ctx).await.into_response()
}

/// `a=1&b=x` into string fields; a repeated key keeps its last value
pub fn parse_form(raw: &str) -> Map<String, Value> {
    url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

pub fn parse_body(headers: &HeaderMap, body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        return Ok(parse_form(&String::from_utf8_lossy(body)));
    }

    if content_type.is_empty() || content_type.contains("json") {
        return match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(ApiError::bad_request("invalid JSON body")),
        };
    }

    // Other content types carry no fields
    Ok(Map::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
