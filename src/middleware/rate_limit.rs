use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::ApiConfig;
use crate::error::ApiError;

const LOGIN_PATH: &str = "/api/user/login";
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter per client address.
/// Every `/api/` request counts against the global limit; login requests
/// additionally count against the tighter login limit.
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<HashMap<(&'static str, String), Window>>,
    window: Duration,
    global_max: u32,
    login_max: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, global_max: u32, login_max: u32) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window,
            global_max,
            login_max,
        }
    }

    pub fn from_config(api: &ApiConfig) -> Self {
        Self::new(
            Duration::from_secs(api.rate_limit_window_secs),
            api.rate_limit_requests,
            api.login_rate_limit_requests,
        )
    }

    /// Count one hit; false once the client is over `max` for the current window
    fn hit(&self, scope: &'static str, client: &str, max: u32, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        if windows.len() > PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = windows
            .entry((scope, client.to_string()))
            .or_insert(Window { started: now, count: 0 });

        if now.duration_since(entry.started) >= self.window {
            *entry = Window { started: now, count: 0 };
        }

        entry.count += 1;
        entry.count <= max
    }

    pub fn allow(&self, path: &str, client: &str) -> bool {
        let now = Instant::now();
        let mut allowed = self.hit("api", client, self.global_max, now);
        if path.starts_with(LOGIN_PATH) {
            allowed &= self.hit("login", client, self.login_max, now);
        }
        allowed
    }
}

fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_key(request.headers(), peer);
    let path = request.uri().path().to_string();

    if !limiter.allow(&path, &client) {
        tracing::warn!("Rate limit exceeded for {} on {}", client, path);
        return ApiError::too_many_requests("too many requests, please try again later").into_response();
    }

    next.run(request).await
}
