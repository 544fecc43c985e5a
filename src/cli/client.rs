use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::{Map, Value};

use super::config::Session;

/// What the server answered for one API call
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(&self) -> bool {
        self.body.get("ok").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn data(&self) -> &Value {
        self.body.get("data").unwrap_or(&Value::Null)
    }

    pub fn errors(&self) -> &Value {
        self.body.get("errors").unwrap_or(&Value::Null)
    }

    /// Errors flattened into one line for text output
    pub fn error_message(&self) -> String {
        match self.errors() {
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join(", "),
            Value::Null => format!("request failed with status {}", self.status),
            other => other.to_string(),
        }
    }
}

/// Thin HTTP client over `/api/{module}/{fn}`
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_session(session: &Session) -> anyhow::Result<Self> {
        Self::new(session.server_url.clone(), session.token.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> anyhow::Result<ApiResponse> {
        let response = self.http.get(format!("{}/health", self.base_url)).send().await?;
        Self::read(response).await
    }

    pub async fn call(
        &self,
        method: Method,
        module: &str,
        function: &str,
        query: &[(String, String)],
        body: Option<&Map<String, Value>>,
    ) -> anyhow::Result<ApiResponse> {
        let url = format!("{}/api/{}/{}", self.base_url, module, function);
        let mut request = self.http.request(method, url).query(query);

        if let Some(token) = &self.token {
            request = request.header("token", token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        Self::read(request.send().await?).await
    }

    async fn read(response: reqwest::Response) -> anyhow::Result<ApiResponse> {
        let status = response.status();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| anyhow::anyhow!("server returned non-JSON response ({}): {}", status, e))?
        };
        Ok(ApiResponse { status, body })
    }
}
