#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::net::TcpListener;

use school_api_rust::app::App;
use school_api_rust::config::{AppConfig, SuperAdminSeed};
use school_api_rust::server::UserServer;
use school_api_rust::store::MemoryStore;

pub const ADMIN_USERNAME: &str = "root_admin";
pub const ADMIN_PASSWORD: &str = "root-password-1";

/// A server running in-process on its own port with a fresh in-memory store
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Development config with a seeded superadmin
    pub async fn start() -> Result<Self> {
        let mut config = AppConfig::development();
        config.superadmin = Some(SuperAdminSeed {
            username: ADMIN_USERNAME.to_string(),
            password: ADMIN_PASSWORD.to_string(),
            email: "root@school.test".to_string(),
        });
        Self::start_with(config).await
    }

    pub async fn start_with(mut config: AppConfig) -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        config.server.port = port;
        // Minimum bcrypt cost keeps logins fast
        config.security.password_hash_cost = 4;

        let app = App::build(Arc::new(config), Arc::new(MemoryStore::new()))?;
        app.seed().await;

        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to bind port {}", port))?;
        tokio::spawn(async move {
            if let Err(e) = UserServer::new(app).serve(listener).await {
                eprintln!("test server stopped: {e:#}");
            }
        });

        let server = Self {
            port,
            base_url: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
        };
        server.wait_ready(Duration::from_secs(10)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let url = format!("{}/health", self.base_url);
        while Instant::now() < deadline {
            if let Ok(resp) = self.client.get(&url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn api_url(&self, module: &str, function: &str) -> String {
        format!("{}/api/{}/{}", self.base_url, module, function)
    }

    /// Call an API function with an optional token and JSON body; returns status and envelope
    pub async fn call(
        &self,
        method: reqwest::Method,
        module: &str,
        function: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut request = self.client.request(method, self.api_url(module, function));
        if let Some(token) = token {
            request = request.header("token", token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let envelope = response.json::<Value>().await?;
        Ok((status, envelope))
    }

    /// GET with query parameters
    pub async fn get(
        &self,
        module: &str,
        function: &str,
        token: &str,
        query: &[(&str, &str)],
    ) -> Result<(StatusCode, Value)> {
        let response = self
            .client
            .get(self.api_url(module, function))
            .header("token", token)
            .query(query)
            .send()
            .await?;
        let status = response.status();
        Ok((status, response.json::<Value>().await?))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let (status, envelope) = self
            .call(
                reqwest::Method::POST,
                "user",
                "login",
                None,
                Some(serde_json::json!({ "username": username, "password": password })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::OK, "login failed with {}: {}", status, envelope);
        envelope["data"]["token"]
            .as_str()
            .map(str::to_string)
            .context("login response had no token")
    }

    pub async fn login_admin(&self) -> Result<String> {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await
    }
}
