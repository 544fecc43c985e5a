use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub superadmin: Option<SuperAdminSeed>,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub service_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_rate_limiting: bool,
    pub rate_limit_requests: u32,
    pub login_rate_limit_requests: u32,
    pub rate_limit_window_secs: u64,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub cors_origins: Vec<String>,
    pub long_token_secret: String,
    pub long_token_expiry_hours: u64,
    /// bcrypt work factor for stored passwords
    pub password_hash_cost: u32,
}

/// Credentials for the superadmin account created at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperAdminSeed {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Middleware names that run ahead of every handler's own stack
    pub pre_stack: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Some(port) = env::var("USER_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.server.port = port;
        }
        if let Ok(v) = env::var("SERVICE_NAME") {
            self.server.service_name = v;
        }

        // API overrides
        if let Ok(v) = env::var("API_ENABLE_RATE_LIMITING") {
            self.api.enable_rate_limiting = v.parse().unwrap_or(self.api.enable_rate_limiting);
        }
        if let Ok(v) = env::var("API_RATE_LIMIT_REQUESTS") {
            self.api.rate_limit_requests = v.parse().unwrap_or(self.api.rate_limit_requests);
        }
        if let Ok(v) = env::var("API_LOGIN_RATE_LIMIT_REQUESTS") {
            self.api.login_rate_limit_requests = v.parse().unwrap_or(self.api.login_rate_limit_requests);
        }
        if let Ok(v) = env::var("API_RATE_LIMIT_WINDOW_SECS") {
            self.api.rate_limit_window_secs = v.parse().unwrap_or(self.api.rate_limit_window_secs);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = split_list(&v);
        }
        if let Ok(v) = env::var("LONG_TOKEN_SECRET") {
            self.security.long_token_secret = v;
        }
        if let Ok(v) = env::var("LONG_TOKEN_EXPIRY_HOURS") {
            self.security.long_token_expiry_hours = v.parse().unwrap_or(self.security.long_token_expiry_hours);
        }
        if let Ok(v) = env::var("PASSWORD_HASH_COST") {
            self.security.password_hash_cost = v.parse().unwrap_or(self.security.password_hash_cost);
        }

        // Seed account is only configured when all three values are present
        if let (Ok(username), Ok(password), Ok(email)) = (
            env::var("SUPERADMIN_USERNAME"),
            env::var("SUPERADMIN_PASSWORD"),
            env::var("SUPERADMIN_EMAIL"),
        ) {
            self.superadmin = Some(SuperAdminSeed { username, password, email });
        }

        if let Ok(v) = env::var("DISPATCH_PRE_STACK") {
            self.dispatch.pre_stack = split_list(&v);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 5111,
                service_name: "school-api".to_string(),
            },
            api: ApiConfig {
                enable_rate_limiting: false,
                rate_limit_requests: 1000,
                login_rate_limit_requests: 100,
                rate_limit_window_secs: 15 * 60,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                cors_origins: vec!["*".to_string()],
                long_token_secret: "development-long-token-secret".to_string(),
                long_token_expiry_hours: 24 * 365 * 3, // 3 years
                password_hash_cost: 12,
            },
            superadmin: None,
            dispatch: DispatchConfig::default(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 5111,
                service_name: "school-api".to_string(),
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                rate_limit_requests: 100,
                login_rate_limit_requests: 10,
                rate_limit_window_secs: 15 * 60,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            security: SecurityConfig {
                cors_origins: vec!["*".to_string()],
                long_token_secret: String::new(),
                long_token_expiry_hours: 24 * 7,
                password_hash_cost: 12,
            },
            superadmin: None,
            dispatch: DispatchConfig::default(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 5111,
                service_name: "school-api".to_string(),
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                rate_limit_requests: 100,
                login_rate_limit_requests: 10,
                rate_limit_window_secs: 15 * 60,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                cors_origins: vec!["*".to_string()],
                long_token_secret: String::new(),
                long_token_expiry_hours: 24 * 7,
                password_hash_cost: 12,
            },
            superadmin: None,
            dispatch: DispatchConfig::default(),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
