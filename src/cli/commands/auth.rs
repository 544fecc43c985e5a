use clap::Subcommand;
use reqwest::Method;
use serde_json::{json, Map, Value};

use crate::cli::client::ApiClient;
use crate::cli::config::{load_session, save_session};
use crate::cli::utils::{output_api_response, output_success};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Login and store the issued token")]
    Login {
        #[arg(help = "Username")]
        username: String,
        #[arg(long, env = "SCHOOL_PASSWORD", help = "Password (or SCHOOL_PASSWORD)")]
        password: String,
    },

    #[command(about = "Forget the stored token")]
    Logout,

    #[command(about = "Show current authentication status")]
    Status,

    #[command(about = "Show the logged-in user's profile")]
    Whoami,
}

pub async fn handle(cmd: AuthCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        AuthCommands::Login { username, password } => {
            let mut session = load_session()?;
            let client = ApiClient::new(session.server_url.clone(), None)?;

            let mut body = Map::new();
            body.insert("username".into(), Value::String(username.clone()));
            body.insert("password".into(), Value::String(password));

            let response = client.call(Method::POST, "user", "login", &[], Some(&body)).await?;
            if !response.ok() {
                return output_api_response(&output_format, &response);
            }

            let token = response
                .data()
                .get("token")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("login response did not include a token"))?
                .to_string();

            session.login(username.clone(), token);
            save_session(&session)?;

            output_success(
                &output_format,
                &format!("Logged in as {}", username),
                Some(json!({ "user": response.data().get("user").cloned().unwrap_or(Value::Null) })),
            )
        }
        AuthCommands::Logout => {
            let mut session = load_session()?;
            session.logout();
            save_session(&session)?;
            output_success(&output_format, "Logged out", None)
        }
        AuthCommands::Status => {
            let session = load_session()?;
            let message = match (&session.username, session.is_logged_in()) {
                (Some(username), true) => format!("Logged in to {} as {}", session.server_url, username),
                _ => format!("Not logged in to {}", session.server_url),
            };
            output_success(
                &output_format,
                &message,
                Some(json!({
                    "server_url": session.server_url,
                    "logged_in": session.is_logged_in(),
                    "username": session.username,
                    "logged_in_at": session.logged_in_at,
                })),
            )
        }
        AuthCommands::Whoami => {
            let session = load_session()?;
            if !session.is_logged_in() {
                return Err(anyhow::anyhow!("not logged in; run `school auth login <username>` first"));
            }
            let client = ApiClient::from_session(&session)?;
            let response = client.call(Method::GET, "user", "getProfile", &[], None).await?;
            output_api_response(&output_format, &response)
        }
    }
}
