use clap::Subcommand;
use reqwest::Method;

use crate::cli::client::ApiClient;
use crate::cli::config::load_session;
use crate::cli::utils::{output_api_response, parse_body, parse_pairs};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum ApiCommands {
    #[command(about = "Call /api/<module>/<function> with the stored token")]
    Call {
        #[arg(help = "Module name, e.g. school")]
        module: String,
        #[arg(help = "Function name, e.g. listSchools")]
        function: String,
        #[arg(short = 'X', long, help = "HTTP verb (defaults to POST with --data, GET otherwise)")]
        method: Option<String>,
        #[arg(short, long, help = "JSON object request body")]
        data: Option<String>,
        #[arg(short, long = "query", help = "Query parameter as key=value (repeatable)")]
        query: Vec<String>,
    },
}

pub async fn handle(cmd: ApiCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ApiCommands::Call {
            module,
            function,
            method,
            data,
            query,
        } => {
            let body = parse_body(data.as_deref())?;
            let query = parse_pairs(&query)?;
            let method = match method {
                Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                    .map_err(|_| anyhow::anyhow!("invalid HTTP method '{}'", m))?,
                None if body.is_some() => Method::POST,
                None => Method::GET,
            };

            let session = load_session()?;
            let client = ApiClient::from_session(&session)?;
            let response = client.call(method, &module, &function, &query, body.as_ref()).await?;
            output_api_response(&output_format, &response)
        }
    }
}
