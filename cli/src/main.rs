//! Corral CLI - Command-line interface for the Corral orchestrator
//!
//! Sign up, log in, and manage your compute session

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Corral CLI - Per-user compute sessions
#[derive(Parser)]
#[command(name = "corral")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the Corral session orchestrator", long_about = None)]
struct Cli {
    /// Corral API URL
    #[arg(short, long, env = "CORRAL_API_URL", default_value = "http://127.0.0.1:8080")]
    api_url: String,

    /// Bearer token from `corral login`
    #[arg(short, long, env = "CORRAL_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Signup {
        username: String,

        #[arg(short, long, env = "CORRAL_PASSWORD")]
        password: String,
    },

    /// Log in and print a token
    Login {
        username: String,

        #[arg(short, long, env = "CORRAL_PASSWORD")]
        password: String,
    },

    /// Start a session (or show the running one)
    Start {
        owner: String,

        /// Image to run instead of the default
        #[arg(short, long)]
        image: Option<String>,
    },

    /// Stop a session; the user's volume is kept
    Stop {
        owner: String,

        /// Keep the stopped container instead of removing it
        #[arg(long)]
        keep_container: bool,
    },

    /// Get session information
    Status { owner: String },

    /// Approve a pending signup (admin)
    Approve { identity: String },

    /// Grant administrator rights (admin)
    Elevate { identity: String },

    /// List all sessions (admin)
    Sessions,

    /// Get server health status
    Health,
}

/// Error body returned by the orchestrator
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(default)]
    details: Option<Value>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("this command needs a token; run `corral login` and pass --token or set CORRAL_TOKEN")]
    MissingToken,
}

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    active_sessions: u64,
    #[serde(default)]
    runtime_version: Option<String>,
}

struct Api {
    client: Client,
    base: String,
    token: Option<String>,
}

impl Api {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.trim_end_matches('/'), path)
    }

    fn authed(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.token.as_deref().ok_or(CliError::MissingToken)?;
        Ok(request.bearer_auth(token))
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().context("Failed to send request")?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let text = response.text().unwrap_or_default();
        Err(api_error(status, &text).into())
    }
}

fn api_error(status: u16, text: &str) -> CliError {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => {
            let message = match body.details.as_ref().and_then(|d| d["locked_until"].as_str()) {
                Some(until) => format!("{} (retry after {})", body.message, until),
                None => body.message,
            };
            CliError::Api {
                status,
                code: body.error,
                message,
            }
        }
        Err(_) => CliError::Api {
            status,
            code: "UNKNOWN".to_string(),
            message: text.trim().to_string(),
        },
    }
}

fn print_session(session: &Value) {
    let state = session["state"].as_str().unwrap_or("?");
    let state = match state {
        "running" => state.green(),
        "stopped" => state.red(),
        _ => state.yellow(),
    };

    println!("{}", "=".repeat(50).bright_blue());
    println!("{} {}", "Owner:".bright_cyan(), session["owner"].as_str().unwrap_or("?"));
    println!("{} {}", "State:".bright_cyan(), state);
    println!("{} {}", "Image:".bright_cyan(), session["image"].as_str().unwrap_or("?"));
    if let Some(ip) = session["internal_ip"].as_str() {
        println!("{} {}", "Address:".bright_cyan(), ip);
    }
    println!("{} {}", "Volume:".bright_cyan(), session["volume"].as_str().unwrap_or("?"));
    println!("{} {}", "Last activity:".bright_cyan(), session["last_activity"].as_str().unwrap_or("?"));
    println!("{}", "=".repeat(50).bright_blue());
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let api = Api {
        client: Client::new(),
        base: cli.api_url,
        token: cli.token,
    };

    match cli.command {
        Commands::Signup { username, password } => {
            let request = api
                .client
                .post(api.url("/api/v1/auth/signup"))
                .json(&Credentials {
                    username: &username,
                    password: &password,
                });
            let result: Value = api.send(request)?.json().context("Failed to parse response")?;

            if result["approved"].as_bool().unwrap_or(false) {
                println!("{} {}", "✓ Account created:".green(), username);
            } else {
                println!(
                    "{} {} (an administrator must approve it before you can log in)",
                    "✓ Signup received:".yellow(),
                    username
                );
            }
        }

        Commands::Login { username, password } => {
            let request = api
                .client
                .post(api.url("/api/v1/auth/login"))
                .json(&Credentials {
                    username: &username,
                    password: &password,
                });
            let token: TokenResponse = api.send(request)?.json().context("Failed to parse response")?;

            eprintln!("{} valid for {}s", "✓ Logged in,".green(), token.expires_in);
            println!("{}", token.token);
        }

        Commands::Start { owner, image } => {
            let request = api
                .client
                .post(api.url(&format!("/api/v1/sessions/{}", owner)))
                .json(&json!({ "image": image }));
            let session: Value = api
                .send(api.authed(request)?)?
                .json()
                .context("Failed to parse response")?;
            print_session(&session);
        }

        Commands::Stop {
            owner,
            keep_container,
        } => {
            let request = api
                .client
                .delete(api.url(&format!("/api/v1/sessions/{}", owner)))
                .query(&[("remove", (!keep_container).to_string())]);
            api.send(api.authed(request)?)?;
            println!("{} {}", "✓ Session stopped:".green(), owner);
        }

        Commands::Status { owner } => {
            let request = api
                .client
                .get(api.url(&format!("/api/v1/sessions/{}", owner)));
            let session: Value = api
                .send(api.authed(request)?)?
                .json()
                .context("Failed to parse response")?;
            print_session(&session);
        }

        Commands::Approve { identity } => {
            let request = api
                .client
                .post(api.url(&format!("/api/v1/admin/users/{}/approve", identity)));
            api.send(api.authed(request)?)?;
            println!("{} {}", "✓ Approved:".green(), identity);
        }

        Commands::Elevate { identity } => {
            let request = api
                .client
                .post(api.url(&format!("/api/v1/admin/users/{}/elevate", identity)));
            api.send(api.authed(request)?)?;
            println!("{} {}", "✓ Elevated:".green(), identity);
        }

        Commands::Sessions => {
            let request = api.client.get(api.url("/api/v1/admin/sessions"));
            let sessions: Vec<Value> = api
                .send(api.authed(request)?)?
                .json()
                .context("Failed to parse response")?;

            println!("{}", "Sessions:".bright_cyan().bold());
            for session in &sessions {
                println!(
                    "  {:<24} {:<10} {}",
                    session["owner"].as_str().unwrap_or("?"),
                    session["state"].as_str().unwrap_or("?"),
                    session["internal_ip"].as_str().unwrap_or("-")
                );
            }
        }

        Commands::Health => {
            let response = api.send(api.client.get(api.url("/health")))?;
            let health: HealthResponse = response.json().context("Failed to parse response")?;

            println!("{}", "Corral Orchestrator Status".bright_cyan().bold());
            println!("{}", "=".repeat(40).bright_blue());
            println!("{} {}", "Status:".cyan(),
                if health.status == "healthy" {
                    health.status.green()
                } else {
                    health.status.yellow()
                }
            );
            println!("{} {}", "Version:".cyan(), health.version);
            println!("{} {}s", "Uptime:".cyan(), health.uptime_seconds);
            println!("{} {}", "Active Sessions:".cyan(), health.active_sessions);
            if let Some(runtime) = health.runtime_version {
                println!("{} {}", "Runtime:".cyan(), runtime);
            }
        }
    }

    Ok(())
}
