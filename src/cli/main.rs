use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::io::Read;

#[derive(Parser)]
#[command(name = "triage-cli")]
#[command(about = "Incident triage service CLI", long_about = None)]
struct Cli {
    #[arg(short, long, env = "TRIAGE_ENDPOINT", default_value = "http://localhost:8000")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Triage an alert
    Triage {
        /// Alert text; `-` reads it from stdin
        #[arg(value_name = "ALERT_TEXT")]
        alert_text: Option<String>,

        /// Read the alert text from a file
        #[arg(short, long, conflicts_with = "alert_text")]
        file: Option<String>,

        #[arg(short, long)]
        service: Option<String>,

        #[arg(short = 'E', long)]
        environment: Option<String>,

        #[arg(long, default_value = "cli")]
        source: String,
    },

    /// Check server health
    Health,

    /// Inspect or replace the escalation routing tables
    Routing {
        #[command(subcommand)]
        action: RoutingAction,
    },
}

#[derive(Subcommand)]
enum RoutingAction {
    /// Print the active routing tables
    Show,

    /// Replace the routing tables with the JSON document in FILE
    Set {
        #[arg(value_name = "FILE")]
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let endpoint = cli.endpoint.trim_end_matches('/');

    let response = match cli.command {
        Commands::Triage {
            alert_text,
            file,
            service,
            environment,
            source,
        } => {
            let alert_text = read_alert(alert_text, file)?;
            client
                .post(format!("{}/triage", endpoint))
                .json(&json!({
                    "alert_text": alert_text,
                    "service_name": service,
                    "environment": environment,
                    "source": source,
                }))
                .send()
                .await
        }

        Commands::Health => client.get(format!("{}/health", endpoint)).send().await,

        Commands::Routing { action } => match action {
            RoutingAction::Show => client.get(format!("{}/v1/routing", endpoint)).send().await,
            RoutingAction::Set { file } => {
                let raw = std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file))?;
                let tables: Value = serde_json::from_str(&raw)
                    .with_context(|| format!("{} is not valid JSON", file))?;
                client
                    .put(format!("{}/v1/routing", endpoint))
                    .json(&tables)
                    .send()
                    .await
            }
        },
    }
    .with_context(|| format!("request to {} failed", endpoint))?;

    print_response(response).await
}

fn read_alert(alert_text: Option<String>, file: Option<String>) -> Result<String> {
    match (alert_text, file) {
        (_, Some(path)) => {
            std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path))
        }
        (Some(text), None) if text == "-" => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read alert from stdin")?;
            Ok(buffer)
        }
        (Some(text), None) => Ok(text),
        (None, None) => bail!("provide ALERT_TEXT, `-` for stdin, or --file"),
    }
}

async fn print_response(response: Response) -> Result<()> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .context("server returned a non-JSON body")?;

    if !status.is_success() {
        let detail = body
            .get("detail")
            .and_then(Value::as_str)
            .unwrap_or("no detail provided");
        bail!("server returned {}: {}", status, detail);
    }

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
