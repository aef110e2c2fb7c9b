use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gate-cli")]
#[command(about = "Management CLI for a visit-gate server", long_about = None)]
struct Cli {
    /// Base URL of the gate server.
    #[arg(short, long, default_value = "http://127.0.0.1:50000")]
    url: String,

    /// Admin API key.
    #[arg(short, long, env = "GATE_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server status and slot usage
    Status,
    /// List tracked clients
    Clients {
        /// Only show blocked clients
        #[arg(long)]
        blocked: bool,
    },
    /// Lift the block on a client
    Unblock {
        /// Client address as shown by `clients`
        address: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match &cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Clients { .. } => client.get(format!("{base}/admin/clients")),
        Commands::Unblock { address } => {
            client.post(format!("{base}/admin/clients/{address}/unblock"))
        }
    };

    let res = request.headers(headers).send().await?;
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let mut json: Value = res.json().await?;
    if let (Commands::Clients { blocked: true }, Value::Array(clients)) = (&cli.command, &mut json) {
        clients.retain(|c| c["blocked"].as_bool().unwrap_or(false));
    }

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
