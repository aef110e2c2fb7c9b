use std::path::PathBuf;

use clap::{Args, Parser};

use visit_gate::config::loader::{load_config, ConfigError};
use visit_gate::config::validation::validate_config;
use visit_gate::config::GateConfig;
use visit_gate::lifecycle::{self, ReloadSource, Shutdown};
use visit_gate::observability::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "visit-gate", version)]
#[command(about = "HTTP server with per-client visit gates and bounded admission", long_about = None)]
struct Cli {
    /// TOML configuration file. Flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not reload the configuration file when it changes.
    #[arg(long)]
    no_watch: bool,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Args, Debug, Clone)]
struct Overrides {
    /// Listen endpoint; repeat for several.
    #[arg(short, long = "listen", value_name = "ADDR")]
    listen: Vec<String>,

    /// Directory served as static files.
    #[arg(long, value_name = "DIR")]
    handler_source: Option<String>,

    #[arg(long, value_name = "DIR")]
    temp_dir: Option<String>,

    #[arg(long, value_name = "BYTES")]
    max_request_bytes: Option<u64>,

    /// Connections processed simultaneously.
    #[arg(long, value_name = "N")]
    max_concurrency: Option<usize>,

    #[arg(long, value_name = "COUNT")]
    visits_minimum: Option<u32>,

    #[arg(long, value_name = "SECS")]
    entry_time_secs: Option<u64>,

    #[arg(long, value_name = "COUNT")]
    visits_maximum: Option<u32>,

    /// Visit retention window.
    #[arg(long, value_name = "SECS")]
    keep_alive_secs: Option<u64>,

    #[arg(long, value_name = "SECS")]
    block_time_secs: Option<u64>,

    #[arg(long, value_name = "SECS")]
    client_lifetime_secs: Option<u64>,

    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Overrides {
    fn apply(&self, config: &mut GateConfig) {
        if !self.listen.is_empty() {
            config.server.listen = self.listen.clone();
        }
        if let Some(v) = &self.handler_source {
            config.server.handler_source = v.clone();
        }
        if let Some(v) = &self.temp_dir {
            config.server.temp_dir = v.clone();
        }
        if let Some(v) = self.max_request_bytes {
            config.server.max_request_bytes = v;
        }
        if let Some(v) = self.max_concurrency {
            config.server.max_concurrency = v;
        }
        if let Some(v) = self.visits_minimum {
            config.throttle.visits_minimum = v;
        }
        if let Some(v) = self.entry_time_secs {
            config.throttle.entry_time_secs = v;
        }
        if let Some(v) = self.visits_maximum {
            config.throttle.visits_maximum = v;
        }
        if let Some(v) = self.keep_alive_secs {
            config.throttle.keep_alive_secs = v;
        }
        if let Some(v) = self.block_time_secs {
            config.throttle.block_time_secs = v;
        }
        if let Some(v) = self.client_lifetime_secs {
            config.throttle.client_lifetime_secs = v;
        }
        if let Some(v) = &self.log_level {
            config.observability.log_level = v.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Cli {
        config: config_path,
        no_watch,
        overrides,
    } = Cli::parse();

    let mut config = match &config_path {
        Some(path) => load_config(path)?,
        None => GateConfig::default(),
    };
    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "visit-gate starting");

    let shutdown = Shutdown::new();
    lifecycle::spawn_signal_handler(&shutdown);

    let reload = config_path.filter(|_| !no_watch).map(|path| ReloadSource {
        path,
        overrides: Box::new(move |config: &mut GateConfig| overrides.apply(config)),
    });

    if let Err(e) = lifecycle::startup::run(config, reload, shutdown).await {
        tracing::error!(error = %e, "visit-gate failed");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
