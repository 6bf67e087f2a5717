// quotactl - Quota Engine Command Line Tool
//
// Loads quota configuration, validates it and prints the default limit table.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quota_engine::config::{Config, LoggingConfig};
use quota_engine::quota::{DefaultLimits, Scope};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// quotactl: inspect quota configuration
#[derive(Parser, Debug)]
#[command(name = "quotactl")]
#[command(version = "0.1.0")]
#[command(about = "Inspect and validate quota configuration", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate the configuration
    Validate,
    /// Print the default limit table as JSON
    Defaults {
        /// Only print limits for one scope (global, org, user)
        #[arg(long)]
        scope: Option<Scope>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let path = args.config.clone().unwrap_or_else(Config::config_path);
    let config = Config::load_from_path(&path);

    // Logging comes up before errors are reported so they reach the log too
    let logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_tracing(&logging, args.verbose)?;

    let config = config?;
    debug!(?path, "Configuration loaded");

    match args.command {
        Commands::Validate => {
            info!("Configuration is valid");
            println!("OK");
        }
        Commands::Defaults { scope } => {
            let defaults = DefaultLimits::from_config(&config.quota)
                .context("Failed to build default limits")?;
            let output = render_defaults(&defaults, scope);
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))?
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
    Ok(())
}

/// Full table as `{target: {scope: limit}}`, or `{target: limit}` for one scope
fn render_defaults(defaults: &DefaultLimits, scope: Option<Scope>) -> Value {
    let mut out = Map::new();
    for (target, limits) in defaults.iter() {
        match scope {
            Some(scope) => {
                if let Some(limit) = limits.get(&scope) {
                    out.insert(target.to_string(), json!(limit));
                }
            }
            None => {
                let scopes: Map<String, Value> = Scope::ALL
                    .iter()
                    .filter_map(|s| limits.get(s).map(|l| (s.to_string(), json!(l))))
                    .collect();
                out.insert(target.to_string(), Value::Object(scopes));
            }
        }
    }
    Value::Object(out)
}
