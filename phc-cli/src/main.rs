//! PHC CLI - customers, orders and articles with custom fields.
//!
//! Commands:
//! - `phc init`: Create the entity and custom field tables if missing
//! - `phc fields list|get <kind> [code]`: Inspect field definitions
//! - `phc get <kind> <id>`: Show an entity with its custom fields
//! - `phc list <kind>`: Page through entities
//! - `phc create <kind> --base <json> --fields <json>`: Create an entity
//! - `phc update <kind> <id> [--base <json>] [--fields <json>]`: Update an entity
//!
//! Results are printed to stdout as pretty JSON.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Rejected input
//! - 2: Entity or field definition not found
//! - 3: Any other failure

use clap::Parser;
use phc::commands::{execute, open_context, CliError, EXIT_CLIENT_ERROR};
use phc::{logging, Cli};
use phc_config::types::DEFAULT_LOG_FILTER;
use phc_config::{ConfigProvider, PhcConfig};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    let explicit = logging::explicit_filter(cli.debug);
    let from_config = explicit.is_none();
    let initial = explicit.unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (subscriber, filter_handle) = logging::subscriber(initial, std::io::stderr);
    subscriber.init();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(EXIT_CLIENT_ERROR);
        }
    };
    if from_config {
        logging::apply_configured(&filter_handle, &config.log.filter);
    }

    std::process::exit(run(cli, &config));
}

fn load_config(cli: &Cli) -> Result<PhcConfig, CliError> {
    let provider = match &cli.config {
        Some(path) => ConfigProvider::new().with_file(path),
        None => ConfigProvider::new(),
    };
    let mut config = provider.load()?;
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    Ok(config)
}

fn run(cli: Cli, config: &PhcConfig) -> i32 {
    let result = open_context(config).and_then(|ctx| execute(&ctx, cli.command));
    match result.and_then(|value| Ok(serde_json::to_string_pretty(&value)?)) {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}
