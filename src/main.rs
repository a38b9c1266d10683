//! chq - run a query against ClickHouse over HTTP.

mod cli;

use std::time::Duration;

use anyhow::Context;
use ch_http::config::{Config, ConnectionConfig};
use ch_http::{logging, ChError, Command, Connection};
use cli::Cli;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    logging::init_stderr_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let mut connection_config = resolve_connection(&cli, &config)?;
    if let Some(timeout) = cli.timeout {
        connection_config.set_timeout(Duration::from_secs(timeout))?;
    }
    info!("Connection: {}", connection_config.display_string());

    let connection = Connection::new(connection_config)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling query");
                cancel.cancel();
            }
        }
    });

    if cli.version_only {
        connection
            .open_with(&cancel)
            .await
            .context("Handshake failed")?;
        println!("{}", connection.server_version()?);
        return Ok(());
    }

    let sql = cli.read_sql()?;
    let mut command = Command::on(&connection, sql);
    command.set_cancellation_token(cancel);
    for param in cli.parameters()? {
        command.add_parameter(param);
    }
    if let Some(query_id) = &cli.query_id {
        command = command.with_query_id(query_id.clone());
    }

    let output = match command.execute_raw().await {
        Ok(output) => output,
        Err(ChError::Cancelled) => anyhow::bail!("Query cancelled"),
        Err(e) => return Err(e).context("Query failed"),
    };
    print!("{output}");

    if let Some(stats) = command.query_stats() {
        info!(
            "Read {} rows ({} bytes), wrote {} rows",
            stats.read_rows, stats.read_bytes, stats.written_rows
        );
    }

    Ok(())
}

/// Resolves the final connection configuration from CLI args, config file, and environment.
fn resolve_connection(cli: &Cli, config: &Config) -> anyhow::Result<ConnectionConfig> {
    // CLI arguments win over the config file.
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = Some(
                config
                    .get_connection(Some(name))
                    .cloned()
                    .with_context(|| format!("Connection '{name}' not found in config file"))?,
            );
        }
    }

    let mut connection = connection
        .or_else(|| config.get_connection(None).cloned())
        .unwrap_or_default();

    connection.apply_env_defaults();
    Ok(connection)
}
