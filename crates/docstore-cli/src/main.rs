//! docstore CLI - document store facade demonstration
//!
//! Usage:
//!   docstore                                   Run against mongodb://localhost:27017
//!   docstore --uri mongodb://host:27017/blog   Use a connection string
//!   docstore --host db --port 27018            Use discrete host/port
//!   docstore --config docstore.toml            Load settings from a TOML file
//!   docstore --keep --json                     Keep existing data, print JSON
//!
//! Settings are layered: config file, then DOCSTORE_* environment variables,
//! then command-line flags.
//!
//! Exit codes: 0 success, 2 connection, 3 authentication, 4 validation, 1 other.

mod demo;
mod post;

use anyhow::{Context, Result};
use clap::Parser;
use docstore_mongodb::{ConnectionHandle, Credentials, DocStoreError, FacadeConfig, RetryConfig};
use std::path::PathBuf;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "docstore")]
#[command(about = "Connect to MongoDB and run a short insert/find demonstration", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML file with connection settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Connection string (overrides --host/--port)
    #[arg(long)]
    uri: Option<String>,

    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(long)]
    port: Option<u16>,

    /// Username for authentication
    #[arg(short, long, requires = "password")]
    username: Option<String>,

    /// Password for authentication
    #[arg(short, long, requires = "username")]
    password: Option<String>,

    /// Authentication database
    #[arg(long)]
    auth_source: Option<String>,

    /// Database to work in
    #[arg(short, long)]
    database: Option<String>,

    /// Connect timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Retry a failed connection this many times with exponential backoff
    #[arg(long)]
    retries: Option<u32>,

    /// Keep existing data instead of dropping the database first
    #[arg(long)]
    keep: bool,

    /// Print records as JSON
    #[arg(long)]
    json: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        error!(kind = error_kind(&e), error = %e, "docstore demo failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    let options = demo::DemoOptions {
        keep: cli.keep,
        json: cli.json,
    };

    let mut handle = ConnectionHandle::connect(&config)
        .await
        .context("Failed to connect")?;

    let outcome = demo::run(&mut handle, options).await;
    handle.close().await?;
    outcome.context("Demonstration failed")
}

/// Layer file, environment and flags into one config
fn build_config(cli: &Cli) -> Result<FacadeConfig> {
    let mut config = match &cli.config {
        Some(path) => FacadeConfig::from_file(path)?,
        None => FacadeConfig::default(),
    };
    config.apply_env()?;

    if let Some(uri) = &cli.uri {
        config.uri = Some(uri.clone());
    }
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let (Some(username), Some(password)) = (&cli.username, &cli.password) {
        let mut credentials = Credentials::new(username.clone(), password.clone());
        credentials.source = cli.auth_source.clone();
        config.credentials = Some(credentials);
    }
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(retries) = cli.retries {
        config.retry = RetryConfig::exponential(retries, 100, 5_000);
    }

    config.validate()?;
    Ok(config)
}

/// Map the failure to the process exit status
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<DocStoreError>() {
        Some(DocStoreError::Connection(_)) => 2,
        Some(DocStoreError::Auth(_)) => 3,
        Some(DocStoreError::Validation(_)) => 4,
        _ => 1,
    }
}

fn error_kind(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<DocStoreError>()
        .map_or("other", DocStoreError::kind)
}

/// Initialize logging based on log level
fn init_logging(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok(); // Ignore error if already initialized

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("docstore").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_flags_override_defaults() {
        let cli = parse(&[
            "--host", "db.internal", "--port", "27018", "--database", "blog", "--timeout-ms", "900",
        ]);
        let config = build_config(&cli).unwrap();

        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 27018);
        assert_eq!(config.database, "blog");
        assert_eq!(config.timeout_ms, 900);
    }

    #[test]
    fn test_cli_credentials_and_retries() {
        let cli = parse(&["-u", "ada", "-p", "secret", "--auth-source", "admin", "--retries", "3"]);
        let config = build_config(&cli).unwrap();

        let creds = config.credentials.unwrap();
        assert_eq!(creds.username, "ada");
        assert_eq!(creds.source.as_deref(), Some("admin"));
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_cli_username_requires_password() {
        let result = Cli::try_parse_from(["docstore", "--username", "ada"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_rejects_invalid_uri() {
        let cli = parse(&["--uri", "postgres://localhost"]);
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn test_exit_codes() {
        let conn = anyhow::Error::new(DocStoreError::Connection("down".into())).context("Failed to connect");
        assert_eq!(exit_code(&conn), 2);
        assert_eq!(exit_code(&anyhow::Error::new(DocStoreError::Auth("no".into()))), 3);
        assert_eq!(exit_code(&anyhow::Error::new(DocStoreError::Validation("bad".into()))), 4);
        assert_eq!(exit_code(&anyhow::Error::new(DocStoreError::ClosedHandle)), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }

    #[test]
    fn test_error_kind_for_logging() {
        let auth = anyhow::Error::new(DocStoreError::Auth("no".into())).context("Failed to connect");
        assert_eq!(error_kind(&auth), "auth");
        assert_eq!(error_kind(&anyhow::anyhow!("boom")), "other");
    }
}
