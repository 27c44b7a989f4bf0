//! lxd-pools CLI entrypoint.
//!
//! This is the main entrypoint for the lxd-pools command-line tool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use lxd_pools::cli::{ApplyArgs, Cli, Commands, ConnectionArgs, OutputFormatter};
use lxd_pools::config::{
    ManifestParser, ManifestValidator, PoolManifest, PoolSpec, find_manifest_file,
};
use lxd_pools::error::Result;
use lxd_pools::lxd::LxdClient;
use lxd_pools::reconciler::{Outcome, Reconciler};

use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(cli))
}

/// Initializes the logging system.
///
/// `RUST_LOG` wins over `--verbose` when set.
fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> ExitCode {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Apply(args) => {
            let (pool, outcome) = cmd_apply(cli.file.as_deref(), &cli.connection, &args).await;
            println!("{}", formatter.format_outcome(&pool, &outcome));
            if outcome.is_failed() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Commands::Exists { name } => {
            let args = ApplyArgs {
                name,
                ..ApplyArgs::default()
            };
            match cmd_exists(cli.file.as_deref(), &cli.connection, &args).await {
                Ok((pool, exists)) => {
                    println!("{}", formatter.format_exists(&pool, exists));
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    let pool = args.name.unwrap_or_default();
                    println!("{}", formatter.format_outcome(&pool, &Outcome::failed(e.to_string())));
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// Reconcile one storage pool.
///
/// Every failure, including configuration errors, becomes a failed outcome.
async fn cmd_apply(
    file: Option<&Path>,
    connection: &ConnectionArgs,
    args: &ApplyArgs,
) -> (String, Outcome) {
    let manifest = match load_manifest(file, connection, args) {
        Ok(manifest) => manifest,
        Err(e) => {
            let pool = args.name.clone().unwrap_or_default();
            return (pool, Outcome::failed(e.to_string()));
        }
    };

    let pool = pool_spec(&manifest);
    let state = manifest.state.as_deref().unwrap_or("present");

    let outcome = match manifest.connection.resolve() {
        Ok((credentials, timeout)) => match LxdClient::connect(&credentials, timeout) {
            Ok(client) => {
                Reconciler::new(&client, &credentials)
                    .reconcile_declared(state, &pool)
                    .await
            }
            Err(e) => Outcome::failed(e.to_string()),
        },
        Err(e) => Outcome::failed(e.to_string()),
    };

    (pool.name, outcome)
}

/// Check whether a storage pool exists.
async fn cmd_exists(
    file: Option<&Path>,
    connection: &ConnectionArgs,
    args: &ApplyArgs,
) -> Result<(String, bool)> {
    let manifest = load_manifest(file, connection, args)?;
    let pool = pool_spec(&manifest);

    let (credentials, timeout) = manifest.connection.resolve()?;
    let client = LxdClient::connect(&credentials, timeout)?;

    let exists = Reconciler::new(&client, &credentials)
        .pool_exists(&pool.name)
        .await?;

    Ok((pool.name, exists))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Builds the effective manifest: file, then `.env` and environment, then flags.
fn load_manifest(
    file: Option<&Path>,
    connection: &ConnectionArgs,
    args: &ApplyArgs,
) -> Result<PoolManifest> {
    let manifest_path: Option<PathBuf> = match file {
        Some(path) => Some(path.to_path_buf()),
        None => find_manifest_file("."),
    };

    let base_path = manifest_path
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."));
    let parser = ManifestParser::new().with_base_path(base_path);
    parser.load_dotenv()?;

    let mut manifest = match &manifest_path {
        Some(path) => parser.load_file(path)?,
        None => {
            debug!("No manifest file, using flags and environment only");
            PoolManifest::default()
        }
    };
    ManifestParser::apply_env_overrides(&mut manifest)?;

    args.apply_to(&mut manifest);
    connection.apply_to(&mut manifest);

    let validation = ManifestValidator::new().validate(&manifest)?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    Ok(manifest)
}

/// Extracts the pool identity and creation parameters from a validated manifest.
fn pool_spec(manifest: &PoolManifest) -> PoolSpec {
    PoolSpec {
        name: manifest.name.clone().unwrap_or_default(),
        driver: manifest.driver,
        config: manifest.config.clone(),
    }
}
