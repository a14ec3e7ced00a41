//! awsform CLI entrypoint.
//!
//! This is the main entrypoint for the awsform command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use awsform::aws::AwsClients;
use awsform::cli::{Cli, Commands, OutputFormatter};
use awsform::config::{
    ConfigParser, ConfigValidator, ProviderConfig, ResourceDocument, find_config_file,
};
use awsform::error::{AwsformError, ConfigError, Result};
use awsform::provider::Provider;

use clap::Parser;
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Validate { file, warnings } => {
            cmd_validate(config_path, file.as_deref(), warnings, &formatter)
        }
        Commands::Resources => {
            let provider = connect(config_path).await?;
            emit(&formatter.format_types(provider.resource_types(), provider.data_source_types()))
        }
        Commands::Create { file } => {
            let doc = load_document(&file)?;
            let provider = connect(config_path).await?;
            match provider.create(&doc).await {
                Ok(state) => emit(&formatter.format_state(&state)),
                Err(err) => {
                    if let Some(state) = err.partial_state() {
                        emit(&formatter.format_state(state))?;
                    }
                    Err(err)
                }
            }
        }
        Commands::Read { resource_type, id } => {
            let provider = connect(config_path).await?;
            let state = provider.read(&resource_type, &id).await?;
            emit(&formatter.format_state(&state))
        }
        Commands::Update { file } => {
            let doc = load_document(&file)?;
            let provider = connect(config_path).await?;
            let state = provider.update(&doc).await?;
            emit(&formatter.format_state(&state))
        }
        Commands::Delete {
            resource_type,
            id,
            force_destroy,
        } => {
            let mut doc = ResourceDocument {
                type_name: resource_type,
                id: Some(id.clone()),
                ..ResourceDocument::default()
            };
            if force_destroy {
                doc.attributes
                    .insert(String::from("force_destroy"), Value::Bool(true));
            }

            let provider = connect(config_path).await?;
            provider.delete(&doc).await?;
            emit(&formatter.format_deleted(&doc.type_name, &id))
        }
        Commands::Import { resource_type, id } => {
            let provider = connect(config_path).await?;
            let state = provider.import(&resource_type, &id).await?;
            emit(&formatter.format_state(&state))
        }
        Commands::Lookup {
            data_source_type,
            file,
        } => {
            let mut doc = match file {
                Some(path) => ConfigParser::new().load_document(&path)?,
                None => ResourceDocument::default(),
            };
            doc.type_name = data_source_type;

            let provider = connect(config_path).await?;
            let state = provider.lookup(&doc).await?;
            emit(&formatter.format_state(&state))
        }
    }
}

/// Validate provider settings and, optionally, a resource document.
fn cmd_validate(
    config_path: Option<&Path>,
    file: Option<&Path>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let validator = ConfigValidator::new();

    let mut result = validator.validate(&config)?;
    if let Some(file) = file {
        info!("Validating document: {}", file.display());
        let doc = ConfigParser::new().load_document(file)?;
        let doc_result = validator.validate_document(&doc)?;
        result.warnings.extend(doc_result.warnings);
    }

    emit(&formatter.format_validation(&result, show_warnings))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Writes command output to stdout; logs go to stderr.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

/// Resolves the configuration file path.
///
/// A missing configuration file is not an error: settings then come from the
/// environment and the shared AWS configuration.
fn resolve_config_path(config_path: Option<&Path>) -> Result<Option<PathBuf>> {
    match config_path {
        Some(path) => Ok(Some(path.to_path_buf())),
        None => match find_config_file(".") {
            Ok(path) => Ok(Some(path)),
            Err(AwsformError::Config(ConfigError::FileNotFound { .. })) => {
                debug!("No configuration file found, using environment only");
                Ok(None)
            }
            Err(e) => Err(e),
        },
    }
}

/// Loads provider settings with .env and environment overrides applied.
fn load_config(config_path: Option<&Path>) -> Result<ProviderConfig> {
    let config_file = resolve_config_path(config_path)?;

    let base = config_file
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."));
    let parser = ConfigParser::new().with_base_path(base);
    parser.load_dotenv()?;

    parser.load_with_env(config_file.as_deref())
}

/// Loads a resource document relative to the working directory.
fn load_document(path: &Path) -> Result<ResourceDocument> {
    let doc = ConfigParser::new().load_document(path)?;
    ConfigValidator::new().validate_document(&doc)?;
    Ok(doc)
}

/// Loads and validates the configuration, then builds the provider.
async fn connect(config_path: Option<&Path>) -> Result<Provider> {
    let config = load_config(config_path)?;
    ConfigValidator::new().validate(&config)?;

    let clients = AwsClients::from_config(&config).await?;
    info!("Using region {} ({})", clients.region, clients.partition);

    Ok(Provider::from_clients(&clients))
}
