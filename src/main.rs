//! Embedding Service Main
//!
//! Entry point for the stdin/stdout embedding service

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::BufReader;
use tracing::error;
use tracing_subscriber::EnvFilter;

use embedding_service::models::model::onnx::OnnxModelFactory;
use embedding_service::models::{error_chain, panic_message, EmbeddingModelsConfig};
use embedding_service::onnx::{runtime_device_resolver, OnnxConfig};
use embedding_service::protocol::status::StatusChannel;
use embedding_service::{run, ServiceConfig, ServiceError, StatusEvent};

/// Embedding service: reads `{"chunks": [...]}` lines on stdin and writes
/// embedding lines on stdout
#[derive(Parser, Debug)]
#[command(name = "embedding_service")]
#[command(version)]
struct Cli {
    /// Model name (catalog entry or model directory)
    #[arg(long, env = "EMBEDDING_MODEL")]
    model: Option<String>,

    /// Device to use: cuda, mps or cpu
    #[arg(long, env = "EMBEDDING_DEVICE")]
    device: Option<String>,

    /// Directory searched for <model>/model.onnx
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Model catalog (embeddingmodels.toml)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Service configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_config(self) -> Result<ServiceConfig, ServiceError> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::from_file(path)?,
            None => ServiceConfig::default(),
        };

        if let Some(model) = self.model {
            config.model.name = model;
        }
        if let Some(device) = self.device {
            config.model.device = device;
        }
        if let Some(dir) = self.models_dir {
            config.model.models_dir = dir;
        }
        if self.catalog.is_some() {
            config.model.catalog = self.catalog;
        }
        match self.verbose {
            0 => {}
            1 => config.monitoring.log_level = "info".to_string(),
            2 => config.monitoring.log_level = "debug".to_string(),
            _ => config.monitoring.log_level = "trace".to_string(),
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => return fatal(&e).await,
    };

    // Logs share stderr with status events, so they are JSON lines too;
    // stdout carries responses only
    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter().into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
    install_panic_hook();

    let catalog = match &config.model.catalog {
        Some(path) => match EmbeddingModelsConfig::from_file(path) {
            Ok(catalog) => catalog,
            Err(e) => return fatal(&ServiceError::from(e)).await,
        },
        None => EmbeddingModelsConfig::default(),
    };

    let factory = OnnxModelFactory::new(
        catalog,
        config.model.models_dir.clone(),
        OnnxConfig {
            intra_threads: config.model.intra_threads,
        },
    );
    let resolver = runtime_device_resolver();

    let result = run(
        &config,
        &resolver,
        &factory,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        tokio::io::stderr(),
    )
    .await;

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

/// Route panic reports through the JSON logger instead of plain stderr text
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        error!(%location, message = %panic_message(info.payload()), "panicked");
    }));
}

/// Report a startup failure that happened before the service could run
async fn fatal(error: &ServiceError) -> ExitCode {
    let mut status = StatusChannel::new(tokio::io::stderr());
    let event = StatusEvent::error(format!("Fatal error: {}", error), Some(error_chain(error)));
    if status.emit(&event).await.is_err() {
        eprintln!("Fatal error: {}", error);
    }
    ExitCode::FAILURE
}
