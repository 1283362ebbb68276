///
/// This module implements the CLI interface for mdhost: command parsing, the async entrypoint
/// and user-visible output.
///
/// All upload logic lives in the [`mdhost-core`] crate; this module only wires configuration,
/// transport and uploader together and prints results.
///
/// ## How To Use
/// - Command line: `mdhost upload --config mdhost.yaml shot.png diagram.svg`
/// - Programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`mdhost-core`]: ../../mdhost-core/
use crate::load_config::load_config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use mdhost_core::backends::build_uploader;
use mdhost_core::transport::ReqwestTransport;
use mdhost_core::{UploadError, UploadRequest, Uploader};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// CLI for mdhost: upload files and print markdown references.
#[derive(Parser)]
#[clap(
    name = "mdhost",
    version,
    about = "Upload files to an image/file hosting backend and print markdown links"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload files and print one markdown reference per file
    Upload {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Files to upload
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },
    /// Validate a config file and print the selected backend
    CheckConfig {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Upload { config, files } => {
            let config = load_config(config)?;
            config.trace_loaded();
            let http = ReqwestTransport::with_timeout(Duration::from_secs(config.http.timeout_secs))
                .context("Failed to build HTTP client")?;
            let uploader = build_uploader(&config, Arc::new(http), None);
            tracing::info!(command = "upload", files = files.len(), "Starting uploads");
            upload_files(uploader.as_ref(), &files, &mut std::io::stdout()).await
        }
        Commands::CheckConfig { config } => {
            let config = load_config(config)?;
            config.trace_loaded();
            println!("Config OK: backend {}", config.backend.name());
            Ok(())
        }
    }
}

/// Uploads all files concurrently and writes one markdown line per success, in input order.
///
/// Failures are reported on stderr; the result is an error if any upload failed.
pub async fn upload_files<U, W>(uploader: &U, files: &[PathBuf], out: &mut W) -> Result<()>
where
    U: Uploader + ?Sized,
    W: Write,
{
    let outcomes = join_all(files.iter().map(|path| upload_one(uploader, path))).await;

    let mut failed = 0usize;
    for (path, outcome) in files.iter().zip(outcomes) {
        match outcome {
            Ok(markdown) => writeln!(out, "{markdown}")?,
            Err(e) => {
                failed += 1;
                tracing::error!(file = %path.display(), error = %e, "Upload failed");
                eprintln!("[ERROR] {}: {}", path.display(), e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} uploads failed", files.len());
    }
    Ok(())
}

async fn upload_one<U: Uploader + ?Sized>(
    uploader: &U,
    path: &Path,
) -> Result<String, UploadError> {
    let request = UploadRequest::from_path(path).await?;
    uploader.upload(&request).await
}
