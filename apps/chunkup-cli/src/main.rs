//! chunkup entry point.

mod config;
mod report;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use chunkup_client::credentials::{LANGUAGE_KEY, TOKEN_KEY};
use chunkup_client::{ApiClient, CredentialStore, FileCredentialStore, MemoryCredentialStore};
use chunkup_upload::{FileService, HttpBackend, UploadEvent, UploadOrchestrator};

use config::AppConfig;
use report::EventPrinter;

#[derive(Parser)]
#[command(name = "chunkup")]
#[command(about = "Resumable chunked uploads with instant-upload deduplication")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(long, global = true, env = "CHUNKUP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload one or more files
    Upload(UploadArgs),
    /// List stored files
    Files {
        /// Only files whose name contains this text
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        server: ServerArgs,
    },
    /// Delete stored files by id
    Rm {
        #[arg(required = true)]
        ids: Vec<i64>,

        #[command(flatten)]
        server: ServerArgs,
    },
    /// Save an authorization token
    Login {
        #[arg(long, env = "CHUNKUP_TOKEN", hide_env_values = true)]
        token: String,

        /// Preferred response language
        #[arg(long)]
        language: Option<String>,
    },
    /// Forget saved credentials
    Logout,
}

#[derive(Args)]
struct ServerArgs {
    /// Server origin (overrides config)
    #[arg(long, env = "CHUNKUP_BASE_URL")]
    base_url: Option<String>,

    /// Authorization token for this run only (overrides saved credentials)
    #[arg(long, env = "CHUNKUP_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Args)]
struct UploadArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    server: ServerArgs,

    /// Send each file in one request, without dedup or resume
    #[arg(long)]
    single: bool,

    /// Parts uploaded at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Chunk size in bytes
    #[arg(long)]
    chunk_size: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting chunkup");

    let config_path = cli.config.unwrap_or_else(config::default_config_path);

    match cli.command {
        Commands::Upload(args) => {
            let config = load_config(&config_path);
            if args.single {
                single_upload(config, &config_path, args).await
            } else {
                upload(config, &config_path, args).await
            }
        }
        Commands::Files { name, server } => {
            let config = load_config(&config_path);
            let service = file_service(&config, &config_path, server)?;
            let files = service
                .list_files(name.as_deref(), &CancellationToken::new())
                .await
                .context("failed to list files")?;
            for entry in &files {
                println!("{}", report::file_line(entry));
            }
            println!("{} file(s)", files.len());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Rm { ids, server } => {
            let config = load_config(&config_path);
            let service = file_service(&config, &config_path, server)?;
            let cancel = CancellationToken::new();
            let mut failed = false;
            for id in ids {
                match service.delete_file(id, &cancel).await {
                    Ok(()) => println!("{id}: deleted"),
                    Err(e) => {
                        failed = true;
                        eprintln!("{id}: {e}");
                    }
                }
            }
            Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
        }
        Commands::Login { token, language } => {
            login(&config_path, &token, language.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Logout => {
            open_credentials(&config_path)?.clear();
            println!("credentials cleared");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: &Path) -> AppConfig {
    match AppConfig::load(path) {
        Ok(c) => {
            tracing::info!(base_url = %c.base_url, "configuration loaded");
            c
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            AppConfig::default()
        }
    }
}

/// Builds the API client for `config`, with `server` overrides applied.
fn connect(config: &AppConfig, config_path: &Path, server: ServerArgs) -> Result<ApiClient> {
    let base_url = server.base_url.unwrap_or_else(|| config.base_url.clone());
    let credentials: Arc<dyn CredentialStore> = match server.token {
        Some(token) => Arc::new(MemoryCredentialStore::with_token(token)),
        None => Arc::new(open_credentials(config_path)?),
    };

    Ok(ApiClient::new(base_url, credentials)
        .context("failed to build HTTP client")?
        .with_request_timeout(config.upload.request_timeout()))
}

fn file_service(config: &AppConfig, config_path: &Path, server: ServerArgs) -> Result<FileService> {
    Ok(FileService::new(connect(config, config_path, server)?)
        .with_prefix(config.service_prefix.as_str())
        .with_upload_timeout(config.upload.part_timeout()))
}

/// Cancels `cancel` on Ctrl-C.
fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, aborting uploads");
            cancel.cancel();
        }
    });
}

async fn upload(mut config: AppConfig, config_path: &Path, args: UploadArgs) -> Result<ExitCode> {
    if let Some(concurrency) = args.concurrency {
        config.upload.max_concurrent_parts = concurrency;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.upload.chunk_size = chunk_size;
    }

    let client = connect(&config, config_path, args.server)?;
    let backend = HttpBackend::new(client)
        .with_prefix(config.api_prefix.as_str())
        .with_part_timeout(config.upload.part_timeout());

    let mut orchestrator = UploadOrchestrator::new(Arc::new(backend), config.upload.clone());
    let mut events = orchestrator
        .take_events()
        .context("event receiver already taken")?;

    cancel_on_interrupt(orchestrator.cancel_token());

    let printer = tokio::spawn(async move {
        let mut printer = EventPrinter::default();
        while let Some(event) = events.recv().await {
            if let Some(line) = printer.line(&event) {
                println!("{line}");
            }
        }
    });

    let results = orchestrator.upload(args.files).await;
    // Closes the event channel so the printer drains and exits.
    drop(orchestrator);
    let _ = printer.await;

    println!("{}", report::summary(&results));
    if results.iter().all(|r| r.success) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn single_upload(config: AppConfig, config_path: &Path, args: UploadArgs) -> Result<ExitCode> {
    let service = file_service(&config, config_path, args.server)?;
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let mut printer = EventPrinter::default();
    let mut uploaded = 0;
    let total = args.files.len();
    for path in args.files {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        if cancel.is_cancelled() {
            println!("{file}: skipped");
            continue;
        }

        let mut events = Vec::new();
        match service.single_upload(&path, &cancel).await {
            Ok(url) => {
                uploaded += 1;
                events.push(UploadEvent::Completed { file, url });
            }
            Err(e) => {
                if e.is_session_fatal() {
                    events.push(UploadEvent::LoginRequired { file: file.clone() });
                }
                events.push(UploadEvent::Failed {
                    file,
                    error: e.to_string(),
                });
            }
        }
        for line in events.iter().filter_map(|e| printer.line(e)) {
            println!("{line}");
        }
    }

    println!("{uploaded}/{total} file(s) uploaded");
    Ok(if uploaded == total {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn login(config_path: &Path, token: &str, language: Option<&str>) -> Result<()> {
    let store = open_credentials(config_path)?;
    store.set(TOKEN_KEY, token)?;
    if let Some(language) = language {
        store.set(LANGUAGE_KEY, language)?;
    }
    println!("credentials saved to {}", store.path().display());
    Ok(())
}

fn open_credentials(config_path: &Path) -> Result<FileCredentialStore> {
    let path = config::credentials_path(config_path);
    FileCredentialStore::open(path.clone())
        .with_context(|| format!("failed to open credentials at {}", path.display()))
}
