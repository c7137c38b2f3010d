use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use url::Url;

use report_pdf::{
    AppState, app,
    browser::ChromeBackend,
    client::{ClientConfig, DEFAULT_LOGO_URL, ReportClient},
    cnfg::AppConfig,
    cors::AllowedOrigins,
    pipeline::Pipeline,
    telemetry::{self, TracingObserver},
};

const DEFAULT_GRADING_BASE: &str = "https://voice-patient-web.vercel.app";
const DEFAULT_PDF_SERVICE: &str = "https://sca-pdf-service.vercel.app/api/render-pdf";

#[derive(Debug, Parser)]
#[command(name = "report-pdf", version, about = "Markdown/HTML to PDF rendering service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP rendering service.
    Serve,
    /// Fetch a session's grading text and save it as a PDF.
    Download(DownloadArgs),
}

#[derive(Debug, clap::Args)]
struct DownloadArgs {
    #[arg(long = "session-id")]
    session_id: String,

    /// Output path; defaults to grading-<session-id>.pdf in the current directory.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,

    #[arg(long, env = "GRADING_BASE_URL", default_value = DEFAULT_GRADING_BASE)]
    grading_base: Url,

    #[arg(long, env = "PDF_SERVICE_URL", default_value = DEFAULT_PDF_SERVICE)]
    pdf_service: Url,

    #[arg(long, env = "REPORT_LOGO_URL", default_value = DEFAULT_LOGO_URL)]
    logo_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(config.log_format)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Download(args) => download(args).await,
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    let backend = ChromeBackend::new(config.chrome.clone());
    if let Err(err) = backend.check() {
        tracing::warn!("browser not ready, renders will fail until it is: {err:#}");
    }

    let pipeline = Pipeline::new(backend, config.render.wait, config.render.load_timeout)
        .with_observer(Arc::new(TracingObserver));

    let state = AppState {
        renderer: Arc::new(pipeline),
        origins: AllowedOrigins::new(config.allowed_origins.clone()),
        max_body_bytes: config.max_body_bytes,
    };

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        wait = %config.render.wait,
        load_timeout_ms = config.render.load_timeout.as_millis() as u64,
        "listening"
    );

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn download(args: DownloadArgs) -> Result<()> {
    let mut config = ClientConfig::new(args.grading_base, args.pdf_service);
    config.logo_url = args.logo_url;

    let report = ReportClient::new(config).download(&args.session_id).await?;
    let path = args.out.unwrap_or_else(|| PathBuf::from(&report.filename));
    tokio::fs::write(&path, &report.bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;

    tracing::info!(path = %path.display(), bytes = report.bytes.len(), "saved report");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}
