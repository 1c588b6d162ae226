use anyhow::Result;
use rustls::crypto::ring::default_provider;
use stockload::{process, JobConfig};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.parse().unwrap_or(Level::INFO.into())),
        )
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) TLS provider for the cloud clients ───────────────────────
    let _ = default_provider().install_default();

    // ─── 3) configuration, read once ─────────────────────────────────
    let config = JobConfig::from_env_args()?;
    info!(
        input = %config.input,
        output = %config.output,
        credentials = ?config.credentials,
        "startup"
    );

    // ─── 4) run the job; an error here exits non-zero ────────────────
    let summary = process::run(&config).await?;
    info!(
        objects = summary.objects,
        rows = summary.rows,
        table = %summary.table,
        "all done"
    );
    Ok(())
}
