use std::env;
use std::process::ExitCode;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use exif_indexer::{Dependencies, IndexingError, Settings};
use exif_indexer_pipeline::PipelineError;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run() -> Result<(), IndexingError> {
    let settings = Settings::from_env()?;
    let Dependencies { mut orchestrator } = Dependencies::new(&settings).await?;

    let shutdown = orchestrator.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "Could not install signal handler"),
        }
    });

    match orchestrator.run().await {
        Ok(report) => {
            info!(
                identifiers = report.identifiers,
                published = report.producers.published,
                fetch_failed = report.producers.fetch_failed,
                publish_failed = report.producers.publish_failed,
                abandoned = report.producers.abandoned,
                indexed = report.sink.indexed,
                interrupted = report.interrupted,
                started_at = %report.started_at,
                finished_at = %report.finished_at,
                "Harvest finished"
            );
            Ok(())
        }
        Err(PipelineError::Cancelled) => {
            info!("Shutdown before the catalog was listed");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine.
    dotenv::dotenv().ok();
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "EXIF indexer failed");
            ExitCode::FAILURE
        }
    }
}
