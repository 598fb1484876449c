use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod keys;
mod models;
mod services;

use models::job::JobParams;
use services::indexer::Indexer;
use services::object_store::S3ObjectStore;
use services::tracker::{GitHubTracker, Tracker};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;
    tracing::info!("Starting version-indexer with config: {:?}", cfg);

    // --- Read job parameters ---
    let job = JobParams::from_file(&cfg.params_path)?;
    tracing::info!(
        "Indexing {}/{} for issue #{}",
        job.project,
        job.version,
        cfg.issue
    );

    // --- Connect collaborators ---
    let store = S3ObjectStore::connect(
        &cfg.bucket,
        cfg.s3_region.clone(),
        cfg.s3_endpoint.clone(),
    )
    .await?;
    let tracker = GitHubTracker::new(&cfg.api_base, &cfg.repository, &cfg.token)?;

    // --- Run the indexing workflow ---
    // A failed run is reported as a comment on the originating issue and the
    // process still exits zero; only the setup errors above are fatal.
    let indexer = Indexer::new(&store, &tracker);
    if let Err(err) = indexer.index(&job, cfg.issue).await {
        tracing::error!("Indexing {}/{} failed: {}", job.project, job.version, err);
        tracker.comment(cfg.issue, &err.to_string()).await?;
    }

    Ok(())
}
