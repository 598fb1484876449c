use crate::errors::IndexError;
use clap::Parser;
use std::env;
use std::fmt;
use std::path::PathBuf;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub bucket: String,
    pub repository: String,
    pub issue: u64,
    pub params_path: PathBuf,
    pub token: String,
    pub api_base: String,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
}

// The token never appears in Debug output, so the config can be logged whole.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bucket", &self.bucket)
            .field("repository", &self.repository)
            .field("issue", &self.issue)
            .field("params_path", &self.params_path)
            .field("api_base", &self.api_base)
            .field("s3_region", &self.s3_region)
            .field("s3_endpoint", &self.s3_endpoint)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Indexes a freshly uploaded project version")]
pub struct Args {
    /// Bucket holding the uploaded content (overrides VERSION_INDEXER_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Repository whose issues drive indexing, as owner/repo
    /// (overrides VERSION_INDEXER_REPOSITORY)
    #[arg(long)]
    pub repository: Option<String>,

    /// Issue this run was started from; closed on success
    #[arg(long)]
    pub issue: u64,

    /// Path to the JSON job parameters file
    #[arg(long)]
    pub params: PathBuf,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    ///
    /// The tracker token is env-only (`VERSION_INDEXER_TOKEN`, falling back
    /// to `GITHUB_TOKEN`) so it never shows up on a command line.
    pub fn from_env_and_args() -> Result<Self, IndexError> {
        let args = Args::parse();

        // --- Environment fallback ---
        let bucket = args
            .bucket
            .or_else(|| env::var("VERSION_INDEXER_BUCKET").ok())
            .ok_or_else(|| {
                IndexError::Configuration(
                    "missing bucket: pass --bucket or set VERSION_INDEXER_BUCKET".to_string(),
                )
            })?;
        let repository = args
            .repository
            .or_else(|| env::var("VERSION_INDEXER_REPOSITORY").ok())
            .ok_or_else(|| {
                IndexError::Configuration(
                    "missing repository: pass --repository or set VERSION_INDEXER_REPOSITORY"
                        .to_string(),
                )
            })?;
        let token = env::var("VERSION_INDEXER_TOKEN")
            .or_else(|_| env::var("GITHUB_TOKEN"))
            .map_err(|_| {
                IndexError::Configuration(
                    "missing tracker token: set VERSION_INDEXER_TOKEN or GITHUB_TOKEN".to_string(),
                )
            })?;
        let api_base = env::var("VERSION_INDEXER_API_BASE")
            .unwrap_or_else(|_| "https://api.github.com".to_string());

        Ok(Self {
            bucket,
            repository,
            issue: args.issue,
            params_path: args.params,
            token,
            api_base,
            s3_region: env::var("VERSION_INDEXER_S3_REGION").ok(),
            s3_endpoint: env::var("VERSION_INDEXER_S3_ENDPOINT").ok(),
        })
    }
}
