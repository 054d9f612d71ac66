use crate::services::object_store_client::S3Settings;
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// `None` keeps progress in process memory (single instance only).
    pub redis_url: Option<String>,
    pub s3: S3Settings,
    /// Base URL objects are publicly served from.
    pub public_url: String,
    pub store_timeout: Duration,
    pub flush_interval_ms: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Media delivery and playback progress API")]
pub struct Args {
    /// Host to bind to (overrides MEDIA_RELAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides MEDIA_RELAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides MEDIA_RELAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Redis URL for the progress cache (overrides MEDIA_RELAY_REDIS_URL)
    #[arg(long)]
    pub redis_url: Option<String>,

    /// S3-compatible endpoint, e.g. an R2 or MinIO URL (overrides MEDIA_RELAY_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// Bucket region (overrides MEDIA_RELAY_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Bucket holding media (overrides MEDIA_RELAY_S3_BUCKET)
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// Public base URL for stored objects (overrides MEDIA_RELAY_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Deadline for each object store call, in seconds (overrides MEDIA_RELAY_STORE_TIMEOUT_SECS)
    #[arg(long)]
    pub store_timeout_secs: Option<u64>,

    /// Positions that are multiples of this are persisted (overrides MEDIA_RELAY_FLUSH_INTERVAL_MS)
    #[arg(long)]
    pub flush_interval_ms: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::merge(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// CLI values win; `lookup` supplies the environment fallback.
    /// Credentials are only read from the environment.
    fn merge(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_host = lookup("MEDIA_RELAY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_var(&lookup, "MEDIA_RELAY_PORT")?.unwrap_or(3000);
        let env_db = lookup("MEDIA_RELAY_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/media_relay.db".into());
        let env_timeout = parse_var(&lookup, "MEDIA_RELAY_STORE_TIMEOUT_SECS")?.unwrap_or(30);
        let env_flush = parse_var(&lookup, "MEDIA_RELAY_FLUSH_INTERVAL_MS")?.unwrap_or(30_000);

        let s3 = S3Settings {
            endpoint: args
                .s3_endpoint
                .or_else(|| lookup("MEDIA_RELAY_S3_ENDPOINT"))
                .filter(|v| !v.is_empty()),
            region: args
                .s3_region
                .or_else(|| lookup("MEDIA_RELAY_S3_REGION"))
                .unwrap_or_else(|| "auto".into()),
            bucket: args
                .s3_bucket
                .or_else(|| lookup("MEDIA_RELAY_S3_BUCKET"))
                .unwrap_or_else(|| "media".into()),
            access_key_id: lookup("MEDIA_RELAY_S3_ACCESS_KEY_ID"),
            secret_access_key: lookup("MEDIA_RELAY_S3_SECRET_ACCESS_KEY"),
        };

        let public_url = args
            .public_url
            .or_else(|| lookup("MEDIA_RELAY_PUBLIC_URL"))
            .unwrap_or_else(|| default_public_url(&s3));

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            redis_url: args
                .redis_url
                .or_else(|| lookup("MEDIA_RELAY_REDIS_URL"))
                .filter(|v| !v.is_empty()),
            s3,
            public_url,
            store_timeout: Duration::from_secs(args.store_timeout_secs.unwrap_or(env_timeout)),
            flush_interval_ms: args.flush_interval_ms.unwrap_or(env_flush),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", name, value))
        })
        .transpose()
}

fn default_public_url(s3: &S3Settings) -> String {
    match &s3.endpoint {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), s3.bucket),
        None => format!("https://{}.s3.{}.amazonaws.com", s3.bucket, s3.region),
    }
}
