use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub default_region: String,
    pub default_owner: String,
    pub max_connections: u32,
    pub io_timeout: Duration,
    pub lease_ttl: Duration,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "S3-compatible bucket namespace service")]
pub struct Args {
    /// Host to bind to (overrides BUCKET_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BUCKET_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides BUCKET_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Region for buckets created without a LocationConstraint
    /// (overrides BUCKET_STORE_DEFAULT_REGION)
    #[arg(long)]
    pub default_region: Option<String>,

    /// Owner for requests without credentials (overrides BUCKET_STORE_DEFAULT_OWNER)
    #[arg(long)]
    pub default_owner: Option<String>,

    /// SQLite pool size (overrides BUCKET_STORE_MAX_CONNECTIONS)
    #[arg(long)]
    pub max_connections: Option<u32>,

    /// Per-call metadata store timeout in milliseconds
    /// (overrides BUCKET_STORE_IO_TIMEOUT_MS)
    #[arg(long)]
    pub io_timeout_ms: Option<u64>,

    /// Age after which an unreleased name reservation may be taken over
    /// (overrides BUCKET_STORE_LEASE_TTL_MS)
    #[arg(long)]
    pub lease_ttl_ms: Option<u64>,

    /// PEM certificate for HTTPS (overrides BUCKET_STORE_TLS_CERT)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for HTTPS (overrides BUCKET_STORE_TLS_KEY)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,

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
        Ok((Self::merge(args, |key| env::var(key))?, migrate))
    }

    /// Merge CLI args over values looked up through `lookup`, then defaults.
    fn merge<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let string_or = |key: &str, default: &str| -> Result<String> {
            match lookup(key) {
                Ok(value) => Ok(value),
                Err(env::VarError::NotPresent) => Ok(default.to_string()),
                Err(err) => Err(err).with_context(|| format!("reading {}", key)),
            }
        };

        // --- Environment fallback ---
        let env_host = string_or("BUCKET_STORE_HOST", "0.0.0.0")?;
        let env_port = parse_env(&lookup, "BUCKET_STORE_PORT", 3000u16)?;
        let env_db = string_or(
            "BUCKET_STORE_DATABASE_URL",
            "sqlite://./data/meta/buckets.db",
        )?;
        let env_region = string_or("BUCKET_STORE_DEFAULT_REGION", "local")?;
        let env_owner = string_or("BUCKET_STORE_DEFAULT_OWNER", "local")?;
        let env_connections = parse_env(&lookup, "BUCKET_STORE_MAX_CONNECTIONS", 5u32)?;
        let env_io_timeout = parse_env(&lookup, "BUCKET_STORE_IO_TIMEOUT_MS", 5_000u64)?;
        let env_lease_ttl = parse_env(&lookup, "BUCKET_STORE_LEASE_TTL_MS", 30_000u64)?;
        let env_cert = lookup("BUCKET_STORE_TLS_CERT").ok().map(PathBuf::from);
        let env_key = lookup("BUCKET_STORE_TLS_KEY").ok().map(PathBuf::from);

        let io_timeout = Duration::from_millis(args.io_timeout_ms.unwrap_or(env_io_timeout));
        let lease_ttl = Duration::from_millis(args.lease_ttl_ms.unwrap_or(env_lease_ttl));
        // A reservation must outlive the slowest store call it guards.
        if lease_ttl < io_timeout {
            anyhow::bail!(
                "lease TTL {:?} is shorter than the I/O timeout {:?}",
                lease_ttl,
                io_timeout
            );
        }

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            default_region: args.default_region.unwrap_or(env_region),
            default_owner: args.default_owner.unwrap_or(env_owner),
            max_connections: args.max_connections.unwrap_or(env_connections),
            io_timeout,
            lease_ttl,
            tls_cert: args.tls_cert.or(env_cert),
            tls_key: args.tls_key.or(env_key),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Certificate and key paths, when both are configured.
    pub fn tls_paths(&self) -> Option<(&PathBuf, &PathBuf)> {
        self.tls_cert.as_ref().zip(self.tls_key.as_ref())
    }
}

fn parse_env<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Result<String, env::VarError>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
