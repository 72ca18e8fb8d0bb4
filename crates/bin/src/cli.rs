//! CLI argument definitions for the Telegate binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// SQLite database (default)
    Sqlite,
    /// In-memory with JSON file persistence
    Inmemory,
}

/// Telegate challenge-response gateway for telemetry endpoints
#[derive(Parser, Debug)]
#[command(name = "telegate")]
#[command(about = "Telegate: signed-challenge access control for telemetry endpoints")]
#[command(version)]
pub struct Cli {
    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gateway server
    Serve(ServeArgs),
    /// Check health of a running gateway
    Health(HealthArgs),
    /// List enrolled clients of a running gateway
    Clients(ClientsArgs),
    /// Sign a challenge nonce with a provisioned key bundle
    Sign(SignArgs),
    /// Run a full handshake against a gateway and print the response
    Fetch(FetchArgs),
}

/// Arguments for the serve command
#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3000, env = "TELEGATE_PORT")]
    pub port: u16,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0", env = "TELEGATE_HOST")]
    pub host: String,

    /// Storage backend to use
    #[arg(short, long, default_value = "sqlite", env = "TELEGATE_BACKEND")]
    pub backend: Backend,

    /// Data directory.
    /// Holds telegate.db or telegate.json, the sealing salt, and the
    /// `resources/` tree served to authorized clients.
    #[arg(short = 'D', long, env = "TELEGATE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Seconds an issued challenge stays valid
    #[arg(long, default_value_t = 90, env = "TELEGATE_CHALLENGE_TTL_SECS")]
    pub challenge_ttl_secs: u64,

    /// Seconds a rotated-out key keeps verifying (0 disables overlap)
    #[arg(long, default_value_t = 0, env = "TELEGATE_ROTATION_GRACE_SECS")]
    pub rotation_grace_secs: u64,

    /// Maximum outstanding challenges per client
    #[arg(long, default_value_t = 16, env = "TELEGATE_MAX_PENDING_CHALLENGES")]
    pub max_pending_challenges: usize,

    /// Number of audit events kept in memory
    #[arg(long, default_value_t = 10_000, env = "TELEGATE_AUDIT_CAPACITY")]
    pub audit_capacity: usize,

    /// Passphrase protecting stored keys. Without it keys are sealed with a
    /// generated key kept in `<data_dir>/sealing.key` (mode 0600).
    #[arg(long, env = "TELEGATE_SEALING_PASSPHRASE", hide_env_values = true)]
    pub sealing_passphrase: Option<String>,

    /// Bearer token required on /admin routes
    #[arg(long, env = "TELEGATE_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,
}

/// Arguments for the health command
#[derive(clap::Args, Debug)]
pub struct HealthArgs {
    /// Base URL of the server to check
    #[arg(default_value = "http://127.0.0.1:3000", env = "TELEGATE_URL")]
    pub url: String,

    /// Timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,
}

/// Arguments for the clients command
#[derive(clap::Args, Debug)]
pub struct ClientsArgs {
    /// Base URL of the server
    #[arg(default_value = "http://127.0.0.1:3000", env = "TELEGATE_URL")]
    pub url: String,

    /// Bearer token for the admin API
    #[arg(long, env = "TELEGATE_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    /// Timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,
}

/// Arguments for the sign command
#[derive(clap::Args, Debug)]
pub struct SignArgs {
    /// Client id the bundle belongs to
    #[arg(long, env = "TELEGATE_CLIENT_ID")]
    pub client_id: String,

    /// Path to the exported key bundle (JSON)
    #[arg(long, env = "TELEGATE_KEY_BUNDLE")]
    pub bundle: PathBuf,

    /// Passphrase the bundle was exported with
    #[arg(long, env = "TELEGATE_BUNDLE_PASSPHRASE", hide_env_values = true)]
    pub passphrase: String,

    /// Challenge nonce, hex encoded
    pub nonce: String,
}

/// Arguments for the fetch command
#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Protected endpoint path, e.g. /telemetry/c1_data
    pub endpoint: String,

    /// Base URL of the server
    #[arg(long, default_value = "http://127.0.0.1:3000", env = "TELEGATE_URL")]
    pub url: String,

    /// Client id the bundle belongs to
    #[arg(long, env = "TELEGATE_CLIENT_ID")]
    pub client_id: String,

    /// Path to the exported key bundle (JSON)
    #[arg(long, env = "TELEGATE_KEY_BUNDLE")]
    pub bundle: PathBuf,

    /// Passphrase the bundle was exported with
    #[arg(long, env = "TELEGATE_BUNDLE_PASSPHRASE", hide_env_values = true)]
    pub passphrase: String,

    /// Timeout in seconds
    #[arg(short, long, default_value_t = 10)]
    pub timeout: u64,
}
