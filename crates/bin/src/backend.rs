//! Store creation and sealing key setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use zeroize::Zeroizing;

use telegate::{
    crypto::{SealingKey, sealing::generate_salt},
    storage::{InMemoryStore, Persistence, SqliteStore},
};

use crate::cli::{Backend, ServeArgs};

const SALT_FILE: &str = "sealing.salt";
const KEY_FILE: &str = "sealing.key";

pub fn data_dir(args: &ServeArgs) -> PathBuf {
    args.data_dir.clone().unwrap_or_else(|| PathBuf::from("."))
}

/// Create the configured persistence backend.
pub async fn create_store(
    args: &ServeArgs,
) -> Result<Arc<dyn Persistence>, Box<dyn std::error::Error>> {
    let data_dir = data_dir(args);
    tokio::fs::create_dir_all(&data_dir).await?;

    match args.backend {
        Backend::Sqlite => {
            let db_path = data_dir.join("telegate.db");
            tracing::info!("Using SQLite backend at {}", db_path.display());
            Ok(Arc::new(SqliteStore::open(&db_path).await?))
        }
        Backend::Inmemory => {
            let json_path = data_dir.join("telegate.json");
            tracing::info!(
                "Using in-memory backend with persistence at {}",
                json_path.display()
            );
            Ok(Arc::new(InMemoryStore::open(&json_path).await?))
        }
    }
}

/// Sealing key for the configured data directory.
pub async fn sealing_key(args: &ServeArgs) -> Result<SealingKey, Box<dyn std::error::Error>> {
    load_sealing_key(&data_dir(args), args.sealing_passphrase.as_deref()).await
}

/// Derive the key from `passphrase` and the salt file, or without a
/// passphrase use the generated key file. Either file is created on first
/// use, so a restart reopens the same store.
async fn load_sealing_key(
    dir: &Path,
    passphrase: Option<&str>,
) -> Result<SealingKey, Box<dyn std::error::Error>> {
    match passphrase {
        Some(passphrase) => {
            let salt = load_or_create(dir, SALT_FILE, generate_salt).await?;
            Ok(SealingKey::derive(passphrase, salt.as_str())?)
        }
        None => {
            let encoded =
                load_or_create(dir, KEY_FILE, || SealingKey::generate().to_base64().as_str().to_owned())
                    .await?;
            tracing::warn!(
                "No sealing passphrase configured; stored keys are sealed with {}",
                dir.join(KEY_FILE).display()
            );
            Ok(SealingKey::from_base64(encoded.as_str())?)
        }
    }
}

/// Read `dir/name`, or write it owner-only with `create()` if it is missing.
async fn load_or_create(
    dir: &Path,
    name: &str,
    create: impl FnOnce() -> String,
) -> Result<Zeroizing<String>, Box<dyn std::error::Error>> {
    let path = dir.join(name);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => Ok(Zeroizing::new(contents.trim().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let contents = Zeroizing::new(create());
            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(&path)
                .await?;
            file.write_all(contents.as_bytes()).await?;
            file.sync_all().await?;
            tracing::info!("Created {}", path.display());
            Ok(contents)
        }
        Err(e) => Err(e.into()),
    }
}
