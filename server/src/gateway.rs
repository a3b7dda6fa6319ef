use std::io;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, TryStreamExt};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::auth::Identity;
use crate::error::ApiError;

const ADMIN_NAMESPACE: &str = "admin";
const USERS_NAMESPACE: &str = "users";
const UNNAMED: &str = "unnamed";
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Bytes persisted on disk, not yet registered.
#[derive(Debug)]
pub struct StoredBlob {
    pub original_filename: String,
    pub stored_filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub blake3_hash: String,
}

/// Directory under which files of `identity` are stored.
#[must_use]
pub fn namespace(root: &Path, identity: &Identity) -> PathBuf {
    if identity.is_admin() {
        root.join(ADMIN_NAMESPACE)
    } else {
        root.join(USERS_NAMESPACE).join(identity.user_id.to_string())
    }
}

/// Reduces a client supplied name to its last path component.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let name = match name.rfind(&['\\', '/']) {
        Some(ix) => &name[ix + 1..],
        None => name,
    };
    let name: String = name
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();
    match name.trim() {
        "" | "." | ".." => UNNAMED.to_owned(),
        trimmed => trimmed.to_owned(),
    }
}

/// Name of the file on disk: upload time in milliseconds plus the original name.
/// A non-zero `attempt` is inserted between them to step around a taken name.
#[must_use]
pub fn stored_name(original: &str, now: DateTime<Utc>, attempt: usize) -> String {
    let millis = now.timestamp_millis();
    if attempt == 0 {
        format!("{millis}-{original}")
    } else {
        format!("{millis}-{attempt}-{original}")
    }
}

/// Streams one uploaded file into `dir`.
///
/// The file is created exclusively and never overwrites: a taken name is
/// retried with an attempt counter. A partially written file is removed on
/// any failure.
pub async fn store<S, E>(
    stream: S,
    dir: &Path,
    original: &str,
    limit: usize,
) -> Result<StoredBlob, ApiError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    tokio::fs::create_dir_all(dir).await?;

    let original_filename = sanitize_name(original);
    let (file, stored_filename, path) = create_unique(dir, &original_filename, Utc::now()).await?;

    match copy_limited(stream, file, limit).await {
        Ok((size, blake3_hash)) => Ok(StoredBlob {
            original_filename,
            stored_filename,
            path,
            size,
            blake3_hash,
        }),
        Err(e) => {
            if let Err(remove_error) = remove(&path).await {
                tracing::error!("partial file {} not removed: {remove_error}", path.display());
            }
            Err(e)
        }
    }
}

async fn create_unique(
    dir: &Path,
    original: &str,
    now: DateTime<Utc>,
) -> io::Result<(File, String, PathBuf)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = stored_name(original, now, attempt);
        let path = dir.join(&name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((file, name, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!("stored name {name} is taken");
            }
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free stored name for {original}"),
    ))
}

/// Removes stored bytes.
pub async fn remove(path: &Path) -> io::Result<()> {
    tokio::fs::remove_file(path).await
}

/// Opens stored bytes for reading. A missing file maps to `NotFound`.
pub async fn open(path: &Path) -> Result<File, ApiError> {
    match File::open(path).await {
        Ok(f) => Ok(f),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!("stored bytes missing at {}", path.display());
            Err(ApiError::NotFound)
        }
        Err(e) => Err(ApiError::Storage(e)),
    }
}

async fn copy_limited<S, E>(stream: S, file: File, limit: usize) -> Result<(u64, String), ApiError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    futures::pin_mut!(stream);
    let limit = u64::try_from(limit).unwrap_or(u64::MAX);
    let mut writer = BufWriter::new(file);
    let mut hasher = blake3::Hasher::new();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.try_next().await.map_err(io::Error::other)? {
        written += chunk.len() as u64;
        if written > limit {
            return Err(ApiError::PayloadTooLarge);
        }
        hasher.update(&chunk);
        writer.write_all(&chunk).await?;
    }
    writer.flush().await?;

    Ok((written, hasher.finalize().to_hex().to_string()))
}
