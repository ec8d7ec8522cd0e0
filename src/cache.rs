use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use tokio::fs;

use crate::arn::Arn;

// Entries this close to expiry are treated as already expired.
const CACHE_BUFFER_SECS: i64 = 60;

/// A single cache file holding one serialized value.
///
/// Reads of missing, unreadable, corrupt or expired files are cache misses. Writes replace the
/// file atomically, so concurrent readers never observe a partial entry.
#[derive(Clone, Debug)]
pub(crate) struct CredentialCache {
    path: PathBuf,
}

impl CredentialCache {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Return the cached value if it is still fresh, otherwise `init` it and cache the result.
    ///
    /// Errors from `init` are returned as-is. Failing to persist the new value is logged and
    /// otherwise ignored.
    pub(crate) async fn get_or_init<F, Fut, T, E>(&self, init: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        T: Expiry + serde::de::DeserializeOwned + serde::Serialize,
    {
        if let Some(value) = self.load().await {
            return Ok(value);
        }

        let value = init().await?;
        if let Err(error) = self.store(&value).await {
            tracing::debug!("{error}");
        }
        Ok(value)
    }

    pub(crate) async fn load<T>(&self) -> Option<T>
    where
        T: Expiry + serde::de::DeserializeOwned,
    {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return None,
            Err(error) => {
                tracing::debug!("{}", cache_error("failed to read", &self.path, error));
                return None;
            }
        };

        let value: T = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(error) => {
                tracing::debug!("{}", cache_error("ignoring corrupt", &self.path, error));
                return None;
            }
        };

        if is_fresh(&value) {
            tracing::debug!(path = %self.path.display(), "cache hit");
            Some(value)
        } else {
            tracing::debug!(path = %self.path.display(), "cached value expired");
            None
        }
    }

    pub(crate) async fn store<T: serde::Serialize>(&self, value: &T) -> Result<(), String> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|error| cache_error("failed to serialize", &self.path, error))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &content))
            .await
            .map_err(|error| cache_error("failed to write", &self.path, error))?
            .map_err(|error| cache_error("failed to write", &self.path, error))
    }

    /// Delete the cache file. A missing file is not an error.
    pub(crate) async fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path).await {
            Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
            _ => Ok(()),
        }
    }
}

pub(crate) trait Expiry {
    fn expires_at(&self) -> DateTime<Utc>;
}

/// Whether `value` is usable for at least a little while longer.
pub(crate) fn is_fresh(value: &impl Expiry) -> bool {
    value.expires_at() - chrono::Duration::seconds(CACHE_BUFFER_SECS) > Utc::now()
}

/// Replace `path` with `content` via a temporary file in the same directory.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(content)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}

fn cache_error(
    msg: &str,
    path: &Path,
    error: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> String {
    format!(
        "{} cache file {} due to: {}",
        msg,
        path.display(),
        error.into()
    )
}

/// The key identifying the cache entry for a profile and role.
///
/// Without a profile, a role ARN is reduced to `{account}-{last resource segment}` so that every
/// configuration reaching the same role shares one entry. With neither, the key is empty.
pub(crate) fn cache_key(profile: Option<&str>, role_arn: Option<&str>) -> String {
    let profile = profile.filter(|profile| !profile.is_empty());
    match (profile, role_arn.and_then(Arn::parse)) {
        (Some(profile), _) => profile.to_string(),
        (None, Some(arn)) => {
            let name = arn.resource.rsplit('/').next().unwrap_or(arn.resource);
            format!("{}-{}", arn.account_id, name)
        }
        (None, None) => String::new(),
    }
}

pub(crate) fn cache_file_name(
    dir: &Path,
    prefix: &str,
    profile: Option<&str>,
    role_arn: Option<&str>,
) -> PathBuf {
    dir.join(format!("{}_{}", prefix, cache_key(profile, role_arn)))
}
