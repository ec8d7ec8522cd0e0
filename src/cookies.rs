use std::{
    fmt,
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
    sync::Arc,
};

use cookie_store::CookieStore;
use reqwest_cookie_store::CookieStoreMutex;

use crate::{cache::write_atomic, config::shared_config_dir, Error};

pub(crate) const COOKIE_FILE: &str = concat!(".", env!("CARGO_PKG_NAME"), ".cookies");

/// HTTP cookies shared by every identity provider client.
///
/// Persisting the jar lets a session established with an identity provider by one invocation be
/// reused by the next, for as long as the provider keeps the session alive. The jar is written
/// back to disk on [`flush`](Self::flush) and when it is dropped.
pub struct CookieJar {
    path: Option<PathBuf>,
    store: Arc<CookieStoreMutex>,
}

impl CookieJar {
    /// Load the jar at the default location, next to the AWS shared config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the location of the AWS shared config file cannot be determined.
    pub fn load_default() -> Result<Self, Error> {
        Ok(Self::load(shared_config_dir()?.join(COOKIE_FILE)))
    }

    /// Load the jar stored at `path`.
    ///
    /// A missing or unreadable file yields an empty jar that will be written to `path`.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let store = read_store(&path).unwrap_or_else(|error| {
            tracing::debug!("ignoring cookie file {} due to: {error}", path.display());
            CookieStore::default()
        });

        Self {
            path: Some(path),
            store: Arc::new(CookieStoreMutex::new(store)),
        }
    }

    /// An empty jar that is never persisted.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            store: Arc::new(CookieStoreMutex::default()),
        }
    }

    /// Where the jar is persisted, if anywhere.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the jar to disk, including session cookies.
    ///
    /// # Errors
    ///
    /// Returns an error if the jar cannot be serialized or written.
    pub fn flush(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut content = Vec::new();
        {
            let store = self
                .store
                .lock()
                .map_err(|_| io::Error::other("cookie store lock poisoned"))?;
            cookie_store::serde::json::save_incl_expired_and_nonpersistent(&store, &mut content)
                .map_err(io::Error::other)?;
        }
        write_atomic(path, &content)
    }

    pub(crate) fn store(&self) -> Arc<CookieStoreMutex> {
        Arc::clone(&self.store)
    }
}

impl Drop for CookieJar {
    fn drop(&mut self) {
        if let Err(error) = self.flush() {
            tracing::debug!("failed to save cookies: {error}");
        }
    }
}

impl fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CookieJar")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn read_store(path: &Path) -> Result<CookieStore, Box<dyn std::error::Error + Send + Sync>> {
    match File::open(path) {
        Ok(file) => cookie_store::serde::json::load(BufReader::new(file)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(CookieStore::default()),
        Err(error) => Err(error.into()),
    }
}
