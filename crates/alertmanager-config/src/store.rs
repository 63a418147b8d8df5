//! Loading and atomically saving the configuration file.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::document::ConfigDocument;
use crate::error::{ConfigError, Result};
use crate::reload::ReloadNotifier;

/// Whole-file byte access to the configuration document.
pub trait DocumentFile: Send + Sync + fmt::Debug {
    /// Where the document lives, for diagnostics.
    fn location(&self) -> &Path;

    /// Reads the whole file.
    ///
    /// # Errors
    ///
    /// Returns an error with kind [`io::ErrorKind::NotFound`] if the file is absent.
    fn read(&self) -> io::Result<Vec<u8>>;

    /// Replaces the whole file. A failed write must leave the previous
    /// contents in place.
    fn write_atomic(&self, bytes: &[u8]) -> io::Result<()>;
}

/// A configuration file on the local filesystem.
///
/// Writes go to a temporary file in the same directory which is then
/// renamed over the target, so readers only ever see a complete document.
#[derive(Debug, Clone)]
pub struct FsDocumentFile {
    dir: PathBuf,
    path: PathBuf,
}

impl FsDocumentFile {
    /// Creates a handle for `file_name` inside `dir`.
    pub fn new(dir: impl Into<PathBuf>, file_name: &str) -> Self {
        let dir = dir.into();
        let path = dir.join(file_name);
        Self { dir, path }
    }
}

impl DocumentFile for FsDocumentFile {
    fn location(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    fn write_atomic(&self, bytes: &[u8]) -> io::Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        // Temp files are created owner-only; keep whatever mode the daemon
        // could already read.
        if let Ok(meta) = fs::metadata(&self.path) {
            tmp.as_file().set_permissions(meta.permissions())?;
        }

        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Reads and writes the configuration document, signalling a reload after every write.
#[derive(Debug)]
pub struct ConfigStore<N> {
    file: Arc<dyn DocumentFile>,
    notifier: N,
}

impl<N: ReloadNotifier> ConfigStore<N> {
    /// Creates a store over `file` that reloads through `notifier`.
    pub fn new(file: impl DocumentFile + 'static, notifier: N) -> Self {
        Self {
            file: Arc::new(file),
            notifier,
        }
    }

    /// Where the document lives.
    #[must_use]
    pub fn location(&self) -> &Path {
        self.file.location()
    }

    /// Returns the reload notifier.
    #[must_use]
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Loads and parses the current document.
    ///
    /// # Errors
    ///
    /// - `ConfigError::NotFound` if the file does not exist
    /// - `ConfigError::MalformedConfig` if it cannot be parsed
    /// - `ConfigError::Io` for any other read failure
    pub fn load(&self) -> Result<ConfigDocument> {
        let bytes = self.file.read().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: self.location().to_path_buf(),
                }
            } else {
                ConfigError::Io(e)
            }
        })?;

        let doc = ConfigDocument::parse(&bytes)?;
        debug!(
            path = %self.location().display(),
            receivers = doc.receivers.len(),
            routes = doc.route.routes.len(),
            "loaded alertmanager config"
        );
        Ok(doc)
    }

    /// Validates, writes and then signals a reload exactly once.
    ///
    /// Nothing is written and no reload is sent if validation fails. The
    /// write and its fsync run on the blocking pool.
    ///
    /// # Errors
    ///
    /// - `ConfigError::MalformedConfig` if the document violates its invariants
    /// - `ConfigError::Io` if the write fails; the previous file is left intact
    pub async fn save(&self, doc: &ConfigDocument) -> Result<()> {
        let bytes = doc.serialize()?;
        let len = bytes.len();

        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || file.write_atomic(&bytes))
            .await
            .map_err(io::Error::other)??;

        info!(
            path = %self.location().display(),
            bytes = len,
            "wrote alertmanager config"
        );

        self.notifier.notify().await;
        Ok(())
    }
}
