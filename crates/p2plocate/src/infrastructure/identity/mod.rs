//! Client identity: the stable identifier this node announces itself with.
//!
//! The production provider persists a UUID v4 to a small text file the first
//! time it is asked, and reads the same value back on every later run.  The
//! value is cached for the lifetime of the provider so the file is touched at
//! most once per process.
//!
//! # Failure handling
//!
//! Identity is never allowed to block startup.  If the file cannot be read or
//! written, the provider logs a warning and hands out a fresh UUID for this
//! run only.
//!
//! # Testability
//!
//! The discovery server only sees the [`IdentityProvider`] trait, so tests can
//! inject [`mock::StaticIdentity`] and never touch the file system.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{info, warn};
use uuid::Uuid;

pub mod mock;

/// Default file name of the persisted client id, relative to the working directory.
pub const DEFAULT_IDENTITY_FILE: &str = "clientid";

/// Supplies the identifier this node announces itself with.
pub trait IdentityProvider: Send + Sync {
    /// Returns the client id.  Must be non-empty and stable for the process lifetime.
    fn client_id(&self) -> String;
}

/// File-backed [`IdentityProvider`].
#[derive(Debug)]
pub struct FileIdentityProvider {
    path: PathBuf,
    cached: OnceLock<String>,
}

impl FileIdentityProvider {
    /// Creates a provider that persists the id at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: OnceLock::new(),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileIdentityProvider {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_FILE)
    }
}

impl IdentityProvider for FileIdentityProvider {
    fn client_id(&self) -> String {
        self.cached
            .get_or_init(|| load_or_create(&self.path))
            .clone()
    }
}

/// Reads the id stored at `path`, creating and persisting a new one if the
/// file is missing, unreadable or empty.
fn load_or_create(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let id = content.trim();
            if !id.is_empty() {
                return id.to_string();
            }
            warn!("client id file {} is empty; creating a new id", path.display());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "failed to read client id file {}: {e}; creating a new id",
            path.display()
        ),
    }

    let id = Uuid::new_v4().to_string();
    info!("created new client id {id}");
    if let Err(e) = std::fs::write(path, &id) {
        warn!(
            "failed to persist client id to {}: {e}; the id is only valid for this run",
            path.display()
        );
    }
    id
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("p2plocate_id_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_creates_and_persists_id_when_file_absent() {
        // Arrange
        let dir = temp_dir();
        let path = dir.join("clientid");
        let provider = FileIdentityProvider::new(&path);

        // Act
        let id = provider.client_id();

        // Assert
        assert!(Uuid::parse_str(&id).is_ok(), "id must be a UUID, got {id}");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), id);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_reads_existing_id_and_trims_whitespace() {
        // Arrange
        let dir = temp_dir();
        let path = dir.join("clientid");
        std::fs::write(&path, "node-from-disk\n").unwrap();

        // Act
        let id = FileIdentityProvider::new(&path).client_id();

        // Assert
        assert_eq!(id, "node-from-disk");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_id_is_stable_across_provider_instances() {
        // Arrange: two providers over the same file stand in for two process runs
        let dir = temp_dir();
        let path = dir.join("clientid");

        // Act
        let first = FileIdentityProvider::new(&path).client_id();
        let second = FileIdentityProvider::new(&path).client_id();

        // Assert
        assert_eq!(first, second);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_empty_file_is_replaced_with_new_id() {
        let dir = temp_dir();
        let path = dir.join("clientid");
        std::fs::write(&path, "   ").unwrap();

        let id = FileIdentityProvider::new(&path).client_id();

        assert!(!id.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), id);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unwritable_location_falls_back_to_ephemeral_id() {
        // Arrange: the parent directory does not exist, so the write fails
        let path = std::env::temp_dir()
            .join(format!("p2plocate_missing_{}", Uuid::new_v4()))
            .join("clientid");
        let provider = FileIdentityProvider::new(&path);

        // Act
        let id = provider.client_id();

        // Assert: a usable id is still returned and cached for this provider
        assert!(!id.is_empty());
        assert_eq!(provider.client_id(), id);
        assert!(!path.exists());
    }

    #[test]
    fn test_default_provider_uses_clientid_file_name() {
        let provider = FileIdentityProvider::default();
        assert_eq!(provider.path(), Path::new(DEFAULT_IDENTITY_FILE));
    }
}
