//! Single-slot persistence for the encrypted vault blob
//!
//! Handles reading/writing the encrypted vault with:
//! - Atomic writes (write to temp, sync, then rename)
//! - Owner-only permissions on Unix
//! - Plaintext configuration next to the vault file

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::codec::EncryptedBlob;
use crate::error::{VaultError, VaultResult};
use crate::models::VaultConfig;

/// Default vault directory name
const VAULT_DIR: &str = ".health-vault";

/// Environment variable overriding the vault directory
pub const VAULT_DIR_ENV: &str = "HEALTH_VAULT_DIR";

/// Main vault file name
const VAULT_FILE: &str = "vault.enc";

/// Temp file used during atomic writes
const VAULT_TEMP_FILE: &str = "vault.enc.tmp";

/// Config file name
const CONFIG_FILE: &str = "config.toml";

/// Durable home for exactly one encrypted blob.
///
/// Every method returns only after the medium has committed the change.
/// Implementations do not coordinate concurrent writers; the session
/// serializes access.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Replace the stored blob
    async fn save(&self, blob: &EncryptedBlob) -> VaultResult<()>;

    /// Stored blob, or `None` when the vault was never initialized or was cleared
    async fn load(&self) -> VaultResult<Option<EncryptedBlob>>;

    async fn exists(&self) -> VaultResult<bool> {
        Ok(self.load().await?.is_some())
    }

    /// Irreversibly remove the stored blob
    async fn clear(&self) -> VaultResult<()>;
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    async fn save(&self, blob: &EncryptedBlob) -> VaultResult<()> {
        (**self).save(blob).await
    }

    async fn load(&self) -> VaultResult<Option<EncryptedBlob>> {
        (**self).load().await
    }

    async fn exists(&self) -> VaultResult<bool> {
        (**self).exists().await
    }

    async fn clear(&self) -> VaultResult<()> {
        (**self).clear().await
    }
}

/// Get the default vault directory path
pub fn default_vault_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(VAULT_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(VAULT_DIR)
}

/// Get the vault file path
pub fn vault_file_path(base_dir: &Path) -> PathBuf {
    base_dir.join(VAULT_FILE)
}

/// Get the config file path
pub fn config_file_path(base_dir: &Path) -> PathBuf {
    base_dir.join(CONFIG_FILE)
}

/// Ensure the vault directory exists with proper permissions
pub async fn ensure_vault_dir(base_dir: &Path) -> VaultResult<()> {
    if !fs::try_exists(base_dir).await? {
        fs::create_dir_all(base_dir).await?;

        // Set directory permissions to 700 (owner only) on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            fs::set_permissions(base_dir, perms).await?;
        }
    }
    Ok(())
}

/// Flush directory entries so a completed rename or unlink survives a crash
async fn sync_dir(dir: &Path) -> VaultResult<()> {
    #[cfg(unix)]
    fs::File::open(dir).await?.sync_all().await?;

    #[cfg(not(unix))]
    let _ = dir;

    Ok(())
}

/// Blob store backed by a single file in the vault directory
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    base_dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Store rooted at [`default_vault_dir`]
    pub fn open_default() -> Self {
        Self::new(default_vault_dir())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn path(&self) -> PathBuf {
        vault_file_path(&self.base_dir)
    }

    fn temp_path(&self) -> PathBuf {
        self.base_dir.join(VAULT_TEMP_FILE)
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn save(&self, blob: &EncryptedBlob) -> VaultResult<()> {
        ensure_vault_dir(&self.base_dir).await?;

        // Write atomically (write to temp, then rename)
        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(blob.as_str().as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        // Set file permissions to 600 (owner only) on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            fs::set_permissions(&temp_path, perms).await?;
        }

        fs::rename(&temp_path, self.path()).await?;
        sync_dir(&self.base_dir).await?;
        debug!(bytes = blob.as_str().len(), "vault blob written");

        Ok(())
    }

    async fn load(&self) -> VaultResult<Option<EncryptedBlob>> {
        match fs::read_to_string(self.path()).await {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(EncryptedBlob::from_encoded(content.trim()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> VaultResult<()> {
        let mut removed = false;
        for path in [self.path(), self.temp_path()] {
            match fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "removed");
                    removed = true;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if removed {
            sync_dir(&self.base_dir).await?;
        }
        Ok(())
    }
}

/// In-process blob store for tests and embedding hosts
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    slot: Mutex<Option<EncryptedBlob>>,
    fail_writes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a blob
    pub fn with_blob(blob: EncryptedBlob) -> Self {
        Self {
            slot: Mutex::new(Some(blob)),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent `save` and `clear` calls fail with an I/O error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> VaultResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(VaultError::Persist(io::Error::other("simulated write failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn save(&self, blob: &EncryptedBlob) -> VaultResult<()> {
        self.check_writable()?;
        *self.slot.lock().await = Some(blob.clone());
        Ok(())
    }

    async fn load(&self) -> VaultResult<Option<EncryptedBlob>> {
        Ok(self.slot.lock().await.clone())
    }

    async fn clear(&self) -> VaultResult<()> {
        self.check_writable()?;
        *self.slot.lock().await = None;
        Ok(())
    }
}

/// Load vault configuration
pub async fn load_config(base_dir: &Path) -> VaultResult<VaultConfig> {
    let config_path = config_file_path(base_dir);

    let content = match fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(VaultConfig::default()),
        Err(e) => return Err(e.into()),
    };

    toml::from_str(&content).map_err(|e| VaultError::ConfigError(e.to_string()))
}

/// Save vault configuration
pub async fn save_config(base_dir: &Path, config: &VaultConfig) -> VaultResult<()> {
    ensure_vault_dir(base_dir).await?;

    let content =
        toml::to_string_pretty(config).map_err(|e| VaultError::ConfigError(e.to_string()))?;

    fs::write(config_file_path(base_dir), content).await?;

    Ok(())
}
