//! Vault session: the one place the live key and decrypted data live
//!
//! States:
//! - `Uninitialized`: no blob in storage
//! - `Locked`: blob in storage, no key in memory
//! - `Unlocked`: key and decrypted [`AppData`] held in memory
//!
//! All mutating operations take `&mut self`, so one session serializes its
//! own read-modify-write cycles. Share it between tasks through
//! [`SharedVaultSession`].

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::backup::BackupEnvelope;
use crate::codec::{open, seal};
use crate::crypto::DerivedKey;
use crate::error::{VaultError, VaultResult};
use crate::merge::merge;
use crate::models::{AppData, MedicalRecord, VaultConfig};
use crate::storage::BlobStore;

/// Externally visible session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultStatus {
    Uninitialized,
    Locked,
    Unlocked,
}

/// Proof that the user explicitly confirmed a destructive reset
#[derive(Debug)]
pub struct ResetConfirmation(());

impl ResetConfirmation {
    /// Only construct this after the user has confirmed data deletion
    pub fn confirmed() -> Self {
        Self(())
    }
}

/// Unlocked vault state
struct UnlockedVault {
    /// Decrypted document, newest record first
    data: AppData,
    /// Key derived from the password; zeroized on drop
    key: DerivedKey,
    /// Last activity timestamp (for auto-lock)
    last_activity: Instant,
}

enum SessionState {
    Uninitialized,
    Locked,
    Unlocked(Box<UnlockedVault>),
}

impl SessionState {
    fn unlocked(&self) -> VaultResult<&UnlockedVault> {
        match self {
            SessionState::Unlocked(vault) => Ok(vault),
            SessionState::Uninitialized | SessionState::Locked => Err(VaultError::VaultLocked),
        }
    }

    fn unlocked_mut(&mut self) -> VaultResult<&mut UnlockedVault> {
        match self {
            SessionState::Unlocked(vault) => Ok(vault),
            SessionState::Uninitialized | SessionState::Locked => Err(VaultError::VaultLocked),
        }
    }
}

/// Password-protected view over a [`BlobStore`]
pub struct VaultSession<S: BlobStore> {
    store: S,
    config: VaultConfig,
    state: SessionState,
    /// Auto-lock timeout, `None` when disabled
    auto_lock_timeout: Option<Duration>,
    /// Set while a save is awaited; still set afterwards only if that
    /// future was dropped before completing
    write_in_flight: bool,
}

impl<S: BlobStore> VaultSession<S> {
    /// Open a session; starts `Locked` if the store holds a blob
    pub async fn open(store: S, config: VaultConfig) -> VaultResult<Self> {
        let state = if store.exists().await? {
            SessionState::Locked
        } else {
            SessionState::Uninitialized
        };
        let auto_lock_timeout = match config.auto_lock_timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            store,
            config,
            state,
            auto_lock_timeout,
            write_in_flight: false,
        })
    }

    pub fn status(&self) -> VaultStatus {
        match self.state {
            SessionState::Uninitialized => VaultStatus::Uninitialized,
            SessionState::Unlocked(_) if !self.write_in_flight => VaultStatus::Unlocked,
            SessionState::Unlocked(_) | SessionState::Locked => VaultStatus::Locked,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.status() == VaultStatus::Unlocked
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create the vault with an empty document. Only valid when no blob exists.
    pub async fn initialize(&mut self, password: SecretString) -> VaultResult<&AppData> {
        self.recover_interrupted_write();

        if !matches!(self.state, SessionState::Uninitialized) || self.store.exists().await? {
            if matches!(self.state, SessionState::Uninitialized) {
                self.state = SessionState::Locked;
            }
            return Err(VaultError::AlreadyInitialized);
        }
        self.check_password(&password, true)?;

        let key = DerivedKey::derive(password.expose_secret().as_bytes());
        let data = AppData::new();
        let blob = seal(&key, &data)?;
        self.store.save(&blob).await?;

        info!("vault initialized");
        self.state = SessionState::Unlocked(Box::new(UnlockedVault {
            data,
            key,
            last_activity: Instant::now(),
        }));
        self.data()
    }

    /// Derive the key from `password` and decrypt the stored document
    pub async fn unlock(&mut self, password: SecretString) -> VaultResult<&AppData> {
        self.recover_interrupted_write();

        match self.state {
            SessionState::Locked => {}
            SessionState::Uninitialized => return Err(VaultError::NotInitialized),
            SessionState::Unlocked(_) => return Err(VaultError::AlreadyUnlocked),
        }
        self.check_password(&password, false)?;

        let Some(blob) = self.store.load().await? else {
            warn!("vault blob missing from storage, treating vault as uninitialized");
            self.state = SessionState::Uninitialized;
            return Err(VaultError::NotInitialized);
        };

        let key = DerivedKey::derive(password.expose_secret().as_bytes());
        let mut data: AppData = match open(&key, &blob) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "unlock failed");
                return Err(e);
            }
        };
        data.sort_records();

        info!(records = data.records.len(), "vault unlocked");
        self.state = SessionState::Unlocked(Box::new(UnlockedVault {
            data,
            key,
            last_activity: Instant::now(),
        }));
        self.data()
    }

    /// Initialize a fresh vault or unlock the existing one, whichever applies
    pub async fn initialize_or_unlock(&mut self, password: SecretString) -> VaultResult<&AppData> {
        self.recover_interrupted_write();

        if matches!(self.state, SessionState::Unlocked(_)) {
            return Err(VaultError::AlreadyUnlocked);
        }

        // Storage is the source of truth; it may have been cleared or restored
        // since the session was opened.
        if self.store.exists().await? {
            self.state = SessionState::Locked;
            self.unlock(password).await
        } else {
            self.state = SessionState::Uninitialized;
            self.initialize(password).await
        }
    }

    /// Drop the key and decrypted data. No storage side effects.
    pub fn lock(&mut self) {
        self.write_in_flight = false;
        if matches!(self.state, SessionState::Unlocked(_)) {
            self.state = SessionState::Locked;
            info!("vault locked");
        }
    }

    /// Decrypted document
    pub fn data(&self) -> VaultResult<&AppData> {
        if self.write_in_flight {
            return Err(VaultError::VaultLocked);
        }
        self.state.unlocked().map(|vault| &vault.data)
    }

    /// Replace the document and persist it under the held key.
    ///
    /// On a storage failure the new document stays in memory and the error is
    /// returned so the caller can retry.
    pub async fn mutate(&mut self, mut new_data: AppData) -> VaultResult<()> {
        self.recover_interrupted_write();

        let vault = self.state.unlocked_mut()?;
        if let Some(id) = new_data.duplicate_id() {
            return Err(VaultError::DuplicateRecordId(id.to_string()));
        }
        new_data.sort_records();

        let blob = seal(&vault.key, &new_data)?;
        vault.data = new_data;
        vault.last_activity = Instant::now();

        self.write_in_flight = true;
        let result = self.store.save(&blob).await;
        self.write_in_flight = false;

        match result {
            Ok(()) => {
                debug!("vault saved");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to persist vault, in-memory changes kept");
                Err(e)
            }
        }
    }

    /// Apply `f` to a copy of the document, then persist it
    pub async fn update<F>(&mut self, f: F) -> VaultResult<()>
    where
        F: FnOnce(&mut AppData) -> VaultResult<()>,
    {
        self.recover_interrupted_write();

        let mut draft = self.data()?.clone();
        f(&mut draft)?;
        self.mutate(draft).await
    }

    pub async fn add_record(&mut self, record: MedicalRecord) -> VaultResult<()> {
        self.update(|data| data.add_record(record)).await
    }

    pub async fn update_record(&mut self, record: MedicalRecord) -> VaultResult<()> {
        self.update(|data| data.replace_record(record)).await
    }

    pub async fn delete_record(&mut self, id: &str) -> VaultResult<()> {
        self.update(|data| data.remove_record(id).map(|_| ())).await
    }

    pub async fn update_profile(&mut self, name: &str, dob: &str) -> VaultResult<()> {
        self.update(|data| {
            data.set_profile(name, dob);
            Ok(())
        })
        .await
    }

    /// Irreversibly delete the stored vault
    pub async fn reset(&mut self, _confirmation: ResetConfirmation) -> VaultResult<()> {
        self.lock();
        self.store.clear().await?;
        self.state = SessionState::Uninitialized;
        info!("vault reset, all data removed");
        Ok(())
    }

    /// Wrap the persisted blob, as stored, in a backup envelope
    pub async fn export_backup(&self) -> VaultResult<BackupEnvelope> {
        let blob = self.store.load().await?.ok_or(VaultError::NotInitialized)?;
        info!("backup exported");
        Ok(BackupEnvelope::new(blob))
    }

    /// Decrypt a backup with the current key, merge it into the document
    /// (imported records win) and persist the result
    pub async fn import_backup(&mut self, envelope: &BackupEnvelope) -> VaultResult<&AppData> {
        self.recover_interrupted_write();

        let vault = self.state.unlocked()?;
        envelope.validate()?;

        let imported: AppData = open(&vault.key, envelope.blob())?;
        let merged = merge(&vault.data, &imported);
        info!(
            current = vault.data.records.len(),
            imported = imported.records.len(),
            merged = merged.records.len(),
            "backup merged"
        );

        self.mutate(merged).await?;
        self.data()
    }

    /// Parse a backup document and import it
    pub async fn import_backup_json(&mut self, text: &str) -> VaultResult<&AppData> {
        self.state.unlocked()?;
        let envelope = BackupEnvelope::from_json(text)?;
        self.import_backup(&envelope).await
    }

    /// Touch activity (reset auto-lock timer)
    pub fn touch(&mut self) {
        if let SessionState::Unlocked(vault) = &mut self.state {
            vault.last_activity = Instant::now();
        }
    }

    /// Check if auto-lock is due
    pub fn should_auto_lock(&self) -> bool {
        match (&self.state, self.auto_lock_timeout) {
            (SessionState::Unlocked(vault), Some(timeout)) => vault.last_activity.elapsed() > timeout,
            _ => false,
        }
    }

    /// Lock if idle past the configured timeout. Returns whether it locked.
    pub fn lock_if_idle(&mut self) -> bool {
        if self.should_auto_lock() {
            info!("auto-lock timeout reached");
            self.lock();
            return true;
        }
        false
    }

    fn check_password(&self, password: &SecretString, creating: bool) -> VaultResult<()> {
        let password = password.expose_secret();
        if password.is_empty() {
            return Err(VaultError::EmptyPassword);
        }
        let min = self.config.min_password_length;
        if creating && password.chars().count() < min {
            return Err(VaultError::PasswordTooShort(min));
        }
        Ok(())
    }

    /// A save future was dropped mid-flight, so memory and storage may
    /// disagree. Fail closed.
    fn recover_interrupted_write(&mut self) {
        if self.write_in_flight {
            warn!("previous save was interrupted, locking vault");
            self.lock();
        }
    }
}

/// Thread-safe session wrapper
pub type SharedVaultSession<S> = Arc<RwLock<VaultSession<S>>>;

/// Create a new shared session
pub async fn create_shared_session<S: BlobStore>(
    store: S,
    config: VaultConfig,
) -> VaultResult<SharedVaultSession<S>> {
    let session = VaultSession::open(store, config).await?;
    Ok(Arc::new(RwLock::new(session)))
}
