//! Health Vault Core - Password-protected storage for personal medical records
//!
//! This crate provides:
//! - PBKDF2-HMAC-SHA256 key derivation from the user password
//! - AES-256-GCM sealing of the whole record document into one opaque blob
//! - Atomic single-slot persistence with owner-only permissions
//! - A lock/unlock session with auto-lock and fail-closed writes
//! - Portable backups that merge into the live document on import

pub mod backup;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod merge;
pub mod models;
pub mod session;
pub mod storage;

pub use backup::{BackupEnvelope, BACKUP_APP_NAME, BACKUP_FORMAT_VERSION};
pub use codec::EncryptedBlob;
pub use crypto::DerivedKey;
pub use error::{VaultError, VaultResult};
pub use logging::init_logging;
pub use merge::merge;
pub use models::*;
pub use session::{
    create_shared_session, ResetConfirmation, SharedVaultSession, VaultSession, VaultStatus,
};
pub use storage::{BlobStore, FileBlobStore, MemoryBlobStore};

pub use secrecy::SecretString;
