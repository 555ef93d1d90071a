//! Error types for vault operations

use thiserror::Error;

/// Errors that can occur during vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// Wrong password and corrupted ciphertext are deliberately the same error.
    #[error("Wrong password or corrupted data")]
    Auth,

    #[error("Vault is locked - unlock with password first")]
    VaultLocked,

    #[error("Vault is not initialized")]
    NotInitialized,

    #[error("Vault is already initialized")]
    AlreadyInitialized,

    #[error("Vault is already unlocked")]
    AlreadyUnlocked,

    #[error("Password must not be empty")]
    EmptyPassword,

    #[error("Password must be at least {0} characters")]
    PasswordTooShort(usize),

    #[error("Storage error: {0}")]
    Persist(#[from] std::io::Error),

    #[error("Invalid backup file: {0}")]
    Format(String),

    /// Authentication succeeded but the payload did not decode. Indicates a
    /// build or schema mismatch rather than a user error.
    #[error("Vault data is inconsistent: {0}")]
    Consistency(String),

    #[error("Duplicate record id: {0}")]
    DuplicateRecordId(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl VaultError {
    /// True for failures that must be reported with the generic auth message.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, VaultError::Auth)
    }

    /// True when the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::Persist(_))
    }
}

pub type VaultResult<T> = Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_message_is_generic() {
        assert_eq!(VaultError::Auth.to_string(), "Wrong password or corrupted data");
        assert!(VaultError::Auth.is_auth_failure());
        assert!(!VaultError::Auth.is_retryable());
    }

    #[test]
    fn test_io_errors_are_retryable() {
        let err: VaultError = std::io::Error::other("disk full").into();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("disk full"));
    }
}
