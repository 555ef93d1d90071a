//! Portable backup envelope
//!
//! A backup is a small JSON document wrapping the persisted blob verbatim:
//!
//! ```json
//! { "appName": "MyHealthPledgeBackup", "version": 1, "encryptedData": "<base64>" }
//! ```
//!
//! The tag and version are checked before any decryption is attempted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::codec::EncryptedBlob;
use crate::error::{VaultError, VaultResult};

/// Literal application tag carried by every backup
pub const BACKUP_APP_NAME: &str = "MyHealthPledgeBackup";

/// Current backup format version
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// Versioned wrapper around an encrypted vault blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEnvelope {
    pub app_name: String,
    pub version: u32,
    pub encrypted_data: EncryptedBlob,
}

impl BackupEnvelope {
    /// Wrap a blob in a current-version envelope
    pub fn new(blob: EncryptedBlob) -> Self {
        Self {
            app_name: BACKUP_APP_NAME.to_string(),
            version: BACKUP_FORMAT_VERSION,
            encrypted_data: blob,
        }
    }

    /// Check tag, version and payload presence
    pub fn validate(&self) -> VaultResult<()> {
        if self.app_name != BACKUP_APP_NAME {
            return Err(VaultError::Format(format!(
                "unexpected application tag '{}'",
                self.app_name
            )));
        }
        if self.version != BACKUP_FORMAT_VERSION {
            return Err(VaultError::Format(format!(
                "unsupported backup version {} (expected {})",
                self.version, BACKUP_FORMAT_VERSION
            )));
        }
        if self.encrypted_data.is_empty() {
            return Err(VaultError::Format("backup contains no data".to_string()));
        }
        Ok(())
    }

    pub fn blob(&self) -> &EncryptedBlob {
        &self.encrypted_data
    }

    /// Pretty-printed JSON, two-space indented
    pub fn to_json(&self) -> VaultResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| VaultError::Format(e.to_string()))
    }

    /// Parse and validate a backup document
    pub fn from_json(text: &str) -> VaultResult<Self> {
        let envelope: Self =
            serde_json::from_str(text).map_err(|e| VaultError::Format(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }
}

/// Conventional file name for a backup taken on `date`
pub fn backup_file_name(date: NaiveDate) -> String {
    format!("health-data-backup-{}.json", date.format("%Y-%m-%d"))
}

/// Write a backup file
pub async fn write_backup_file(path: &Path, envelope: &BackupEnvelope) -> VaultResult<()> {
    let json = envelope.to_json()?;
    fs::write(path, json).await?;
    Ok(())
}

/// Read and validate a backup file
pub async fn read_backup_file(path: &Path) -> VaultResult<BackupEnvelope> {
    let bytes = fs::read(path).await?;
    let text = String::from_utf8(bytes)
        .map_err(|_| VaultError::Format("backup file is not valid UTF-8".to_string()))?;
    BackupEnvelope::from_json(&text)
}
