use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use lbx_crypto::{CrypterError, DeriveError, ItemId};
use lbx_store::StoreError;

pub type VaultResult<T> = Result<T, VaultError>;

/// Caller-facing error for every vault operation.
///
/// Wrong password, wrong associated data, and tampered ciphertext all
/// collapse into `DecryptFailed`; they are indistinguishable on purpose.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("passphrase shorter than {min} characters")]
    WeakPassphrase { min: usize },

    #[error("user already exists")]
    UserExists,

    #[error("decryption failed")]
    DecryptFailed,

    #[error("{0} not found")]
    NotFound(String),

    #[error("keyset invariant violated: {0}")]
    Invariant(String),

    /// Crypter misuse (missing AD, unkeyed crypter, bad key). A programmer
    /// error; tests exercise these, users should never see them.
    #[error("crypter misuse: {0}")]
    Crypter(CrypterError),

    #[error("key derivation failed: {0}")]
    Derive(DeriveError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Reencryption(#[from] ReencryptionErrors),
}

impl From<CrypterError> for VaultError {
    fn from(e: CrypterError) -> Self {
        match e {
            CrypterError::DecryptFailed => VaultError::DecryptFailed,
            other => VaultError::Crypter(other),
        }
    }
}

impl From<DeriveError> for VaultError {
    fn from(e: DeriveError) -> Self {
        match e {
            DeriveError::WeakPassphrase { min } => VaultError::WeakPassphrase { min },
            other => VaultError::Derive(other),
        }
    }
}

impl From<StoreError> for VaultError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { bucket, key } => {
                VaultError::NotFound(format!("{bucket} entry {key}"))
            }
            other => VaultError::Store(other),
        }
    }
}

/// Aggregate per-item failures from the background re-encryption sweep.
///
/// The sweep records a failing item and keeps going, so one corrupt blob
/// does not stall re-keying of the rest of the vault. Never fatal to the
/// session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReencryptionErrors {
    pub failures: BTreeMap<ItemId, String>,
}

impl ReencryptionErrors {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for ReencryptionErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "re-encryption failed for {} item(s):", self.failures.len())?;
        for (item_id, reason) in &self.failures {
            write!(f, " {item_id}: {reason};")?;
        }
        Ok(())
    }
}

impl std::error::Error for ReencryptionErrors {}
