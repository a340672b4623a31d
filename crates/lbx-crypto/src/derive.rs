//! Versioned key derivation.
//!
//! A `VersionToken` selects the algorithm set. Keyset entries record the
//! version their base key was created under, so sub-key derivation for old
//! items keeps using the algorithm that produced them even after the
//! default moves on.

use secrecy::SecretString;
use thiserror::Error;

use crate::argon_blake::ArgonBlakeDeriver;
use crate::keys::{AuthKey, BaseKey, CryptKey};
use crate::tokens::{AuthToken, UserId, VersionToken};

/// Version id of the default deriver: Argon2id base key + keyed BLAKE2b
/// sub-derivations with frozen parameters and context strings.
pub const ARGON_BLAKE_DERIVER_VERSION: &str =
    "vt_W5BREZKAIEU4PZEWSZEHYFS53UNZD43ONKWOODRA2L2DZDIS5DYA";

/// Minimum passphrase length in characters, counted after NFKD normalization.
pub const MIN_PASSPHRASE_CHARS: usize = 16;

/// Argon2id cost parameters for the password hash.
///
/// The defaults are the frozen values of the default deriver version; a
/// different parameter set requires a new version id or previously written
/// vaults stop deriving the same keys.
#[derive(Debug, Clone, Copy)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Key-derivation failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeriveError {
    #[error("passphrase shorter than {min} characters")]
    WeakPassphrase { min: usize },

    #[error("invalid Argon2id parameters: {0}")]
    Params(String),
}

/// A versioned deriver; one variant per algorithm set.
#[derive(Debug, Clone)]
pub enum Deriver {
    ArgonBlake(ArgonBlakeDeriver),
}

impl Deriver {
    /// Select the deriver for a version token.
    ///
    /// Unknown versions fall back to the default algorithm set so vaults
    /// written by newer builds stay readable; a future version adds its
    /// own arm here.
    pub fn for_version(_version: &VersionToken, params: KdfParams) -> Self {
        Self::ArgonBlake(ArgonBlakeDeriver::new(params))
    }

    /// The version token of the current default deriver.
    pub fn default_version() -> VersionToken {
        ARGON_BLAKE_DERIVER_VERSION
            .parse()
            .expect("deriver version id is a valid version token")
    }

    /// Derive the master secret for a `(username, passphrase)` pair.
    ///
    /// Deterministic in the NFKD-normalized inputs; rejects passphrases
    /// shorter than [`MIN_PASSPHRASE_CHARS`].
    pub fn derive_base_key(
        &self,
        username: &str,
        passphrase: &SecretString,
    ) -> Result<BaseKey, DeriveError> {
        match self {
            Self::ArgonBlake(d) => d.derive_base_key(username, passphrase),
        }
    }

    /// Derive the key that encrypts the user record.
    pub fn derive_auth_key(&self, base_key: &BaseKey) -> AuthKey {
        match self {
            Self::ArgonBlake(d) => d.derive_auth_key(base_key),
        }
    }

    /// Derive the storage token of the user record.
    pub fn derive_auth_token(&self, base_key: &BaseKey, user_id: &UserId) -> AuthToken {
        match self {
            Self::ArgonBlake(d) => d.derive_auth_token(base_key, user_id),
        }
    }

    /// Derive an AEAD key; `salt` selects the per-entity sub-key, the
    /// fixed encryption context is used when no salt is supplied.
    pub fn derive_crypt_key(&self, base_key: &BaseKey, salt: Option<&[u8]>) -> CryptKey {
        match self {
            Self::ArgonBlake(d) => d.derive_crypt_key(base_key, salt),
        }
    }
}

/// Generate a random recovery passphrase: [`MIN_PASSPHRASE_CHARS`]
/// characters of the token alphabet, for callers that offer a generated
/// passphrase instead of a user-chosen one.
pub fn recovery_phrase() -> String {
    use data_encoding::BASE32_NOPAD;
    use rand::RngCore;

    let mut bytes = [0u8; MIN_PASSPHRASE_CHARS];
    rand::rngs::OsRng.fill_bytes(&mut bytes);

    let mut phrase = BASE32_NOPAD.encode(&bytes);
    phrase.truncate(MIN_PASSPHRASE_CHARS);
    phrase
}
