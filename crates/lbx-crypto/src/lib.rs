//! lbx-crypto: identifiers, key material, and AEAD envelopes for latchbox
//!
//! Key hierarchy:
//! ```text
//! Passphrase + Username
//!        │ Argon2id (salt = BLAKE2b-256 of NFKD username)
//!        ▼
//! BaseKey (per keyset entry, 256-bit)
//!   ├── AuthKey:   keyed BLAKE2b, fixed context   → decrypts the user record
//!   ├── AuthToken: keyed BLAKE2b over the UserId  → locates the user record
//!   └── CryptKey:  keyed BLAKE2b, fixed context or caller salt
//!                  (per-item and per-metadata keys use the entity id as salt)
//! ```
//!
//! Every ciphertext is XChaCha20-Poly1305 with a random 24-byte nonce
//! prepended and the owning entity's token string bound as associated data,
//! so a blob moved to a different storage key fails authentication.
//!
//! Derivers and crypters are versioned: a `VersionToken` selects the
//! algorithm set, and keyset entries record the version they were created
//! under so old material stays readable across upgrades.

pub mod argon_blake;
pub mod crypter;
pub mod derive;
pub mod keys;
pub mod tokens;

pub use crypter::{Crypter, CrypterError, XCHACHA_CRYPTER_VERSION};
pub use derive::{
    recovery_phrase, DeriveError, Deriver, KdfParams, ARGON_BLAKE_DERIVER_VERSION,
    MIN_PASSPHRASE_CHARS,
};
pub use keys::{AuthKey, BaseKey, CryptKey};
pub use tokens::{AuthToken, ItemId, KeysetId, MetadataId, ParseError, UserId, VersionToken};

/// Size of all key material in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of all token identifiers in bytes
pub const TOKEN_SIZE: usize = 32;

/// XChaCha20-Poly1305 nonce size in bytes (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;
