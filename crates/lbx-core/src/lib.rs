//! lbx-core: the latchbox vault engine.
//!
//! A caller presents a username and passphrase to [`LockedBox`], which
//! derives the session keys, reads and writes ciphertext through the
//! bucket store, and hands back an [`UnlockedBox`] over the decrypted
//! user, keyset, and metadata. The unlocked box serves item operations
//! and the background reconciliation ([`UnlockedBox::update_encryption`],
//! [`UnlockedBox::purge_unused_keys`]) that re-keys items after a
//! password change and retires old master keys.
//!
//! ```text
//! LockedBox ── register / login / change_password ──► UnlockedBox
//!                                                        │
//!                       add / update / delete / get ─────┤
//!                       update_encryption ───────────────┤
//!                       purge_unused_keys ───────────────┘
//! ```
//!
//! Dropping an `UnlockedBox` locks the session; key material zeroizes on
//! drop.

pub mod config;
pub mod error;
pub mod keyset;
pub mod locked;
pub mod metadata;
pub mod note;
pub mod unlocked;
pub mod user;

pub use config::VaultConfig;
pub use error::{ReencryptionErrors, VaultError, VaultResult};
pub use keyset::{Keyset, KeysetItem};
pub use locked::LockedBox;
pub use metadata::{ItemMetadata, Metadata};
pub use note::NoteItem;
pub use unlocked::UnlockedBox;
pub use user::User;
