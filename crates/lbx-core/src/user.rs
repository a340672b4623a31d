//! The user record: the binding between a username, its id, and the ids of
//! the keyset and metadata aggregates.
//!
//! The record itself is immutable after creation; a password change only
//! moves its encrypted blob to a new storage token and key. The plaintext
//! username→id binding lives in the separate `auth` bucket and is written
//! exactly once, at registration.

use serde::{Deserialize, Serialize};

use lbx_crypto::{AuthToken, Crypter, KeysetId, MetadataId, UserId};
use lbx_store::{BucketStore, StoreError};

use crate::error::{VaultError, VaultResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "UserId")]
    pub user_id: UserId,
    #[serde(rename = "UserName")]
    pub user_name: String,
    #[serde(rename = "KeysetId")]
    pub keyset_id: KeysetId,
    #[serde(rename = "MetadataId")]
    pub metadata_id: MetadataId,
}

impl User {
    /// A fresh user with newly allocated ids.
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_id: UserId::random(),
            user_name: user_name.into(),
            keyset_id: KeysetId::random(),
            metadata_id: MetadataId::random(),
        }
    }

    fn seal(&self, crypter: &Crypter) -> VaultResult<Vec<u8>> {
        let plaintext = serde_json::to_vec(self)?;
        Ok(crypter.encrypt(&plaintext, self.user_id.to_string().as_bytes())?)
    }

    /// First-time creation: claim the username binding, then write the
    /// encrypted record under `auth_token`. Rolls the binding back if the
    /// record write fails so a half-registered name is not left claimed.
    pub fn create(
        &self,
        store: &BucketStore,
        crypter: &Crypter,
        auth_token: &AuthToken,
    ) -> VaultResult<()> {
        let existing = store.get_user_id(&self.user_name)?;
        if !existing.is_zero() {
            return Err(VaultError::UserExists);
        }

        store.save_user_id(&self.user_name, &self.user_id)?;

        let sealed = self.seal(crypter)?;
        if let Err(e) = store.save_user(auth_token, &sealed) {
            if let Err(rollback) = store.delete_user_id(&self.user_name) {
                tracing::warn!(error = %rollback, "username binding rollback failed");
            }
            return Err(e.into());
        }

        Ok(())
    }

    /// Rewrite the encrypted record only; the username binding is never
    /// touched after creation.
    pub fn save(
        &self,
        store: &BucketStore,
        crypter: &Crypter,
        auth_token: &AuthToken,
    ) -> VaultResult<()> {
        let sealed = self.seal(crypter)?;
        store.save_user(auth_token, &sealed)?;
        Ok(())
    }

    /// Fetch the record stored under `auth_token` and decrypt it against
    /// the caller's claimed `user_id`.
    ///
    /// The auth token is itself derived from the passphrase, so a wrong
    /// passphrase looks up an absent record. That miss reports as
    /// `DecryptFailed`: a missing user, a wrong passphrase, and a tampered
    /// blob must stay indistinguishable to the caller.
    pub fn load(
        store: &BucketStore,
        crypter: &Crypter,
        auth_token: &AuthToken,
        user_id: &UserId,
    ) -> VaultResult<Self> {
        let sealed = match store.get_user(auth_token) {
            Ok(sealed) => sealed,
            Err(StoreError::NotFound { .. }) => return Err(VaultError::DecryptFailed),
            Err(e) => return Err(e.into()),
        };
        let plaintext = crypter.decrypt(&sealed, user_id.to_string().as_bytes())?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbx_crypto::CryptKey;
    use tempfile::tempdir;

    fn keyed() -> Crypter {
        Crypter::keyed(&Crypter::default_version(), &CryptKey::random())
    }

    #[test]
    fn test_create_and_load() {
        let dir = tempdir().unwrap();
        let store = BucketStore::open(dir.path().join("user.redb")).unwrap();
        let crypter = keyed();
        let at = AuthToken::random();

        let user = User::new("alice");
        user.create(&store, &crypter, &at).unwrap();

        assert_eq!(store.get_user_id("alice").unwrap(), user.user_id);

        let loaded = User::load(&store, &crypter, &at, &user.user_id).unwrap();
        assert_eq!(loaded, user);
    }

    #[test]
    fn test_create_duplicate_fails() {
        let dir = tempdir().unwrap();
        let store = BucketStore::open(dir.path().join("user.redb")).unwrap();
        let crypter = keyed();

        User::new("alice")
            .create(&store, &crypter, &AuthToken::random())
            .unwrap();

        let err = User::new("alice")
            .create(&store, &crypter, &AuthToken::random())
            .unwrap_err();
        assert!(matches!(err, VaultError::UserExists));
    }

    #[test]
    fn test_load_wrong_user_id_fails() {
        let dir = tempdir().unwrap();
        let store = BucketStore::open(dir.path().join("user.redb")).unwrap();
        let crypter = keyed();
        let at = AuthToken::random();

        let user = User::new("alice");
        user.create(&store, &crypter, &at).unwrap();

        // The record authenticates against its own user id; any other id
        // breaks the associated data.
        assert!(matches!(
            User::load(&store, &crypter, &at, &UserId::random()),
            Err(VaultError::DecryptFailed)
        ));
    }

    #[test]
    fn test_load_missing_record_reports_decrypt_failed() {
        let dir = tempdir().unwrap();
        let store = BucketStore::open(dir.path().join("user.redb")).unwrap();

        // A wrong passphrase derives an auth token with no record behind
        // it; the miss must not be distinguishable from a bad key.
        assert!(matches!(
            User::load(&store, &keyed(), &AuthToken::random(), &UserId::random()),
            Err(VaultError::DecryptFailed)
        ));
    }

    #[test]
    fn test_save_rewrites_blob_only() {
        let dir = tempdir().unwrap();
        let store = BucketStore::open(dir.path().join("user.redb")).unwrap();
        let crypter = keyed();
        let at = AuthToken::random();

        let user = User::new("alice");
        user.create(&store, &crypter, &at).unwrap();

        // Re-encrypt under a different key at a different token, as a
        // password change does.
        let new_crypter = keyed();
        let new_at = AuthToken::random();
        user.save(&store, &new_crypter, &new_at).unwrap();

        let loaded = User::load(&store, &new_crypter, &new_at, &user.user_id).unwrap();
        assert_eq!(loaded, user);
        assert_eq!(store.get_user_id("alice").unwrap(), user.user_id);
    }
}
