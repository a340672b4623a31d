//! The locked vault: registration, login, and password rotation.
//!
//! Each protocol is a linear chain of derivations and store operations.
//! Every step builds the one keyed crypter it needs and drops it; no
//! cipher state is shared or mutated across steps.

use secrecy::SecretString;

use lbx_crypto::{
    AuthKey, AuthToken, BaseKey, CryptKey, Crypter, Deriver, KdfParams, UserId, VersionToken,
};
use lbx_store::BucketStore;

use crate::error::VaultResult;
use crate::keyset::Keyset;
use crate::metadata::Metadata;
use crate::unlocked::UnlockedBox;
use crate::user::User;

/// Entry point for callers without a session: owns the store and the
/// deriver/crypter versions every protocol runs under.
pub struct LockedBox {
    store: BucketStore,
    deriver: Deriver,
    crypter_version: VersionToken,
}

impl LockedBox {
    /// A locked vault over `store` with the default deriver and crypter.
    pub fn new(store: BucketStore) -> Self {
        Self::with_params(store, KdfParams::default())
    }

    /// Override the Argon2id cost parameters (config override or test rig;
    /// non-default costs derive different keys than the frozen defaults).
    pub fn with_params(store: BucketStore, params: KdfParams) -> Self {
        Self {
            store,
            deriver: Deriver::for_version(&Deriver::default_version(), params),
            crypter_version: Crypter::default_version(),
        }
    }

    /// Register a new user.
    ///
    /// Builds fresh user/keyset/metadata aggregates, then persists each
    /// under its own key: the user record under the derived auth key, the
    /// keyset under the passphrase-derived crypt key, the metadata under a
    /// key from the keyset's only entry.
    pub fn register(&self, username: &str, passphrase: &SecretString) -> VaultResult<()> {
        let user = User::new(username);
        let keyset = Keyset::new(user.keyset_id);
        let metadata = Metadata::new(user.metadata_id);

        let base_key = self.deriver.derive_base_key(username, passphrase)?;
        let (auth_key, auth_token, crypt_key) = self.credentials(&base_key, &user.user_id);

        let user_crypter = Crypter::keyed(&self.crypter_version, &auth_key.as_crypt_key());
        user.create(&self.store, &user_crypter, &auth_token)?;

        let keyset_crypter = Crypter::keyed(&self.crypter_version, &crypt_key);
        keyset.save(&self.store, &keyset_crypter)?;

        let metadata_key = keyset.get_new_metadata_key(&user.metadata_id)?;
        let metadata_crypter = Crypter::keyed(&self.crypter_version, &metadata_key);
        metadata.save(&self.store, &metadata_crypter)?;

        tracing::info!(user_id = %user.user_id, "user registered");

        Ok(())
    }

    /// Unlock a session.
    ///
    /// A missing username resolves to the zero user id, so the derivation
    /// chain proceeds and fails at decryption, indistinguishable from a
    /// wrong passphrase. Fail-closed: no partial state escapes.
    pub fn login(&self, username: &str, passphrase: &SecretString) -> VaultResult<UnlockedBox> {
        let (unlocked, _) = self.unlock(username, passphrase)?;
        tracing::info!(user_id = %unlocked.user_id(), "login succeeded");
        Ok(unlocked)
    }

    /// Rotate the passphrase.
    ///
    /// Adds a fresh master key to the keyset (the old latest stays in
    /// use, existing items still point at it) and rewrites the user
    /// record, keyset, and metadata under keys derived from the new
    /// passphrase.
    /// The user blob moves to a new storage token because the token is a
    /// function of the base key; the stale blob at the old token is
    /// deleted once the new one is in place.
    pub fn change_password(
        &self,
        username: &str,
        old_passphrase: &SecretString,
        new_passphrase: &SecretString,
    ) -> VaultResult<()> {
        let (unlocked, old_auth_token) = self.unlock(username, old_passphrase)?;

        let base_key = self.deriver.derive_base_key(username, new_passphrase)?;
        let (auth_key, auth_token, crypt_key) = self.credentials(&base_key, &unlocked.user_id());

        unlocked
            .keyset()
            .add_key(BaseKey::random(), Deriver::default_version());

        let user_crypter = Crypter::keyed(&self.crypter_version, &auth_key.as_crypt_key());
        unlocked
            .user()
            .save(&self.store, &user_crypter, &auth_token)?;

        let keyset_crypter = Crypter::keyed(&self.crypter_version, &crypt_key);
        unlocked.keyset().save(&self.store, &keyset_crypter)?;

        let metadata_id = unlocked.user().metadata_id;
        let metadata_key = unlocked.keyset().get_new_metadata_key(&metadata_id)?;
        let metadata_crypter = Crypter::keyed(&self.crypter_version, &metadata_key);
        unlocked.metadata().save(&self.store, &metadata_crypter)?;

        // The old blob is unreadable without the old base key but would
        // still confirm that a user once existed; drop it. Same passphrase
        // twice means the token did not move.
        if old_auth_token != auth_token {
            if let Err(e) = self.store.delete_user(&old_auth_token) {
                tracing::warn!(error = %e, "stale user record not deleted");
            }
        }

        tracing::info!(user_id = %unlocked.user_id(), "password changed");

        Ok(())
    }

    /// Login steps 1–6, also yielding the auth token the session was
    /// located under so `change_password` can retire it without a second
    /// run of the memory-hard hash.
    fn unlock(
        &self,
        username: &str,
        passphrase: &SecretString,
    ) -> VaultResult<(UnlockedBox, AuthToken)> {
        let user_id = self.store.get_user_id(username)?;

        let base_key = self.deriver.derive_base_key(username, passphrase)?;
        let (auth_key, auth_token, crypt_key) = self.credentials(&base_key, &user_id);

        let user_crypter = Crypter::keyed(&self.crypter_version, &auth_key.as_crypt_key());
        let user = User::load(&self.store, &user_crypter, &auth_token, &user_id)?;

        let keyset_crypter = Crypter::keyed(&self.crypter_version, &crypt_key);
        let keyset = Keyset::load(&self.store, &keyset_crypter, &user.keyset_id)?;

        let metadata_key = keyset.get_new_metadata_key(&user.metadata_id)?;
        let metadata_crypter = Crypter::keyed(&self.crypter_version, &metadata_key);
        let metadata = Metadata::load(&self.store, &metadata_crypter, &user.metadata_id)?;

        let unlocked = UnlockedBox::new(
            self.store.clone(),
            self.crypter_version,
            user,
            keyset,
            metadata,
        );

        Ok((unlocked, auth_token))
    }

    /// Derive the auth key, auth token, and crypt key for a base key.
    fn credentials(&self, base_key: &BaseKey, user_id: &UserId) -> (AuthKey, AuthToken, CryptKey) {
        let auth_key = self.deriver.derive_auth_key(base_key);
        let auth_token = self.deriver.derive_auth_token(base_key, user_id);
        let crypt_key = self.deriver.derive_crypt_key(base_key, None);
        (auth_key, auth_token, crypt_key)
    }
}
