//! A live session over a decrypted user: item operations plus the
//! background reconciliation that walks the vault back to a single-key
//! steady state after password changes.

use std::collections::BTreeMap;

use lbx_crypto::{Crypter, ItemId, UserId, VersionToken};
use lbx_store::BucketStore;

use crate::error::{ReencryptionErrors, VaultResult};
use crate::keyset::Keyset;
use crate::metadata::{ItemMetadata, Metadata};
use crate::note::NoteItem;
use crate::user::User;

/// An unlocked vault session.
///
/// Item operations take `&self`; the keyset and metadata serialize their
/// own readers and writers internally, so the background sweep can run
/// while reads continue. Dropping the box locks the session: key material
/// zeroizes on drop, and no decrypted aggregate outlives it.
pub struct UnlockedBox {
    store: BucketStore,
    crypter_version: VersionToken,
    user: User,
    keyset: Keyset,
    metadata: Metadata,
}

impl std::fmt::Debug for UnlockedBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockedBox")
            .field("user_id", &self.user.user_id)
            .finish()
    }
}

impl UnlockedBox {
    pub(crate) fn new(
        store: BucketStore,
        crypter_version: VersionToken,
        user: User,
        keyset: Keyset,
        metadata: Metadata,
    ) -> Self {
        Self {
            store,
            crypter_version,
            user,
            keyset,
            metadata,
        }
    }

    pub fn user_name(&self) -> &str {
        &self.user.user_name
    }

    pub fn user_id(&self) -> UserId {
        self.user.user_id
    }

    /// The decrypted user record.
    pub fn user(&self) -> &User {
        &self.user
    }

    /// The decrypted keyset.
    pub fn keyset(&self) -> &Keyset {
        &self.keyset
    }

    /// The decrypted item index.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Encrypt and store a new note under the latest key, then record it
    /// in the metadata index.
    pub fn add_note_item(&self, note: &NoteItem) -> VaultResult<()> {
        let key = self.keyset.get_new_item_key(&note.item_id)?;
        note.save(&self.store, &Crypter::keyed(&self.crypter_version, &key))?;

        self.metadata.add_item(ItemMetadata::new(
            note.name.clone(),
            note.item_id,
            self.keyset.latest(),
        ));

        self.save_metadata()
    }

    /// Re-encrypt an existing note in place under its recorded key
    /// version, and keep the index name in sync. Does not rotate the
    /// item's key; that is the background sweep's job.
    pub fn update_note_item(&self, note: &NoteItem) -> VaultResult<()> {
        let mut entry = self.metadata.get_item(&note.item_id)?;

        let key = self.keyset.get_item_key(&entry.key_version, &note.item_id)?;
        note.save(&self.store, &Crypter::keyed(&self.crypter_version, &key))?;

        entry.name = note.name.clone();
        self.metadata.add_item(entry);

        self.save_metadata()
    }

    /// Remove a note and its index entry.
    pub fn delete_item(&self, item_id: &ItemId) -> VaultResult<()> {
        self.store.delete_item(item_id)?;
        self.metadata.delete_item(item_id);
        self.save_metadata()
    }

    /// Decrypt a note using the key version its index entry records, so
    /// items written before the last password change stay readable until
    /// the sweep re-keys them.
    pub fn get_item(&self, item_id: &ItemId) -> VaultResult<NoteItem> {
        let entry = self.metadata.get_item(item_id)?;
        let key = self.keyset.get_item_key(&entry.key_version, item_id)?;
        NoteItem::load(
            &self.store,
            &Crypter::keyed(&self.crypter_version, &key),
            item_id,
        )
    }

    pub fn get_item_list(&self) -> Vec<ItemMetadata> {
        self.metadata.get_items()
    }

    /// Lock the session. Dropping the box has the same effect; this spells
    /// the intent at call sites.
    pub fn lock(self) {
        tracing::debug!(user_id = %self.user.user_id, "session locked");
    }

    /// Re-encrypt every item whose recorded key version is not the latest.
    ///
    /// Designed to run after login. A failing item is recorded and the
    /// sweep continues, so one corrupt blob cannot stall re-keying of the
    /// rest; the index entry only moves to the latest version once the
    /// re-encrypted item is safely stored. Metadata is rewritten once at
    /// the end. Returns the aggregate failures, never a hard error for a
    /// single item.
    pub fn update_encryption(&self) -> VaultResult<()> {
        let latest = self.keyset.latest();
        let mut failures = BTreeMap::new();
        let mut rekeyed = 0usize;

        for entry in self.metadata.get_items() {
            if entry.key_version == latest {
                continue;
            }

            match self.reencrypt_item(&entry, &latest) {
                Ok(()) => rekeyed += 1,
                Err(e) => {
                    tracing::warn!(item_id = %entry.item_id, error = %e, "re-encryption failed");
                    failures.insert(entry.item_id, e.to_string());
                }
            }
        }

        self.save_metadata()?;

        if rekeyed > 0 {
            tracing::info!(rekeyed, "items re-encrypted to latest key");
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReencryptionErrors { failures }.into())
        }
    }

    fn reencrypt_item(&self, entry: &ItemMetadata, latest: &VersionToken) -> VaultResult<()> {
        let old_key = self
            .keyset
            .get_item_key(&entry.key_version, &entry.item_id)?;
        let note = NoteItem::load(
            &self.store,
            &Crypter::keyed(&self.crypter_version, &old_key),
            &entry.item_id,
        )?;

        let new_key = self.keyset.get_new_item_key(&entry.item_id)?;
        note.save(
            &self.store,
            &Crypter::keyed(&self.crypter_version, &new_key),
        )?;

        self.metadata
            .add_item(ItemMetadata::new(entry.name.clone(), entry.item_id, *latest));

        Ok(())
    }

    /// Mark every keyset entry no item references as unused, then purge.
    ///
    /// Designed to run after `update_encryption`: once every item points
    /// at the latest version, this collapses the keyset to a single entry.
    /// The refusals for the latest and last-remaining entry are expected
    /// and ignored; such entries simply survive the sweep.
    pub fn purge_unused_keys(&self) {
        let in_use = self.metadata.in_use_keys();

        for version in self.keyset.versions() {
            if !in_use.contains(&version) {
                let _ = self.keyset.mark_unused(&version);
            }
        }

        self.keyset.purge_keys();
    }

    fn save_metadata(&self) -> VaultResult<()> {
        let key = self
            .keyset
            .get_new_metadata_key(&self.user.metadata_id)?;
        self.metadata
            .save(&self.store, &Crypter::keyed(&self.crypter_version, &key))
    }
}
