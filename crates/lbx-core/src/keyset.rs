//! The versioned keyset: every master secret a user has ever rotated to.
//!
//! A password change adds a new entry and repoints `latest`; items keep
//! decrypting under the entry recorded in their metadata until the
//! background sweep re-keys them, after which retired entries are marked
//! unused and purged. Two invariants keep that safe: the latest entry can
//! never be marked unused or deleted, and the last remaining entry can
//! never be removed.
//!
//! Sub-key derivation goes through the deriver version recorded on the
//! named entry, so re-encryption across algorithm upgrades stays
//! well-defined.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use lbx_crypto::{
    BaseKey, CryptKey, Crypter, Deriver, ItemId, KdfParams, KeysetId, MetadataId, VersionToken,
};
use lbx_store::BucketStore;

use crate::error::{VaultError, VaultResult};

/// One master secret and the deriver version that interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysetItem {
    #[serde(rename = "BaseKey")]
    pub base_key: BaseKey,
    #[serde(rename = "DeriverVersion")]
    pub deriver_version: VersionToken,
    #[serde(rename = "InUse")]
    pub in_use: bool,
}

/// Persisted form; the lock is reconstructed on load.
#[derive(Serialize, Deserialize)]
struct KeysetDoc {
    #[serde(rename = "KeysetId")]
    keyset_id: KeysetId,
    #[serde(rename = "Latest")]
    latest: VersionToken,
    #[serde(rename = "Keys")]
    keys: HashMap<VersionToken, KeysetItem>,
}

struct KeysetInner {
    latest: VersionToken,
    keys: HashMap<VersionToken, KeysetItem>,
}

/// Versioned map of master keys with add / mark-unused / purge semantics.
///
/// Reads and writes go through an interior readers-writer lock so the
/// background sweep can share the keyset with foreground item operations;
/// `latest` lives under the same lock as the map and can never be observed
/// pointing at a missing entry.
pub struct Keyset {
    keyset_id: KeysetId,
    inner: RwLock<KeysetInner>,
}

impl Keyset {
    /// Create a keyset seeded with one fresh random master key under the
    /// default deriver version.
    pub fn new(keyset_id: KeysetId) -> Self {
        let ks = Self {
            keyset_id,
            inner: RwLock::new(KeysetInner {
                latest: VersionToken::random(),
                keys: HashMap::new(),
            }),
        };
        ks.add_key(BaseKey::random(), Deriver::default_version());
        ks
    }

    pub fn keyset_id(&self) -> KeysetId {
        self.keyset_id
    }

    /// Add a master key, mark it in use, and make it the latest version.
    /// Returns the version token naming the new entry.
    pub fn add_key(&self, base_key: BaseKey, deriver_version: VersionToken) -> VersionToken {
        let version = VersionToken::random();
        let item = KeysetItem {
            base_key,
            deriver_version,
            in_use: true,
        };

        let mut inner = self.inner.write().expect("keyset lock poisoned");
        inner.keys.insert(version, item);
        inner.latest = version;

        version
    }

    /// Look up the entry named by `version`.
    pub fn get_key(&self, version: &VersionToken) -> VaultResult<KeysetItem> {
        let inner = self.inner.read().expect("keyset lock poisoned");
        inner
            .keys
            .get(version)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("keyset entry {version}")))
    }

    /// The entry new encryptions use.
    pub fn get_latest_key(&self) -> VaultResult<KeysetItem> {
        let latest = self.latest();
        self.get_key(&latest)
    }

    pub fn latest(&self) -> VersionToken {
        self.inner.read().expect("keyset lock poisoned").latest
    }

    /// Every version currently present, in no particular order.
    pub fn versions(&self) -> Vec<VersionToken> {
        let inner = self.inner.read().expect("keyset lock poisoned");
        inner.keys.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("keyset lock poisoned").keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Derive the AEAD key for a new item from the latest entry.
    pub fn get_new_item_key(&self, item_id: &ItemId) -> VaultResult<CryptKey> {
        self.get_item_key(&self.latest(), item_id)
    }

    /// Derive the AEAD key for an item under the named entry (read-back of
    /// older items and the re-encryption sweep).
    pub fn get_item_key(&self, version: &VersionToken, item_id: &ItemId) -> VaultResult<CryptKey> {
        self.derive_for(version, item_id.to_string().as_bytes())
    }

    /// Derive the AEAD key for the metadata index from the latest entry.
    pub fn get_new_metadata_key(&self, metadata_id: &MetadataId) -> VaultResult<CryptKey> {
        self.get_metadata_key(&self.latest(), metadata_id)
    }

    /// Derive the AEAD key for the metadata index under the named entry.
    pub fn get_metadata_key(
        &self,
        version: &VersionToken,
        metadata_id: &MetadataId,
    ) -> VaultResult<CryptKey> {
        self.derive_for(version, metadata_id.to_string().as_bytes())
    }

    fn derive_for(&self, version: &VersionToken, salt: &[u8]) -> VaultResult<CryptKey> {
        let item = self.get_key(version)?;
        let deriver = Deriver::for_version(&item.deriver_version, KdfParams::default());
        Ok(deriver.derive_crypt_key(&item.base_key, Some(salt)))
    }

    /// Mark an entry as no longer referenced by any item.
    ///
    /// The latest entry and the last remaining entry stay in use.
    pub fn mark_unused(&self, version: &VersionToken) -> VaultResult<()> {
        let mut inner = self.inner.write().expect("keyset lock poisoned");

        if *version == inner.latest {
            return Err(VaultError::Invariant(
                "latest key cannot be marked unused".into(),
            ));
        }
        if inner.keys.len() == 1 {
            return Err(VaultError::Invariant(
                "only available key cannot be marked unused".into(),
            ));
        }

        let item = inner
            .keys
            .get_mut(version)
            .ok_or_else(|| VaultError::NotFound(format!("keyset entry {version}")))?;
        item.in_use = false;

        Ok(())
    }

    /// Delete an entry. Refuses the latest entry, the last remaining
    /// entry, an absent entry, and any entry still marked in use.
    pub fn delete_key(&self, version: &VersionToken) -> VaultResult<()> {
        let mut inner = self.inner.write().expect("keyset lock poisoned");

        if *version == inner.latest {
            return Err(VaultError::Invariant("latest key cannot be deleted".into()));
        }
        if inner.keys.len() == 1 {
            return Err(VaultError::Invariant(
                "only available key cannot be deleted".into(),
            ));
        }

        let item = inner
            .keys
            .get(version)
            .ok_or_else(|| VaultError::NotFound(format!("keyset entry {version}")))?;
        if item.in_use {
            return Err(VaultError::Invariant(
                "in-use key cannot be deleted".into(),
            ));
        }

        inner.keys.remove(version);

        Ok(())
    }

    /// Attempt to delete every entry, swallowing the per-entry refusals so
    /// the latest and in-use entries survive.
    pub fn purge_keys(&self) {
        let mut purged = 0usize;
        for version in self.versions() {
            if self.delete_key(&version).is_ok() {
                purged += 1;
            }
        }
        if purged > 0 {
            tracing::debug!(purged, remaining = self.len(), "keyset purged");
        }
    }

    /// Encrypt and persist, binding the keyset id as associated data.
    pub fn save(&self, store: &BucketStore, crypter: &Crypter) -> VaultResult<()> {
        let plaintext = serde_json::to_vec(&self.to_doc())?;
        let sealed = crypter.encrypt(&plaintext, self.keyset_id.to_string().as_bytes())?;
        store.save_keyset(&self.keyset_id, &sealed)?;
        Ok(())
    }

    /// Fetch, decrypt, and rebuild a keyset from the store.
    pub fn load(store: &BucketStore, crypter: &Crypter, keyset_id: &KeysetId) -> VaultResult<Self> {
        let sealed = store.get_keyset(keyset_id)?;
        let plaintext = crypter.decrypt(&sealed, keyset_id.to_string().as_bytes())?;
        let doc: KeysetDoc = serde_json::from_slice(&plaintext)?;
        Ok(Self::from_doc(doc))
    }

    fn to_doc(&self) -> KeysetDoc {
        let inner = self.inner.read().expect("keyset lock poisoned");
        KeysetDoc {
            keyset_id: self.keyset_id,
            latest: inner.latest,
            keys: inner.keys.clone(),
        }
    }

    fn from_doc(doc: KeysetDoc) -> Self {
        Self {
            keyset_id: doc.keyset_id,
            inner: RwLock::new(KeysetInner {
                latest: doc.latest,
                keys: doc.keys,
            }),
        }
    }
}

impl std::fmt::Debug for Keyset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("keyset lock poisoned");
        f.debug_struct("Keyset")
            .field("keyset_id", &self.keyset_id)
            .field("latest", &inner.latest)
            .field("keys", &inner.keys.len())
            .finish()
    }
}

impl PartialEq for Keyset {
    fn eq(&self, other: &Self) -> bool {
        if self.keyset_id != other.keyset_id {
            return false;
        }
        let a = self.inner.read().expect("keyset lock poisoned");
        let b = other.inner.read().expect("keyset lock poisoned");
        a.latest == b.latest && a.keys == b.keys
    }
}
