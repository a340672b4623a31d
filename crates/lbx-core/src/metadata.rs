//! The per-user item index: names, ids, and the key version each item is
//! currently encrypted under.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use lbx_crypto::{Crypter, ItemId, MetadataId, VersionToken};
use lbx_store::BucketStore;

use crate::error::{VaultError, VaultResult};

/// Index entry for one item. `key_version` names the keyset entry whose
/// base key encrypts the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    #[serde(rename = "ItemId")]
    pub item_id: ItemId,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "KeyVersion")]
    pub key_version: VersionToken,
}

impl ItemMetadata {
    pub fn new(name: impl Into<String>, item_id: ItemId, key_version: VersionToken) -> Self {
        Self {
            item_id,
            name: name.into(),
            key_version,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct MetadataDoc {
    #[serde(rename = "MetadataId")]
    metadata_id: MetadataId,
    #[serde(rename = "Items")]
    items: HashMap<ItemId, ItemMetadata>,
}

/// The item index, rewritten on every item mutation. Reads and writes go
/// through an interior readers-writer lock shared with the background
/// sweep.
pub struct Metadata {
    metadata_id: MetadataId,
    items: RwLock<HashMap<ItemId, ItemMetadata>>,
}

impl Metadata {
    pub fn new(metadata_id: MetadataId) -> Self {
        Self {
            metadata_id,
            items: RwLock::new(HashMap::new()),
        }
    }

    pub fn metadata_id(&self) -> MetadataId {
        self.metadata_id
    }

    /// Insert or replace the entry for an item.
    pub fn add_item(&self, item: ItemMetadata) {
        let mut items = self.items.write().expect("metadata lock poisoned");
        items.insert(item.item_id, item);
    }

    pub fn delete_item(&self, item_id: &ItemId) {
        let mut items = self.items.write().expect("metadata lock poisoned");
        items.remove(item_id);
    }

    pub fn get_item(&self, item_id: &ItemId) -> VaultResult<ItemMetadata> {
        let items = self.items.read().expect("metadata lock poisoned");
        items
            .get(item_id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("metadata item {item_id}")))
    }

    pub fn get_items(&self) -> Vec<ItemMetadata> {
        let items = self.items.read().expect("metadata lock poisoned");
        items.values().cloned().collect()
    }

    /// The distinct key versions referenced by current items.
    pub fn in_use_keys(&self) -> HashSet<VersionToken> {
        let items = self.items.read().expect("metadata lock poisoned");
        items.values().map(|item| item.key_version).collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().expect("metadata lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encrypt and persist, binding the metadata id as associated data.
    pub fn save(&self, store: &BucketStore, crypter: &Crypter) -> VaultResult<()> {
        let plaintext = serde_json::to_vec(&self.to_doc())?;
        let sealed = crypter.encrypt(&plaintext, self.metadata_id.to_string().as_bytes())?;
        store.save_metadata(&self.metadata_id, &sealed)?;
        Ok(())
    }

    /// Fetch, decrypt, and rebuild the index from the store.
    pub fn load(
        store: &BucketStore,
        crypter: &Crypter,
        metadata_id: &MetadataId,
    ) -> VaultResult<Self> {
        let sealed = store.get_metadata(metadata_id)?;
        let plaintext = crypter.decrypt(&sealed, metadata_id.to_string().as_bytes())?;
        let doc: MetadataDoc = serde_json::from_slice(&plaintext)?;
        Ok(Self {
            metadata_id: doc.metadata_id,
            items: RwLock::new(doc.items),
        })
    }

    fn to_doc(&self) -> MetadataDoc {
        let items = self.items.read().expect("metadata lock poisoned");
        MetadataDoc {
            metadata_id: self.metadata_id,
            items: items.clone(),
        }
    }
}

impl std::fmt::Debug for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let items = self.items.read().expect("metadata lock poisoned");
        f.debug_struct("Metadata")
            .field("metadata_id", &self.metadata_id)
            .field("items", &items.len())
            .finish()
    }
}

impl PartialEq for Metadata {
    fn eq(&self, other: &Self) -> bool {
        if self.metadata_id != other.metadata_id {
            return false;
        }
        let a = self.items.read().expect("metadata lock poisoned");
        let b = other.items.read().expect("metadata lock poisoned");
        *a == *b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbx_crypto::CryptKey;
    use tempfile::tempdir;

    fn entry(key_version: VersionToken) -> ItemMetadata {
        ItemMetadata::new("grocery list", ItemId::random(), key_version)
    }

    #[test]
    fn test_add_get_delete() {
        let md = Metadata::new(MetadataId::random());
        let item = entry(VersionToken::random());
        let id = item.item_id;

        md.add_item(item.clone());
        assert_eq!(md.get_item(&id).unwrap(), item);
        assert_eq!(md.len(), 1);

        md.delete_item(&id);
        assert!(matches!(
            md.get_item(&id),
            Err(VaultError::NotFound(_))
        ));
        assert!(md.is_empty());
    }

    #[test]
    fn test_add_item_replaces() {
        let md = Metadata::new(MetadataId::random());
        let mut item = entry(VersionToken::random());
        md.add_item(item.clone());

        item.name = "renamed".into();
        md.add_item(item.clone());

        assert_eq!(md.len(), 1);
        assert_eq!(md.get_item(&item.item_id).unwrap().name, "renamed");
    }

    #[test]
    fn test_in_use_keys_is_distinct() {
        let md = Metadata::new(MetadataId::random());
        let shared = VersionToken::random();
        let other = VersionToken::random();

        md.add_item(entry(shared));
        md.add_item(entry(shared));
        md.add_item(entry(other));

        let in_use = md.in_use_keys();
        assert_eq!(in_use.len(), 2);
        assert!(in_use.contains(&shared));
        assert!(in_use.contains(&other));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = BucketStore::open(dir.path().join("md.redb")).unwrap();
        let crypter = Crypter::keyed(&Crypter::default_version(), &CryptKey::random());

        let md = Metadata::new(MetadataId::random());
        md.add_item(entry(VersionToken::random()));
        md.add_item(entry(VersionToken::random()));
        md.save(&store, &crypter).unwrap();

        let loaded = Metadata::load(&store, &crypter, &md.metadata_id()).unwrap();
        assert_eq!(loaded, md);
    }

    #[test]
    fn test_load_wrong_key_fails() {
        let dir = tempdir().unwrap();
        let store = BucketStore::open(dir.path().join("md.redb")).unwrap();

        let md = Metadata::new(MetadataId::random());
        let crypter = Crypter::keyed(&Crypter::default_version(), &CryptKey::random());
        md.save(&store, &crypter).unwrap();

        let wrong = Crypter::keyed(&Crypter::default_version(), &CryptKey::random());
        assert!(matches!(
            Metadata::load(&store, &wrong, &md.metadata_id()),
            Err(VaultError::DecryptFailed)
        ));
    }
}
