//! The encrypted leaf payload: one note.

use serde::{Deserialize, Serialize};

use lbx_crypto::{Crypter, ItemId};
use lbx_store::BucketStore;

use crate::error::VaultResult;

/// A note: user-chosen name plus opaque bytes. Persisted as an AEAD
/// envelope keyed by the per-item key, with the item id as associated
/// data; the data field travels as base64 inside the JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteItem {
    #[serde(rename = "ItemId")]
    pub item_id: ItemId,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Data", with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl NoteItem {
    /// A fresh note with a newly allocated item id.
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            item_id: ItemId::random(),
            name: name.into(),
            data: data.into(),
        }
    }

    /// Encrypt and persist, binding the item id as associated data.
    pub fn save(&self, store: &BucketStore, crypter: &Crypter) -> VaultResult<()> {
        let plaintext = serde_json::to_vec(self)?;
        let sealed = crypter.encrypt(&plaintext, self.item_id.to_string().as_bytes())?;
        store.save_item(&self.item_id, &sealed)?;
        Ok(())
    }

    /// Fetch, decrypt, and rebuild a note from the store.
    pub fn load(store: &BucketStore, crypter: &Crypter, item_id: &ItemId) -> VaultResult<Self> {
        let sealed = store.get_item(item_id)?;
        let plaintext = crypter.decrypt(&sealed, item_id.to_string().as_bytes())?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(de::Error::custom)
    }
}
