//! Redb-backed bucket store.
//!
//! Uses redb's ACID transactions with copy-on-write for crash safety; a
//! partially applied write never becomes visible. Thread-safe through
//! redb's internal locking, `Clone` is cheap (`Arc`).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use lbx_crypto::{AuthToken, ItemId, KeysetId, MetadataId, UserId};

use crate::StoreError;

const AUTH: TableDefinition<&str, &[u8]> = TableDefinition::new("auth");
const USER: TableDefinition<&str, &[u8]> = TableDefinition::new("user");
const KEYSET: TableDefinition<&str, &[u8]> = TableDefinition::new("keyset");
const METADATA: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");
const ITEM: TableDefinition<&str, &[u8]> = TableDefinition::new("item");

const ALL_BUCKETS: [TableDefinition<'static, &str, &[u8]>; 5] =
    [AUTH, USER, KEYSET, METADATA, ITEM];

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Typed CRUD over the five latchbox buckets.
#[derive(Clone)]
pub struct BucketStore {
    db: Arc<Database>,
}

impl BucketStore {
    /// Open or create the database at `path` and ensure every bucket exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(db_err)?;

        let txn = db.begin_write().map_err(db_err)?;
        for bucket in ALL_BUCKETS {
            txn.open_table(bucket).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn write(
        &self,
        bucket: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &[u8],
    ) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(bucket).map_err(db_err)?;
            table.insert(key, value).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)
    }

    fn read(
        &self,
        bucket: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = txn.open_table(bucket).map_err(db_err)?;
        let value = table.get(key).map_err(db_err)?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    fn remove(
        &self,
        bucket: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(bucket).map_err(db_err)?;
            table.remove(key).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)
    }

    /// Resolve a username to its `UserId` binding.
    ///
    /// Returns the all-zero token on a miss so a caller deriving keys from
    /// it fails closed at decryption, indistinguishable from a wrong
    /// password. The lookup key is the raw registration string with no
    /// case folding or normalization, so `Login("ALICE")` after
    /// `Register("alice")` misses on purpose.
    pub fn get_user_id(&self, username: &str) -> Result<UserId, StoreError> {
        let Some(value) = self.read(AUTH, username)? else {
            return Ok(UserId::ZERO);
        };

        let s = std::str::from_utf8(&value).map_err(|e| StoreError::Corrupt {
            bucket: "auth",
            key: username.to_string(),
            reason: e.to_string(),
        })?;

        s.parse().map_err(|e: lbx_crypto::ParseError| StoreError::Corrupt {
            bucket: "auth",
            key: username.to_string(),
            reason: e.to_string(),
        })
    }

    /// Write the username→`UserId` binding. Only registration calls this.
    pub fn save_user_id(&self, username: &str, user_id: &UserId) -> Result<(), StoreError> {
        self.write(AUTH, username, user_id.to_string().as_bytes())
    }

    /// Remove a username binding (registration rollback).
    pub fn delete_user_id(&self, username: &str) -> Result<(), StoreError> {
        self.remove(AUTH, username)
    }

    pub fn get_user(&self, auth_token: &AuthToken) -> Result<Vec<u8>, StoreError> {
        let key = auth_token.to_string();
        self.read(USER, &key)?.ok_or(StoreError::NotFound {
            bucket: "user",
            key,
        })
    }

    pub fn save_user(&self, auth_token: &AuthToken, data: &[u8]) -> Result<(), StoreError> {
        self.write(USER, &auth_token.to_string(), data)
    }

    /// Remove a user record blob (stale blob cleanup after password change).
    pub fn delete_user(&self, auth_token: &AuthToken) -> Result<(), StoreError> {
        self.remove(USER, &auth_token.to_string())
    }

    pub fn get_keyset(&self, keyset_id: &KeysetId) -> Result<Vec<u8>, StoreError> {
        let key = keyset_id.to_string();
        self.read(KEYSET, &key)?.ok_or(StoreError::NotFound {
            bucket: "keyset",
            key,
        })
    }

    pub fn save_keyset(&self, keyset_id: &KeysetId, data: &[u8]) -> Result<(), StoreError> {
        self.write(KEYSET, &keyset_id.to_string(), data)
    }

    pub fn get_metadata(&self, metadata_id: &MetadataId) -> Result<Vec<u8>, StoreError> {
        let key = metadata_id.to_string();
        self.read(METADATA, &key)?.ok_or(StoreError::NotFound {
            bucket: "metadata",
            key,
        })
    }

    pub fn save_metadata(&self, metadata_id: &MetadataId, data: &[u8]) -> Result<(), StoreError> {
        self.write(METADATA, &metadata_id.to_string(), data)
    }

    pub fn get_item(&self, item_id: &ItemId) -> Result<Vec<u8>, StoreError> {
        let key = item_id.to_string();
        self.read(ITEM, &key)?.ok_or(StoreError::NotFound {
            bucket: "item",
            key,
        })
    }

    pub fn save_item(&self, item_id: &ItemId, data: &[u8]) -> Result<(), StoreError> {
        self.write(ITEM, &item_id.to_string(), data)
    }

    pub fn delete_item(&self, item_id: &ItemId) -> Result<(), StoreError> {
        self.remove(ITEM, &item_id.to_string())
    }

    /// Hot backup: copy every bucket into a fresh database at `path`.
    ///
    /// A single read transaction pins one consistent snapshot for the whole
    /// copy, so writers may keep running while the backup is taken.
    pub fn backup(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let target = Database::create(path.as_ref()).map_err(db_err)?;

        let source_txn = self.db.begin_read().map_err(db_err)?;
        let target_txn = target.begin_write().map_err(db_err)?;

        let mut entries = 0usize;
        for bucket in ALL_BUCKETS {
            let source = source_txn.open_table(bucket).map_err(db_err)?;
            let mut dest = target_txn.open_table(bucket).map_err(db_err)?;

            for entry in source.iter().map_err(db_err)? {
                let (key, value) = entry.map_err(db_err)?;
                dest.insert(key.value(), value.value()).map_err(db_err)?;
                entries += 1;
            }
        }

        target_txn.commit().map_err(db_err)?;
        tracing::info!(
            entries,
            path = %path.as_ref().display(),
            "store backup written"
        );

        Ok(())
    }
}
