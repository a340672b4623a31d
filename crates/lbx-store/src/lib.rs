//! lbx-store: the embedded bucket store for latchbox.
//!
//! Five flat key→bytes buckets over a single redb database file:
//!
//! | Bucket | Key | Value |
//! |---|---|---|
//! | `auth` | username as supplied at registration | `UserId` string form |
//! | `user` | `AuthToken` string form | encrypted user record |
//! | `keyset` | `KeysetId` string form | encrypted keyset |
//! | `metadata` | `MetadataId` string form | encrypted metadata index |
//! | `item` | `ItemId` string form | encrypted item |
//!
//! Every method runs as one ACID transaction; there are no cross-bucket
//! transactions. The store never sees plaintext other than the username
//! binding, which is the only queryable index.

pub mod bucket;

pub use bucket::BucketStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("{bucket} entry not found: {key}")]
    NotFound { bucket: &'static str, key: String },

    #[error("corrupt {bucket} entry for {key}: {reason}")]
    Corrupt {
        bucket: &'static str,
        key: String,
        reason: String,
    },
}
