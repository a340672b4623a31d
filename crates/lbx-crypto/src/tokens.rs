//! Opaque 32-byte identifiers with a prefix-tagged base32 string form.
//!
//! Tokens are randomly generated and only ever used as identifiers; their
//! external form is `tag_<52 base32 chars>` over the RFC 4648 alphabet
//! (`A–Z2–7`, no padding). The string form is lossless: parsing rejects a
//! wrong tag, a wrong length, and any character outside the alphabet.

use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32_NOPAD;
use rand::RngCore;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::TOKEN_SIZE;

/// Number of base32 characters encoding a 32-byte token (no padding).
pub const TOKEN_BASE32_LEN: usize = 52;

/// Failure to parse a tagged base32 token or key string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid prefix: expected {expected}_")]
    InvalidTag { expected: &'static str },

    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("invalid base32: {0}")]
    InvalidEncoding(String),
}

pub(crate) fn encode_tagged(tag: &str, bytes: &[u8]) -> String {
    format!("{}_{}", tag, BASE32_NOPAD.encode(bytes))
}

pub(crate) fn decode_tagged(
    tag: &'static str,
    s: &str,
) -> Result<[u8; TOKEN_SIZE], ParseError> {
    let rest = s
        .strip_prefix(tag)
        .and_then(|r| r.strip_prefix('_'))
        .ok_or(ParseError::InvalidTag { expected: tag })?;

    let data = BASE32_NOPAD
        .decode(rest.as_bytes())
        .map_err(|e| ParseError::InvalidEncoding(e.to_string()))?;

    if data.len() != TOKEN_SIZE {
        return Err(ParseError::InvalidLength {
            expected: TOKEN_SIZE,
            got: data.len(),
        });
    }

    let mut bytes = [0u8; TOKEN_SIZE];
    bytes.copy_from_slice(&data);
    Ok(bytes)
}

pub(crate) fn random_bytes() -> [u8; TOKEN_SIZE] {
    let mut bytes = [0u8; TOKEN_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

macro_rules! token_kind {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; TOKEN_SIZE]);

        impl $name {
            /// Two-letter tag of this token kind's string form.
            pub const TAG: &'static str = $tag;

            /// Generate a fresh random token.
            pub fn random() -> Self {
                Self(random_bytes())
            }

            pub fn from_bytes(bytes: [u8; TOKEN_SIZE]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; TOKEN_SIZE] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&encode_tagged(Self::TAG, &self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_tagged(Self::TAG, s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct TokenVisitor;

                impl Visitor<'_> for TokenVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        write!(f, "a {}_-tagged base32 token string", $tag)
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                        v.parse().map_err(de::Error::custom)
                    }
                }

                deserializer.deserialize_str(TokenVisitor)
            }
        }
    };
}

token_kind!(
    /// Identifies a user; doubles as the associated data of the user record.
    UserId, "ut"
);
token_kind!(
    /// Derived storage key of the encrypted user record. Never persisted.
    AuthToken, "at"
);
token_kind!(
    /// Identifies a keyset and binds its envelope as associated data.
    KeysetId, "kt"
);
token_kind!(
    /// Identifies a metadata index and binds its envelope as associated data.
    MetadataId, "mt"
);
token_kind!(
    /// Identifies a stored item and binds its envelope as associated data.
    ItemId, "it"
);
token_kind!(
    /// Tags a keyset entry and selects a deriver or crypter algorithm version.
    VersionToken, "vt"
);

impl UserId {
    /// Sentinel returned by the store when a username has no binding.
    pub const ZERO: UserId = UserId([0u8; TOKEN_SIZE]);

    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }
}
