//! Key material: 256-bit secrets with a prefix-tagged base32 string form.
//!
//! Keys share the token alphabet (`bk_`/`ck_`/`ak_` + 52 base32 chars) so
//! they can live inside persisted JSON documents, but unlike tokens they
//! are secrets: zeroized on drop and redacted in `Debug` output.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

use crate::tokens::{decode_tagged, encode_tagged, random_bytes, ParseError};
use crate::KEY_SIZE;

macro_rules! key_kind {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq)]
        pub struct $name {
            bytes: [u8; KEY_SIZE],
        }

        impl $name {
            /// Two-letter tag of this key kind's string form.
            pub const TAG: &'static str = $tag;

            pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
                Self { bytes }
            }

            pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.bytes
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.bytes.zeroize();
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("bytes", &"[REDACTED]")
                    .finish()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&encode_tagged(Self::TAG, &self.bytes))
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_tagged(Self::TAG, s).map(Self::from_bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct KeyVisitor;

                impl Visitor<'_> for KeyVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        write!(f, "a {}_-tagged base32 key string", $tag)
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                        v.parse().map_err(de::Error::custom)
                    }
                }

                deserializer.deserialize_str(KeyVisitor)
            }
        }
    };
}

key_kind!(
    /// Master secret held in a keyset entry; the root of all sub-keys.
    BaseKey, "bk"
);
key_kind!(
    /// A key handed directly to the AEAD.
    CryptKey, "ck"
);
key_kind!(
    /// The key that encrypts the user record.
    AuthKey, "ak"
);

impl BaseKey {
    /// Generate a fresh random master secret.
    pub fn random() -> Self {
        Self::from_bytes(random_bytes())
    }
}

impl CryptKey {
    /// Generate a fresh random AEAD key (used to scrub a crypter on lock).
    pub fn random() -> Self {
        Self::from_bytes(random_bytes())
    }
}

impl AuthKey {
    /// View this key as AEAD key material. The user record is the one
    /// envelope keyed from the authentication branch of the derivation
    /// graph.
    pub fn as_crypt_key(&self) -> CryptKey {
        CryptKey::from_bytes(*self.as_bytes())
    }
}
