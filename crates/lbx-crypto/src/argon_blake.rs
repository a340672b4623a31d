//! The default deriver: Argon2id for the base key, keyed BLAKE2b for
//! everything below it.
//!
//! The salt for the password hash is a BLAKE2b-256 digest of the NFKD
//! username, so the derivation graph is fully determined by the
//! `(username, passphrase)` pair and the user record can be located
//! without any server-side salt lookup. Context strings and parameters
//! are frozen for this version.

use argon2::{Algorithm, Argon2, Params, Version};
use blake2::digest::consts::U32;
use blake2::digest::Mac;
use blake2::{Blake2b, Blake2bMac, Digest};
use secrecy::{ExposeSecret, SecretString};
use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroize;

use crate::derive::{DeriveError, KdfParams, MIN_PASSPHRASE_CHARS};
use crate::keys::{AuthKey, BaseKey, CryptKey};
use crate::tokens::{AuthToken, UserId};
use crate::KEY_SIZE;

type Blake2b256 = Blake2b<U32>;

const AUTH_INFO: &[u8] = b"This key will be used for authentication.";
const CRYPT_INFO: &[u8] = b"This key will be used for encryption.";

/// Argon2id + keyed-BLAKE2b deriver.
#[derive(Debug, Clone)]
pub struct ArgonBlakeDeriver {
    params: KdfParams,
}

impl ArgonBlakeDeriver {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    /// Derive the 256-bit base key from a username and passphrase.
    pub fn derive_base_key(
        &self,
        username: &str,
        passphrase: &SecretString,
    ) -> Result<BaseKey, DeriveError> {
        let username: String = username.nfkd().collect();
        let mut passphrase: String = passphrase.expose_secret().nfkd().collect();

        if passphrase.chars().count() < MIN_PASSPHRASE_CHARS {
            passphrase.zeroize();
            return Err(DeriveError::WeakPassphrase {
                min: MIN_PASSPHRASE_CHARS,
            });
        }

        let salt: [u8; KEY_SIZE] = Blake2b256::digest(username.as_bytes()).into();

        let params = Params::new(
            self.params.mem_cost_kib,
            self.params.time_cost,
            self.params.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| DeriveError::Params(e.to_string()))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; KEY_SIZE];
        let result = argon2
            .hash_password_into(passphrase.as_bytes(), &salt, &mut key)
            .map_err(|e| DeriveError::Params(e.to_string()));
        passphrase.zeroize();
        result?;

        Ok(BaseKey::from_bytes(key))
    }

    /// Derive the user-record encryption key from a base key.
    pub fn derive_auth_key(&self, base_key: &BaseKey) -> AuthKey {
        AuthKey::from_bytes(keyed_blake2b(base_key.as_bytes(), AUTH_INFO))
    }

    /// Derive the user-record storage token from a base key and user id.
    pub fn derive_auth_token(&self, base_key: &BaseKey, user_id: &UserId) -> AuthToken {
        let digest = keyed_blake2b(base_key.as_bytes(), user_id.to_string().as_bytes());
        AuthToken::from_bytes(digest)
    }

    /// Derive an AEAD key from a base key and an optional salt.
    pub fn derive_crypt_key(&self, base_key: &BaseKey, salt: Option<&[u8]>) -> CryptKey {
        let digest = keyed_blake2b(base_key.as_bytes(), salt.unwrap_or(CRYPT_INFO));
        CryptKey::from_bytes(digest)
    }
}

/// Keyed BLAKE2b-256. A 32-byte key is always within the BLAKE2b key bound,
/// so construction cannot fail.
fn keyed_blake2b(key: &[u8; KEY_SIZE], data: &[u8]) -> [u8; KEY_SIZE] {
    let mut mac = Blake2bMac::<U32>::new_from_slice(key)
        .expect("32-byte key is a valid BLAKE2b key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TOKEN_SIZE;

    const USERNAME: &str = "user";
    const GOOD_PASSPHRASE: &str = "This is just right.";
    const BAD_PASSPHRASE: &str = "Thisistooshort.";

    const EXPECTED_BASE_KEY: &str = "bk_IQWFPSX2VCCB4ZAI3AEYJNZN2ONKUFMROKKNMH56TBPHI6JII4PA";
    const EXPECTED_AUTH_KEY: &str = "ak_GIG3UGUPV3EVJSAZZ2NQPSHOYRMGP54NHJARXUN67SXNSDXEKLGA";
    const EXPECTED_AUTH_TOKEN: &str = "at_GIJ7LGGYWCJJ3GPVCQDHXVF7CZDZRDQYSRGLS3OIUKAPS3M7PJAQ";
    const EXPECTED_CRYPT_KEY: &str = "ck_LIWCI2SX2BYQLU7CATC6MZMOTCT5VLCQ6LAEE6E3EXVAIF5QOVWQ";
    const EXPECTED_SALTED_CRYPT_KEY: &str =
        "ck_6M54CRBI3B7EHX565V7OPXHOY7PSCNGRSCBUEAR3E6M36J4HOSHA";

    const SALT_BYTES: [u8; TOKEN_SIZE] = [
        31, 34, 182, 210, 19, 183, 200, 6, 8, 41, 125, 107, 196, 122, 143, 6, 30, 149, 213, 230,
        89, 18, 54, 64, 40, 113, 179, 235, 141, 23, 109, 79,
    ];

    fn deriver() -> ArgonBlakeDeriver {
        ArgonBlakeDeriver::new(KdfParams::default())
    }

    #[test]
    fn test_short_passphrase_rejected() {
        let err = deriver()
            .derive_base_key(USERNAME, &SecretString::from(BAD_PASSPHRASE))
            .unwrap_err();
        assert_eq!(
            err,
            DeriveError::WeakPassphrase {
                min: MIN_PASSPHRASE_CHARS
            }
        );
    }

    #[test]
    fn test_known_derivation_chain() {
        let d = deriver();
        let bk = d
            .derive_base_key(USERNAME, &SecretString::from(GOOD_PASSPHRASE))
            .unwrap();
        assert_eq!(bk.to_string(), EXPECTED_BASE_KEY);

        assert_eq!(d.derive_auth_key(&bk).to_string(), EXPECTED_AUTH_KEY);
        assert_eq!(
            d.derive_crypt_key(&bk, None).to_string(),
            EXPECTED_CRYPT_KEY
        );

        let uid = UserId::from_bytes(SALT_BYTES);
        assert_eq!(
            d.derive_auth_token(&bk, &uid).to_string(),
            EXPECTED_AUTH_TOKEN
        );
        assert_eq!(
            d.derive_crypt_key(&bk, Some(&SALT_BYTES)).to_string(),
            EXPECTED_SALTED_CRYPT_KEY
        );
    }

    #[test]
    fn test_base_key_deterministic() {
        let d = deriver();
        let pass = SecretString::from(GOOD_PASSPHRASE);
        let a = d.derive_base_key(USERNAME, &pass).unwrap();
        let b = d.derive_base_key(USERNAME, &pass).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_usernames_different_keys() {
        let d = deriver();
        let pass = SecretString::from(GOOD_PASSPHRASE);
        let a = d.derive_base_key("alice", &pass).unwrap();
        let b = d.derive_base_key("bob", &pass).unwrap();
        assert_ne!(a, b);
    }
}
