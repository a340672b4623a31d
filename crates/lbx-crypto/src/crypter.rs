//! Versioned AEAD envelopes.
//!
//! Wire format: `[24-byte random nonce][ciphertext + 16-byte tag]`.
//! Associated data is mandatory and must be at least a token's width.
//! Callers always bind the external string form of the identifier a blob
//! is stored under, which is 55 bytes, so the gate only trips on misuse.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;
use thiserror::Error;

use crate::keys::CryptKey;
use crate::tokens::VersionToken;
use crate::{KEY_SIZE, NONCE_SIZE, TOKEN_SIZE};

/// Version id of the default crypter: XChaCha20-Poly1305, 24-byte nonce.
pub const XCHACHA_CRYPTER_VERSION: &str =
    "vt_MMO77C3BEUQLI337JSNV6Y4IFE2I2B6T4YD4JUHFT7OVF3I7XJQA";

/// AEAD failure. Everything except `DecryptFailed` is caller misuse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CrypterError {
    #[error("no key has been set")]
    NotKeyed,

    #[error("missing associated data")]
    MissingAssociatedData,

    #[error("associated data shorter than {TOKEN_SIZE} bytes")]
    ShortAssociatedData,

    #[error("key shorter than {KEY_SIZE} bytes")]
    ShortKey,

    #[error("key is all zeroes")]
    NullKey,

    #[error("ciphertext shorter than the {NONCE_SIZE}-byte nonce")]
    ShortCiphertext,

    #[error("decryption failed")]
    DecryptFailed,

    #[error("cipher failure: {0}")]
    Cipher(String),
}

/// Cipher state, one variant per algorithm version.
#[derive(Clone)]
enum CipherState {
    XChaCha(XChaCha20Poly1305),
}

/// A rekeyable AEAD.
///
/// Protocol code prefers [`Crypter::keyed`]: build an immutable crypter for
/// the single key a step needs instead of mutating a shared instance. The
/// rekeyable form exists for callers that hold one crypter across steps and
/// for scrubbing the key on lock.
#[derive(Clone)]
pub struct Crypter {
    state: Option<CipherState>,
}

impl Crypter {
    /// A crypter with no key set; `encrypt`/`decrypt` fail until
    /// [`Crypter::change_key`] succeeds.
    pub fn new(_version: &VersionToken) -> Self {
        // Single algorithm version today; unknown versions fall back to it.
        Self { state: None }
    }

    /// A crypter keyed for one operation. `CryptKey` is always exactly the
    /// AEAD key width, so this cannot fail.
    pub fn keyed(version: &VersionToken, key: &CryptKey) -> Self {
        Self {
            state: Some(make_state(version, key.as_bytes())),
        }
    }

    /// The version token of the current default crypter.
    pub fn default_version() -> VersionToken {
        XCHACHA_CRYPTER_VERSION
            .parse()
            .expect("crypter version id is a valid version token")
    }

    /// Replace the current key. Rejects keys shorter than [`KEY_SIZE`]
    /// and the all-zero key.
    pub fn change_key(&mut self, key: &[u8]) -> Result<(), CrypterError> {
        if key.len() < KEY_SIZE {
            return Err(CrypterError::ShortKey);
        }
        if key.iter().all(|&b| b == 0) {
            return Err(CrypterError::NullKey);
        }

        let cipher = XChaCha20Poly1305::new_from_slice(key)
            .map_err(|e| CrypterError::Cipher(e.to_string()))?;
        self.state = Some(CipherState::XChaCha(cipher));

        Ok(())
    }

    /// Seal `plaintext` under the current key, binding `ad`.
    ///
    /// Returns `[nonce][ciphertext + tag]` with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8], ad: &[u8]) -> Result<Vec<u8>, CrypterError> {
        let state = self.state.as_ref().ok_or(CrypterError::NotKeyed)?;
        check_associated_data(ad)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

        let encrypted = match state {
            CipherState::XChaCha(cipher) => cipher
                .encrypt(
                    XNonce::from_slice(&nonce_bytes),
                    Payload { msg: plaintext, aad: ad },
                )
                .map_err(|e| CrypterError::Cipher(e.to_string()))?,
        };

        let mut ciphertext = Vec::with_capacity(NONCE_SIZE + encrypted.len());
        ciphertext.extend_from_slice(&nonce_bytes);
        ciphertext.extend_from_slice(&encrypted);
        Ok(ciphertext)
    }

    /// Open `[nonce][ciphertext + tag]` under the current key and `ad`.
    ///
    /// A wrong key, wrong associated data, and a tampered ciphertext are
    /// indistinguishable: all surface as [`CrypterError::DecryptFailed`].
    pub fn decrypt(&self, ciphertext: &[u8], ad: &[u8]) -> Result<Vec<u8>, CrypterError> {
        let state = self.state.as_ref().ok_or(CrypterError::NotKeyed)?;
        if ciphertext.len() < NONCE_SIZE {
            return Err(CrypterError::ShortCiphertext);
        }
        check_associated_data(ad)?;

        let (nonce, encrypted) = ciphertext.split_at(NONCE_SIZE);

        match state {
            CipherState::XChaCha(cipher) => cipher
                .decrypt(
                    XNonce::from_slice(nonce),
                    Payload { msg: encrypted, aad: ad },
                )
                .map_err(|_| CrypterError::DecryptFailed),
        }
    }
}

fn make_state(_version: &VersionToken, key: &[u8; KEY_SIZE]) -> CipherState {
    CipherState::XChaCha(XChaCha20Poly1305::new(key.into()))
}

fn check_associated_data(ad: &[u8]) -> Result<(), CrypterError> {
    if ad.is_empty() {
        return Err(CrypterError::MissingAssociatedData);
    }
    if ad.len() < TOKEN_SIZE {
        return Err(CrypterError::ShortAssociatedData);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::ItemId;

    const PLAINTEXT: &[u8] = b"attack at dawn";
    const SHORT_AD: &[u8] = b"too short";

    fn good_ad() -> String {
        ItemId::random().to_string()
    }

    fn keyed_crypter() -> Crypter {
        Crypter::keyed(&Crypter::default_version(), &CryptKey::random())
    }

    #[test]
    fn test_default_version_parses() {
        assert_eq!(
            Crypter::default_version().to_string(),
            XCHACHA_CRYPTER_VERSION
        );
    }

    #[test]
    fn test_encrypt_requires_key() {
        let crypter = Crypter::new(&Crypter::default_version());
        assert_eq!(
            crypter.encrypt(PLAINTEXT, good_ad().as_bytes()),
            Err(CrypterError::NotKeyed)
        );
        assert_eq!(
            crypter.decrypt(&[0u8; 64], good_ad().as_bytes()),
            Err(CrypterError::NotKeyed)
        );
    }

    #[test]
    fn test_change_key_rejects_bad_keys() {
        let mut crypter = Crypter::new(&Crypter::default_version());
        assert_eq!(crypter.change_key(&[1u8; 16]), Err(CrypterError::ShortKey));
        assert_eq!(
            crypter.change_key(&[0u8; KEY_SIZE]),
            Err(CrypterError::NullKey)
        );
        assert!(crypter.change_key(&[1u8; KEY_SIZE]).is_ok());
    }

    #[test]
    fn test_associated_data_is_mandatory() {
        let crypter = keyed_crypter();
        assert_eq!(
            crypter.encrypt(PLAINTEXT, &[]),
            Err(CrypterError::MissingAssociatedData)
        );
        assert_eq!(
            crypter.encrypt(PLAINTEXT, SHORT_AD),
            Err(CrypterError::ShortAssociatedData)
        );

        let ad = good_ad();
        let sealed = crypter.encrypt(PLAINTEXT, ad.as_bytes()).unwrap();
        assert_eq!(
            crypter.decrypt(&sealed, &[]),
            Err(CrypterError::MissingAssociatedData)
        );
        assert_eq!(
            crypter.decrypt(&sealed, SHORT_AD),
            Err(CrypterError::ShortAssociatedData)
        );
    }

    #[test]
    fn test_roundtrip() {
        let crypter = keyed_crypter();
        let ad = good_ad();

        let sealed = crypter.encrypt(PLAINTEXT, ad.as_bytes()).unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + PLAINTEXT.len() + crate::TAG_SIZE);

        let opened = crypter.decrypt(&sealed, ad.as_bytes()).unwrap();
        assert_eq!(opened, PLAINTEXT);
    }

    #[test]
    fn test_wrong_associated_data_fails() {
        let crypter = keyed_crypter();
        let sealed = crypter.encrypt(PLAINTEXT, good_ad().as_bytes()).unwrap();
        assert_eq!(
            crypter.decrypt(&sealed, good_ad().as_bytes()),
            Err(CrypterError::DecryptFailed)
        );
    }

    #[test]
    fn test_wrong_key_fails() {
        let ad = good_ad();
        let sealed = keyed_crypter().encrypt(PLAINTEXT, ad.as_bytes()).unwrap();
        assert_eq!(
            keyed_crypter().decrypt(&sealed, ad.as_bytes()),
            Err(CrypterError::DecryptFailed)
        );
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let crypter = keyed_crypter();
        let ad = good_ad();
        let sealed = crypter.encrypt(PLAINTEXT, ad.as_bytes()).unwrap();

        // Flip one bit anywhere: nonce, body, or tag.
        for index in [0, NONCE_SIZE + 2, sealed.len() - 1] {
            let mut tampered = sealed.clone();
            tampered[index] ^= 0x01;
            assert_eq!(
                crypter.decrypt(&tampered, ad.as_bytes()),
                Err(CrypterError::DecryptFailed)
            );
        }
    }

    #[test]
    fn test_short_ciphertext_rejected() {
        let crypter = keyed_crypter();
        assert_eq!(
            crypter.decrypt(&[0u8; NONCE_SIZE - 1], good_ad().as_bytes()),
            Err(CrypterError::ShortCiphertext)
        );
    }

    #[test]
    fn test_fresh_nonce_per_encrypt() {
        let crypter = keyed_crypter();
        let ad = good_ad();
        let a = crypter.encrypt(PLAINTEXT, ad.as_bytes()).unwrap();
        let b = crypter.encrypt(PLAINTEXT, ad.as_bytes()).unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }
}
