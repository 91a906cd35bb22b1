use crate::errors::{AppError, AppResult};
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use sha2::{Digest, Sha256};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_LENGTH: usize = 16;

/// AES-256-CBC with a key derived from the site secret. Ciphertext layout is
/// `base64(iv || ciphertext)`.
#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    pub fn from_secret(secret: &str) -> AppResult<Self> {
        if secret.is_empty() {
            return Err(AppError::Configuration("site secret is not defined".to_string()));
        }
        let key: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        Ok(Self { key })
    }

    pub fn encrypt(&self, plain: &str) -> AppResult<String> {
        let iv: [u8; IV_LENGTH] = rand::random();
        let cipher = Aes256CbcEnc::new_from_slices(&self.key, &iv)
            .map_err(|error| AppError::Internal(error.to_string()))?;
        let encrypted = cipher.encrypt_padded_vec_mut::<Pkcs7>(plain.as_bytes());

        let mut payload = Vec::with_capacity(IV_LENGTH + encrypted.len());
        payload.extend_from_slice(&iv);
        payload.extend_from_slice(&encrypted);
        Ok(base64::engine::general_purpose::STANDARD.encode(payload))
    }

    /// Returns `None` when the payload is not something this key produced.
    pub fn decrypt(&self, encoded: &str) -> Option<String> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .ok()?;
        if raw.len() <= IV_LENGTH {
            return None;
        }
        let (iv, data) = raw.split_at(IV_LENGTH);
        let cipher = Aes256CbcDec::new_from_slices(&self.key, iv).ok()?;
        let plain = cipher.decrypt_padded_vec_mut::<Pkcs7>(data).ok()?;
        String::from_utf8(plain).ok()
    }
}
