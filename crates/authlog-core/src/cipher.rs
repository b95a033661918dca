use crate::error::CipherError;
use crate::keystore::KeyPair;
use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rsa::Oaep;
use sha2::Sha256;

/// RSA-OAEP (SHA-256 digest and MGF1-SHA-256, no label) over a loaded key pair.
///
/// Ciphertext is base64 text so it can live in a BLOB column and still be
/// printed. Encryption is randomised; the same plaintext never encrypts to
/// the same bytes twice.
#[derive(Debug, Clone)]
pub struct CredentialCipher {
    keys: KeyPair,
}

impl CredentialCipher {
    pub fn new(keys: KeyPair) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    /// Returns `None` for an empty plaintext.
    pub fn encrypt(&self, plaintext: &str) -> Result<Option<Vec<u8>>, CipherError> {
        if plaintext.is_empty() {
            return Ok(None);
        }
        let ciphertext = self
            .keys
            .public_key()
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext.as_bytes())
            .map_err(|e| CipherError::Encryption(e.to_string()))?;
        Ok(Some(general_purpose::STANDARD.encode(ciphertext).into_bytes()))
    }

    /// Returns `None` for an empty ciphertext.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Option<String>, CipherError> {
        if ciphertext.is_empty() {
            return Ok(None);
        }
        let raw = general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|e| CipherError::Decryption(format!("base64: {e}")))?;
        let plaintext = self
            .keys
            .private_key()
            .decrypt(Oaep::new::<Sha256>(), &raw)
            .map_err(|e| CipherError::Decryption(e.to_string()))?;
        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|_| CipherError::Decryption("plaintext is not valid UTF-8".to_string()))
    }
}
