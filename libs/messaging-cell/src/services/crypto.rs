use base64::{engine::general_purpose, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use crate::models::MessagingError;

/// AES-256-GCM for message bodies at rest.
///
/// Stored form is base64 of `nonce || ciphertext || tag`. The key is the
/// SHA-256 of the configured secret.
pub struct MessageCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl MessageCipher {
    pub fn new(secret: &str) -> Result<Self, MessagingError> {
        let digest = Sha256::digest(secret.as_bytes());
        let unbound = UnboundKey::new(&AES_256_GCM, digest.as_slice())
            .map_err(|_| MessagingError::Crypto("Invalid message key".to_string()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, MessagingError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| MessagingError::Crypto("Nonce generation failed".to_string()))?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce_bytes), Aad::empty(), &mut in_out)
            .map_err(|_| MessagingError::Crypto("Encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(general_purpose::STANDARD.encode(sealed))
    }

    pub fn decrypt(&self, sealed: &str) -> Result<String, MessagingError> {
        let bytes = general_purpose::STANDARD
            .decode(sealed)
            .map_err(|_| MessagingError::Crypto("Ciphertext is not base64".to_string()))?;
        if bytes.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(MessagingError::Crypto("Ciphertext is truncated".to_string()));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| MessagingError::Crypto("Invalid nonce".to_string()))?;
        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| MessagingError::Crypto("Decryption failed".to_string()))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| MessagingError::Crypto("Plaintext is not UTF-8".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_text_opens_with_the_same_key_only() {
        let cipher = MessageCipher::new("clinic-secret").unwrap();
        let sealed = cipher.encrypt("See you Tuesday").unwrap();

        assert_ne!(sealed, "See you Tuesday");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "See you Tuesday");
        assert!(MessageCipher::new("other-secret").unwrap().decrypt(&sealed).is_err());
    }

    #[test]
    fn nonces_differ_between_messages() {
        let cipher = MessageCipher::new("clinic-secret").unwrap();
        assert_ne!(cipher.encrypt("hi").unwrap(), cipher.encrypt("hi").unwrap());
    }

    #[test]
    fn rejects_garbage() {
        let cipher = MessageCipher::new("clinic-secret").unwrap();
        assert!(cipher.decrypt("not base64!").is_err());
        assert!(cipher.decrypt("AAAA").is_err());
    }
}
