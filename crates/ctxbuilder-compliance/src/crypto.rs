//! Envelope encryption for ledger lines.
//!
//! Each record gets its own random 256-bit DEK; the DEK encrypts the
//! plaintext canonical JSON with AES-256-GCM and is itself wrapped by the
//! KEK (loaded from a key file) with AES-256-GCM. Wire format per line:
//!
//! ```text
//! base64( wrapped_dek(48) || dek_nonce(12) || data_nonce(12) || ciphertext_with_tag )
//! ```
//!
//! GCM authentication makes ciphertext tamper detectable: a flipped bit
//! fails decryption, which verification reports as tamper.

use crate::error::ComplianceError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use camino::Utf8Path;
use rand::RngCore;

const DEK_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;
const WRAPPED_DEK_LEN: usize = DEK_LEN + GCM_TAG_LEN;

/// Per-line encoding applied by a ledger backend.
pub(crate) trait LineCodec: Send + Sync {
    fn encode(&self, plaintext: &str) -> Result<String, ComplianceError>;
    fn decode(&self, line: &str) -> Result<String, ComplianceError>;
}

/// Plaintext backend: lines are stored as-is.
pub(crate) struct PlainCodec;

impl LineCodec for PlainCodec {
    fn encode(&self, plaintext: &str) -> Result<String, ComplianceError> {
        Ok(plaintext.to_string())
    }

    fn decode(&self, line: &str) -> Result<String, ComplianceError> {
        Ok(line.to_string())
    }
}

/// Envelope-encryption backend.
pub(crate) struct EnvelopeCodec {
    kek: [u8; DEK_LEN],
}

impl EnvelopeCodec {
    /// Load the KEK from a key file: either 32 raw bytes or 64 hex chars.
    pub(crate) fn from_key_file(path: &Utf8Path) -> Result<Self, ComplianceError> {
        let raw = std::fs::read(path.as_std_path()).map_err(|e| {
            ComplianceError::KeyLoad(format!("cannot read key file {path}: {e}"))
        })?;

        let kek: [u8; DEK_LEN] = if raw.len() == DEK_LEN {
            let mut kek = [0u8; DEK_LEN];
            kek.copy_from_slice(&raw);
            kek
        } else {
            let text = String::from_utf8(raw)
                .map_err(|_| key_format_error(path))?
                .trim()
                .to_string();
            let decoded = hex::decode(&text).map_err(|_| key_format_error(path))?;
            decoded.try_into().map_err(|_| key_format_error(path))?
        };

        Ok(Self { kek })
    }

    #[cfg(test)]
    pub(crate) fn from_key(kek: [u8; DEK_LEN]) -> Self {
        Self { kek }
    }
}

fn key_format_error(path: &Utf8Path) -> ComplianceError {
    ComplianceError::KeyLoad(format!(
        "key file {path} must contain 32 raw bytes or 64 hex characters"
    ))
}

impl LineCodec for EnvelopeCodec {
    fn encode(&self, plaintext: &str) -> Result<String, ComplianceError> {
        let mut rng = rand::thread_rng();

        let mut dek = [0u8; DEK_LEN];
        rng.fill_bytes(&mut dek);
        let mut dek_nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut dek_nonce);
        let mut data_nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut data_nonce);

        let data_cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&dek));
        let ciphertext = data_cipher
            .encrypt(Nonce::from_slice(&data_nonce), plaintext.as_bytes())
            .map_err(|_| ComplianceError::Crypto("record encryption failed".to_string()))?;

        let kek_cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.kek));
        let wrapped_dek = kek_cipher
            .encrypt(Nonce::from_slice(&dek_nonce), dek.as_slice())
            .map_err(|_| ComplianceError::Crypto("DEK wrapping failed".to_string()))?;

        let mut blob = Vec::with_capacity(WRAPPED_DEK_LEN + 2 * NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&wrapped_dek);
        blob.extend_from_slice(&dek_nonce);
        blob.extend_from_slice(&data_nonce);
        blob.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(blob))
    }

    fn decode(&self, line: &str) -> Result<String, ComplianceError> {
        let blob = BASE64
            .decode(line.trim())
            .map_err(|_| ComplianceError::Crypto("record is not valid base64".to_string()))?;

        if blob.len() < WRAPPED_DEK_LEN + 2 * NONCE_LEN + GCM_TAG_LEN {
            return Err(ComplianceError::Crypto("record blob truncated".to_string()));
        }

        let (wrapped_dek, rest) = blob.split_at(WRAPPED_DEK_LEN);
        let (dek_nonce, rest) = rest.split_at(NONCE_LEN);
        let (data_nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let kek_cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.kek));
        let dek = kek_cipher
            .decrypt(Nonce::from_slice(dek_nonce), wrapped_dek)
            .map_err(|_| ComplianceError::Crypto("DEK unwrap failed (tamper?)".to_string()))?;

        let data_cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&dek));
        let plaintext = data_cipher
            .decrypt(Nonce::from_slice(data_nonce), ciphertext)
            .map_err(|_| {
                ComplianceError::Crypto("record decryption failed (tamper?)".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| ComplianceError::Crypto("decrypted record is not UTF-8".to_string()))
    }
}

/// Generate a fresh KEK and write it hex-encoded to a key file.
pub fn generate_key_file(path: &Utf8Path) -> Result<(), ComplianceError> {
    let mut kek = [0u8; DEK_LEN];
    rand::thread_rng().fill_bytes(&mut kek);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent.as_std_path())?;
    }
    std::fs::write(path.as_std_path(), hex::encode(kek))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::from_key([7u8; 32])
    }

    #[test]
    fn encrypt_decrypt_round_trips() {
        let codec = codec();
        let line = codec.encode(r#"{"n":1}"#).unwrap();
        assert_ne!(line, r#"{"n":1}"#);
        assert_eq!(codec.decode(&line).unwrap(), r#"{"n":1}"#);
    }

    #[test]
    fn each_record_uses_a_fresh_dek() {
        let codec = codec();
        let a = codec.encode("same plaintext").unwrap();
        let b = codec.encode("same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn flipped_ciphertext_bit_fails_authentication() {
        let codec = codec();
        let line = codec.encode(r#"{"n":1}"#).unwrap();

        let mut blob = BASE64.decode(&line).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        let tampered = BASE64.encode(blob);

        assert!(matches!(
            codec.decode(&tampered),
            Err(ComplianceError::Crypto(_))
        ));
    }

    #[test]
    fn wrong_key_fails_to_unwrap() {
        let line = codec().encode("secret").unwrap();
        let other = EnvelopeCodec::from_key([8u8; 32]);
        assert!(matches!(other.decode(&line), Err(ComplianceError::Crypto(_))));
    }

    #[test]
    fn key_file_accepts_hex_and_raw() {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        let hex_path = root.join("key.hex");
        std::fs::write(hex_path.as_std_path(), hex::encode([9u8; 32])).unwrap();
        EnvelopeCodec::from_key_file(&hex_path).unwrap();

        let raw_path = root.join("key.raw");
        std::fs::write(raw_path.as_std_path(), [9u8; 32]).unwrap();
        EnvelopeCodec::from_key_file(&raw_path).unwrap();

        let bad_path = root.join("key.bad");
        std::fs::write(bad_path.as_std_path(), "too short").unwrap();
        assert!(EnvelopeCodec::from_key_file(&bad_path).is_err());
    }

    #[test]
    fn generated_key_file_is_usable() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("keys/kek")).unwrap();
        generate_key_file(&path).unwrap();
        let codec = EnvelopeCodec::from_key_file(&path).unwrap();
        let line = codec.encode("hello").unwrap();
        assert_eq!(codec.decode(&line).unwrap(), "hello");
    }
}
