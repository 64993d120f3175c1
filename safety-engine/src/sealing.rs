//! Payload sealing for itinerary and emergency-contact data.
//!
//! # Algorithm
//!
//! - **Encryption**: ChaCha20-Poly1305 (authenticated encryption)
//! - **Key**: 32 bytes, supplied out-of-band as hex or base64
//! - **Nonce**: 12 random bytes per sealed value
//!
//! Only sealed boxes are stored in the projection. The ledger carries
//! an itinerary summary and never sees contact details.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SafetyError};

// =============================================================================
// Constants
// =============================================================================

/// Key length for ChaCha20-Poly1305 (32 bytes)
pub const KEY_LEN: usize = 32;

/// Nonce length for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_LEN: usize = 12;

// =============================================================================
// Sealed value
// =============================================================================

/// An encrypted JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    /// Hex-encoded nonce
    pub nonce: String,
    /// Base64 ciphertext including the auth tag
    pub data: String,
}

// =============================================================================
// Sealer
// =============================================================================

/// Seals and opens JSON payloads under a single key.
#[derive(Clone)]
pub struct Sealer {
    key: [u8; KEY_LEN],
}

impl Sealer {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Random key. Values sealed with it cannot be opened after restart.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Parse a 32-byte key given as 64 hex characters or base64.
    pub fn from_encoded(encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        let bytes = if encoded.len() == KEY_LEN * 2 {
            hex::decode(encoded).map_err(|e| SafetyError::Config(format!("Invalid hex key: {e}")))?
        } else {
            BASE64
                .decode(encoded)
                .map_err(|e| SafetyError::Config(format!("Invalid base64 key: {e}")))?
        };

        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            SafetyError::Config(format!("Sealing key must be {KEY_LEN} bytes, got {}", b.len()))
        })?;
        Ok(Self { key })
    }

    /// Use the configured key, or generate one.
    pub fn from_config(key: Option<&str>) -> Result<Self> {
        match key {
            Some(k) => Self::from_encoded(k),
            None => {
                tracing::warn!("No sealing key configured, generating an ephemeral key");
                Ok(Self::generate())
            }
        }
    }

    pub fn seal<T: Serialize>(&self, value: &T) -> Result<SealedBox> {
        let plaintext = serde_json::to_vec(value)
            .map_err(|e| SafetyError::Sealing(format!("Serialize failed: {e}")))?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
            .map_err(|_| SafetyError::Sealing("Encryption failed".into()))?;

        Ok(SealedBox {
            nonce: hex::encode(nonce),
            data: BASE64.encode(ciphertext),
        })
    }

    pub fn open<T: DeserializeOwned>(&self, sealed: &SealedBox) -> Result<T> {
        let nonce = hex::decode(&sealed.nonce)
            .map_err(|e| SafetyError::Sealing(format!("Invalid nonce: {e}")))?;
        if nonce.len() != NONCE_LEN {
            return Err(SafetyError::Sealing(format!(
                "Nonce must be {NONCE_LEN} bytes, got {}",
                nonce.len()
            )));
        }
        let ciphertext = BASE64
            .decode(&sealed.data)
            .map_err(|e| SafetyError::Sealing(format!("Invalid ciphertext: {e}")))?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| SafetyError::Sealing("Decryption failed: wrong key or tampered data".into()))?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| SafetyError::Sealing(format!("Deserialize failed: {e}")))
    }
}

impl std::fmt::Debug for Sealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sealer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaincode::EmergencyContact;

    fn contacts() -> Vec<EmergencyContact> {
        vec![EmergencyContact {
            name: "Leela".into(),
            relationship: Some("mother".into()),
            phone: "+91 91234 56789".into(),
            email: None,
        }]
    }

    #[test]
    fn test_seal_and_open() {
        let sealer = Sealer::generate();
        let sealed = sealer.seal(&contacts()).unwrap();
        assert!(!sealed.data.contains("Leela"));

        let opened: Vec<EmergencyContact> = sealer.open(&sealed).unwrap();
        assert_eq!(opened, contacts());
    }

    #[test]
    fn test_nonce_is_fresh() {
        let sealer = Sealer::generate();
        let a = sealer.seal(&contacts()).unwrap();
        let b = sealer.seal(&contacts()).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = Sealer::generate().seal(&contacts()).unwrap();
        let err = Sealer::generate()
            .open::<Vec<EmergencyContact>>(&sealed)
            .unwrap_err();
        assert!(matches!(err, SafetyError::Sealing(_)));
    }

    #[test]
    fn test_tampered_data_fails() {
        let sealer = Sealer::generate();
        let mut sealed = sealer.seal(&contacts()).unwrap();
        let mut raw = BASE64.decode(&sealed.data).unwrap();
        raw[0] ^= 0xff;
        sealed.data = BASE64.encode(raw);
        assert!(sealer.open::<Vec<EmergencyContact>>(&sealed).is_err());
    }

    #[test]
    fn test_key_encodings() {
        let key = [7u8; KEY_LEN];
        let from_hex = Sealer::from_encoded(&hex::encode(key)).unwrap();
        let from_b64 = Sealer::from_encoded(&BASE64.encode(key)).unwrap();

        let sealed = from_hex.seal(&"secret").unwrap();
        let opened: String = from_b64.open(&sealed).unwrap();
        assert_eq!(opened, "secret");

        assert!(matches!(
            Sealer::from_encoded("c2hvcnQ="),
            Err(SafetyError::Config(_))
        ));
    }
}
