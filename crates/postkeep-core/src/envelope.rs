//! Delegated-API result envelope.
//!
//! Wire contract shared with external clients: a random 256-bit key encrypts
//! the JSON record set (CBC, random 128-bit IV) and is itself encrypted with the
//! client's public key (OAEP). Field names and standard base64 are fixed.
//! The cryptography is provided by an [`EnvelopeSealer`] outside this workspace.

use crate::error::{PostkeepError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Length of the CBC initialization vector in bytes.
pub const IV_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(rename = "encryptedData")]
    pub encrypted_data: String,
    #[serde(rename = "encryptedKey")]
    pub encrypted_key: String,
    pub iv: String,
}

/// Decoded envelope fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeParts {
    pub ciphertext: Vec<u8>,
    pub wrapped_key: Vec<u8>,
    pub iv: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Encodes raw ciphertext, wrapped key and IV into the wire form.
    pub fn from_parts(ciphertext: &[u8], wrapped_key: &[u8], iv: &[u8]) -> Result<Self> {
        if iv.len() != IV_LEN {
            return Err(PostkeepError::malformed(format!(
                "envelope iv must be {} bytes, got {}",
                IV_LEN,
                iv.len()
            )));
        }
        Ok(Self {
            encrypted_data: STANDARD.encode(ciphertext),
            encrypted_key: STANDARD.encode(wrapped_key),
            iv: STANDARD.encode(iv),
        })
    }

    /// Decodes the base64 fields.
    pub fn decode_parts(&self) -> Result<EnvelopeParts> {
        let decode = |field: &str, value: &str| {
            STANDARD
                .decode(value)
                .map_err(|e| PostkeepError::malformed(format!("envelope {}: {}", field, e)))
        };
        let parts = EnvelopeParts {
            ciphertext: decode("encryptedData", &self.encrypted_data)?,
            wrapped_key: decode("encryptedKey", &self.encrypted_key)?,
            iv: decode("iv", &self.iv)?,
        };
        if parts.iv.len() != IV_LEN {
            return Err(PostkeepError::malformed("envelope iv has wrong length"));
        }
        Ok(parts)
    }
}

/// Encrypts a serialized payload for a delegated-API client.
pub trait EnvelopeSealer: Send + Sync {
    fn seal(&self, plaintext: &[u8]) -> Result<EncryptedEnvelope>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let envelope = EncryptedEnvelope::from_parts(b"cipher", b"key", &[7u8; IV_LEN]).unwrap();
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["encryptedData"], "Y2lwaGVy");
        assert_eq!(json["encryptedKey"], "a2V5");
        assert!(json.get("iv").is_some());
        assert!(json.get("encrypted_data").is_none());
    }

    #[test]
    fn test_decode_parts() {
        let envelope = EncryptedEnvelope::from_parts(b"abc", b"k", &[1u8; IV_LEN]).unwrap();
        let parts = envelope.decode_parts().unwrap();
        assert_eq!(parts.ciphertext, b"abc");
        assert_eq!(parts.iv.len(), IV_LEN);
    }

    #[test]
    fn test_rejects_bad_iv() {
        assert!(EncryptedEnvelope::from_parts(b"abc", b"k", &[1u8; 8]).is_err());

        let envelope = EncryptedEnvelope {
            encrypted_data: "not base64!".to_string(),
            encrypted_key: String::new(),
            iv: String::new(),
        };
        assert!(envelope.decode_parts().unwrap_err().is_malformed());
    }
}
