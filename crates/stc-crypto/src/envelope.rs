//! Wire envelope: the unit placed on the transport.
//!
//! JSON with base64-encoded byte fields. Field names are fixed by the
//! transport contract (`cyphertext` carries the capsule).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Error type for envelope encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope encode failed: {0}")]
    Encode(String),
    #[error("envelope decode failed: {0}")]
    Decode(String),
}

/// A capsule plus the symmetrically encrypted payload, with an optional
/// sender-side timestamp for end-to-end latency measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Encapsulation output, bound to the recipient's public key.
    #[serde(rename = "cyphertext", with = "b64")]
    pub capsule: Vec<u8>,
    /// Keystream-encrypted payload bytes.
    #[serde(rename = "encryptedMessage", with = "b64")]
    pub ciphertext: Vec<u8>,
    /// Unix milliseconds at publish time, when the sender embeds one.
    #[serde(rename = "sentAt", default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<u64>,
}

impl Envelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Decode(e.to_string()))
    }
}

mod b64 {
    use super::{Engine, BASE64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        BASE64.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let env = Envelope {
            capsule: vec![1, 2, 3],
            ciphertext: vec![4, 5, 6],
            sent_at: Some(1_700_000_000_000),
        };

        let json: serde_json::Value = serde_json::from_slice(&env.to_bytes().unwrap()).unwrap();
        assert!(json.get("cyphertext").is_some());
        assert!(json.get("encryptedMessage").is_some());
        assert!(json.get("sentAt").is_some());
        assert!(json.get("capsule").is_none());
    }

    #[test]
    fn test_round_trip_without_timestamp() {
        let env = Envelope { capsule: vec![9; 48], ciphertext: vec![7; 20], sent_at: None };

        let bytes = env.to_bytes().unwrap();
        let decoded = Envelope::from_bytes(&bytes).unwrap();

        assert_eq!(decoded, env);
        // Absent timestamp is omitted from the wire record entirely.
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json.get("sentAt").is_none());
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let raw = br#"{"cyphertext":"not valid b64!!","encryptedMessage":"AAAA"}"#;
        assert!(matches!(Envelope::from_bytes(raw), Err(EnvelopeError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(Envelope::from_bytes(b"\x00\x01garbage").is_err());
    }
}
