//! Keystream derivation for bulk payload protection.

/// XOR `data` against `key` cycled to the data length.
///
/// Involutive: applying the same key twice restores the input. Safe only
/// because every shared secret is single-use; there is no integrity
/// protection at this layer.
pub fn keystream_xor(key: &[u8], data: &[u8]) -> Vec<u8> {
    debug_assert!(!key.is_empty());
    data.iter()
        .enumerate()
        .map(|(i, byte)| byte ^ key[i % key.len()])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_involution() {
        let key = [0xA5u8; 32];
        let data = b"telemetry payload with some length to it";

        let encrypted = keystream_xor(&key, data);
        let decrypted = keystream_xor(&key, &encrypted);

        assert_ne!(encrypted.as_slice(), data.as_slice());
        assert_eq!(decrypted.as_slice(), data.as_slice());
    }

    #[test]
    fn test_key_cycles_past_its_length() {
        let key = [0xFFu8, 0x00u8];
        let data = [0x0Fu8; 5];

        let out = keystream_xor(&key, &data);
        assert_eq!(out, vec![0xF0, 0x0F, 0xF0, 0x0F, 0xF0]);
    }

    #[test]
    fn test_empty_data() {
        let key = [1u8; 32];
        assert!(keystream_xor(&key, &[]).is_empty());
    }
}
