
#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use crate::hybrid::HybridCipher;
    use crate::kem::{Capsule, Kem, PrivateKey, X25519Kem, CAPSULE_LEN};
    use crate::stream::keystream_xor;

    proptest! {
        // Round-trip: any payload sealed to a key pair is recovered
        // exactly with the matching private key.
        #[test]
        fn test_hybrid_round_trip(plaintext in any::<Vec<u8>>()) {
            let cipher = HybridCipher::new();
            let pair = cipher.kem().generate();

            let env = cipher.encrypt_for_recipient(&pair.public, &plaintext).unwrap();
            let recovered = cipher.decrypt_with_private_key(&pair.private, &env).unwrap();

            prop_assert_eq!(recovered, plaintext);
        }

        // Keystream involution holds for any non-empty key and any data.
        #[test]
        fn test_keystream_involution(
            key in proptest::collection::vec(any::<u8>(), 1..64),
            data in any::<Vec<u8>>()
        ) {
            let once = keystream_xor(&key, &data);
            let twice = keystream_xor(&key, &once);
            prop_assert_eq!(twice, data);
        }

        // Corrupt capsule corpus: mutating any byte of the capsule must
        // produce a typed failure, never a silently wrong plaintext.
        #[test]
        fn test_mutated_capsule_always_fails(
            index in 0usize..CAPSULE_LEN,
            flip in 1u8..=255u8
        ) {
            let cipher = HybridCipher::new();
            let pair = cipher.kem().generate();

            let mut env = cipher
                .encrypt_for_recipient(&pair.public, b"{\"lat\":1.0,\"lon\":2.0}")
                .unwrap();
            env.capsule[index] ^= flip;

            prop_assert!(cipher.decrypt_with_private_key(&pair.private, &env).is_err());
        }

        // Deterministic decapsulation: the same capsule and key always
        // recover the same secret.
        #[test]
        fn test_decapsulation_determinism(seed in any::<[u8; 32]>()) {
            let kem = X25519Kem;
            let private = PrivateKey::from_bytes(&seed).unwrap();
            let public = private.public();

            let (capsule, secret) = kem.encapsulate(&public).unwrap();
            let capsule = Capsule::from_bytes(capsule.as_bytes()).unwrap();

            let s1 = kem.decapsulate(&capsule, &private).unwrap();
            let s2 = kem.decapsulate(&capsule, &private).unwrap();

            prop_assert_eq!(s1.as_bytes(), secret.as_bytes());
            prop_assert_eq!(s1.as_bytes(), s2.as_bytes());
        }
    }
}
