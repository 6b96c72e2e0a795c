
#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::cipher::{decrypt, encrypt};
    use crate::keys::{derive_shared_secret, generate_key_pair, PrivateKey, PublicKey};

    proptest! {
        // Key agreement is symmetric for any pair of secrets
        #[test]
        fn test_key_agreement_symmetric(a in any::<[u8; 32]>(), b in any::<[u8; 32]>()) {
            let a = PrivateKey::from_hex(&hex::encode(a)).unwrap();
            let b = PrivateKey::from_hex(&hex::encode(b)).unwrap();

            let ab = derive_shared_secret(&a, &b.public_key());
            let ba = derive_shared_secret(&b, &a.public_key());
            match (ab, ba) {
                (Ok(ab), Ok(ba)) => prop_assert_eq!(ab, ba),
                (Err(_), Err(_)) => {}
                _ => prop_assert!(false, "only one side derived a secret"),
            }
        }

        // Public key hex survives export and import
        #[test]
        fn test_public_key_hex_stable(bytes in any::<[u8; 32]>()) {
            let key = PublicKey::from(bytes);
            let restored = PublicKey::from_hex(&key.to_hex()).unwrap();
            prop_assert_eq!(restored, key);
        }

        // Any payload sealed by one side opens on the other
        #[test]
        fn test_seal_open_across_peers(payload in any::<Vec<u8>>()) {
            let dapp = generate_key_pair();
            let wallet = generate_key_pair();
            let ours = derive_shared_secret(&dapp.private, &wallet.public).unwrap();
            let theirs = derive_shared_secret(&wallet.private, &dapp.public).unwrap();

            let sealed = encrypt(&ours, &payload).unwrap();
            prop_assert_eq!(decrypt(&theirs, &sealed).unwrap(), payload);
        }

        // Non-hex input never panics and always errors
        #[test]
        fn test_garbage_hex_rejected(s in "[g-z]{1,80}") {
            prop_assert!(PublicKey::from_hex(&s).is_err());
            prop_assert!(PrivateKey::from_hex(&s).is_err());
        }
    }
}
