//! Key agreement and proofs used by pairing and authenticated connect.

use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::protocol::constants::{
    CLIENT_ID_LEN, CONNECT_VERIFY_LABEL, PAIR_SETUP_INFO, PAIR_VERIFY_LABEL, SECRET_LEN,
};

/// Client half of a pairing exchange.
pub struct PairingKeys {
    secret: StaticSecret,
    pub public: PublicKey,
}

impl PairingKeys {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Combine the device key, the device salt and the operator PIN into
    /// the long-lived session secret.
    pub fn derive_secret(
        &self,
        device_public: &[u8],
        salt: &[u8],
        pin: &str,
    ) -> Result<[u8; SECRET_LEN], String> {
        let device_public: [u8; 32] = device_public
            .try_into()
            .map_err(|_| format!("device public key has {} bytes", device_public.len()))?;
        let shared = self
            .secret
            .diffie_hellman(&PublicKey::from(device_public));

        let mut ikm = shared.as_bytes().to_vec();
        ikm.extend_from_slice(pin.as_bytes());

        let hk = Hkdf::<Sha256>::new(Some(salt), &ikm);
        let mut okm = [0u8; SECRET_LEN];
        hk.expand(PAIR_SETUP_INFO, &mut okm)
            .map_err(|e| format!("key derivation: {e}"))?;
        Ok(okm)
    }
}

/// Random hex identifier a client announces while pairing.
pub fn new_client_id() -> String {
    let mut bytes = [0u8; CLIENT_ID_LEN];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Proof that pairing derived the same secret on both ends.
pub fn pair_proof(secret: &[u8]) -> String {
    digest(&[secret, PAIR_VERIFY_LABEL])
}

/// Proof of possession of the secret for one connect challenge.
pub fn connect_proof(secret: &[u8], nonce: &[u8]) -> String {
    digest(&[secret, nonce, CONNECT_VERIFY_LABEL])
}

fn digest(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_sides_derive_same_secret() {
        let client = PairingKeys::generate();
        let device = PairingKeys::generate();
        let salt = b"salt";

        let a = client
            .derive_secret(device.public.as_bytes(), salt, "1234")
            .unwrap();
        let b = device
            .derive_secret(client.public.as_bytes(), salt, "1234")
            .unwrap();
        assert_eq!(a, b);

        let wrong_pin = device
            .derive_secret(client.public.as_bytes(), salt, "4321")
            .unwrap();
        assert_ne!(a, wrong_pin);
    }

    #[test]
    fn test_bad_public_key_length() {
        let client = PairingKeys::generate();
        assert!(client.derive_secret(&[1, 2, 3], b"s", "0000").is_err());
    }

    #[test]
    fn test_proofs_depend_on_inputs() {
        let secret = [7u8; 32];
        assert_ne!(pair_proof(&secret), pair_proof(&[8u8; 32]));
        assert_ne!(connect_proof(&secret, b"a"), connect_proof(&secret, b"b"));
        assert_eq!(connect_proof(&secret, b"a").len(), 64);
    }

    #[test]
    fn test_client_id_shape() {
        let id = new_client_id();
        assert_eq!(id.len(), CLIENT_ID_LEN * 2);
        assert_ne!(id, new_client_id());
    }
}
