//! Cryptographic primitives for Ferrocoin
//!
//! Wallets are secp256k1 key pairs. An [`Address`] is the public half of a
//! wallet; its string form is the base58 encoding of the 33 compressed key
//! bytes, which is what appears inside transactions, map keys, and wire
//! payloads. Signatures are deterministic ECDSA (RFC 6979) over the SHA-256
//! digest of the signed payload, carried as lowercase hex.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

use ferrocoin_util::{base58_to_bytes, bytes_to_base58, bytes_to_hex, hex_to_bytes};

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid key format")]
    InvalidKey,

    #[error("Invalid signature format")]
    InvalidSignature,
}

/// Hashes arbitrary bytes with SHA-256 and returns the lowercase hex digest.
///
/// Every content hash in the system (outputs, transactions, blocks) goes
/// through this function.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    bytes_to_hex(hasher.finalize().as_slice())
}

/// The public identity funds are paid to.
///
/// Two addresses compare equal iff their compressed key bytes are equal, so
/// an address survives a string round-trip and stays a stable map key.
#[derive(Debug, Clone, Copy)]
pub struct Address(PublicKey);

impl Address {
    /// Wraps a raw public key.
    pub fn from_pubkey(pubkey: PublicKey) -> Self {
        Address(pubkey)
    }

    /// The underlying public key, used for signature verification.
    pub fn key(&self) -> &PublicKey {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bytes_to_base58(&self.0.serialize()))
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = base58_to_bytes(s).map_err(|_| CryptoError::InvalidKey)?;
        let key = PublicKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Address(key))
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.0.serialize() == other.0.serialize()
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.serialize().hash(state);
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(D::Error::custom)
    }
}

/// A key pair that can spend and receive funds.
#[derive(Debug, Clone)]
pub struct Wallet {
    secret: SecretKey,
    public: PublicKey,
}

impl Wallet {
    /// Generates a fresh key pair.
    pub fn create() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut rand::thread_rng());
        Wallet { secret, public }
    }

    /// Rebuilds a wallet from a previously exported secret key.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex_to_bytes(secret_hex).map_err(|_| CryptoError::InvalidKey)?;
        let secret = SecretKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidKey)?;
        let secp = Secp256k1::new();
        let public = secret.public_key(&secp);
        Ok(Wallet { secret, public })
    }

    /// Exports the secret key as hex.
    pub fn secret_hex(&self) -> String {
        bytes_to_hex(&self.secret.secret_bytes())
    }

    /// The address funds sent to this wallet should name.
    pub fn address(&self) -> Address {
        Address(self.public)
    }

    /// Signs a message and returns the signature as lowercase hex.
    ///
    /// The message is hashed with SHA-256 before signing; ECDSA here is
    /// deterministic, so signing the same payload twice yields the same hex.
    pub fn sign(&self, message: &[u8]) -> String {
        let secp = Secp256k1::new();
        let digest: [u8; 32] = Sha256::digest(message).into();
        let msg = Message::from_slice(&digest).expect("digest is 32 bytes");
        let sig = secp.sign_ecdsa(&msg, &self.secret);
        bytes_to_hex(&sig.serialize_compact())
    }

    /// Verifies a hex signature over `message` against `address`.
    ///
    /// Malformed hex or signature bytes simply fail verification; callers
    /// never need to distinguish "garbage" from "wrong key".
    pub fn verify(message: &[u8], signature_hex: &str, address: &Address) -> bool {
        let Ok(sig_bytes) = hex_to_bytes(signature_hex) else {
            return false;
        };
        let Ok(sig) = Signature::from_compact(&sig_bytes) else {
            return false;
        };
        let secp = Secp256k1::new();
        let digest: [u8; 32] = Sha256::digest(message).into();
        let msg = Message::from_slice(&digest).expect("digest is 32 bytes");
        secp.verify_ecdsa(&msg, &sig, address.key()).is_ok()
    }
}
