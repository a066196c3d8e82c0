// Secret Key Codec
//
// Decodes wallet secret keys from the two formats operators paste or import:
// 1. Base58 string (the common wallet-app export format)
// 2. JSON byte array, e.g. [12,34,...] (the `solana-keygen` file format)
//
// Decoding is pure: no I/O, same input always yields the same keypair, so
// everything here is unit-testable without a network.

use crate::error::TradeError;
use solana_sdk::signature::Keypair;

/// Exact length of an ed25519 secret key (32-byte seed + 32-byte pubkey).
pub const SECRET_KEY_LEN: usize = 64;

/// Decode a secret key string into a [`Keypair`].
///
/// Tries base58 first; on decode failure or wrong resulting length falls back
/// to a JSON byte array. Anything that does not produce exactly 64 valid
/// bytes fails with [`TradeError::InvalidKeyFormat`].
pub fn decode_secret_key(input: &str) -> Result<Keypair, TradeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TradeError::InvalidKeyFormat("empty input".to_string()));
    }

    if let Ok(bytes) = bs58::decode(trimmed).into_vec() {
        if bytes.len() == SECRET_KEY_LEN {
            return keypair_from_bytes(&bytes);
        }
    }

    let bytes: Vec<u8> = serde_json::from_str(trimmed).map_err(|_| {
        TradeError::InvalidKeyFormat(
            "expected base58 string or JSON byte array".to_string(),
        )
    })?;

    keypair_from_bytes(&bytes)
}

/// Encode a keypair's secret as a base58 string.
pub fn encode_base58(keypair: &Keypair) -> String {
    bs58::encode(keypair.to_bytes()).into_string()
}

/// Encode a keypair's secret as a JSON byte array.
pub fn encode_json(keypair: &Keypair) -> String {
    serde_json::to_string(&keypair.to_bytes().to_vec())
        .expect("byte vector always serializes")
}

/// Build a keypair from raw secret bytes, enforcing the exact length.
pub fn keypair_from_bytes(bytes: &[u8]) -> Result<Keypair, TradeError> {
    if bytes.len() != SECRET_KEY_LEN {
        return Err(TradeError::InvalidKeyFormat(format!(
            "secret key must be {} bytes, got {}",
            SECRET_KEY_LEN,
            bytes.len()
        )));
    }

    Keypair::from_bytes(bytes)
        .map_err(|e| TradeError::InvalidKeyFormat(format!("invalid key material: {}", e)))
}
