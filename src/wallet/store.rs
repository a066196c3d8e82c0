// In-Memory Wallet Store
//
// Ordered collection of up to 99 wallet keypairs with import/export in the
// two persisted formats:
// 1. A single JSON array of {publicKey, secretKey} objects (secretKey is a
//    64-element byte array)
// 2. Newline-delimited entries: JSON byte array or base58 string per line
//
// All mutations are synchronous and take &mut self, so callers never observe
// a partial list. Imports beyond the cap are truncated to the first 99
// entries and reported, not failed.

use crate::error::TradeError;
use crate::wallet::codec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hard cap on stored wallets, matching the dashboard's 99-slot layout.
pub const MAX_WALLETS: usize = 99;

/// One wallet entry in the JSON array file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletFileEntry {
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "secretKey")]
    pub secret_key: Vec<u8>,
}

/// Result of a bulk mutation. `truncated > 0` is the non-fatal
/// `CapacityExceeded` signal: the store kept the first `accepted` entries
/// and dropped the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationReport {
    pub accepted: usize,
    pub truncated: usize,
}

impl MutationReport {
    pub fn capacity_exceeded(&self) -> bool {
        self.truncated > 0
    }
}

/// Ordered, capped collection of wallet credentials.
#[derive(Default)]
pub struct WalletStore {
    wallets: Vec<Arc<Keypair>>,
}

impl WalletStore {
    pub fn new() -> Self {
        Self { wallets: Vec::new() }
    }

    /// Replace the whole collection, truncating to the cap.
    pub fn replace_all(&mut self, credentials: Vec<Keypair>) -> MutationReport {
        self.wallets.clear();
        self.append(credentials)
    }

    /// Append credentials, silently truncating the combined list to the
    /// first [`MAX_WALLETS`] entries. Truncation is reported and logged,
    /// never an error.
    pub fn append(&mut self, credentials: Vec<Keypair>) -> MutationReport {
        let room = MAX_WALLETS.saturating_sub(self.wallets.len());
        let offered = credentials.len();
        let accepted = offered.min(room);

        for keypair in credentials.into_iter().take(room) {
            self.wallets.push(Arc::new(keypair));
        }

        let truncated = offered - accepted;
        if truncated > 0 {
            warn!(
                "Wallet capacity exceeded: kept first {} of {} offered (cap {})",
                accepted, offered, MAX_WALLETS
            );
        }

        MutationReport { accepted, truncated }
    }

    /// Generate `count` fresh keypairs, replacing the current collection.
    pub fn generate(&mut self, count: usize) -> MutationReport {
        let fresh: Vec<Keypair> = (0..count).map(|_| Keypair::new()).collect();
        let report = self.replace_all(fresh);
        info!("Generated {} wallets", report.accepted);
        report
    }

    /// Remove the wallets at the given indices, compacting the remainder
    /// while preserving relative order. Unknown indices are ignored.
    pub fn remove(&mut self, indices: &HashSet<usize>) -> usize {
        let before = self.wallets.len();
        let mut position = 0;
        self.wallets.retain(|_| {
            let keep = !indices.contains(&position);
            position += 1;
            keep
        });
        let removed = before - self.wallets.len();
        if removed > 0 {
            debug!("Removed {} wallets, {} remain", removed, self.wallets.len());
        }
        removed
    }

    pub fn get(&self, index: usize) -> Option<Arc<Keypair>> {
        self.wallets.get(index).cloned()
    }

    pub fn count(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Keypair>> {
        self.wallets.iter()
    }

    /// Parse wallet file content in either persisted format.
    ///
    /// Tries the single JSON array first (objects with a `secretKey` field,
    /// or bare byte arrays); otherwise falls back to one entry per line,
    /// where each line is a JSON byte array or a base58 secret key.
    pub fn parse_import(content: &str) -> Result<Vec<Keypair>, TradeError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(TradeError::InvalidKeyFormat("empty wallet file".to_string()));
        }

        if let Ok(entries) = serde_json::from_str::<Vec<WalletFileEntry>>(trimmed) {
            return entries
                .iter()
                .map(|entry| codec::keypair_from_bytes(&entry.secret_key))
                .collect();
        }

        if let Ok(arrays) = serde_json::from_str::<Vec<Vec<u8>>>(trimmed) {
            return arrays
                .iter()
                .map(|bytes| codec::keypair_from_bytes(bytes))
                .collect();
        }

        trimmed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(codec::decode_secret_key)
            .collect()
    }

    /// Serialize the collection as a pretty-printed JSON array of
    /// {publicKey, secretKey} objects, the original export payload shape.
    pub fn export_json(&self) -> String {
        let entries: Vec<WalletFileEntry> = self
            .wallets
            .iter()
            .map(|keypair| WalletFileEntry {
                public_key: keypair.pubkey().to_string(),
                secret_key: keypair.to_bytes().to_vec(),
            })
            .collect();
        serde_json::to_string_pretty(&entries).expect("wallet entries always serialize")
    }

    /// Load wallets from a file, replacing the current collection.
    pub async fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<MutationReport> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read wallet file {}", path.as_ref().display()))?;
        let credentials = Self::parse_import(&content)?;
        let report = self.replace_all(credentials);
        info!(
            "Loaded {} wallets from {}{}",
            report.accepted,
            path.as_ref().display(),
            if report.capacity_exceeded() {
                " (truncated to cap)"
            } else {
                ""
            }
        );
        Ok(report)
    }

    /// Write the current collection to a file in the JSON array format.
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create wallet file directory")?;
        }
        tokio::fs::write(path.as_ref(), self.export_json())
            .await
            .with_context(|| format!("Failed to write wallet file {}", path.as_ref().display()))?;
        info!("Exported {} wallets to {}", self.count(), path.as_ref().display());
        Ok(())
    }
}
