// Ledger RPC Gateway
//
// Thin async trait over the handful of JSON-RPC calls the orchestrator and
// balance oracle need: balances, blockhash, rent minimum, submission, and
// confirmation polling. The trait is the seam that lets every run be tested
// against an in-memory ledger; `SolanaRpc` is the production implementation
// over `solana_client::nonblocking::rpc_client::RpcClient`.
//
// The RPC handle is shared read-only across all concurrent wallet tasks in a
// batch; it carries no per-call mutable state.

use crate::error::TradeError;
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::{
    commitment_config::CommitmentLevel,
    hash::Hash,
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    system_instruction,
    transaction::VersionedTransaction,
};
use solana_transaction_status::TransactionConfirmationStatus;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info};

/// Confirmation poll cadence, matching the public RPC rate expectations.
const CONFIRMATION_POLL_MS: u64 = 400;

/// Minimal ledger surface consumed by the orchestrator and balance oracle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, TradeError>;

    async fn latest_blockhash(&self) -> Result<Hash, TradeError>;

    /// Rent-exempt minimum for an account of `data_len` bytes.
    async fn minimum_rent_exempt(&self, data_len: usize) -> Result<u64, TradeError>;

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, TradeError>;

    /// Poll until the signature reaches confirmed commitment or the
    /// configured timeout elapses.
    async fn confirm_transaction(&self, signature: &Signature) -> Result<(), TradeError>;
}

/// Production gateway over a shared nonblocking [`RpcClient`].
pub struct SolanaRpc {
    client: Arc<RpcClient>,
    confirmation_timeout_ms: u64,
}

impl SolanaRpc {
    pub fn new(client: Arc<RpcClient>, confirmation_timeout_ms: u64) -> Self {
        info!(
            "Initialized ledger gateway: confirmation timeout {}ms",
            confirmation_timeout_ms
        );
        Self {
            client,
            confirmation_timeout_ms,
        }
    }
}

#[async_trait]
impl LedgerRpc for SolanaRpc {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, TradeError> {
        self.client
            .get_balance(address)
            .await
            .map_err(|e| TradeError::Unavailable(e.to_string()))
    }

    async fn latest_blockhash(&self) -> Result<Hash, TradeError> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| TradeError::SubmitFailed(format!("blockhash fetch failed: {}", e)))
    }

    async fn minimum_rent_exempt(&self, data_len: usize) -> Result<u64, TradeError> {
        self.client
            .get_minimum_balance_for_rent_exemption(data_len)
            .await
            .map_err(|e| TradeError::Unavailable(e.to_string()))
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, TradeError> {
        let send_config = RpcSendTransactionConfig {
            skip_preflight: true,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            encoding: None,
            max_retries: Some(3),
            min_context_slot: None,
        };

        self.client
            .send_transaction_with_config(transaction, send_config)
            .await
            .map_err(|e| TradeError::SubmitFailed(e.to_string()))
    }

    async fn confirm_transaction(&self, signature: &Signature) -> Result<(), TradeError> {
        let timeout_duration = Duration::from_millis(self.confirmation_timeout_ms);
        let signature = *signature;

        let poll = async {
            loop {
                match self.client.get_signature_statuses(&[signature]).await {
                    Ok(response) => {
                        if let Some(Some(status)) = response.value.first() {
                            if let Some(err) = &status.err {
                                return Err(TradeError::SubmitFailed(format!(
                                    "transaction failed on-chain: {:?}",
                                    err
                                )));
                            }
                            if matches!(
                                status.confirmation_status,
                                Some(TransactionConfirmationStatus::Confirmed)
                                    | Some(TransactionConfirmationStatus::Finalized)
                            ) {
                                debug!("Confirmed {} at slot {}", signature, status.slot);
                                return Ok(());
                            }
                        }
                    }
                    Err(e) => {
                        debug!("Signature status poll failed: {}", e);
                    }
                }

                sleep(Duration::from_millis(CONFIRMATION_POLL_MS)).await;
            }
        };

        match timeout(timeout_duration, poll).await {
            Ok(result) => result,
            Err(_) => Err(TradeError::ConfirmTimeout {
                signature: signature.to_string(),
            }),
        }
    }
}

/// Build a signed SOL transfer as a versioned transaction.
///
/// The sender's own keypair signs; a wallet never signs another wallet's
/// transfer.
pub fn build_transfer_transaction(
    sender: &Keypair,
    recipient: &Pubkey,
    lamports: u64,
    recent_blockhash: Hash,
) -> Result<VersionedTransaction, TradeError> {
    let instruction = system_instruction::transfer(&sender.pubkey(), recipient, lamports);
    let message = Message::new_with_blockhash(
        &[instruction],
        Some(&sender.pubkey()),
        &recent_blockhash,
    );

    VersionedTransaction::try_new(VersionedMessage::Legacy(message), &[sender])
        .map_err(|e| TradeError::SubmitFailed(format!("transfer signing failed: {}", e)))
}
