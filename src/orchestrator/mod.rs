// Batched Multi-Wallet Transaction Orchestrator
//
// Executes one operation (SOL distribute/collect or Jupiter swap) against an
// ordered selection of wallet indices:
// 1. Pre-flight validation before any network activity
// 2. Consecutive batches of `batch_size` wallets, one cooperative future per
//    wallet, joined with allSettled semantics (a failing wallet never
//    interrupts its siblings)
// 3. Batch N+1 never starts before batch N fully settles; the inter-batch
//    delay is a hard floor
// 4. Cancellation observed only at batch boundaries, so in-flight
//    submissions always run to completion
// 5. Exactly one outcome per selected wallet per run, folded into a
//    recomputable RunSummary
//
// Per-wallet errors are captured into that wallet's outcome; a run is
// strictly one attempt per wallet per invocation.

use crate::chain::rpc::{build_transfer_transaction, LedgerRpc};
use crate::dex::jupiter::{sign_swap_transaction, SwapApi};
use crate::error::TradeError;
use crate::wallet::WalletStore;
use futures::future::join_all;
use solana_sdk::{pubkey::Pubkey, signature::Keypair, signer::Signer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lamports kept in a wallet beyond the rent-exempt minimum when collecting,
/// covering the transfer fee.
pub const COLLECT_SAFETY_BUFFER_LAMPORTS: u64 = 5_000;

/// The operation to fan out across the selected wallets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// Master sends a fixed amount to every selected wallet.
    Distribute { lamports_per_wallet: u64 },
    /// Master splits a total equally across the selection; the whole run
    /// aborts up front if the master cannot fund the full total.
    DistributeEqually { total_lamports: u64 },
    /// Every selected wallet sends its balance (minus rent minimum and
    /// safety buffer) back to the master.
    Collect,
    /// Every selected wallet swaps `amount_raw` of the input mint via the
    /// aggregator, signing with its own key.
    Swap {
        input_mint: Pubkey,
        output_mint: Pubkey,
        amount_raw: u64,
        slippage_bps: u16,
    },
}

impl OperationKind {
    fn needs_master(&self) -> bool {
        !matches!(self, OperationKind::Swap { .. })
    }
}

#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
}

impl OperationRequest {
    pub fn validate(&self) -> Result<(), TradeError> {
        if self.batch_size < 1 {
            return Err(TradeError::InvalidRequest("batch size must be >= 1".to_string()));
        }
        match &self.kind {
            OperationKind::Distribute { lamports_per_wallet: 0 } => Err(
                TradeError::InvalidRequest("distribute amount must be > 0".to_string()),
            ),
            OperationKind::DistributeEqually { total_lamports: 0 } => Err(
                TradeError::InvalidRequest("distribute total must be > 0".to_string()),
            ),
            OperationKind::Swap { amount_raw: 0, .. } => Err(TradeError::InvalidRequest(
                "swap amount must be > 0".to_string(),
            )),
            OperationKind::Swap {
                input_mint,
                output_mint,
                ..
            } if input_mint == output_mint => Err(TradeError::InvalidRequest(
                "input and output mint must differ".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Terminal result for one wallet. Produced exactly once per selected wallet
/// per run.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub wallet_index: usize,
    pub pubkey: Pubkey,
    pub status: OutcomeStatus,
    pub balance_delta: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum OutcomeStatus {
    Succeeded { signature: String },
    Failed { error: TradeError },
}

impl OperationOutcome {
    pub fn success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Succeeded { .. })
    }

    pub fn signature(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Succeeded { signature } => Some(signature),
            OutcomeStatus::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&TradeError> {
        match &self.status {
            OutcomeStatus::Succeeded { .. } => None,
            OutcomeStatus::Failed { error } => Some(error),
        }
    }
}

/// Aggregate counts derived by folding the outcome list. Never stored
/// independently, so it can always be recomputed without drift.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Sum of absolute balance deltas of successful wallets.
    pub lamports_moved: u64,
    /// Signed sum of balance deltas of successful wallets.
    pub net_lamports: i64,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[OperationOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut summary, outcome| {
            if outcome.success() {
                summary.succeeded += 1;
                if let Some(delta) = outcome.balance_delta {
                    summary.lamports_moved += delta.unsigned_abs();
                    summary.net_lamports += delta;
                }
            } else {
                summary.failed += 1;
            }
            summary
        })
    }
}

/// Structured run events for a presentation layer to subscribe to; the
/// orchestrator itself never touches any rendering.
#[derive(Debug, Clone)]
pub enum RunEvent {
    WalletStarted { wallet_index: usize },
    WalletFinished { outcome: OperationOutcome },
    BatchSettled { batch_index: usize, batch_count: usize },
    RunFinished { summary: RunSummary, cancelled: bool },
}

/// Everything a caller needs after a run: the per-wallet outcomes, the
/// folded summary, and whether cancellation cut the run short.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcomes: Vec<OperationOutcome>,
    pub summary: RunSummary,
    pub cancelled: bool,
}

pub struct TransactionOrchestrator {
    ledger: Arc<dyn LedgerRpc>,
    swap_api: Arc<dyn SwapApi>,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl TransactionOrchestrator {
    pub fn new(ledger: Arc<dyn LedgerRpc>, swap_api: Arc<dyn SwapApi>) -> Self {
        Self {
            ledger,
            swap_api,
            events: None,
        }
    }

    /// Attach an event channel; outcomes are still returned either way.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Execute `request` against the wallets at `selection`, in selection
    /// order. The store is only read during the run; preventing concurrent
    /// runs over overlapping selections is the caller's responsibility.
    pub async fn run(
        &self,
        store: &WalletStore,
        master: Option<&Keypair>,
        selection: &[usize],
        request: &OperationRequest,
        cancel: &CancellationToken,
    ) -> Result<RunReport, TradeError> {
        request.validate()?;

        if selection.is_empty() {
            return Err(TradeError::EmptySelection);
        }

        if request.kind.needs_master() && master.is_none() {
            return Err(TradeError::InvalidRequest(
                "operation requires a loaded master wallet".to_string(),
            ));
        }

        let per_wallet_lamports = self.preflight_lamports(master, selection.len(), request).await?;

        let batch_count = selection.len().div_ceil(request.batch_size);
        info!(
            "Starting run: {} wallets, {} batches of up to {}, delay {:?}",
            selection.len(),
            batch_count,
            request.batch_size,
            request.inter_batch_delay
        );

        let mut outcomes = Vec::with_capacity(selection.len());
        let mut cancelled = false;

        for (batch_index, batch) in selection.chunks(request.batch_size).enumerate() {
            debug!("Launching batch {}/{}: {:?}", batch_index + 1, batch_count, batch);

            let tasks = batch.iter().map(|&wallet_index| {
                self.execute_wallet(wallet_index, store, master, request, per_wallet_lamports)
            });
            let settled = join_all(tasks).await;
            outcomes.extend(settled);

            self.emit(RunEvent::BatchSettled {
                batch_index,
                batch_count,
            });

            if cancel.is_cancelled() {
                warn!(
                    "Run cancelled after batch {}/{}; remaining batches skipped",
                    batch_index + 1,
                    batch_count
                );
                cancelled = true;
                break;
            }

            if batch_index + 1 < batch_count {
                sleep(request.inter_batch_delay).await;
            }
        }

        let summary = RunSummary::from_outcomes(&outcomes);
        info!(
            "Run finished: {} succeeded, {} failed, {} lamports moved{}",
            summary.succeeded,
            summary.failed,
            summary.lamports_moved,
            if cancelled { " (cancelled)" } else { "" }
        );
        self.emit(RunEvent::RunFinished {
            summary: summary.clone(),
            cancelled,
        });

        Ok(RunReport {
            outcomes,
            summary,
            cancelled,
        })
    }

    /// Run-level checks that must happen before any transaction is issued.
    /// Returns the per-wallet lamports for the distribute modes.
    async fn preflight_lamports(
        &self,
        master: Option<&Keypair>,
        selected: usize,
        request: &OperationRequest,
    ) -> Result<u64, TradeError> {
        match &request.kind {
            OperationKind::Distribute { lamports_per_wallet } => Ok(*lamports_per_wallet),
            OperationKind::DistributeEqually { total_lamports } => {
                let master = require_master(master)?;
                let available = self.ledger.get_balance(&master.pubkey()).await?;
                if available < *total_lamports {
                    return Err(TradeError::InsufficientFunds {
                        required: *total_lamports,
                        available,
                    });
                }
                Ok(total_lamports / selected as u64)
            }
            OperationKind::Collect | OperationKind::Swap { .. } => Ok(0),
        }
    }

    /// One wallet, one attempt. Never returns an error: every failure is
    /// folded into the outcome so siblings keep running.
    async fn execute_wallet(
        &self,
        wallet_index: usize,
        store: &WalletStore,
        master: Option<&Keypair>,
        request: &OperationRequest,
        per_wallet_lamports: u64,
    ) -> OperationOutcome {
        self.emit(RunEvent::WalletStarted { wallet_index });

        let (status, pubkey, balance_delta) = match store.get(wallet_index) {
            Some(wallet) => {
                let pubkey = wallet.pubkey();
                let before = self.ledger.get_balance(&pubkey).await.ok();

                let result = self
                    .execute_operation(&wallet, master, request, per_wallet_lamports)
                    .await;

                let delta = match (before, self.ledger.get_balance(&pubkey).await.ok()) {
                    (Some(before), Some(after)) => Some(after as i64 - before as i64),
                    _ => None,
                };

                match result {
                    Ok(signature) => {
                        debug!("Wallet #{} succeeded: {}", wallet_index + 1, signature);
                        (OutcomeStatus::Succeeded { signature }, pubkey, delta)
                    }
                    Err(error) => {
                        warn!("Wallet #{} failed: {}", wallet_index + 1, error);
                        (OutcomeStatus::Failed { error }, pubkey, delta)
                    }
                }
            }
            None => (
                OutcomeStatus::Failed {
                    error: TradeError::InvalidRequest(format!(
                        "no wallet at index {}",
                        wallet_index
                    )),
                },
                Pubkey::default(),
                None,
            ),
        };

        let outcome = OperationOutcome {
            wallet_index,
            pubkey,
            status,
            balance_delta,
        };
        self.emit(RunEvent::WalletFinished {
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn execute_operation(
        &self,
        wallet: &Keypair,
        master: Option<&Keypair>,
        request: &OperationRequest,
        per_wallet_lamports: u64,
    ) -> Result<String, TradeError> {
        match &request.kind {
            OperationKind::Distribute { .. } | OperationKind::DistributeEqually { .. } => {
                let master = require_master(master)?;
                self.transfer(master, &wallet.pubkey(), per_wallet_lamports).await
            }
            OperationKind::Collect => {
                let master = require_master(master)?;
                let balance = self.ledger.get_balance(&wallet.pubkey()).await?;
                let rent_minimum = self.ledger.minimum_rent_exempt(0).await?;
                let reserved = rent_minimum + COLLECT_SAFETY_BUFFER_LAMPORTS;
                let transferable = balance.saturating_sub(reserved);
                if transferable == 0 {
                    return Err(TradeError::InsufficientBalance { available: balance });
                }
                self.transfer(wallet, &master.pubkey(), transferable).await
            }
            OperationKind::Swap {
                input_mint,
                output_mint,
                amount_raw,
                slippage_bps,
            } => {
                let quote = self
                    .swap_api
                    .get_quote(input_mint, output_mint, *amount_raw, *slippage_bps)
                    .await?;
                let unsigned = self
                    .swap_api
                    .build_swap_transaction(&quote, &wallet.pubkey())
                    .await?;
                let transaction = sign_swap_transaction(&unsigned, wallet)?;
                let signature = self.ledger.send_transaction(&transaction).await?;
                self.ledger.confirm_transaction(&signature).await?;
                Ok(signature.to_string())
            }
        }
    }

    /// Sign, submit, and confirm a direct value transfer.
    async fn transfer(
        &self,
        sender: &Keypair,
        recipient: &Pubkey,
        lamports: u64,
    ) -> Result<String, TradeError> {
        let blockhash = self.ledger.latest_blockhash().await?;
        let transaction = build_transfer_transaction(sender, recipient, lamports, blockhash)?;
        let signature = self.ledger.send_transaction(&transaction).await?;
        self.ledger.confirm_transaction(&signature).await?;
        Ok(signature.to_string())
    }
}

// run() verifies master presence up front; this covers the type system.
fn require_master(master: Option<&Keypair>) -> Result<&Keypair, TradeError> {
    master.ok_or_else(|| {
        TradeError::InvalidRequest("operation requires a loaded master wallet".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::rpc::MockLedgerRpc;
    use crate::dex::jupiter::MockSwapApi;

    fn orchestrator(ledger: MockLedgerRpc) -> TransactionOrchestrator {
        TransactionOrchestrator::new(Arc::new(ledger), Arc::new(MockSwapApi::new()))
    }

    fn distribute_equally(total: u64) -> OperationRequest {
        OperationRequest {
            kind: OperationKind::DistributeEqually {
                total_lamports: total,
            },
            batch_size: 5,
            inter_batch_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_request_validation() {
        let bad_batch = OperationRequest {
            kind: OperationKind::Collect,
            batch_size: 0,
            inter_batch_delay: Duration::ZERO,
        };
        assert_eq!(
            bad_batch.validate().unwrap_err().classification(),
            "InvalidRequest"
        );

        let zero_amount = OperationRequest {
            kind: OperationKind::Distribute {
                lamports_per_wallet: 0,
            },
            batch_size: 1,
            inter_batch_delay: Duration::ZERO,
        };
        assert!(zero_amount.validate().is_err());

        let same_mint = Pubkey::new_unique();
        let bad_swap = OperationRequest {
            kind: OperationKind::Swap {
                input_mint: same_mint,
                output_mint: same_mint,
                amount_raw: 1,
                slippage_bps: 100,
            },
            batch_size: 1,
            inter_batch_delay: Duration::ZERO,
        };
        assert!(bad_swap.validate().is_err());
    }

    #[tokio::test]
    async fn test_empty_selection_aborts_before_network() {
        // A mock with no expectations panics on any call, so this also
        // proves no network activity happens.
        let orchestrator = orchestrator(MockLedgerRpc::new());
        let store = WalletStore::new();
        let master = Keypair::new();

        let err = orchestrator
            .run(
                &store,
                Some(&master),
                &[],
                &distribute_equally(1_000_000),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, TradeError::EmptySelection);
    }

    #[tokio::test]
    async fn test_distribute_equally_insufficient_funds_preflight() {
        let mut ledger = MockLedgerRpc::new();
        // Only the master balance check is expected; any send would panic.
        ledger
            .expect_get_balance()
            .times(1)
            .returning(|_| Ok(1_000_000_000));

        let orchestrator = orchestrator(ledger);
        let mut store = WalletStore::new();
        store.append((0..3).map(|_| Keypair::new()).collect());
        let master = Keypair::new();

        let err = orchestrator
            .run(
                &store,
                Some(&master),
                &[0, 1, 2],
                &distribute_equally(2_000_000_000),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TradeError::InsufficientFunds {
                required: 2_000_000_000,
                available: 1_000_000_000
            }
        );
    }

    #[tokio::test]
    async fn test_distribute_requires_master() {
        let orchestrator = orchestrator(MockLedgerRpc::new());
        let mut store = WalletStore::new();
        store.append(vec![Keypair::new()]);

        let err = orchestrator
            .run(
                &store,
                None,
                &[0],
                &distribute_equally(1_000),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.classification(), "InvalidRequest");
    }

    #[test]
    fn test_summary_fold() {
        let outcomes = vec![
            OperationOutcome {
                wallet_index: 0,
                pubkey: Pubkey::new_unique(),
                status: OutcomeStatus::Succeeded {
                    signature: "sig0".to_string(),
                },
                balance_delta: Some(500),
            },
            OperationOutcome {
                wallet_index: 1,
                pubkey: Pubkey::new_unique(),
                status: OutcomeStatus::Succeeded {
                    signature: "sig1".to_string(),
                },
                balance_delta: Some(-200),
            },
            OperationOutcome {
                wallet_index: 2,
                pubkey: Pubkey::new_unique(),
                status: OutcomeStatus::Failed {
                    error: TradeError::NoRoute("none".to_string()),
                },
                balance_delta: None,
            },
        ];

        let summary = RunSummary::from_outcomes(&outcomes);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.lamports_moved, 700);
        assert_eq!(summary.net_lamports, 300);
        // recomputing never drifts
        assert_eq!(summary, RunSummary::from_outcomes(&outcomes));
    }
}
