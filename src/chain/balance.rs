// Balance Oracle
//
// Single and bulk lamport balance lookups over the ledger gateway. The bulk
// variant fans out one request per address and joins them all; one address
// failing degrades only that entry to `Unavailable`, which stays distinct
// from a legitimate zero balance.

use crate::chain::rpc::LedgerRpc;
use crate::error::TradeError;
use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Balance query result for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceEntry {
    Lamports(u64),
    Unavailable(String),
}

impl BalanceEntry {
    pub fn lamports(&self) -> Option<u64> {
        match self {
            BalanceEntry::Lamports(value) => Some(*value),
            BalanceEntry::Unavailable(_) => None,
        }
    }
}

pub struct BalanceOracle {
    ledger: Arc<dyn LedgerRpc>,
}

impl BalanceOracle {
    pub fn new(ledger: Arc<dyn LedgerRpc>) -> Self {
        Self { ledger }
    }

    pub async fn get_balance(&self, address: &Pubkey) -> Result<u64, TradeError> {
        self.ledger.get_balance(address).await
    }

    /// Query every address independently. No batched RPC call is assumed;
    /// failures never abort sibling queries.
    pub async fn get_balances(&self, addresses: &[Pubkey]) -> HashMap<Pubkey, BalanceEntry> {
        let queries = addresses.iter().map(|address| async move {
            let entry = match self.ledger.get_balance(address).await {
                Ok(lamports) => BalanceEntry::Lamports(lamports),
                Err(e) => {
                    warn!("Balance unavailable for {}: {}", address, e);
                    BalanceEntry::Unavailable(e.to_string())
                }
            };
            (*address, entry)
        });

        let results: HashMap<Pubkey, BalanceEntry> = join_all(queries).await.into_iter().collect();
        debug!(
            "Fetched {} balances, {} unavailable",
            results.len(),
            results
                .values()
                .filter(|entry| entry.lamports().is_none())
                .count()
        );
        results
    }

    /// Total lamports across the addresses that could be queried.
    pub async fn total_lamports(&self, addresses: &[Pubkey]) -> u64 {
        self.get_balances(addresses)
            .await
            .values()
            .filter_map(BalanceEntry::lamports)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::rpc::MockLedgerRpc;
    use mockall::predicate::eq;

    fn oracle_with(mock: MockLedgerRpc) -> BalanceOracle {
        BalanceOracle::new(Arc::new(mock))
    }

    #[tokio::test]
    async fn test_single_balance() {
        let address = Pubkey::new_unique();
        let mut mock = MockLedgerRpc::new();
        mock.expect_get_balance()
            .with(eq(address))
            .returning(|_| Ok(1_500_000_000));

        let oracle = oracle_with(mock);
        assert_eq!(oracle.get_balance(&address).await.unwrap(), 1_500_000_000);
    }

    #[tokio::test]
    async fn test_bulk_failure_degrades_single_entry() {
        let healthy = Pubkey::new_unique();
        let broken = Pubkey::new_unique();
        let empty = Pubkey::new_unique();

        let mut mock = MockLedgerRpc::new();
        mock.expect_get_balance().returning(move |address| {
            if *address == broken {
                Err(TradeError::Unavailable("node timeout".to_string()))
            } else if *address == empty {
                Ok(0)
            } else {
                Ok(2_000_000_000)
            }
        });

        let oracle = oracle_with(mock);
        let balances = oracle.get_balances(&[healthy, broken, empty]).await;

        assert_eq!(balances.len(), 3);
        assert_eq!(balances[&healthy], BalanceEntry::Lamports(2_000_000_000));
        // zero is a real balance, unavailable is not
        assert_eq!(balances[&empty], BalanceEntry::Lamports(0));
        assert!(matches!(balances[&broken], BalanceEntry::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_total_skips_unavailable() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();

        let mut mock = MockLedgerRpc::new();
        mock.expect_get_balance().returning(move |address| {
            if *address == a {
                Ok(700)
            } else {
                Err(TradeError::Unavailable("down".to_string()))
            }
        });

        let oracle = oracle_with(mock);
        assert_eq!(oracle.total_lamports(&[a, b]).await, 700);
    }
}
