pub mod balance;
pub mod rpc;

pub use balance::{BalanceEntry, BalanceOracle};
pub use rpc::{build_transfer_transaction, LedgerRpc, SolanaRpc};
