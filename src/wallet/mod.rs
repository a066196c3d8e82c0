pub mod codec;
pub mod store;

pub use store::{MutationReport, WalletStore, MAX_WALLETS};
