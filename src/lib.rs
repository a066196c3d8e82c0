// Solana Wallet Fleet Library
//
// Components for operating a fleet of up to 99 trading wallets on Solana:
// - Secret key encoding/decoding (base58 and JSON byte arrays)
// - Wallet fleet storage with import/export
// - Bulk balance queries
// - Jupiter v6 quote and swap building
// - Batched multi-wallet transaction orchestration
// - DexScreener market monitoring

pub mod chain;
pub mod config;
pub mod dex;
pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod reporting;
pub mod wallet;
