use crate::dex::jupiter::DEFAULT_JUPITER_URL;
use crate::monitor::DEFAULT_DEXSCREENER_URL;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Main configuration struct containing all runtime settings
#[derive(Debug, Clone)]
pub struct Config {
    pub rpc: RpcConfig,
    pub wallet: WalletConfig,
    pub trade: TradeConfig,
    pub api: ApiConfig,
    pub monitor: MonitorConfig,
}

/// RPC endpoint configuration
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub url: String,
    pub commitment_level: String,
    pub confirmation_timeout_ms: u64,
}

/// Wallet storage and master key configuration
#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// JSON file holding the generated wallet fleet.
    pub fleet_path: PathBuf,
    /// Master key material, base58 or JSON byte array.
    pub master_private_key: Option<String>,
    /// Alternative to MASTER_PRIVATE_KEY: path to a keypair file.
    pub master_keypair_path: Option<PathBuf>,
}

/// Defaults applied to orchestrated operations
#[derive(Debug, Clone)]
pub struct TradeConfig {
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub slippage_bps: u16,
}

/// External HTTP API endpoints
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub jupiter_url: String,
    pub dexscreener_url: String,
}

/// Market monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Token mint to watch; the feed stays off when unset.
    pub token_address: Option<String>,
    pub poll_interval_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file
        dotenvy::dotenv().ok();

        let rpc = RpcConfig {
            url: std::env::var("RPC_URL").context("RPC_URL not set")?,
            commitment_level: get_env_or_default("COMMITMENT_LEVEL", "confirmed"),
            confirmation_timeout_ms: get_u64_env("CONFIRMATION_TIMEOUT_MS", 30_000)?,
        };

        let wallet = WalletConfig {
            fleet_path: PathBuf::from(get_env_or_default("WALLET_FLEET_PATH", "wallets.json")),
            master_private_key: std::env::var("MASTER_PRIVATE_KEY").ok(),
            master_keypair_path: std::env::var("MASTER_KEYPAIR_PATH").ok().map(PathBuf::from),
        };

        let trade = TradeConfig {
            batch_size: get_u64_env("BATCH_SIZE", 5)? as usize,
            inter_batch_delay_ms: get_u64_env("INTER_BATCH_DELAY_MS", 1_000)?,
            slippage_bps: get_u64_env("SLIPPAGE_BPS", 100)? as u16,
        };

        let api = ApiConfig {
            jupiter_url: get_env_or_default("JUPITER_API_URL", DEFAULT_JUPITER_URL),
            dexscreener_url: get_env_or_default("DEXSCREENER_API_URL", DEFAULT_DEXSCREENER_URL),
        };

        let monitor = MonitorConfig {
            token_address: std::env::var("MONITOR_TOKEN_ADDRESS").ok(),
            poll_interval_ms: get_u64_env("MONITOR_POLL_INTERVAL_MS", 10_000)?,
        };

        if trade.batch_size < 1 {
            anyhow::bail!("BATCH_SIZE must be >= 1");
        }

        Ok(Config {
            rpc,
            wallet,
            trade,
            api,
            monitor,
        })
    }
}

// ============================================================================
// Helper Functions for Environment Variable Parsing
// ============================================================================

/// Get environment variable or return default value
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get u64 environment variable with default
fn get_u64_env(key: &str, default: u64) -> Result<u64> {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .context(format!("Failed to parse {} as u64", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_get_env_or_default() {
        std::env::remove_var("FLEET_TEST_MISSING");
        assert_eq!(get_env_or_default("FLEET_TEST_MISSING", "fallback"), "fallback");

        std::env::set_var("FLEET_TEST_PRESENT", "value");
        assert_eq!(get_env_or_default("FLEET_TEST_PRESENT", "fallback"), "value");
    }

    #[test]
    #[serial]
    fn test_get_u64_env() {
        std::env::set_var("FLEET_TEST_U64", "250");
        assert_eq!(get_u64_env("FLEET_TEST_U64", 5).unwrap(), 250);

        std::env::set_var("FLEET_TEST_U64_BAD", "not-a-number");
        assert!(get_u64_env("FLEET_TEST_U64_BAD", 5).is_err());
    }
}
