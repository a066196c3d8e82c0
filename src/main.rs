use anyhow::{Context, Result};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{pubkey::Pubkey, signature::Keypair, signer::Signer};
use solana_wallet_fleet::chain::{BalanceOracle, SolanaRpc};
use solana_wallet_fleet::config::{Config, WalletConfig};
use solana_wallet_fleet::dex::JupiterClient;
use solana_wallet_fleet::monitor::{DexScreenerClient, MonitorFeed};
use solana_wallet_fleet::orchestrator::{
    OperationKind, OperationRequest, TransactionOrchestrator,
};
use solana_wallet_fleet::reporting::format_run_report;
use solana_wallet_fleet::wallet::{codec, WalletStore};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ========================================================================
    // Step 1: Initialize tracing subscriber with EnvFilter
    // ========================================================================
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to create EnvFilter")?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .init();

    info!("🚀 Starting Solana Wallet Fleet...");

    // ========================================================================
    // Step 2: Load configuration
    // ========================================================================
    let config = Config::load().context("Failed to load configuration")?;
    info!("✅ Configuration loaded");
    info!("   RPC: {}", config.rpc.url);
    info!(
        "   Batch size: {}, inter-batch delay: {}ms",
        config.trade.batch_size, config.trade.inter_batch_delay_ms
    );

    // ========================================================================
    // Step 3: Load master wallet
    // ========================================================================
    let master = load_master_wallet(&config.wallet)?;
    match &master {
        Some(master) => info!("✅ Master wallet loaded: {}", master.pubkey()),
        None => warn!("⚠️  No master wallet configured; distribute/collect disabled"),
    }

    // ========================================================================
    // Step 4: Initialize gateways
    // ========================================================================
    let rpc_client = Arc::new(RpcClient::new(config.rpc.url.clone()));
    let ledger = Arc::new(SolanaRpc::new(
        rpc_client,
        config.rpc.confirmation_timeout_ms,
    ));
    let swap_api = Arc::new(JupiterClient::new(config.api.jupiter_url.clone()));
    info!("✅ Ledger and swap gateways initialized");

    // ========================================================================
    // Step 5: Load the wallet fleet
    // ========================================================================
    let mut store = WalletStore::new();
    match store.load_from_file(&config.wallet.fleet_path).await {
        Ok(report) => {
            info!(
                "✅ Loaded {} wallet(s) from {}",
                report.accepted,
                config.wallet.fleet_path.display()
            );
            if report.capacity_exceeded() {
                warn!("⚠️  Wallet file exceeded the cap; extra entries dropped");
            }
        }
        Err(e) => {
            warn!(
                "⚠️  Could not load {}: {} (starting with an empty fleet)",
                config.wallet.fleet_path.display(),
                e
            );
        }
    }

    // ========================================================================
    // Step 6: Balance overview
    // ========================================================================
    let oracle = BalanceOracle::new(ledger.clone());
    if let Some(master) = &master {
        match oracle.get_balance(&master.pubkey()).await {
            Ok(balance) => info!(
                "💰 Master balance: {:.4} SOL ({} lamports)",
                balance as f64 / 1e9,
                balance
            ),
            Err(e) => error!("❌ Failed to fetch master balance: {}", e),
        }
    }
    if !store.is_empty() {
        let addresses: Vec<Pubkey> = store.iter().map(|w| w.pubkey()).collect();
        let total = oracle.total_lamports(&addresses).await;
        info!(
            "💰 Fleet total: {:.4} SOL across {} wallet(s)",
            total as f64 / 1e9,
            store.count()
        );
    }

    let cancel = CancellationToken::new();

    // ========================================================================
    // Step 7: Run the configured operation, if any
    // ========================================================================
    if let Some(kind) = operation_from_env(config.trade.slippage_bps)? {
        let request = OperationRequest {
            kind,
            batch_size: config.trade.batch_size,
            inter_batch_delay: Duration::from_millis(config.trade.inter_batch_delay_ms),
        };
        let selection: Vec<usize> = (0..store.count()).collect();
        let label = std::env::var("OPERATION").unwrap_or_default();

        info!("▶️  Running '{}' across {} wallet(s)", label, selection.len());
        let orchestrator = TransactionOrchestrator::new(ledger.clone(), swap_api);

        let op_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("🛑 Stop requested; finishing the current batch...");
                op_cancel.cancel();
            }
        });

        let report = orchestrator
            .run(&store, master.as_ref(), &selection, &request, &cancel)
            .await
            .context("Operation failed pre-flight")?;

        println!("{}", format_run_report(&report, &label));
        return Ok(());
    }

    // ========================================================================
    // Step 8: Market monitor mode
    // ========================================================================
    if let Some(token_address) = &config.monitor.token_address {
        let source = Arc::new(DexScreenerClient::new(config.api.dexscreener_url.clone()));
        let feed = MonitorFeed::new(
            source,
            token_address.clone(),
            Duration::from_millis(config.monitor.poll_interval_ms),
        );
        let mut state = feed.subscribe();
        let feed_cancel = cancel.clone();
        let feed_task = tokio::spawn(async move { feed.run(feed_cancel).await });

        let log_task = tokio::spawn(async move {
            while state.changed().await.is_ok() {
                let current = state.borrow_and_update().clone();
                match (&current.snapshot, current.stale) {
                    (Some(snapshot), false) => info!(
                        "📈 {} on {}: ${} (24h {:+.2}%, liq ${:.0})",
                        snapshot.pair_address,
                        snapshot.dex_id,
                        snapshot.price_usd.unwrap_or(0.0),
                        snapshot.price_change_h24.unwrap_or(0.0),
                        snapshot.liquidity_usd.unwrap_or(0.0)
                    ),
                    (_, true) => warn!(
                        "📉 Market feed stale: {}",
                        current.last_error.as_deref().unwrap_or("unknown error")
                    ),
                    _ => {}
                }
            }
        });

        info!("🔄 Monitoring {}... Press Ctrl+C to stop", token_address);
        tokio::signal::ctrl_c().await?;
        cancel.cancel();
        feed_task.await.ok();
        log_task.abort();
        info!("👋 Shutting down...");
        return Ok(());
    }

    info!("🛑 Nothing to do: set OPERATION or MONITOR_TOKEN_ADDRESS");
    Ok(())
}

/// Load the master keypair from a file or key material in the environment.
fn load_master_wallet(wallet_config: &WalletConfig) -> Result<Option<Keypair>> {
    if let Some(path) = &wallet_config.master_keypair_path {
        info!("Loading master keypair from file: {}", path.display());
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let keypair = codec::decode_secret_key(&raw)
            .with_context(|| format!("Invalid keypair file {}", path.display()))?;
        return Ok(Some(keypair));
    }
    if let Some(key) = &wallet_config.master_private_key {
        info!("Loading master keypair from environment");
        let keypair =
            codec::decode_secret_key(key).context("Invalid MASTER_PRIVATE_KEY")?;
        return Ok(Some(keypair));
    }
    Ok(None)
}

/// Build an operation from OPERATION and its companion variables:
///   distribute          AMOUNT_LAMPORTS per wallet
///   distribute-equally  TOTAL_LAMPORTS split across the fleet
///   collect
///   swap                INPUT_MINT, OUTPUT_MINT, AMOUNT_RAW
fn operation_from_env(slippage_bps: u16) -> Result<Option<OperationKind>> {
    let Ok(operation) = std::env::var("OPERATION") else {
        return Ok(None);
    };

    let kind = match operation.as_str() {
        "distribute" => OperationKind::Distribute {
            lamports_per_wallet: required_u64("AMOUNT_LAMPORTS")?,
        },
        "distribute-equally" => OperationKind::DistributeEqually {
            total_lamports: required_u64("TOTAL_LAMPORTS")?,
        },
        "collect" => OperationKind::Collect,
        "swap" => OperationKind::Swap {
            input_mint: required_pubkey("INPUT_MINT")?,
            output_mint: required_pubkey("OUTPUT_MINT")?,
            amount_raw: required_u64("AMOUNT_RAW")?,
            slippage_bps,
        },
        other => anyhow::bail!("Unknown OPERATION '{}'", other),
    };
    Ok(Some(kind))
}

fn required_u64(key: &str) -> Result<u64> {
    std::env::var(key)
        .with_context(|| format!("{} not set", key))?
        .parse()
        .with_context(|| format!("Failed to parse {} as u64", key))
}

fn required_pubkey(key: &str) -> Result<Pubkey> {
    let raw = std::env::var(key).with_context(|| format!("{} not set", key))?;
    Pubkey::from_str(&raw).with_context(|| format!("Failed to parse {} as Pubkey", key))
}
