// Market Monitor Feed
//
// Polls DexScreener (`/latest/dex/tokens/{mint}`) on a fixed interval and
// publishes the highest-liquidity pair as a `MarketSnapshot` over a watch
// channel. A failed poll keeps the previous snapshot and marks the feed
// stale; the feed never fabricates market data.

use crate::error::TradeError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_DEXSCREENER_URL: &str = "https://api.dexscreener.com";

/// One observation of a token's most liquid trading pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub pair_address: String,
    pub dex_id: String,
    pub price_usd: Option<f64>,
    pub price_change_m5: Option<f64>,
    pub price_change_h24: Option<f64>,
    pub volume_h24: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub fdv: Option<f64>,
    pub market_cap: Option<f64>,
    pub txns_m5: TxnCounts,
    pub txns_h1: TxnCounts,
    pub txns_h24: TxnCounts,
    pub fetched_at: DateTime<Utc>,
}

/// Buy/sell counts for one rolling window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TxnCounts {
    #[serde(default)]
    pub buys: u64,
    #[serde(default)]
    pub sells: u64,
}

/// Published feed state. `stale` flips when the latest poll failed; the
/// snapshot then still holds the last good observation.
#[derive(Debug, Clone, Default)]
pub struct FeedState {
    pub snapshot: Option<MarketSnapshot>,
    pub stale: bool,
    pub last_error: Option<String>,
}

/// Market data provider surface, mockable for feed tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_snapshot(&self, token_address: &str) -> Result<MarketSnapshot, TradeError>;
}

/// HTTP client for the DexScreener token-pairs endpoint.
pub struct DexScreenerClient {
    http: Client,
    base_url: String,
}

impl DexScreenerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MarketDataSource for DexScreenerClient {
    async fn fetch_snapshot(&self, token_address: &str) -> Result<MarketSnapshot, TradeError> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, token_address);
        debug!("Polling market data: {}", url);

        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| TradeError::Unavailable(format!("market data request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(TradeError::Unavailable(format!(
                "market data API returned {}",
                response.status()
            )));
        }

        let payload: TokenPairsPayload = response
            .json()
            .await
            .map_err(|e| TradeError::Unavailable(format!("malformed market data: {}", e)))?;

        best_pair(payload)
            .map(snapshot_from_pair)
            .ok_or_else(|| {
                TradeError::Unavailable(format!("no trading pairs found for {}", token_address))
            })
    }
}

/// Periodic poller. `start` spawns the loop; readers subscribe to the watch
/// channel and always see the latest state.
pub struct MonitorFeed {
    source: Arc<dyn MarketDataSource>,
    token_address: String,
    interval: Duration,
    state_tx: watch::Sender<FeedState>,
}

impl MonitorFeed {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        token_address: impl Into<String>,
        interval: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(FeedState::default());
        Self {
            source,
            token_address: token_address.into(),
            interval,
            state_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state_tx.subscribe()
    }

    /// Poll until the token is cancelled. The first poll fires immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Monitor feed started for {} every {:?}",
            self.token_address, self.interval
        );
        let mut ticker = tokio::time::interval(self.interval);
        // a poll that overruns the interval must not trigger catch-up bursts
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Monitor feed stopped for {}", self.token_address);
                    return;
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }

    async fn poll_once(&self) {
        match self.source.fetch_snapshot(&self.token_address).await {
            Ok(snapshot) => {
                self.state_tx.send_replace(FeedState {
                    snapshot: Some(snapshot),
                    stale: false,
                    last_error: None,
                });
            }
            Err(e) => {
                warn!("Market poll failed for {}: {}", self.token_address, e);
                self.state_tx.send_modify(|state| {
                    state.stale = true;
                    state.last_error = Some(e.to_string());
                });
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenPairsPayload {
    #[serde(default)]
    pairs: Option<Vec<PairPayload>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairPayload {
    pair_address: String,
    #[serde(default)]
    dex_id: String,
    #[serde(default)]
    price_usd: Option<String>,
    #[serde(default)]
    price_change: PriceChangePayload,
    #[serde(default)]
    volume: VolumePayload,
    #[serde(default)]
    liquidity: Option<LiquidityPayload>,
    #[serde(default)]
    fdv: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    txns: TxnsPayload,
}

#[derive(Debug, Default, Deserialize)]
struct PriceChangePayload {
    #[serde(default)]
    m5: Option<f64>,
    #[serde(default)]
    h24: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct VolumePayload {
    #[serde(default)]
    h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LiquidityPayload {
    #[serde(default)]
    usd: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct TxnsPayload {
    #[serde(default)]
    m5: Option<TxnCounts>,
    #[serde(default)]
    h1: Option<TxnCounts>,
    #[serde(default)]
    h24: Option<TxnCounts>,
}

/// Pick the pair with the highest USD liquidity; pairs without a liquidity
/// figure rank last.
fn best_pair(payload: TokenPairsPayload) -> Option<PairPayload> {
    payload
        .pairs?
        .into_iter()
        .max_by(|a, b| {
            pair_liquidity(a)
                .partial_cmp(&pair_liquidity(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

fn pair_liquidity(pair: &PairPayload) -> f64 {
    pair.liquidity
        .as_ref()
        .and_then(|l| l.usd)
        .unwrap_or(0.0)
}

fn snapshot_from_pair(pair: PairPayload) -> MarketSnapshot {
    MarketSnapshot {
        pair_address: pair.pair_address,
        dex_id: pair.dex_id,
        price_usd: pair.price_usd.as_deref().and_then(|p| p.parse().ok()),
        price_change_m5: pair.price_change.m5,
        price_change_h24: pair.price_change.h24,
        volume_h24: pair.volume.h24,
        liquidity_usd: pair.liquidity.as_ref().and_then(|l| l.usd),
        fdv: pair.fdv,
        market_cap: pair.market_cap,
        txns_m5: pair.txns.m5.unwrap_or_default(),
        txns_h1: pair.txns.h1.unwrap_or_default(),
        txns_h24: pair.txns.h24.unwrap_or_default(),
        fetched_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    fn pair_json(address: &str, liquidity_usd: f64, price: &str) -> serde_json::Value {
        serde_json::json!({
            "pairAddress": address,
            "dexId": "raydium",
            "priceUsd": price,
            "priceChange": {"m5": -1.2, "h24": 8.5},
            "volume": {"h24": 120000.0},
            "liquidity": {"usd": liquidity_usd},
            "fdv": 950000.0,
            "marketCap": 900000.0,
            "txns": {
                "m5": {"buys": 3, "sells": 1},
                "h1": {"buys": 40, "sells": 28},
                "h24": {"buys": 420, "sells": 310},
            },
        })
    }

    #[test]
    fn test_best_pair_by_liquidity() {
        let payload: TokenPairsPayload = serde_json::from_value(serde_json::json!({
            "pairs": [
                pair_json("shallow", 5_000.0, "0.001"),
                pair_json("deep", 250_000.0, "0.0011"),
                {"pairAddress": "no-liquidity", "dexId": "orca"},
            ]
        }))
        .unwrap();

        let pair = best_pair(payload).unwrap();
        assert_eq!(pair.pair_address, "deep");
    }

    #[test]
    fn test_no_pairs_yields_none() {
        let empty: TokenPairsPayload = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(best_pair(empty).is_none());

        let null_pairs: TokenPairsPayload =
            serde_json::from_value(serde_json::json!({"pairs": null})).unwrap();
        assert!(best_pair(null_pairs).is_none());
    }

    #[test]
    fn test_snapshot_field_mapping() {
        let pair: PairPayload =
            serde_json::from_value(pair_json("pair1", 250_000.0, "0.0011")).unwrap();
        let snapshot = snapshot_from_pair(pair);

        assert_eq!(snapshot.pair_address, "pair1");
        assert_eq!(snapshot.price_usd, Some(0.0011));
        assert_eq!(snapshot.price_change_m5, Some(-1.2));
        assert_eq!(snapshot.price_change_h24, Some(8.5));
        assert_eq!(snapshot.liquidity_usd, Some(250_000.0));
        assert_eq!(snapshot.txns_m5, TxnCounts { buys: 3, sells: 1 });
        assert_eq!(snapshot.txns_h1, TxnCounts { buys: 40, sells: 28 });
        assert_eq!(snapshot.txns_h24, TxnCounts { buys: 420, sells: 310 });
    }

    #[test]
    fn test_unparseable_price_degrades_to_none() {
        let mut value = pair_json("pair1", 1.0, "n/a");
        value["priceUsd"] = serde_json::json!("not-a-number");
        let pair: PairPayload = serde_json::from_value(value).unwrap();
        assert_eq!(snapshot_from_pair(pair).price_usd, None);
    }

    #[tokio::test]
    async fn test_failed_poll_marks_stale_and_keeps_snapshot() {
        let mut source = MockMarketDataSource::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch_snapshot()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                let pair: PairPayload =
                    serde_json::from_value(pair_json("pair1", 1_000.0, "0.5")).unwrap();
                Ok(snapshot_from_pair(pair))
            });
        source
            .expect_fetch_snapshot()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(TradeError::Unavailable("rate limited".to_string())));

        let feed = MonitorFeed::new(Arc::new(source), "mint", Duration::from_secs(30));
        let state = feed.subscribe();

        feed.poll_once().await;
        {
            let current = state.borrow();
            assert!(!current.stale);
            assert_eq!(
                current.snapshot.as_ref().map(|s| s.pair_address.as_str()),
                Some("pair1")
            );
        }

        feed.poll_once().await;
        let current = state.borrow();
        assert!(current.stale);
        // previous observation survives the failed poll
        assert_eq!(
            current.snapshot.as_ref().map(|s| s.pair_address.as_str()),
            Some("pair1")
        );
        assert!(current.last_error.as_deref().is_some_and(|e| e.contains("rate limited")));
    }

    struct OverrunningSource {
        starts: Arc<std::sync::Mutex<Vec<tokio::time::Instant>>>,
    }

    #[async_trait]
    impl MarketDataSource for OverrunningSource {
        async fn fetch_snapshot(&self, _token: &str) -> Result<MarketSnapshot, TradeError> {
            let first = {
                let mut starts = self.starts.lock().unwrap();
                starts.push(tokio::time::Instant::now());
                starts.len() == 1
            };
            if first {
                // longer than the poll interval
                tokio::time::sleep(Duration::from_millis(35)).await;
            }
            Err(TradeError::Unavailable("offline".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_poll_does_not_burst_ticks() {
        let starts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let feed = MonitorFeed::new(
            Arc::new(OverrunningSource {
                starts: starts.clone(),
            }),
            "mint",
            Duration::from_millis(10),
        );
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { feed.run(run_cancel).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        let starts = starts.lock().unwrap();
        assert!(starts.len() >= 3, "expected several polls, got {}", starts.len());
        // after the slow poll the ticker must not fire queued catch-up
        // ticks back-to-back
        for pair in starts.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(
                gap >= Duration::from_millis(10),
                "polls fired {}ms apart, under the interval",
                gap.as_millis()
            );
        }
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let mut source = MockMarketDataSource::new();
        source.expect_fetch_snapshot().returning(|_| {
            Err(TradeError::Unavailable("offline".to_string()))
        });

        let feed = MonitorFeed::new(Arc::new(source), "mint", Duration::from_millis(5));
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        let handle = tokio::spawn(async move { feed.run(cancel_clone).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
