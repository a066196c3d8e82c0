// Jupiter Aggregator Client
//
// Quote and swap-transaction building against the Jupiter v6 HTTP API:
//   GET  /quote?inputMint&outputMint&amount&slippageBps&swapMode=ExactIn
//   POST /swap  {quoteResponse, userPublicKey, wrapAndUnwrapSol}
//
// `NoRoute` is an expected, common outcome whenever the aggregator has no
// path between two mints; the orchestrator handles it per-wallet instead of
// aborting a batch. Upstream HTTP failures and malformed JSON map to
// `NoRoute` / `SwapBuildFailed` at the call site.

use crate::error::TradeError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde_json::{json, Value};
use solana_sdk::{
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    transaction::VersionedTransaction,
};
use tracing::{debug, warn};

pub const DEFAULT_JUPITER_URL: &str = "https://quote-api.jup.ag/v6";

/// A priced route between two mints, as returned by the aggregator.
///
/// The raw response is kept verbatim because the swap endpoint expects it
/// echoed back unchanged.
#[derive(Debug, Clone)]
pub struct Quote {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub in_amount: u64,
    pub out_amount: u64,
    pub response: Value,
}

/// Swap aggregator surface consumed by the orchestrator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SwapApi: Send + Sync {
    async fn get_quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount_raw: u64,
        slippage_bps: u16,
    ) -> Result<Quote, TradeError>;

    /// Build the unsigned swap transaction bytes for `payer`.
    async fn build_swap_transaction(
        &self,
        quote: &Quote,
        payer: &Pubkey,
    ) -> Result<Vec<u8>, TradeError>;
}

/// HTTP client for the Jupiter v6 quote/swap API.
pub struct JupiterClient {
    http: Client,
    base_url: String,
}

impl JupiterClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SwapApi for JupiterClient {
    async fn get_quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount_raw: u64,
        slippage_bps: u16,
    ) -> Result<Quote, TradeError> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}&swapMode=ExactIn",
            self.base_url, input_mint, output_mint, amount_raw, slippage_bps
        );
        debug!("Fetching quote: {} -> {} ({})", input_mint, output_mint, amount_raw);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| TradeError::NoRoute(format!("quote request failed: {}", e)))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| TradeError::NoRoute(format!("malformed quote response: {}", e)))?;

        parse_quote_response(body, input_mint, output_mint)
    }

    async fn build_swap_transaction(
        &self,
        quote: &Quote,
        payer: &Pubkey,
    ) -> Result<Vec<u8>, TradeError> {
        let url = format!("{}/swap", self.base_url);
        let payload = json!({
            "quoteResponse": quote.response,
            "userPublicKey": payer.to_string(),
            "wrapAndUnwrapSol": true,
        });

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TradeError::SwapBuildFailed(format!("swap request failed: {}", e)))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| TradeError::SwapBuildFailed(format!("malformed swap response: {}", e)))?;

        parse_swap_response(&body)
    }
}

/// Validate a raw quote response and extract the priced amounts.
pub fn parse_quote_response(
    body: Value,
    input_mint: &Pubkey,
    output_mint: &Pubkey,
) -> Result<Quote, TradeError> {
    if let Some(error) = body.get("error").and_then(Value::as_str) {
        warn!("No route {} -> {}: {}", input_mint, output_mint, error);
        return Err(TradeError::NoRoute(error.to_string()));
    }

    let in_amount = amount_field(&body, "inAmount")?;
    let out_amount = amount_field(&body, "outAmount")?;

    Ok(Quote {
        input_mint: *input_mint,
        output_mint: *output_mint,
        in_amount,
        out_amount,
        response: body,
    })
}

/// Extract and decode the base64 `swapTransaction` field.
pub fn parse_swap_response(body: &Value) -> Result<Vec<u8>, TradeError> {
    let encoded = body
        .get("swapTransaction")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            TradeError::SwapBuildFailed(
                body.get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("missing swapTransaction field")
                    .to_string(),
            )
        })?;

    BASE64
        .decode(encoded)
        .map_err(|e| TradeError::SwapBuildFailed(format!("invalid base64 payload: {}", e)))
}

fn amount_field(body: &Value, field: &str) -> Result<u64, TradeError> {
    body.get(field)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| TradeError::NoRoute(format!("quote missing {}", field)))
}

/// Deserialize unsigned swap transaction bytes and sign with the wallet's
/// own keypair. The wallet must already be a required signer of the message.
pub fn sign_swap_transaction(
    bytes: &[u8],
    signer: &Keypair,
) -> Result<VersionedTransaction, TradeError> {
    let mut transaction: VersionedTransaction = bincode::deserialize(bytes)
        .map_err(|e| TradeError::SwapBuildFailed(format!("undecodable transaction: {}", e)))?;

    let signer_index = transaction
        .message
        .static_account_keys()
        .iter()
        .position(|key| *key == signer.pubkey())
        .filter(|index| *index < transaction.signatures.len())
        .ok_or_else(|| {
            TradeError::SwapBuildFailed("wallet is not a required signer".to_string())
        })?;

    let message_bytes = transaction.message.serialize();
    transaction.signatures[signer_index] = signer.sign_message(&message_bytes);
    Ok(transaction)
}
