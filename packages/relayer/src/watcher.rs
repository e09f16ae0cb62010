//! Burn event watcher
//!
//! Scans the source chain from the stored cursor up to the current head in
//! bounded `eth_getLogs` windows and decodes `TokensBurned` logs.
//!
//! The scan is budgeted: at most `max_requests` windows of at most
//! `max_range` blocks per invocation. When the budget runs out first, the
//! returned cursor only covers the windows actually queried.

use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use std::str::FromStr;
use tracing::{debug, info};

use crate::contracts::BridgeToken::TokensBurned;
use crate::metrics;
use crate::types::{BurnEvent, SourceChain};

/// Maximum blocks per log query, to stay inside RPC provider range limits
pub const DEFAULT_MAX_RANGE: u64 = 500;
/// Maximum log queries per invocation, to bound invocation latency
pub const DEFAULT_MAX_REQUESTS: u32 = 50;
/// Lookback used when no cursor has been stored yet
pub const DEFAULT_LAST_BLOCK_OFFSET: u64 = 2000;

/// Scan window configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    pub max_range: u64,
    pub max_requests: u32,
    pub default_offset: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_range: DEFAULT_MAX_RANGE,
            max_requests: DEFAULT_MAX_REQUESTS,
            default_offset: DEFAULT_LAST_BLOCK_OFFSET,
        }
    }
}

/// Read access to the source chain
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Current head block number
    async fn head_block(&self) -> Result<u64>;

    /// `TokensBurned` logs of the token contract in `[from_block, to_block]`
    async fn burn_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>>;
}

#[async_trait]
impl<T: LogSource + ?Sized> LogSource for &T {
    async fn head_block(&self) -> Result<u64> {
        (**self).head_block().await
    }

    async fn burn_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>> {
        (**self).burn_logs(from_block, to_block).await
    }
}

/// JSON-RPC backed log source
pub struct EvmLogSource {
    provider: RootProvider<Http<Client>>,
    token_address: Address,
}

impl EvmLogSource {
    pub fn new(rpc_url: &str, token_address: &str) -> Result<Self> {
        let url = rpc_url.parse().wrap_err("Failed to parse RPC URL")?;
        let provider = ProviderBuilder::new().on_http(url);
        let token_address =
            Address::from_str(token_address).wrap_err("Invalid token contract address")?;

        Ok(Self {
            provider,
            token_address,
        })
    }

    pub fn token_address(&self) -> Address {
        self.token_address
    }
}

#[async_trait]
impl LogSource for EvmLogSource {
    async fn head_block(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .wrap_err("Failed to get block number")
    }

    async fn burn_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .address(self.token_address)
            .event_signature(TokensBurned::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block);

        self.provider
            .get_logs(&filter)
            .await
            .wrap_err("Failed to get logs")
    }
}

/// Outcome of one scan pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Burn events in log retrieval order
    pub events: Vec<BurnEvent>,
    /// Cursor the scan started from (stored or derived)
    pub start_cursor: u64,
    /// New cursor: the last block actually scanned
    pub last_processed_block: u64,
    pub head_block: u64,
    /// Number of windowed queries issued
    pub requests: u32,
}

impl FetchResult {
    /// First block of the scanned range
    pub fn first_block(&self) -> u64 {
        self.start_cursor + 1
    }

    pub fn reached_head(&self) -> bool {
        self.last_processed_block >= self.head_block
    }
}

/// Paginated burn event scanner for one source chain
pub struct BurnWatcher<L> {
    source: L,
    scan: ScanConfig,
    chain: SourceChain,
}

impl<L: LogSource> BurnWatcher<L> {
    pub fn new(source: L, scan: ScanConfig, chain: SourceChain) -> Self {
        Self {
            source,
            scan,
            chain,
        }
    }

    pub fn chain(&self) -> SourceChain {
        self.chain
    }

    pub fn scan_config(&self) -> &ScanConfig {
        &self.scan
    }

    pub fn source(&self) -> &L {
        &self.source
    }

    /// Scan from `cursor` (exclusive) towards the head.
    ///
    /// Any RPC error aborts the whole scan; nothing found so far is returned.
    pub async fn fetch(&self, cursor: Option<u64>) -> Result<FetchResult> {
        let chain = self.chain.as_str();
        let head_block = self
            .source
            .head_block()
            .await
            .wrap_err("Failed to fetch head block")?;

        let start_cursor =
            cursor.unwrap_or_else(|| head_block.saturating_sub(self.scan.default_offset));
        let mut last_block = start_cursor;
        let mut requests = 0u32;
        let mut events = Vec::new();

        while last_block < head_block && requests < self.scan.max_requests {
            requests += 1;
            let from_block = last_block + 1;
            let to_block = from_block
                .saturating_add(self.scan.max_range - 1)
                .min(head_block);

            debug!(chain, from_block, to_block, "Fetching burn logs");

            let logs = self
                .source
                .burn_logs(from_block, to_block)
                .await
                .wrap_err_with(|| format!("Failed to fetch logs from block {}", from_block))?;
            metrics::record_window_scanned(chain, from_block, to_block);

            for log in &logs {
                match decode_burn_log(log) {
                    Some(event) => events.push(event),
                    None => debug!(
                        chain,
                        tx_hash = ?log.transaction_hash,
                        log_index = ?log.log_index,
                        "Ignoring log that is not a TokensBurned event"
                    ),
                }
            }

            last_block = to_block;
        }

        if !events.is_empty() {
            metrics::record_burns_detected(chain, events.len());
        }

        let result = FetchResult {
            events,
            start_cursor,
            last_processed_block: last_block,
            head_block,
            requests,
        };

        info!(
            chain,
            from_block = result.first_block(),
            to_block = result.last_processed_block,
            head_block,
            requests,
            burns = result.events.len(),
            reached_head = result.reached_head(),
            "Burn scan complete"
        );

        Ok(result)
    }
}

/// Decode a `TokensBurned` log; `None` for anything else or a pending log.
pub fn decode_burn_log(log: &Log) -> Option<BurnEvent> {
    let decoded = log.log_decode::<TokensBurned>().ok()?;
    let block = log.block_number?;

    Some(BurnEvent {
        account: decoded.inner.data.account,
        amount: decoded.inner.data.amount,
        block,
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
    })
}
