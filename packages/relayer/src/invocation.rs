//! One relay invocation: scan, mint, persist
//!
//! A polling invocation moves through
//! `Fetching -> NoEvents | Relaying -> Done` (or `FetchFailed`), and the
//! terminal state is returned as an [`InvocationOutcome`]. The event-triggered
//! variant relays a single log and never touches the cursor.

use alloy::primitives::Address;
use alloy::rpc::types::Log;
use eyre::Result;
use tracing::{info, warn};

use crate::db::CursorStore;
use crate::metrics;
use crate::types::{BurnEvent, ExecutionResult, SourceChain};
use crate::watcher::{decode_burn_log, BurnWatcher, FetchResult, LogSource};
use crate::writers::{relay_burn_events, MintSubmitter, RelayOutcome};

/// Terminal state of an invocation
#[derive(Debug, Clone)]
pub enum InvocationOutcome {
    /// The scan found nothing; the cursor moved to the end of the scan
    NoEvents { fetch: FetchResult, cursor: u64 },
    /// Burns were found and relayed, fully or up to the first failure
    Relayed {
        fetch: FetchResult,
        relay: RelayOutcome,
        cursor: u64,
    },
    /// The scan failed; the stored cursor is untouched
    FetchFailed {
        cursor: Option<u64>,
        error: String,
    },
    /// Event-triggered log that is not a burn of the watched token
    Ignored { reason: String },
    /// Event-triggered burn relayed as a one-event batch
    EventRelayed { event: BurnEvent, relay: RelayOutcome },
}

impl InvocationOutcome {
    /// Cursor persisted by this invocation, if any
    pub fn persisted_cursor(&self) -> Option<u64> {
        match self {
            InvocationOutcome::NoEvents { cursor, .. }
            | InvocationOutcome::Relayed { cursor, .. } => Some(*cursor),
            _ => None,
        }
    }

    /// Number of mints accepted by the relay
    pub fn minted(&self) -> usize {
        match self {
            InvocationOutcome::Relayed { relay, .. }
            | InvocationOutcome::EventRelayed { relay, .. } => relay.success_count(),
            _ => 0,
        }
    }

    /// Whether the scan succeeded and every burn found was relayed
    pub fn poll_succeeded(&self) -> bool {
        match self {
            InvocationOutcome::NoEvents { .. } => true,
            InvocationOutcome::Relayed { relay, .. } => relay.is_complete(),
            _ => false,
        }
    }

    /// Report for the trigger
    pub fn result(&self) -> ExecutionResult {
        match self {
            InvocationOutcome::NoEvents { fetch, cursor } => ExecutionResult::no_action(format!(
                "No burn events found. Processed blocks from {} to {}",
                fetch.start_cursor, cursor
            )),
            InvocationOutcome::Relayed {
                fetch,
                relay,
                cursor,
            } => {
                let message = format!(
                    "Found {} burn events. Minted {} ({}/{}). Processed blocks from {} to {}",
                    relay.total,
                    relay.success_count(),
                    relay.success_count(),
                    relay.total,
                    fetch.start_cursor,
                    cursor
                );
                if relay.success_count() > 0 {
                    ExecutionResult::executed(message)
                } else {
                    ExecutionResult::no_action(message)
                }
            }
            InvocationOutcome::FetchFailed { error, .. } => {
                ExecutionResult::no_action(format!("Rpc call failed: {}", error))
            }
            InvocationOutcome::Ignored { reason } => ExecutionResult::no_action(reason.clone()),
            InvocationOutcome::EventRelayed { event, relay } => match (&relay.submitted[..], &relay.failure) {
                ([minted], _) => ExecutionResult::executed(format!(
                    "Minted {} to {}. Task {}",
                    event.amount,
                    event.account,
                    minted.task_id.status_url()
                )),
                (_, Some(failure)) => ExecutionResult::no_action(format!(
                    "Failed to mint tokens: {}",
                    failure.error
                )),
                _ => ExecutionResult::no_action("No mint submitted"),
            },
        }
    }
}

/// Run one polling invocation against `store`'s cursor for the watcher's chain.
///
/// RPC failures during the scan are reported in the outcome; cursor store
/// failures are returned as errors.
pub async fn run_poll<L, M, S>(
    watcher: &BurnWatcher<L>,
    submitter: &M,
    store: &S,
) -> Result<InvocationOutcome>
where
    L: LogSource,
    M: MintSubmitter + ?Sized,
    S: CursorStore + ?Sized,
{
    let chain = watcher.chain();
    let key = chain.storage_key();
    let stored = store.load(key).await?;

    let fetch = match watcher.fetch(stored).await {
        Ok(fetch) => fetch,
        Err(e) => {
            let error = format!("{:#}", e);
            metrics::record_error(chain.as_str(), "rpc");
            warn!(chain = %chain, cursor = ?stored, error = %error, "Burn scan failed");
            return Ok(InvocationOutcome::FetchFailed {
                cursor: stored,
                error,
            });
        }
    };

    if fetch.events.is_empty() {
        let cursor = fetch.last_processed_block;
        persist(store, chain, cursor).await?;
        metrics::record_successful_poll(chain.as_str());
        info!(
            chain = %chain,
            from_block = fetch.start_cursor,
            to_block = cursor,
            "No burn events found"
        );
        return Ok(InvocationOutcome::NoEvents { fetch, cursor });
    }

    for (i, event) in fetch.events.iter().enumerate() {
        info!(chain = %chain, sequence = i, "Burn event: {}", event);
    }

    let relay = relay_burn_events(submitter, &fetch.events, chain.as_str()).await;
    let cursor = relay.next_cursor(fetch.last_processed_block, fetch.start_cursor);
    persist(store, chain, cursor).await?;

    info!(
        chain = %chain,
        burns = relay.total,
        minted = relay.success_count(),
        from_block = fetch.start_cursor,
        to_block = cursor,
        complete = relay.is_complete(),
        "Relay invocation finished"
    );

    let outcome = InvocationOutcome::Relayed {
        fetch,
        relay,
        cursor,
    };
    if outcome.poll_succeeded() {
        metrics::record_successful_poll(chain.as_str());
    }
    Ok(outcome)
}

async fn persist<S: CursorStore + ?Sized>(store: &S, chain: SourceChain, cursor: u64) -> Result<()> {
    store.save(chain.storage_key(), cursor).await?;
    metrics::set_cursor(chain.as_str(), cursor);
    Ok(())
}

/// Relay a single log delivered by an event trigger.
///
/// Logs not emitted by `burn_contract`, or that are not `TokensBurned`, are
/// ignored.
pub async fn run_event_triggered<M>(
    log: &Log,
    burn_contract: Address,
    chain: SourceChain,
    submitter: &M,
) -> InvocationOutcome
where
    M: MintSubmitter + ?Sized,
{
    if log.address() != burn_contract {
        return InvocationOutcome::Ignored {
            reason: format!(
                "Log emitted by {} instead of burn contract {}",
                log.address(),
                burn_contract
            ),
        };
    }

    let Some(event) = decode_burn_log(log) else {
        return InvocationOutcome::Ignored {
            reason: "Log is not a mined TokensBurned event".to_string(),
        };
    };

    info!(chain = %chain, "Burn event: {}", event);
    metrics::record_burns_detected(chain.as_str(), 1);

    let relay = relay_burn_events(submitter, std::slice::from_ref(&event), chain.as_str()).await;
    InvocationOutcome::EventRelayed { event, relay }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryCursorStore;
    use crate::types::CURSOR_KEY_ARBITRUM;
    use crate::watcher::tests::{burn_log, token, MockChain};
    use crate::watcher::ScanConfig;
    use crate::writers::tests::MockSubmitter;

    fn watcher(chain: &MockChain) -> BurnWatcher<&MockChain> {
        BurnWatcher::new(chain, ScanConfig::default(), SourceChain::ArbitrumSepolia)
    }

    fn alice() -> Address {
        Address::repeat_byte(0xa1)
    }

    #[tokio::test]
    async fn test_no_events_advances_cursor_to_scan_end() {
        let chain = MockChain::new(10_000, vec![]);
        let store = MemoryCursorStore::new();
        let submitter = MockSubmitter::default();

        let outcome = run_poll(&watcher(&chain), &submitter, &store).await.unwrap();

        assert!(matches!(outcome, InvocationOutcome::NoEvents { cursor: 10_000, .. }));
        assert_eq!(store.load(CURSOR_KEY_ARBITRUM).await.unwrap(), Some(10_000));
        assert!(outcome.poll_succeeded());
        let result = outcome.result();
        assert!(!result.can_exec);
        assert_eq!(
            result.message,
            "No burn events found. Processed blocks from 8000 to 10000"
        );
        assert!(submitter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_cursor_at_last_success() {
        let chain = MockChain::new(
            1_000,
            vec![burn_log(alice(), 5, 100), burn_log(alice(), 7, 200)],
        );
        let store = MemoryCursorStore::with_cursor(CURSOR_KEY_ARBITRUM, 50);
        let submitter = MockSubmitter::failing_on(2);

        let outcome = run_poll(&watcher(&chain), &submitter, &store).await.unwrap();

        assert_eq!(outcome.persisted_cursor(), Some(100));
        assert_eq!(store.load(CURSOR_KEY_ARBITRUM).await.unwrap(), Some(100));
        assert!(!outcome.poll_succeeded());
        let result = outcome.result();
        assert!(result.can_exec);
        assert!(result.message.contains("1/2"));
        assert_eq!(
            result.message,
            "Found 2 burn events. Minted 1 (1/2). Processed blocks from 50 to 100"
        );
    }

    #[tokio::test]
    async fn test_all_succeed_persists_scan_end() {
        let chain = MockChain::new(
            1_000,
            vec![burn_log(alice(), 5, 100), burn_log(alice(), 7, 200)],
        );
        let store = MemoryCursorStore::with_cursor(CURSOR_KEY_ARBITRUM, 50);
        let submitter = MockSubmitter::default();

        let outcome = run_poll(&watcher(&chain), &submitter, &store).await.unwrap();

        assert_eq!(outcome.minted(), 2);
        assert!(outcome.poll_succeeded());
        assert_eq!(store.load(CURSOR_KEY_ARBITRUM).await.unwrap(), Some(1_000));
        assert_eq!(submitter.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_first_failure_without_stored_cursor_persists_derived_start() {
        let chain = MockChain::new(10_000, vec![burn_log(alice(), 5, 9_000)]);
        let store = MemoryCursorStore::new();
        let submitter = MockSubmitter::failing_on(1);

        let outcome = run_poll(&watcher(&chain), &submitter, &store).await.unwrap();

        assert_eq!(store.load(CURSOR_KEY_ARBITRUM).await.unwrap(), Some(8_000));
        assert!(!outcome.poll_succeeded());
        let result = outcome.result();
        assert!(!result.can_exec);
        assert!(result.message.contains("Minted 0 (0/1)"));
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_cursor_unchanged() {
        let mut chain = MockChain::new(3_000, vec![burn_log(alice(), 5, 1_200)]);
        chain.fail_on_window = Some(0);
        let store = MemoryCursorStore::with_cursor(CURSOR_KEY_ARBITRUM, 1_000);
        let submitter = MockSubmitter::default();

        let outcome = run_poll(&watcher(&chain), &submitter, &store).await.unwrap();

        assert!(matches!(outcome, InvocationOutcome::FetchFailed { cursor: Some(1_000), .. }));
        assert_eq!(store.load(CURSOR_KEY_ARBITRUM).await.unwrap(), Some(1_000));
        let result = outcome.result();
        assert!(!result.can_exec);
        assert!(result
            .message
            .starts_with("Rpc call failed: Failed to fetch logs from block 1001"));
        assert!(submitter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_head_query_failure_leaves_cursor_unchanged() {
        let mut chain = MockChain::new(3_000, vec![burn_log(alice(), 5, 1_200)]);
        chain.fail_head = true;
        let store = MemoryCursorStore::with_cursor(CURSOR_KEY_ARBITRUM, 1_000);
        let submitter = MockSubmitter::default();

        let outcome = run_poll(&watcher(&chain), &submitter, &store).await.unwrap();

        assert!(matches!(outcome, InvocationOutcome::FetchFailed { cursor: Some(1_000), .. }));
        assert!(!outcome.poll_succeeded());
        assert_eq!(store.load(CURSOR_KEY_ARBITRUM).await.unwrap(), Some(1_000));
        assert!(chain.windows().is_empty());
        assert_eq!(
            outcome.result().message,
            "Rpc call failed: Failed to fetch head block: connection refused"
        );
        assert!(submitter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_head_query_failure_without_stored_cursor() {
        let mut chain = MockChain::new(3_000, vec![]);
        chain.fail_head = true;
        let store = MemoryCursorStore::new();
        let submitter = MockSubmitter::default();

        let outcome = run_poll(&watcher(&chain), &submitter, &store).await.unwrap();

        assert!(matches!(outcome, InvocationOutcome::FetchFailed { cursor: None, .. }));
        assert_eq!(store.load(CURSOR_KEY_ARBITRUM).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_event_triggered_relays_burn() {
        let submitter = MockSubmitter::default();
        let log = burn_log(alice(), 50, 10);

        let outcome =
            run_event_triggered(&log, token(), SourceChain::OptimismSepolia, &submitter).await;

        assert_eq!(outcome.minted(), 1);
        assert_eq!(outcome.persisted_cursor(), None);
        assert!(outcome.result().can_exec);
        assert_eq!(submitter.calls()[0].account, alice());
    }

    #[tokio::test]
    async fn test_event_triggered_ignores_other_contract() {
        let submitter = MockSubmitter::default();
        let log = burn_log(alice(), 50, 10);

        let outcome = run_event_triggered(
            &log,
            Address::repeat_byte(0x99),
            SourceChain::OptimismSepolia,
            &submitter,
        )
        .await;

        assert!(matches!(outcome, InvocationOutcome::Ignored { .. }));
        assert!(!outcome.result().can_exec);
        assert!(submitter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_event_triggered_reports_failure() {
        let submitter = MockSubmitter::failing_on(1);
        let log = burn_log(alice(), 50, 10);

        let outcome =
            run_event_triggered(&log, token(), SourceChain::ArbitrumSepolia, &submitter).await;

        let result = outcome.result();
        assert!(!result.can_exec);
        assert!(result.message.starts_with("Failed to mint tokens"));
    }
}
