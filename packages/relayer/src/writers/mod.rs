//! Mint relay loop
//!
//! Replays decoded burns as relayed mints on the destination chain, strictly
//! in order, stopping at the first failed submission. The loop is a reducer
//! over per-event results: [`RelayOutcome`] carries the accepted submissions
//! and the first failure, so the caller can checkpoint the cursor without
//! advancing past an event whose mint did not go through.

use async_trait::async_trait;
use std::ops::ControlFlow;
use tracing::{error, info};

use crate::metrics;
use crate::types::{BurnEvent, TaskId};

pub mod gelato;

pub use gelato::{GelatoMintSubmitter, RelayClient};

/// Why a single mint submission failed
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("destination chain query failed: {0}")]
    Chain(String),

    #[error("failed to sign relay request: {0}")]
    Signing(String),

    #[error("relay request failed: {0}")]
    Network(String),

    #[error("relay rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl SubmitError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SubmitError::Chain(_) => "chain",
            SubmitError::Signing(_) => "signing",
            SubmitError::Network(_) => "network",
            SubmitError::Rejected { .. } => "rejected",
        }
    }
}

/// Submits one relayed mint for a burn
#[async_trait]
pub trait MintSubmitter: Send + Sync {
    /// Called once before the first submission of every batch
    async fn begin_batch(&self) {}

    /// Hand the mint to the relay; returns once the relay accepted it,
    /// without waiting for on-chain execution.
    async fn submit_mint(&self, event: &BurnEvent) -> Result<TaskId, SubmitError>;
}

#[async_trait]
impl<T: MintSubmitter + ?Sized> MintSubmitter for &T {
    async fn begin_batch(&self) {
        (**self).begin_batch().await
    }

    async fn submit_mint(&self, event: &BurnEvent) -> Result<TaskId, SubmitError> {
        (**self).submit_mint(event).await
    }
}

/// A mint the relay accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedMint {
    pub event: BurnEvent,
    pub task_id: TaskId,
}

/// The submission that stopped the loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFailure {
    /// Zero-based position in the batch
    pub index: usize,
    pub event: BurnEvent,
    pub kind: &'static str,
    pub error: String,
}

/// Result of one relay pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub total: usize,
    pub submitted: Vec<SubmittedMint>,
    pub failure: Option<RelayFailure>,
}

impl RelayOutcome {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            submitted: Vec::with_capacity(total),
            failure: None,
        }
    }

    pub fn success_count(&self) -> usize {
        self.submitted.len()
    }

    /// Block of the last accepted submission
    pub fn last_successful_block(&self) -> Option<u64> {
        self.submitted.last().map(|m| m.event.block)
    }

    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.submitted.len() == self.total
    }

    /// Fold one submission result into the outcome
    pub fn apply(
        &mut self,
        index: usize,
        event: &BurnEvent,
        result: Result<TaskId, SubmitError>,
    ) -> ControlFlow<()> {
        match result {
            Ok(task_id) => {
                self.submitted.push(SubmittedMint {
                    event: event.clone(),
                    task_id,
                });
                ControlFlow::Continue(())
            }
            Err(e) => {
                self.failure = Some(RelayFailure {
                    index,
                    event: event.clone(),
                    kind: e.kind(),
                    error: e.to_string(),
                });
                ControlFlow::Break(())
            }
        }
    }

    /// Cursor to persist after this pass.
    ///
    /// `scan_cursor` is the end of the scan, `start_cursor` the cursor the
    /// scan started from. On failure the cursor stays strictly below the
    /// failed event's block so it is scanned again next time.
    pub fn next_cursor(&self, scan_cursor: u64, start_cursor: u64) -> u64 {
        match self.failure {
            None => scan_cursor,
            Some(ref failure) => {
                let below_failure = failure.event.block.saturating_sub(1);
                self.last_successful_block()
                    .unwrap_or(start_cursor)
                    .min(below_failure)
                    .max(start_cursor)
            }
        }
    }
}

/// Submit one mint per event, in order, stopping at the first failure
pub async fn relay_burn_events<M: MintSubmitter + ?Sized>(
    submitter: &M,
    events: &[BurnEvent],
    chain: &str,
) -> RelayOutcome {
    let mut outcome = RelayOutcome::new(events.len());
    if events.is_empty() {
        return outcome;
    }
    submitter.begin_batch().await;

    for (index, event) in events.iter().enumerate() {
        let result = submitter.submit_mint(event).await;

        match result {
            Ok(ref task_id) => {
                metrics::record_mint_submitted(chain, true);
                info!(
                    chain,
                    sequence = index,
                    recipient = %event.account,
                    amount = %event.amount,
                    source_block = event.block,
                    task_id = %task_id,
                    status_url = %task_id.status_url(),
                    "Sent mint task"
                );
            }
            Err(ref e) => {
                metrics::record_mint_submitted(chain, false);
                metrics::record_error(chain, e.kind());
                error!(
                    chain,
                    sequence = index,
                    recipient = %event.account,
                    amount = %event.amount,
                    source_block = event.block,
                    error = %e,
                    "Failed to mint {} tokens to {}",
                    event.amount,
                    event.account
                );
            }
        }

        if outcome.apply(index, event, result).is_break() {
            break;
        }
    }

    outcome
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub fn burn(block: u64) -> BurnEvent {
        BurnEvent {
            account: Address::repeat_byte(block as u8),
            amount: U256::from(block * 10),
            block,
            tx_hash: None,
            log_index: None,
        }
    }

    /// Records submissions; fails the call with the given 1-based number
    #[derive(Default)]
    pub struct MockSubmitter {
        pub fail_on_call: Option<usize>,
        pub calls: Mutex<Vec<BurnEvent>>,
        pub batches: AtomicUsize,
    }

    impl MockSubmitter {
        pub fn failing_on(call: usize) -> Self {
            Self {
                fail_on_call: Some(call),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<BurnEvent> {
            self.calls.lock().unwrap().clone()
        }

        pub fn batches(&self) -> usize {
            self.batches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MintSubmitter for MockSubmitter {
        async fn begin_batch(&self) {
            self.batches.fetch_add(1, Ordering::SeqCst);
        }

        async fn submit_mint(&self, event: &BurnEvent) -> Result<TaskId, SubmitError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(event.clone());
            if self.fail_on_call == Some(calls.len()) {
                return Err(SubmitError::Rejected {
                    status: 429,
                    body: "rate limited".to_string(),
                });
            }
            Ok(TaskId(format!("task-{}", calls.len())))
        }
    }

    #[tokio::test]
    async fn test_all_submissions_succeed() {
        let submitter = MockSubmitter::default();
        let events = vec![burn(100), burn(200), burn(300)];

        let outcome = relay_burn_events(&submitter, &events, "optimismSepolia").await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.success_count(), 3);
        assert_eq!(outcome.last_successful_block(), Some(300));
        assert_eq!(outcome.submitted[2].task_id, TaskId("task-3".to_string()));
        // Full success checkpoints at the end of the scan, past the last event
        assert_eq!(outcome.next_cursor(1_000, 50), 1_000);
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let submitter = MockSubmitter::failing_on(2);
        let events = vec![burn(100), burn(200), burn(300)];

        let outcome = relay_burn_events(&submitter, &events, "optimismSepolia").await;

        // The third event is never attempted
        assert_eq!(submitter.calls().len(), 2);
        assert_eq!(outcome.success_count(), 1);
        assert_eq!(outcome.last_successful_block(), Some(100));
        let failure = outcome.failure.as_ref().unwrap();
        assert_eq!(failure.index, 1);
        assert_eq!(failure.event.block, 200);
        assert_eq!(failure.kind, "rejected");
        assert_eq!(outcome.next_cursor(1_000, 50), 100);
    }

    #[tokio::test]
    async fn test_first_event_failure_keeps_start_cursor() {
        let submitter = MockSubmitter::failing_on(1);
        let events = vec![burn(100), burn(200)];

        let outcome = relay_burn_events(&submitter, &events, "arbitrumSepolia").await;

        assert_eq!(outcome.success_count(), 0);
        assert_eq!(outcome.last_successful_block(), None);
        assert_eq!(outcome.next_cursor(1_000, 50), 50);
    }

    #[tokio::test]
    async fn test_failure_within_same_block_rescans_that_block() {
        let submitter = MockSubmitter::failing_on(2);
        let mut second = burn(100);
        second.log_index = Some(1);
        let events = vec![burn(100), second];

        let outcome = relay_burn_events(&submitter, &events, "arbitrumSepolia").await;

        assert_eq!(outcome.success_count(), 1);
        assert_eq!(outcome.next_cursor(1_000, 50), 99);
    }

    #[tokio::test]
    async fn test_replayed_event_is_submitted_twice() {
        let submitter = MockSubmitter::default();
        let events = vec![burn(100)];

        relay_burn_events(&submitter, &events, "arbitrumSepolia").await;
        relay_burn_events(&submitter, &events, "arbitrumSepolia").await;

        assert_eq!(submitter.calls(), vec![burn(100), burn(100)]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let submitter = MockSubmitter::default();
        let outcome = relay_burn_events(&submitter, &[], "arbitrumSepolia").await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.success_count(), 0);
        assert!(submitter.calls().is_empty());
        assert_eq!(submitter.batches(), 0);
    }

    #[tokio::test]
    async fn test_each_pass_begins_one_batch() {
        let submitter = MockSubmitter::failing_on(2);
        let events = vec![burn(100), burn(200), burn(300)];

        relay_burn_events(&submitter, &events, "arbitrumSepolia").await;
        assert_eq!(submitter.batches(), 1);

        relay_burn_events(&submitter, &events[1..], "arbitrumSepolia").await;
        assert_eq!(submitter.batches(), 2);
    }

    #[test]
    fn test_submit_error_kinds() {
        assert_eq!(SubmitError::Chain("x".into()).kind(), "chain");
        assert_eq!(SubmitError::Signing("x".into()).kind(), "signing");
        assert_eq!(SubmitError::Network("x".into()).kind(), "network");
        let rejected = SubmitError::Rejected {
            status: 400,
            body: "bad request".into(),
        };
        assert_eq!(rejected.kind(), "rejected");
        assert_eq!(rejected.to_string(), "relay rejected request (400): bad request");
    }
}
