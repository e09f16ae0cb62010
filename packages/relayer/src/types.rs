//! Common types for the burn/mint relay
//!
//! Chain pairing, decoded burn events and the result contract reported by
//! every invocation.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

/// Cursor storage key for Arbitrum Sepolia burns
pub const CURSOR_KEY_ARBITRUM: &str = "lastProcessedBlockArbitrum";
/// Cursor storage key for Optimism Sepolia burns
pub const CURSOR_KEY_OPTIMISM: &str = "lastProcessedBlockOptimism";

// ============================================================================
// Chain Pairing
// ============================================================================

/// One side of the fixed Arbitrum Sepolia / Optimism Sepolia pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceChain {
    ArbitrumSepolia,
    OptimismSepolia,
}

impl SourceChain {
    /// Name as used in `CHAIN_LISTENED`
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceChain::ArbitrumSepolia => "arbitrumSepolia",
            SourceChain::OptimismSepolia => "optimismSepolia",
        }
    }

    /// Native EVM chain ID
    pub fn chain_id(&self) -> u64 {
        match self {
            SourceChain::ArbitrumSepolia => 421_614,
            SourceChain::OptimismSepolia => 11_155_420,
        }
    }

    /// Cursor store key holding the last processed block of this chain
    pub fn storage_key(&self) -> &'static str {
        match self {
            SourceChain::ArbitrumSepolia => CURSOR_KEY_ARBITRUM,
            SourceChain::OptimismSepolia => CURSOR_KEY_OPTIMISM,
        }
    }

    /// The chain that mints when this one burns
    pub fn counterpart(&self) -> SourceChain {
        match self {
            SourceChain::ArbitrumSepolia => SourceChain::OptimismSepolia,
            SourceChain::OptimismSepolia => SourceChain::ArbitrumSepolia,
        }
    }
}

impl fmt::Display for SourceChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceChain {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "arbitrumSepolia" => Ok(SourceChain::ArbitrumSepolia),
            "optimismSepolia" => Ok(SourceChain::OptimismSepolia),
            other => Err(ConfigError::InvalidChain(other.to_string())),
        }
    }
}

// ============================================================================
// Burn Events
// ============================================================================

/// A decoded `TokensBurned` log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnEvent {
    /// Account that burned, and the recipient of the mint
    pub account: Address,
    /// Amount burned in token base units
    pub amount: U256,
    /// Source block number
    pub block: u64,
    pub tx_hash: Option<B256>,
    pub log_index: Option<u64>,
}

impl fmt::Display for BurnEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} burned {} at block {}",
            self.account, self.amount, self.block
        )
    }
}

/// Identifier returned by the relay service for an accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Public status page for the task
    pub fn status_url(&self) -> String {
        format!("https://relay.gelato.digital/tasks/status/{}", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Result Contract
// ============================================================================

/// What an invocation reports back to its trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Whether on-chain follow-up happened or is needed
    pub can_exec: bool,
    pub message: String,
    /// Always empty: mints go through the relay, not through the trigger
    #[serde(default)]
    pub call_data: Vec<String>,
}

impl ExecutionResult {
    pub fn no_action(message: impl Into<String>) -> Self {
        Self {
            can_exec: false,
            message: message.into(),
            call_data: Vec::new(),
        }
    }

    pub fn executed(message: impl Into<String>) -> Self {
        Self {
            can_exec: true,
            message: message.into(),
            call_data: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_chain_from_str() {
        assert_eq!(
            "arbitrumSepolia".parse::<SourceChain>().unwrap(),
            SourceChain::ArbitrumSepolia
        );
        assert_eq!(
            "optimismSepolia".parse::<SourceChain>().unwrap(),
            SourceChain::OptimismSepolia
        );
        assert!("ethereum".parse::<SourceChain>().is_err());
    }

    #[test]
    fn test_source_chain_pairing() {
        assert_eq!(
            SourceChain::ArbitrumSepolia.counterpart(),
            SourceChain::OptimismSepolia
        );
        assert_eq!(
            SourceChain::OptimismSepolia.counterpart(),
            SourceChain::ArbitrumSepolia
        );
    }

    #[test]
    fn test_storage_keys() {
        assert_eq!(
            SourceChain::ArbitrumSepolia.storage_key(),
            "lastProcessedBlockArbitrum"
        );
        assert_eq!(
            SourceChain::OptimismSepolia.storage_key(),
            "lastProcessedBlockOptimism"
        );
    }

    #[test]
    fn test_task_status_url() {
        let task = TaskId("0xabc".to_string());
        assert_eq!(
            task.status_url(),
            "https://relay.gelato.digital/tasks/status/0xabc"
        );
    }

    #[test]
    fn test_execution_result_json_shape() {
        let result = ExecutionResult::no_action("No burn events found");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["canExec"], false);
        assert_eq!(json["message"], "No burn events found");
        assert_eq!(json["callData"], serde_json::json!([]));
    }
}
