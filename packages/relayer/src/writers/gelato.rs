//! Sponsored ERC-2771 mint submission through the Gelato relay
//!
//! Each mint is ABI-encoded against the destination token, wrapped in a
//! `SponsoredCallERC2771` request, signed with EIP-712 by the relayer key and
//! posted with the sponsor API key. The relay pays gas and answers with a
//! task ID; execution is not awaited.

use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol_types::{eip712_domain, Eip712Domain, SolCall, SolStruct};
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use super::{MintSubmitter, SubmitError};
use crate::config::{ChainEndpoint, RelayConfig};
use crate::contracts::{BridgeToken, RelayForwarder, SponsoredCallERC2771};
use crate::types::{BurnEvent, TaskId};

/// EIP-712 domain name of the sponsored-call forwarder
pub const RELAY_DOMAIN_NAME: &str = "GelatoRelay1BalanceERC2771";
/// EIP-712 domain version of the sponsored-call forwarder
pub const RELAY_DOMAIN_VERSION: &str = "1";
/// How long a signed request stays valid
pub const USER_DEADLINE_SECS: u64 = 24 * 60 * 60;

const SPONSORED_CALL_PATH: &str = "/relays/v2/sponsored-call-erc2771";
const RELAY_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Signing domain for `chain_id` and the forwarder contract
pub fn relay_domain(chain_id: u64, forwarder: Address) -> Eip712Domain {
    eip712_domain! {
        name: RELAY_DOMAIN_NAME,
        version: RELAY_DOMAIN_VERSION,
        chain_id: chain_id,
        verifying_contract: forwarder,
    }
}

/// Unsigned meta-transaction minting `event.amount` to `event.account`
pub fn build_mint_request(
    chain_id: u64,
    token: Address,
    user: Address,
    user_nonce: U256,
    user_deadline: u64,
    event: &BurnEvent,
) -> SponsoredCallERC2771 {
    let data = BridgeToken::mintCall {
        to: event.account,
        amount: event.amount,
    }
    .abi_encode();

    SponsoredCallERC2771 {
        chainId: U256::from(chain_id),
        target: token,
        data: data.into(),
        user,
        userNonce: user_nonce,
        userDeadline: U256::from(user_deadline),
    }
}

/// EIP-712 signature over `request`, as 65 `r || s || v` bytes
pub fn sign_mint_request(
    signer: &PrivateKeySigner,
    request: &SponsoredCallERC2771,
    domain: &Eip712Domain,
) -> Result<Bytes, SubmitError> {
    let hash = request.eip712_signing_hash(domain);
    let signature = signer
        .sign_hash_sync(&hash)
        .map_err(|e| SubmitError::Signing(e.to_string()))?;
    Ok(Bytes::from(signature.as_bytes().to_vec()))
}

// ============================================================================
// Relay HTTP Client
// ============================================================================

/// Body of `POST /relays/v2/sponsored-call-erc2771`.
///
/// Carries the sponsor API key, so it deliberately has no Debug impl.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsoredCallBody {
    pub chain_id: String,
    pub target: Address,
    pub data: Bytes,
    pub user: Address,
    pub user_nonce: u64,
    pub user_deadline: u64,
    pub user_signature: Bytes,
    pub sponsor_api_key: String,
}

impl SponsoredCallBody {
    pub fn new(
        request: &SponsoredCallERC2771,
        signature: Bytes,
        sponsor_api_key: &str,
    ) -> Result<Self, SubmitError> {
        let user_nonce = u64::try_from(request.userNonce)
            .map_err(|_| SubmitError::Chain(format!("user nonce {} overflows", request.userNonce)))?;
        let user_deadline = u64::try_from(request.userDeadline).map_err(|_| {
            SubmitError::Signing(format!("deadline {} overflows", request.userDeadline))
        })?;

        Ok(Self {
            chain_id: request.chainId.to_string(),
            target: request.target,
            data: request.data.clone(),
            user: request.user,
            user_nonce,
            user_deadline,
            user_signature: signature,
            sponsor_api_key: sponsor_api_key.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayResponse {
    task_id: String,
}

/// Minimal client for the relay REST API
#[derive(Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(RELAY_HTTP_TIMEOUT)
            .build()
            .wrap_err("Failed to build relay HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Submit a signed sponsored call; returns the relay task ID
    pub async fn sponsored_call_erc2771(
        &self,
        body: &SponsoredCallBody,
    ) -> Result<TaskId, SubmitError> {
        let url = format!("{}{}", self.base_url, SPONSORED_CALL_PATH);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| SubmitError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RelayResponse = response
            .json()
            .await
            .map_err(|e| SubmitError::Network(format!("invalid relay response: {}", e)))?;

        Ok(TaskId(parsed.task_id))
    }
}

// ============================================================================
// Mint Submitter
// ============================================================================

/// Relays mints to one destination token contract
pub struct GelatoMintSubmitter {
    provider: RootProvider<Http<Client>>,
    relay: RelayClient,
    signer: PrivateKeySigner,
    api_key: String,
    token_address: Address,
    forwarder_address: Address,
    chain_id: OnceCell<u64>,
    /// Next user nonce within the current batch; `None` until read from chain
    next_nonce: Mutex<Option<U256>>,
}

impl GelatoMintSubmitter {
    /// Create a submitter; no network calls are made until the first mint.
    pub fn new(destination: &ChainEndpoint, relay: &RelayConfig) -> Result<Self> {
        let url = destination
            .rpc_url
            .parse()
            .wrap_err("Failed to parse destination RPC URL")?;
        let provider = ProviderBuilder::new().on_http(url);

        let signer: PrivateKeySigner = relay
            .private_key
            .parse()
            .map_err(|e| eyre!("Invalid private key: {}", e))?;
        let token_address = Address::from_str(&destination.contract_address)
            .wrap_err("Invalid destination token address")?;
        let forwarder_address = Address::from_str(&relay.forwarder_address)
            .wrap_err("Invalid relay forwarder address")?;

        info!(
            relayer_address = %signer.address(),
            token_address = %token_address,
            forwarder_address = %forwarder_address,
            "Mint submitter initialized"
        );

        Ok(Self {
            provider,
            relay: RelayClient::new(&relay.api_url)?,
            signer,
            api_key: relay.api_key.clone(),
            token_address,
            forwarder_address,
            chain_id: OnceCell::new(),
            next_nonce: Mutex::new(None),
        })
    }

    /// Address that signs the meta-transactions
    pub fn relayer_address(&self) -> Address {
        self.signer.address()
    }

    async fn chain_id(&self) -> Result<u64, SubmitError> {
        self.chain_id
            .get_or_try_init(|| async {
                self.provider
                    .get_chain_id()
                    .await
                    .map_err(|e| SubmitError::Chain(format!("failed to get chain id: {}", e)))
            })
            .await
            .copied()
    }

    async fn fetch_user_nonce(&self) -> Result<U256, SubmitError> {
        let forwarder = RelayForwarder::new(self.forwarder_address, &self.provider);
        let nonce = forwarder
            .userNonce(self.signer.address())
            .call()
            .await
            .map_err(|e| SubmitError::Chain(format!("failed to get user nonce: {}", e)))?;
        Ok(nonce._0)
    }
}

#[async_trait]
impl MintSubmitter for GelatoMintSubmitter {
    /// Relayed tasks from earlier batches may have reverted without using
    /// their nonce, so every batch starts from the forwarder's value.
    async fn begin_batch(&self) {
        *self.next_nonce.lock().await = None;
    }

    async fn submit_mint(&self, event: &BurnEvent) -> Result<TaskId, SubmitError> {
        let chain_id = self.chain_id().await?;

        // Held for the whole submission so nonces are handed out in order
        let mut next_nonce = self.next_nonce.lock().await;
        let user_nonce = match *next_nonce {
            Some(nonce) => nonce,
            None => self.fetch_user_nonce().await?,
        };

        let deadline = chrono::Utc::now().timestamp().max(0) as u64 + USER_DEADLINE_SECS;
        let request = build_mint_request(
            chain_id,
            self.token_address,
            self.signer.address(),
            user_nonce,
            deadline,
            event,
        );
        let domain = relay_domain(chain_id, self.forwarder_address);
        let signature = sign_mint_request(&self.signer, &request, &domain)?;
        let body = SponsoredCallBody::new(&request, signature, &self.api_key)?;

        debug!(
            chain_id,
            recipient = %event.account,
            amount = %event.amount,
            user_nonce = %user_nonce,
            "Submitting sponsored mint"
        );

        match self.relay.sponsored_call_erc2771(&body).await {
            Ok(task_id) => {
                *next_nonce = Some(user_nonce + U256::from(1));
                Ok(task_id)
            }
            Err(e) => {
                // Re-read the nonce from chain on the next attempt
                *next_nonce = None;
                Err(e)
            }
        }
    }
}
