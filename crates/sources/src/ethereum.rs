//! Ethereum source: polls a registry of independent JSON-RPC providers
//! for the latest block and verifies a pulse's claimed block hash
//! against a per-provider quorum.
//!
//! Grounded on `original_source/verifier/ethereum/source.py`: each
//! enabled provider (Infura, EtherScan, Rivet) gets its own buffer —
//! buffers are never shared — and a block (or its ancestor, for the
//! `mod == 1` case) is pushed only when its number lands on
//! `block_id_module`. Verification counts how many provider buffers
//! independently confirm the beacon's claimed hash for a block number
//! and requires at least `threshold` of them to agree.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::error;

use verifier_core::{EthBlock, EthereumBuffer, Source, VerifierResult, VerifyParams};

const BUFFER_SIZE: usize = 120;
const DEFAULT_FETCH_INTERVAL_SECS: u64 = 6;

/// Errors from a single provider's JSON-RPC call.
#[derive(Debug, Error)]
pub enum EthereumClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned non-success status {0}")]
    BadStatus(reqwest::StatusCode),
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// One JSON-RPC `eth_getBlockByNumber("latest", false)` provider.
#[async_trait]
trait EthProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn get_latest_block(&self, timeout: Duration) -> Result<(EthBlock, EthBlock), EthereumClientError>;
}

#[derive(serde::Deserialize)]
struct BlockResult {
    number: String,
    hash: String,
    #[serde(rename = "parentHash")]
    parent_hash: String,
    uncles: Vec<String>,
}

#[derive(serde::Deserialize)]
struct RpcResponse {
    result: BlockResult,
}

fn strip_0x(s: &str) -> String {
    s.strip_prefix("0x").unwrap_or(s).to_string()
}

fn blocks_from_result(r: BlockResult) -> Result<(EthBlock, EthBlock), EthereumClientError> {
    let number = u64::from_str_radix(
        r.number.strip_prefix("0x").ok_or_else(|| {
            EthereumClientError::MalformedResponse(format!("block number not hex: {}", r.number))
        })?,
        16,
    )
    .map_err(|e| EthereumClientError::MalformedResponse(e.to_string()))?;
    let block = EthBlock::new(number, [strip_0x(&r.hash)]);
    let mut ancestor_hashes: Vec<String> = r.uncles.iter().map(|u| strip_0x(u)).collect();
    ancestor_hashes.push(strip_0x(&r.parent_hash));
    let ancestor = EthBlock::new(number - 1, ancestor_hashes);
    Ok((block, ancestor))
}

fn json_rpc_body() -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": "eth_getBlockByNumber",
        "params": ["latest", false],
        "id": "1",
    })
}

struct Infura {
    client: reqwest::Client,
    token: String,
}

#[async_trait]
impl EthProvider for Infura {
    fn name(&self) -> &'static str {
        "infura"
    }

    async fn get_latest_block(&self, timeout: Duration) -> Result<(EthBlock, EthBlock), EthereumClientError> {
        let url = format!("https://mainnet.infura.io/v3/{}", self.token);
        let resp = self
            .client
            .post(url)
            .json(&json_rpc_body())
            .timeout(timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(EthereumClientError::BadStatus(resp.status()));
        }
        let parsed: RpcResponse = resp.json().await?;
        blocks_from_result(parsed.result)
    }
}

struct EtherScan {
    client: reqwest::Client,
    token: String,
}

#[async_trait]
impl EthProvider for EtherScan {
    fn name(&self) -> &'static str {
        "etherscan"
    }

    async fn get_latest_block(&self, timeout: Duration) -> Result<(EthBlock, EthBlock), EthereumClientError> {
        let url = format!(
            "https://api.etherscan.io/api?module=proxy&action=eth_getBlockByNumber&tag=latest&boolean=false&apikey={}",
            self.token
        );
        let resp = self.client.get(url).timeout(timeout).send().await?;
        if !resp.status().is_success() {
            return Err(EthereumClientError::BadStatus(resp.status()));
        }
        let parsed: RpcResponse = resp.json().await?;
        blocks_from_result(parsed.result)
    }
}

struct Rivet {
    client: reqwest::Client,
    token: String,
}

#[async_trait]
impl EthProvider for Rivet {
    fn name(&self) -> &'static str {
        "rivet"
    }

    async fn get_latest_block(&self, timeout: Duration) -> Result<(EthBlock, EthBlock), EthereumClientError> {
        let url = format!("https://{}.eth.rpc.rivet.cloud/", self.token);
        let resp = self
            .client
            .post(url)
            .json(&json_rpc_body())
            .timeout(timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(EthereumClientError::BadStatus(resp.status()));
        }
        let parsed: RpcResponse = resp.json().await?;
        blocks_from_result(parsed.result)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EthereumTokens {
    pub infura: Option<String>,
    pub etherscan: Option<String>,
    pub rivet: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EthereumConfig {
    pub threshold: usize,
    pub block_id_module: u64,
    pub tokens: EthereumTokens,
}

/// Raised at construction when fewer providers are configured than
/// `threshold` requires (spec.md §4.6: "the source refuses to start").
#[derive(Debug, Error)]
#[error("only {configured} provider(s) configured, need at least {threshold}")]
pub struct NotEnoughProvidersError {
    pub configured: usize,
    pub threshold: usize,
}

pub struct EthereumSource {
    providers: Vec<Box<dyn EthProvider>>,
    buffers: HashMap<&'static str, EthereumBuffer>,
    threshold: usize,
    block_id_module: u64,
    fetch_interval: Duration,
}

impl EthereumSource {
    /// Builds the provider registry from whichever tokens are
    /// configured.
    ///
    /// # Errors
    /// Returns [`NotEnoughProvidersError`] if fewer providers are
    /// configured than `config.threshold`.
    pub fn try_new(config: EthereumConfig) -> Result<Self, NotEnoughProvidersError> {
        let client = reqwest::Client::new();
        let mut providers: Vec<Box<dyn EthProvider>> = Vec::new();
        if let Some(token) = config.tokens.infura.clone() {
            providers.push(Box::new(Infura { client: client.clone(), token }));
        }
        if let Some(token) = config.tokens.etherscan.clone() {
            providers.push(Box::new(EtherScan { client: client.clone(), token }));
        }
        if let Some(token) = config.tokens.rivet.clone() {
            providers.push(Box::new(Rivet { client: client.clone(), token }));
        }
        let threshold = config.threshold.max(1);
        if providers.len() < threshold {
            return Err(NotEnoughProvidersError {
                configured: providers.len(),
                threshold,
            });
        }
        let buffers = providers
            .iter()
            .map(|p| (p.name(), EthereumBuffer::new(BUFFER_SIZE)))
            .collect();
        Ok(Self {
            providers,
            buffers,
            threshold,
            block_id_module: config.block_id_module.max(1),
            fetch_interval: Duration::from_secs(DEFAULT_FETCH_INTERVAL_SECS),
        })
    }
}

#[async_trait]
impl Source for EthereumSource {
    fn name(&self) -> &str {
        "ethereum"
    }

    async fn init_collector(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn collect(&mut self) -> anyhow::Result<()> {
        let start = std::time::Instant::now();
        let timeout = self.fetch_interval / self.providers.len().max(1) as u32;
        for provider in &self.providers {
            match provider.get_latest_block(timeout).await {
                Ok((block, ancestor)) => {
                    let buffer = self.buffers.get_mut(provider.name()).expect("buffer exists for provider");
                    if block.number % self.block_id_module == 0 {
                        buffer.add(block);
                    } else if block.number % self.block_id_module == 1 {
                        buffer.add(ancestor);
                    }
                }
                Err(e) => error!(provider = provider.name(), error = %e, "error getting latest block"),
            }
        }
        let elapsed = start.elapsed();
        tokio::time::sleep(self.fetch_interval.saturating_sub(elapsed)).await;
        Ok(())
    }

    async fn finish_collector(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn verify(&mut self, params: &VerifyParams) -> VerifierResult {
        let mut result = VerifierResult::new(self.name(), Utc::now());
        result.possible = self.possible();
        result.ext_value_status = params.status;
        if params.status & 0b10 == 0b10 {
            result.status = verifier_core::VerifierStatus::WrongStatusCode;
            result.add_detail(format!("ExtValue is not valid, beacon_status={}", params.status));
            result.finish(Utc::now());
            return result;
        }

        let Ok(block_num) = u64::from_str_radix(params.metadata.trim_start_matches("0x"), 16) else {
            result.status = verifier_core::VerifierStatus::InvalidExtractionParameters;
            result.add_detail(format!("cannot parse block number from metadata={}", params.metadata));
            result.finish(Utc::now());
            return result;
        };
        if block_num % self.block_id_module != 0 {
            result.status = verifier_core::VerifierStatus::InvalidExtractionParameters;
            result.add_detail(format!(
                "incorrect block number module, module={}, block_id={block_num}",
                self.block_id_module
            ));
            result.finish(Utc::now());
            return result;
        }

        let marker = block_num.to_string();
        let mut correct = 0usize;
        let mut errors = Vec::new();
        for (name, buffer) in &mut self.buffers {
            if buffer.check_marker(&marker) {
                if let Some(block) = buffer.get_first() {
                    if block.hashes.contains(&params.raw) {
                        correct += 1;
                    } else {
                        errors.push(format!(
                            "block hash not found, block_number={block_num}, source_name={name}, buffer_len={}",
                            buffer.len()
                        ));
                    }
                }
            } else {
                errors.push(format!(
                    "block number not found on buffer, block_number={block_num}, source_name={name}, buffer_len={}",
                    buffer.len()
                ));
            }
        }
        if correct < self.threshold {
            result.status = verifier_core::VerifierStatus::DataNotFoundInBuffer;
            result.add_detail(format!(
                "not enough valid nodes to verify, total_nodes={}, threshold={}, correct={correct}, errors={}",
                self.buffers.len(),
                self.threshold,
                errors.join("; ")
            ));
        }
        result.finish(Utc::now());
        result
    }

    fn possible(&self) -> usize {
        let mut counts: HashMap<(u64, String), usize> = HashMap::new();
        for buffer in self.buffers.values() {
            for block in buffer.blocks() {
                for hash in &block.hashes {
                    *counts.entry((block.number, hash.clone())).or_insert(0) += 1;
                }
            }
        }
        counts.values().filter(|&&c| c >= self.threshold).count()
    }

    fn buffer_len(&self) -> usize {
        self.buffers.values().map(EthereumBuffer::len).sum()
    }
}
