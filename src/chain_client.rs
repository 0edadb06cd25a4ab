//! Client for the insurance oracle contract over JSON-RPC

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::adapter::PLONK_PROOF_WORDS;
use crate::error::{PipelineError, Result};
use crate::types::{AdaptedProof, TxReceipt};

sol! {
    interface IInsuranceOracle {
        function submitData(bytes32 dataHash);
        function verifyDataProof(
            uint256[2] a,
            uint256[2][2] b,
            uint256[2] c,
            uint256[] input,
            uint256 riskScore
        );
    }
}

sol! {
    interface IPlonkInsuranceOracle {
        function verifyDataProof(uint256[24] proof, uint256[] input, uint256 riskScore);
    }
}

/// The two contract operations a submission needs
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn submit_commitment(&self, commitment: B256) -> Result<TxReceipt>;

    async fn verify_proof(&self, proof: &AdaptedProof, risk_score: u8) -> Result<TxReceipt>;
}

/// ABI calldata for `verifyDataProof` in the proof's layout
pub fn verify_calldata(proof: &AdaptedProof, risk_score: u8) -> Result<Vec<u8>> {
    let risk_score = U256::from(risk_score);

    match proof {
        AdaptedProof::Groth16 { a, b, c, input } => Ok(IInsuranceOracle::verifyDataProofCall {
            a: *a,
            b: *b,
            c: *c,
            input: input.clone(),
            riskScore: risk_score,
        }
        .abi_encode()),
        AdaptedProof::Flat { proof, input } => {
            let words: [U256; PLONK_PROOF_WORDS] = proof.as_slice().try_into().map_err(|_| {
                PipelineError::Config(format!(
                    "Flat proof has {} words, verifier takes {}",
                    proof.len(),
                    PLONK_PROOF_WORDS
                ))
            })?;
            Ok(IPlonkInsuranceOracle::verifyDataProofCall {
                proof: words,
                input: input.clone(),
                riskScore: risk_score,
            }
            .abi_encode())
        }
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    block_number: Option<String>,
    status: Option<String>,
}

/// Sends transactions with `eth_sendTransaction`; the endpoint signs for `from`.
pub struct RpcChainClient {
    endpoint: String,
    contract: Address,
    from: Address,
    gas_limit: u64,
    poll_interval: Duration,
    poll_attempts: u32,
    client: Client,
    next_id: AtomicU64,
}

impl RpcChainClient {
    pub fn new(
        endpoint: &str,
        contract: Address,
        from: Address,
        gas_limit: u64,
        request_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.to_string(),
            contract,
            from,
            gas_limit,
            poll_interval: Duration::from_secs(2),
            poll_attempts: 60,
            client: Client::builder().timeout(request_timeout).build()?,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        debug!("JSON-RPC {} -> {}", method, self.endpoint);

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::Rpc(format!(
                "{} returned HTTP {}: {}",
                method, status, error_text
            )));
        }

        let body: RpcResponse = response.json().await?;
        if let Some(err) = body.error {
            return Err(PipelineError::Rpc(format!(
                "{} failed ({}): {}",
                method, err.code, err.message
            )));
        }

        Ok(body.result.unwrap_or(Value::Null))
    }

    async fn send_transaction(&self, data: Vec<u8>) -> Result<B256> {
        let tx = json!({
            "from": format!("0x{}", hex::encode(self.from)),
            "to": format!("0x{}", hex::encode(self.contract)),
            "gas": format!("0x{:x}", self.gas_limit),
            "data": format!("0x{}", hex::encode(data)),
        });

        let result = self.call("eth_sendTransaction", json!([tx])).await?;
        let hash = result
            .as_str()
            .ok_or_else(|| PipelineError::Rpc(format!("Unexpected transaction hash: {}", result)))?;

        hash.parse::<B256>()
            .map_err(|e| PipelineError::Rpc(format!("Invalid transaction hash {}: {}", hash, e)))
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt> {
        let hash = format!("0x{}", hex::encode(tx_hash));

        for attempt in 1..=self.poll_attempts {
            let result = self.call("eth_getTransactionReceipt", json!([hash])).await?;

            if !result.is_null() {
                let raw: RawReceipt = serde_json::from_value(result)?;
                let receipt = TxReceipt {
                    tx_hash: raw.transaction_hash,
                    block_number: raw.block_number.as_deref().and_then(parse_quantity),
                    // Pre-Byzantium receipts carry no status; treat inclusion as success.
                    status: raw.status.as_deref().map_or(true, |s| parse_quantity(s) == Some(1)),
                };
                debug!("Receipt for {} after {} polls", hash, attempt);
                return Ok(receipt);
            }

            sleep(self.poll_interval).await;
        }

        Err(PipelineError::Rpc(format!(
            "Transaction {} not confirmed after {} polls",
            hash, self.poll_attempts
        )))
    }

    async fn send_and_confirm(&self, data: Vec<u8>) -> Result<TxReceipt> {
        let tx_hash = self.send_transaction(data).await?;
        info!("Transaction sent: 0x{}", hex::encode(tx_hash));
        self.wait_for_receipt(tx_hash).await
    }
}

fn parse_quantity(s: &str) -> Option<u64> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn submit_commitment(&self, commitment: B256) -> Result<TxReceipt> {
        let data = IInsuranceOracle::submitDataCall {
            dataHash: commitment,
        }
        .abi_encode();
        self.send_and_confirm(data).await
    }

    async fn verify_proof(&self, proof: &AdaptedProof, risk_score: u8) -> Result<TxReceipt> {
        let data = verify_calldata(proof, risk_score)?;
        self.send_and_confirm(data).await
    }
}
