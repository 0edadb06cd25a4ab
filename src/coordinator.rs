//! Sequences proof generation and the two dependent on-chain calls per reading

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use tracing::{error, info, warn};

use crate::adapter::{ProofAdapter, VerifierLayout, PLONK_PROOF_WORDS};
use crate::chain_client::{ChainClient, RpcChainClient};
use crate::commitment::compute_commitment;
use crate::config::Config;
use crate::error::{BatchError, DanglingCommitment, PipelineError, Result, SubmissionStage};
use crate::input_builder::ProofInputBuilder;
use crate::oracle::{self, ProofOracle, SnarkjsOracle};
use crate::risk;
use crate::types::{AdaptedProof, BatchReport, Reading, SubmissionOutcome};

/// Owns one signing identity. Every method that touches the chain takes
/// `&mut self`, so a coordinator never has two transactions in flight.
pub struct SubmissionCoordinator {
    chain: Arc<dyn ChainClient>,
    oracle: Arc<dyn ProofOracle>,
    builder: ProofInputBuilder,
    adapter: ProofAdapter,
}

impl SubmissionCoordinator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        oracle: Arc<dyn ProofOracle>,
        builder: ProofInputBuilder,
        adapter: ProofAdapter,
    ) -> Self {
        Self {
            chain,
            oracle,
            builder,
            adapter,
        }
    }

    /// Wire the snarkjs prover and JSON-RPC client described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let contract: Address = config.contract_address.parse().map_err(|e| {
            PipelineError::Config(format!("Invalid contract address {}: {}", config.contract_address, e))
        })?;
        let signer: Address = config.signer_address.parse().map_err(|e| {
            PipelineError::Config(format!("Invalid signer address {}: {}", config.signer_address, e))
        })?;

        let chain = RpcChainClient::new(
            &config.rpc_endpoint,
            contract,
            signer,
            config.gas_limit,
            Duration::from_secs(config.request_timeout_secs),
        )?
        .with_polling(
            Duration::from_millis(config.receipt_poll_interval_ms),
            config.receipt_poll_attempts,
        );

        let oracle = SnarkjsOracle::new(
            config.snarkjs_bin.clone(),
            config.circuit_wasm.clone(),
            config.proving_key.clone(),
            config.proof_system,
            Duration::from_secs(config.prove_timeout_secs),
        );

        let adapter = match &config.layouts {
            Some(layouts) => ProofAdapter::new(layouts.clone())?,
            None => ProofAdapter::for_system(config.proof_system, config.plonk_layout),
        };

        // Flat layouts must match the contract's fixed proof width.
        for layout in adapter.layouts() {
            if let VerifierLayout::Flat { name, length, .. } = layout {
                if *length != PLONK_PROOF_WORDS {
                    return Err(PipelineError::Config(format!(
                        "Layout {} has {} words; the verifier contract takes {}",
                        name, length, PLONK_PROOF_WORDS
                    )));
                }
            }
        }

        Ok(Self::new(
            Arc::new(chain),
            Arc::new(oracle),
            ProofInputBuilder::new(config.speed_limit_fixed)?,
            adapter,
        ))
    }

    /// Encode, prove and adapt one reading. Touches no chain state.
    pub async fn prepare(&self, reading: &Reading) -> Result<AdaptedProof> {
        let input = self.builder.build(reading)?;
        let output = self.oracle.prove(&input).await?;
        oracle::check_shape(&output)?;

        info!("Proof generated for reading at timestamp: {}", reading.timestamp);
        self.adapter.adapt(&output.proof, &output.public_signals)
    }

    /// Submit the commitment, then the proof. The proof call is only made
    /// once the commitment transaction is confirmed.
    pub async fn submit(
        &mut self,
        reading: &Reading,
        proof: &AdaptedProof,
    ) -> Result<SubmissionOutcome> {
        let commitment = compute_commitment(reading)?;
        let commitment_hex = format!("0x{}", hex::encode(commitment));

        let commit_receipt = self
            .chain
            .submit_commitment(commitment)
            .await
            .map_err(|e| PipelineError::submission(SubmissionStage::Commitment, e))?;
        if !commit_receipt.status {
            return Err(PipelineError::submission(
                SubmissionStage::Commitment,
                format!("transaction 0x{} reverted", hex::encode(commit_receipt.tx_hash)),
            ));
        }
        info!("Data submitted successfully with hash: {}", commitment_hex);

        let risk_score = risk::score(reading);

        // From here on the commitment is on-chain; failures must say so.
        let committed = DanglingCommitment {
            commitment,
            tx_hash: commit_receipt.tx_hash,
        };
        let verification = match self.chain.verify_proof(proof, risk_score).await {
            Ok(receipt) if receipt.status => receipt,
            Ok(receipt) => {
                return Err(dangling(
                    reading,
                    committed,
                    format!("transaction 0x{} reverted", hex::encode(receipt.tx_hash)),
                ))
            }
            Err(e) => return Err(dangling(reading, committed, e)),
        };
        info!("Proof verified successfully with risk score: {}", risk_score);

        Ok(SubmissionOutcome {
            timestamp: reading.timestamp,
            commitment,
            risk_score,
            commitment_tx: commit_receipt.tx_hash,
            verification_tx: verification.tx_hash,
        })
    }

    pub async fn process_reading(&mut self, reading: &Reading) -> Result<SubmissionOutcome> {
        let proof = self.prepare(reading).await?;
        self.submit(reading, &proof).await
    }

    /// Process readings strictly in order, halting on the first failure
    pub async fn process_batch(
        &mut self,
        readings: &[Reading],
    ) -> std::result::Result<BatchReport, BatchError> {
        info!("Processing {} readings...", readings.len());

        let mut report = BatchReport {
            total: readings.len(),
            outcomes: Vec::with_capacity(readings.len()),
        };

        for (index, reading) in readings.iter().enumerate() {
            match self.process_reading(reading).await {
                Ok(outcome) => {
                    info!("Data and proof submitted to blockchain ({}/{})", index + 1, readings.len());
                    report.outcomes.push(outcome);
                }
                Err(source) => {
                    warn!(
                        index,
                        timestamp = reading.timestamp,
                        completed = report.submitted(),
                        "Batch aborted: {}",
                        source
                    );
                    return Err(BatchError {
                        index,
                        timestamp: reading.timestamp,
                        report,
                        source,
                    });
                }
            }
        }

        Ok(report)
    }
}

fn dangling(
    reading: &Reading,
    committed: DanglingCommitment,
    cause: impl std::fmt::Display,
) -> PipelineError {
    error!(
        timestamp = reading.timestamp,
        commitment = %format!("0x{}", hex::encode(committed.commitment)),
        tx = %format!("0x{}", hex::encode(committed.tx_hash)),
        "Commitment accepted but proof verification failed; resubmit the proof only"
    );
    PipelineError::Submission {
        stage: SubmissionStage::ProofVerification,
        cause: cause.to_string(),
        committed: Some(committed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{PlonkLayout, SlotSource};
    use crate::oracle::ProofSystem;
    use crate::types::{CircuitInput, OracleOutput, TxReceipt, DEFAULT_SPEED_LIMIT_FIXED};
    use alloy_primitives::{B256, U256};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChain {
        fail_commitment_at: Option<usize>,
        fail_verification_at: Option<usize>,
        revert_commitment: bool,
        commitments: Mutex<Vec<B256>>,
        verifications: Mutex<Vec<(AdaptedProof, u8)>>,
    }

    impl RecordingChain {
        fn commitment_calls(&self) -> usize {
            self.commitments.lock().unwrap().len()
        }

        fn verification_calls(&self) -> usize {
            self.verifications.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChainClient for RecordingChain {
        async fn submit_commitment(&self, commitment: B256) -> Result<TxReceipt> {
            let mut calls = self.commitments.lock().unwrap();
            let call = calls.len();
            calls.push(commitment);
            if self.fail_commitment_at == Some(call) {
                return Err(PipelineError::Rpc("replacement transaction underpriced".to_string()));
            }
            Ok(TxReceipt {
                tx_hash: B256::with_last_byte(0x40 | call as u8),
                block_number: Some(call as u64),
                status: !self.revert_commitment,
            })
        }

        async fn verify_proof(&self, proof: &AdaptedProof, risk_score: u8) -> Result<TxReceipt> {
            let mut calls = self.verifications.lock().unwrap();
            let call = calls.len();
            calls.push((proof.clone(), risk_score));
            if self.fail_verification_at == Some(call) {
                return Err(PipelineError::Rpc("execution reverted".to_string()));
            }
            Ok(TxReceipt {
                tx_hash: B256::with_last_byte(0x80 | call as u8),
                block_number: Some(call as u64),
                status: true,
            })
        }
    }

    struct StaticOracle {
        proof: serde_json::Value,
        calls: AtomicUsize,
    }

    impl StaticOracle {
        fn groth16() -> Self {
            Self {
                proof: json!({
                    "pi_a": ["1", "2", "1"],
                    "pi_b": [["3", "4"], ["5", "6"], ["1", "0"]],
                    "pi_c": ["7", "8", "1"],
                    "protocol": "groth16"
                }),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProofOracle for StaticOracle {
        async fn prove(&self, input: &CircuitInput) -> Result<OracleOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(OracleOutput {
                proof: self.proof.clone(),
                public_signals: vec!["1".to_string(), input.speed.clone()],
            })
        }
    }

    fn coordinator(chain: Arc<RecordingChain>, oracle: Arc<StaticOracle>) -> SubmissionCoordinator {
        SubmissionCoordinator::new(
            chain,
            oracle,
            ProofInputBuilder::new(DEFAULT_SPEED_LIMIT_FIXED).unwrap(),
            ProofAdapter::for_system(ProofSystem::Groth16, PlonkLayout::default()),
        )
    }

    fn readings(n: usize) -> Vec<Reading> {
        (0..n)
            .map(|i| Reading::new(1_700_000_000 + i as u64, 37.7749, -122.4194, 95.0 + i as f64 * 10.0))
            .collect()
    }

    #[tokio::test]
    async fn test_submits_commitment_then_proof() {
        let chain = Arc::new(RecordingChain::default());
        let oracle = Arc::new(StaticOracle::groth16());
        let mut coordinator = coordinator(chain.clone(), oracle);

        let reading = Reading::new(1_700_000_000, 37.7749, -122.4194, 110.59);
        let outcome = coordinator.process_reading(&reading).await.unwrap();

        assert_eq!(outcome.risk_score, 90);
        assert_eq!(outcome.commitment, compute_commitment(&reading).unwrap());
        assert_eq!(chain.commitments.lock().unwrap().as_slice(), &[outcome.commitment]);

        let verifications = chain.verifications.lock().unwrap();
        let (proof, score) = &verifications[0];
        assert_eq!(*score, 90);
        assert_eq!(proof.public_inputs(), &[U256::from(1), U256::from(11059)]);
    }

    #[tokio::test]
    async fn test_commitment_failure_skips_verification() {
        let chain = Arc::new(RecordingChain {
            fail_commitment_at: Some(0),
            ..Default::default()
        });
        let mut coordinator = coordinator(chain.clone(), Arc::new(StaticOracle::groth16()));

        let err = coordinator.process_reading(&readings(1)[0]).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Submission {
                stage: SubmissionStage::Commitment,
                committed: None,
                ..
            }
        ));
        assert_eq!(chain.commitment_calls(), 1);
        assert_eq!(chain.verification_calls(), 0);
    }

    #[tokio::test]
    async fn test_reverted_commitment_skips_verification() {
        let chain = Arc::new(RecordingChain {
            revert_commitment: true,
            ..Default::default()
        });
        let mut coordinator = coordinator(chain.clone(), Arc::new(StaticOracle::groth16()));

        let err = coordinator.process_reading(&readings(1)[0]).await.unwrap_err();

        assert!(err.to_string().contains("reverted"));
        assert_eq!(chain.verification_calls(), 0);
    }

    #[tokio::test]
    async fn test_verification_failure_reports_dangling_commitment() {
        let chain = Arc::new(RecordingChain {
            fail_verification_at: Some(0),
            ..Default::default()
        });
        let mut coordinator = coordinator(chain.clone(), Arc::new(StaticOracle::groth16()));
        let reading = readings(1)[0];

        let err = coordinator.process_reading(&reading).await.unwrap_err();

        let message = err.to_string();
        match err {
            PipelineError::Submission {
                stage,
                committed: Some(committed),
                ..
            } => {
                assert_eq!(stage, SubmissionStage::ProofVerification);
                assert_eq!(committed.commitment, compute_commitment(&reading).unwrap());
                assert_eq!(committed.tx_hash, B256::with_last_byte(0x40));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(message.contains(&format!("tx 0x{}40", "00".repeat(31))));
        assert!(message.contains(&hex::encode(compute_commitment(&reading).unwrap())));
        // The commitment is never sent twice.
        assert_eq!(chain.commitment_calls(), 1);
    }

    #[tokio::test]
    async fn test_batch_aborts_at_failing_index() {
        for k in 0..4 {
            let chain = Arc::new(RecordingChain {
                fail_commitment_at: Some(k),
                ..Default::default()
            });
            let oracle = Arc::new(StaticOracle::groth16());
            let mut coordinator = coordinator(chain.clone(), oracle.clone());
            let batch = readings(5);

            let err = coordinator.process_batch(&batch).await.unwrap_err();

            assert_eq!(err.index, k);
            assert_eq!(err.report.total, 5);
            let commit_txs: Vec<B256> =
                err.report.outcomes.iter().map(|o| o.commitment_tx).collect();
            let expected: Vec<B256> =
                (0..k).map(|i| B256::with_last_byte(0x40 | i as u8)).collect();
            assert_eq!(commit_txs, expected);
            assert_eq!(err.timestamp, batch[k].timestamp);
            assert_eq!(chain.verification_calls(), k);
            assert_eq!(chain.commitment_calls(), k + 1);
            assert_eq!(oracle.calls.load(Ordering::SeqCst), k + 1);
        }
    }

    #[tokio::test]
    async fn test_batch_aborts_on_invalid_reading_before_proving() {
        let chain = Arc::new(RecordingChain::default());
        let oracle = Arc::new(StaticOracle::groth16());
        let mut coordinator = coordinator(chain.clone(), oracle.clone());

        let mut batch = readings(3);
        batch[1].speed = f64::NAN;

        let err = coordinator.process_batch(&batch).await.unwrap_err();

        assert_eq!(err.index, 1);
        assert_eq!(err.report.submitted(), 1);
        assert_eq!(err.report.outcomes[0].timestamp, batch[0].timestamp);
        assert_eq!(err.report.outcomes[0].verification_tx, B256::with_last_byte(0x80));
        assert!(matches!(err.source, PipelineError::InvalidReading(_)));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        assert_eq!(chain.commitment_calls(), 1);
    }

    #[tokio::test]
    async fn test_batch_reports_every_outcome() {
        let chain = Arc::new(RecordingChain::default());
        let mut coordinator = coordinator(chain.clone(), Arc::new(StaticOracle::groth16()));

        let report = tokio_test::assert_ok!(coordinator.process_batch(&readings(4)).await);

        assert_eq!(report.total, 4);
        assert_eq!(report.submitted(), 4);
        let scores: Vec<u8> = report.outcomes.iter().map(|o| o.risk_score).collect();
        assert_eq!(scores, vec![100, 90, 90, 80]);
    }

    #[tokio::test]
    async fn test_unsupported_proof_never_reaches_chain() {
        let chain = Arc::new(RecordingChain::default());
        let oracle = Arc::new(StaticOracle {
            proof: json!({"A": ["1", "2", "1"], "protocol": "plonk"}),
            calls: AtomicUsize::new(0),
        });
        let mut coordinator = coordinator(chain.clone(), oracle);

        let err = coordinator.process_reading(&readings(1)[0]).await.unwrap_err();

        assert!(matches!(err, PipelineError::UnsupportedProofVariant(_)));
        assert_eq!(chain.commitment_calls(), 0);
    }

    #[test]
    fn test_from_config_rejects_layout_contract_cannot_take() {
        let config = Config {
            layouts: Some(vec![VerifierLayout::Flat {
                name: "short".to_string(),
                length: 4,
                slots: vec![SlotSource::Scalar {
                    field: "eval_a".to_string(),
                }],
            }]),
            ..Config::default()
        };
        assert!(matches!(
            SubmissionCoordinator::from_config(&config),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_from_config_uses_selected_plonk_layout() {
        let config = Config {
            proof_system: ProofSystem::Plonk,
            plonk_layout: PlonkLayout::SnarkjsPlonk,
            ..Config::default()
        };
        let coordinator = SubmissionCoordinator::from_config(&config).unwrap();
        assert_eq!(coordinator.adapter.layouts(), &[VerifierLayout::snarkjs_plonk()]);
    }

    #[test]
    fn test_from_config_rejects_bad_address() {
        let config = Config {
            contract_address: "not-an-address".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            SubmissionCoordinator::from_config(&config),
            Err(PipelineError::Config(_))
        ));
    }
}
