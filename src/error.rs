//! Error types for the telematics proof pipeline

use std::fmt;

use alloy_primitives::B256;
use thiserror::Error;

use crate::types::BatchReport;

/// The on-chain call a submission failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    Commitment,
    ProofVerification,
}

impl fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStage::Commitment => write!(f, "commitment"),
            SubmissionStage::ProofVerification => write!(f, "proof-verification"),
        }
    }
}

/// A commitment accepted on-chain whose proof was not verified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DanglingCommitment {
    pub commitment: B256,
    pub tx_hash: B256,
}

impl fmt::Display for DanglingCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "commitment 0x{} is on-chain in tx 0x{}",
            hex::encode(self.commitment),
            hex::encode(self.tx_hash)
        )
    }
}

fn dangling_suffix(committed: &Option<DanglingCommitment>) -> String {
    match committed {
        Some(dangling) => format!(" ({}; resubmit the proof only)", dangling),
        None => String::new(),
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Precision overflow encoding {name}: |{value}| x {scale} exceeds the exact integer range")]
    PrecisionOverflow { name: String, value: f64, scale: u64 },

    #[error("Invalid reading: {0}")]
    InvalidReading(String),

    #[error("Malformed proof: {0}")]
    MalformedProof(String),

    #[error("Unsupported proof variant: {0}")]
    UnsupportedProofVariant(String),

    #[error("Submission failed at {stage} stage: {cause}{}", dangling_suffix(.committed))]
    Submission {
        stage: SubmissionStage,
        cause: String,
        /// Set only for proof-verification failures.
        committed: Option<DanglingCommitment>,
    },

    #[error("Proof oracle error: {0}")]
    Oracle(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingestion error: {0}")]
    Ingest(String),

    #[error("JSON-RPC error: {0}")]
    Rpc(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn submission(stage: SubmissionStage, cause: impl fmt::Display) -> Self {
        PipelineError::Submission {
            stage,
            cause: cause.to_string(),
            committed: None,
        }
    }
}

/// A batch run halted on its first unrecoverable error.
#[derive(Error, Debug)]
#[error(
    "Batch aborted at reading {index} (timestamp {timestamp}) after {} fully submitted: {source}",
    .report.submitted()
)]
pub struct BatchError {
    pub index: usize,
    pub timestamp: u64,
    /// Outcomes of the readings submitted before the failure
    pub report: BatchReport,
    #[source]
    pub source: PipelineError,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
