//! Type definitions for the telematics proof pipeline

use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};

/// Speed threshold handed to the circuit: 120 km/h in hundredths.
pub const DEFAULT_SPEED_LIMIT_FIXED: u64 = 12_000;

/// Normalized telematics sample produced by ingestion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Unix timestamp in seconds
    pub timestamp: u64,

    /// (latitude, longitude) in signed decimal degrees
    pub location: [f64; 2],

    /// Speed in km/h
    pub speed: f64,
}

impl Reading {
    pub fn new(timestamp: u64, latitude: f64, longitude: f64, speed: f64) -> Self {
        Self {
            timestamp,
            location: [latitude, longitude],
            speed,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.location[0]
    }

    pub fn longitude(&self) -> f64 {
        self.location[1]
    }
}

/// Fixed-point integers matching the circuit's encoding.
///
/// Coordinates carry no sign: a reading in the southern or western
/// hemisphere encodes identically to its mirror image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedReading {
    pub speed_fixed: u64,
    pub lat_fixed: u64,
    pub lon_fixed: u64,
    pub timestamp: u64,
}

/// Circuit input in the prover's wire format (decimal-string field elements)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitInput {
    pub public_data_hash: String,
    pub speed: String,
    pub location: [String; 2],
    pub timestamp: String,
    pub speed_limit: String,
}

/// Raw result of a prove call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleOutput {
    /// Proof object exactly as the prover emitted it
    pub proof: serde_json::Value,

    #[serde(rename = "publicSignals")]
    pub public_signals: Vec<String>,
}

/// Proof re-encoded into the verifier contract's argument layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdaptedProof {
    /// Groth16 verifier: `b` already carries the per-row coordinate swap
    Groth16 {
        a: [U256; 2],
        b: [[U256; 2]; 2],
        c: [U256; 2],
        input: Vec<U256>,
    },

    /// Verifiers taking one fixed-length word array (PLONK)
    Flat { proof: Vec<U256>, input: Vec<U256> },
}

impl AdaptedProof {
    pub fn public_inputs(&self) -> &[U256] {
        match self {
            AdaptedProof::Groth16 { input, .. } => input,
            AdaptedProof::Flat { input, .. } => input,
        }
    }
}

/// Outcome of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub status: bool,
}

/// Record of one reading that went through both on-chain calls
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub timestamp: u64,
    pub commitment: B256,
    pub risk_score: u8,
    pub commitment_tx: B256,
    pub verification_tx: B256,
}

/// Outcomes of a batch run, in reading order
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub outcomes: Vec<SubmissionOutcome>,
}

impl BatchReport {
    pub fn submitted(&self) -> usize {
        self.outcomes.len()
    }
}
