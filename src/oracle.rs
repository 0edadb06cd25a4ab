//! Proof generation behind a narrow prove interface

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::error::{PipelineError, Result};
use crate::types::{CircuitInput, OracleOutput};

/// Proving-system family of the compiled circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofSystem {
    Groth16,
    Plonk,
}

impl fmt::Display for ProofSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProofSystem::Groth16 => write!(f, "groth16"),
            ProofSystem::Plonk => write!(f, "plonk"),
        }
    }
}

impl std::str::FromStr for ProofSystem {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groth16" => Ok(ProofSystem::Groth16),
            "plonk" => Ok(ProofSystem::Plonk),
            other => Err(PipelineError::Config(format!("Unknown proof system: {}", other))),
        }
    }
}

/// Opaque prover over a fixed circuit. Implementations do not retry.
#[async_trait]
pub trait ProofOracle: Send + Sync {
    async fn prove(&self, input: &CircuitInput) -> Result<OracleOutput>;
}

/// Reject oracle responses that cannot possibly be adapted
pub fn check_shape(output: &OracleOutput) -> Result<()> {
    match output.proof.as_object() {
        Some(fields) if !fields.is_empty() => {}
        _ => {
            return Err(PipelineError::MalformedProof(
                "proof is not a non-empty JSON object".to_string(),
            ))
        }
    }

    if let Some(bad) = output
        .public_signals
        .iter()
        .find(|s| s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(PipelineError::MalformedProof(format!(
            "public signal {:?} is not a decimal field element",
            bad
        )));
    }

    Ok(())
}

/// Runs `snarkjs <system> fullprove` against on-disk circuit artifacts
pub struct SnarkjsOracle {
    snarkjs_bin: PathBuf,
    circuit_wasm: PathBuf,
    proving_key: PathBuf,
    system: ProofSystem,
    prove_timeout: Duration,
}

impl SnarkjsOracle {
    pub fn new(
        snarkjs_bin: PathBuf,
        circuit_wasm: PathBuf,
        proving_key: PathBuf,
        system: ProofSystem,
        prove_timeout: Duration,
    ) -> Self {
        Self {
            snarkjs_bin,
            circuit_wasm,
            proving_key,
            system,
            prove_timeout,
        }
    }

    async fn run_fullprove(&self, workdir: &Path) -> Result<()> {
        let input_path = workdir.join("input.json");
        let proof_path = workdir.join("proof.json");
        let public_path = workdir.join("public.json");

        let output = match timeout(
            self.prove_timeout,
            Command::new(&self.snarkjs_bin)
                .arg(self.system.to_string())
                .arg("fullprove")
                .arg(&input_path)
                .arg(&self.circuit_wasm)
                .arg(&self.proving_key)
                .arg(&proof_path)
                .arg(&public_path)
                .kill_on_drop(true)
                .output(),
        )
        .await
        {
            Ok(Ok(o)) => o,
            Ok(Err(e)) => {
                error!("Failed to spawn {:?}: {}", self.snarkjs_bin, e);
                return Err(PipelineError::Oracle(format!("Failed to spawn prover: {}", e)));
            }
            Err(_) => {
                error!("Prover timed out after {:?}", self.prove_timeout);
                return Err(PipelineError::Oracle(format!(
                    "Prover timed out after {}s",
                    self.prove_timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Oracle(format!(
                "Prover exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ProofOracle for SnarkjsOracle {
    async fn prove(&self, input: &CircuitInput) -> Result<OracleOutput> {
        let workdir = tempfile::tempdir()?;
        tokio::fs::write(workdir.path().join("input.json"), serde_json::to_vec(input)?).await?;

        info!("Generating {} proof for timestamp {}", self.system, input.timestamp);
        self.run_fullprove(workdir.path()).await?;

        let proof_bytes = tokio::fs::read(workdir.path().join("proof.json")).await?;
        let public_bytes = tokio::fs::read(workdir.path().join("public.json")).await?;

        let proof: serde_json::Value = serde_json::from_slice(&proof_bytes)
            .map_err(|e| PipelineError::MalformedProof(format!("proof.json: {}", e)))?;
        let public_signals: Vec<String> = serde_json::from_slice(&public_bytes)
            .map_err(|e| PipelineError::MalformedProof(format!("public.json: {}", e)))?;

        debug!("Prover returned {} public signals", public_signals.len());

        Ok(OracleOutput {
            proof,
            public_signals,
        })
    }
}
