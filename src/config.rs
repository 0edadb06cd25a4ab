//! Configuration management for the telematics prover

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::adapter::{PlonkLayout, VerifierLayout};
use crate::oracle::ProofSystem;
use crate::types::DEFAULT_SPEED_LIMIT_FIXED;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JSON-RPC endpoint of a node or signing proxy
    pub rpc_endpoint: String,

    /// Insurance oracle contract address
    pub contract_address: String,

    /// Account the endpoint signs transactions for
    pub signer_address: String,

    /// Compiled circuit (witness generator)
    pub circuit_wasm: PathBuf,

    /// Proving key
    pub proving_key: PathBuf,

    /// snarkjs executable
    pub snarkjs_bin: PathBuf,

    /// Proving system the circuit was set up for
    pub proof_system: ProofSystem,

    /// Built-in flat layout used for PLONK proofs when `layouts` is unset
    pub plonk_layout: PlonkLayout,

    /// Public speed threshold in hundredths of km/h
    pub speed_limit_fixed: u64,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,

    /// Upper bound on a single proof generation in seconds
    pub prove_timeout_secs: u64,

    /// Delay between receipt polls in milliseconds
    pub receipt_poll_interval_ms: u64,

    /// Receipt polls before a transaction counts as unconfirmed
    pub receipt_poll_attempts: u32,

    /// Gas limit attached to each transaction
    pub gas_limit: u64,

    /// Verifier layouts replacing the proof system's default
    pub layouts: Option<Vec<VerifierLayout>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_endpoint: "http://localhost:8545".to_string(),
            contract_address: "0x0000000000000000000000000000000000000000".to_string(),
            signer_address: "0x0000000000000000000000000000000000000000".to_string(),
            circuit_wasm: PathBuf::from("circuit_js/circuit.wasm"),
            proving_key: PathBuf::from("circuit_final.zkey"),
            snarkjs_bin: PathBuf::from("snarkjs"),
            proof_system: ProofSystem::Groth16,
            plonk_layout: PlonkLayout::default(),
            speed_limit_fixed: DEFAULT_SPEED_LIMIT_FIXED,
            request_timeout_secs: 30,
            prove_timeout_secs: 600,
            receipt_poll_interval_ms: 2_000,
            receipt_poll_attempts: 60,
            gas_limit: 500_000,
            layouts: None,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let contents = fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            Config::default()
        };

        config.apply_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(endpoint) = env::var("RPC_ENDPOINT") {
            self.rpc_endpoint = endpoint;
        }

        if let Ok(address) = env::var("CONTRACT_ADDRESS") {
            self.contract_address = address;
        }

        if let Ok(address) = env::var("SIGNER_ADDRESS") {
            self.signer_address = address;
        }

        if let Ok(path) = env::var("CIRCUIT_WASM") {
            self.circuit_wasm = PathBuf::from(path);
        }

        if let Ok(path) = env::var("PROVING_KEY") {
            self.proving_key = PathBuf::from(path);
        }

        if let Ok(path) = env::var("SNARKJS_BIN") {
            self.snarkjs_bin = PathBuf::from(path);
        }

        if let Ok(system) = env::var("PROOF_SYSTEM") {
            self.proof_system = system.parse()?;
        }

        if let Ok(layout) = env::var("PLONK_LAYOUT") {
            self.plonk_layout = layout.parse()?;
        }

        if let Ok(limit) = env::var("SPEED_LIMIT_FIXED") {
            self.speed_limit_fixed = limit
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid SPEED_LIMIT_FIXED {}: {}", limit, e))?;
        }

        if let Ok(interval) = env::var("RECEIPT_POLL_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.receipt_poll_interval_ms = ms;
            }
        }

        if let Ok(attempts) = env::var("RECEIPT_POLL_ATTEMPTS") {
            if let Ok(n) = attempts.parse() {
                self.receipt_poll_attempts = n;
            }
        }

        Ok(())
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.rpc_endpoint.is_empty() {
            return Err(anyhow::anyhow!("RPC endpoint is required"));
        }

        for (name, address) in [
            ("contract", &self.contract_address),
            ("signer", &self.signer_address),
        ] {
            let hex_part = address.strip_prefix("0x").unwrap_or(address);
            if hex_part.len() != 40 || hex::decode(hex_part).is_err() {
                return Err(anyhow::anyhow!("Invalid {} address: {}", name, address));
            }
        }

        if self.speed_limit_fixed == 0 {
            return Err(anyhow::anyhow!("Speed limit must be positive"));
        }

        if self.receipt_poll_attempts == 0 {
            return Err(anyhow::anyhow!("At least one receipt poll is required"));
        }

        Ok(())
    }
}
