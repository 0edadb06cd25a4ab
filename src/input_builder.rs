//! Assembles circuit inputs from telematics readings

use tracing::debug;

use crate::encoder::{self, MAX_SAFE_INTEGER};
use crate::error::{PipelineError, Result};
use crate::types::{CircuitInput, Reading};

/// The circuit derives the data hash itself; the input slot stays zero.
const PUBLIC_DATA_HASH_PLACEHOLDER: &str = "0";

pub struct ProofInputBuilder {
    speed_limit_fixed: u64,
}

impl ProofInputBuilder {
    pub fn new(speed_limit_fixed: u64) -> Result<Self> {
        if speed_limit_fixed == 0 || speed_limit_fixed > MAX_SAFE_INTEGER {
            return Err(PipelineError::Config(format!(
                "speed limit {} is outside (0, {}]",
                speed_limit_fixed, MAX_SAFE_INTEGER
            )));
        }

        Ok(Self { speed_limit_fixed })
    }

    /// Build the prover input for one reading
    pub fn build(&self, reading: &Reading) -> Result<CircuitInput> {
        let encoded = encoder::encode_reading(reading)?;

        let input = CircuitInput {
            public_data_hash: PUBLIC_DATA_HASH_PLACEHOLDER.to_string(),
            speed: encoded.speed_fixed.to_string(),
            location: [encoded.lat_fixed.to_string(), encoded.lon_fixed.to_string()],
            timestamp: encoded.timestamp.to_string(),
            speed_limit: self.speed_limit_fixed.to_string(),
        };

        debug!(
            timestamp = reading.timestamp,
            speed = %input.speed,
            lat = %input.location[0],
            lon = %input.location[1],
            "Built circuit input"
        );

        Ok(input)
    }
}
