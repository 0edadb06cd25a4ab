//! Commitment hash binding a reading to its later proof submission

use alloy_primitives::{B256, U256};
use alloy_sol_types::SolValue;
use sha3::{Digest, Keccak256};

use crate::encoder;
use crate::error::Result;
use crate::types::Reading;

/// keccak256(abi.encode(uint256 speed, uint256[2] location, uint256 timestamp))
/// over the fixed-point values.
pub fn compute_commitment(reading: &Reading) -> Result<B256> {
    let encoded = encoder::encode_reading(reading)?;

    let words = (
        U256::from(encoded.speed_fixed),
        [U256::from(encoded.lat_fixed), U256::from(encoded.lon_fixed)],
        U256::from(encoded.timestamp),
    )
        .abi_encode_params();

    let mut hasher = Keccak256::new();
    hasher.update(&words);
    Ok(B256::from_slice(&hasher.finalize()))
}
