//! Speed-based risk scoring

use crate::types::Reading;

const BASELINE: i32 = 100;
const SEVERE_SPEED_KMH: f64 = 120.0;
const ELEVATED_SPEED_KMH: f64 = 100.0;
const SEVERE_PENALTY: i32 = 20;
const ELEVATED_PENALTY: i32 = 10;

/// Step function of speed, clamped to [0, 100]
pub fn score(reading: &Reading) -> u8 {
    let mut risk_score = BASELINE;

    if reading.speed > SEVERE_SPEED_KMH {
        risk_score -= SEVERE_PENALTY;
    } else if reading.speed > ELEVATED_SPEED_KMH {
        risk_score -= ELEVATED_PENALTY;
    }

    risk_score.clamp(0, 100) as u8
}
