//! Re-encodes prover output into verifier contract argument layouts

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::oracle::ProofSystem;
use crate::types::AdaptedProof;

/// Word count of the PLONK verifier's proof argument.
pub const PLONK_PROOF_WORDS: usize = 24;

const PLONK_COMMITMENTS: [&str; 9] = ["A", "B", "C", "Z", "T1", "T2", "T3", "Wxi", "Wxiw"];

const PLONK_EVALUATIONS: [&str; 6] = ["eval_a", "eval_b", "eval_c", "eval_s1", "eval_s2", "eval_zw"];

/// Commitment order of the InsuranceUnderwriting verifier. `B` is sent twice.
const UNDERWRITING_COMMITMENTS: [&str; 10] =
    ["A", "B", "B", "C", "Z", "T1", "T2", "T3", "Wxi", "Wxiw"];

/// Where one word of a flat proof array comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotSource {
    /// One affine coordinate of a curve point, e.g. `A[0]`
    Coordinate { field: String, index: usize },
    /// A scalar evaluation, e.g. `eval_a`
    Scalar { field: String },
    Zero,
}

/// Calling convention of one verifier contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum VerifierLayout {
    /// `(uint[2] a, uint[2][2] b, uint[2] c, uint[] input)`
    Groth16,
    /// Single `uint[length]` array filled from `slots`, zero-padded at the end
    Flat {
        name: String,
        length: usize,
        slots: Vec<SlotSource>,
    },
}

impl VerifierLayout {
    /// Array taken by the InsuranceUnderwriting verifier: A, B, B, C, Z, T1,
    /// T2, T3, Wxi, Wxiw coordinates, then four zero words
    pub fn insurance_underwriting() -> Self {
        VerifierLayout::Flat {
            name: "insurance-underwriting".to_string(),
            length: PLONK_PROOF_WORDS,
            slots: commitment_slots(&UNDERWRITING_COMMITMENTS),
        }
    }

    /// `uint256[24]` of a snarkjs-generated PLONK verifier: the nine
    /// commitments followed by the six evaluations
    pub fn snarkjs_plonk() -> Self {
        let mut slots = commitment_slots(&PLONK_COMMITMENTS);
        slots.extend(PLONK_EVALUATIONS.iter().map(|field| SlotSource::Scalar {
            field: field.to_string(),
        }));

        VerifierLayout::Flat {
            name: "snarkjs-plonk".to_string(),
            length: PLONK_PROOF_WORDS,
            slots,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            VerifierLayout::Groth16 => "groth16",
            VerifierLayout::Flat { name, .. } => name,
        }
    }

    /// Proof fields that must be present for this layout to apply
    pub fn required_fields(&self) -> Vec<&str> {
        match self {
            VerifierLayout::Groth16 => vec!["pi_a", "pi_b", "pi_c"],
            VerifierLayout::Flat { slots, .. } => {
                let mut fields: Vec<&str> = Vec::new();
                for slot in slots {
                    let field = match slot {
                        SlotSource::Coordinate { field, .. } | SlotSource::Scalar { field } => field,
                        SlotSource::Zero => continue,
                    };
                    if !fields.contains(&field.as_str()) {
                        fields.push(field.as_str());
                    }
                }
                fields
            }
        }
    }

    fn matches(&self, proof: &Map<String, Value>) -> bool {
        self.required_fields()
            .iter()
            .all(|field| proof.contains_key(*field))
    }
}

fn commitment_slots(fields: &[&str]) -> Vec<SlotSource> {
    fields
        .iter()
        .flat_map(|field| {
            (0..2).map(move |index| SlotSource::Coordinate {
                field: field.to_string(),
                index,
            })
        })
        .collect()
}

/// Built-in flat layouts for PLONK proofs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlonkLayout {
    #[default]
    InsuranceUnderwriting,
    SnarkjsPlonk,
}

impl PlonkLayout {
    pub fn layout(self) -> VerifierLayout {
        match self {
            PlonkLayout::InsuranceUnderwriting => VerifierLayout::insurance_underwriting(),
            PlonkLayout::SnarkjsPlonk => VerifierLayout::snarkjs_plonk(),
        }
    }
}

impl std::str::FromStr for PlonkLayout {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insurance-underwriting" => Ok(PlonkLayout::InsuranceUnderwriting),
            "snarkjs-plonk" => Ok(PlonkLayout::SnarkjsPlonk),
            other => Err(PipelineError::Config(format!("Unknown PLONK layout: {}", other))),
        }
    }
}

pub struct ProofAdapter {
    layouts: Vec<VerifierLayout>,
}

impl ProofAdapter {
    pub fn new(layouts: Vec<VerifierLayout>) -> Result<Self> {
        if layouts.is_empty() {
            return Err(PipelineError::Config(
                "At least one verifier layout is required".to_string(),
            ));
        }

        for layout in &layouts {
            if let VerifierLayout::Flat { name, length, slots } = layout {
                if *length == 0 || slots.len() > *length {
                    return Err(PipelineError::Config(format!(
                        "Layout {} maps {} slots into {} words",
                        name,
                        slots.len(),
                        length
                    )));
                }
                if slots.iter().all(|s| *s == SlotSource::Zero) {
                    return Err(PipelineError::Config(format!(
                        "Layout {} reads no proof fields",
                        name
                    )));
                }
            }
        }

        Ok(Self { layouts })
    }

    /// Built-in layout for a proving system
    pub fn for_system(system: ProofSystem, plonk: PlonkLayout) -> Self {
        let layout = match system {
            ProofSystem::Groth16 => VerifierLayout::Groth16,
            ProofSystem::Plonk => plonk.layout(),
        };
        Self {
            layouts: vec![layout],
        }
    }

    pub fn layouts(&self) -> &[VerifierLayout] {
        &self.layouts
    }

    pub fn adapt(&self, proof: &Value, public_signals: &[String]) -> Result<AdaptedProof> {
        let fields = proof.as_object().ok_or_else(|| {
            PipelineError::MalformedProof("proof is not a JSON object".to_string())
        })?;

        let layout = self
            .layouts
            .iter()
            .find(|layout| layout.matches(fields))
            .ok_or_else(|| {
                let mut keys: Vec<&str> = fields.keys().map(String::as_str).collect();
                keys.sort_unstable();
                PipelineError::UnsupportedProofVariant(format!(
                    "fields [{}] match none of [{}]",
                    keys.join(", "),
                    self.layouts
                        .iter()
                        .map(VerifierLayout::name)
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })?;

        debug!("Adapting proof with {} layout", layout.name());

        let input = public_signals
            .iter()
            .enumerate()
            .map(|(i, signal)| parse_decimal(signal, &format!("publicSignals[{}]", i)))
            .collect::<Result<Vec<_>>>()?;

        match layout {
            VerifierLayout::Groth16 => {
                let a = point(fields, "pi_a")?;
                let b_rows = rows(fields, "pi_b")?;
                let c = point(fields, "pi_c")?;

                // The pairing precompile expects each Fq2 coordinate as (imaginary, real).
                let b = [
                    [b_rows[0][1], b_rows[0][0]],
                    [b_rows[1][1], b_rows[1][0]],
                ];

                Ok(AdaptedProof::Groth16 { a, b, c, input })
            }
            VerifierLayout::Flat { length, slots, .. } => {
                let mut words = Vec::with_capacity(*length);
                for slot in slots {
                    let word = match slot {
                        SlotSource::Coordinate { field, index } => {
                            coordinate(fields, field, *index)?
                        }
                        SlotSource::Scalar { field } => parse_value(get(fields, field)?, field)?,
                        SlotSource::Zero => U256::ZERO,
                    };
                    words.push(word);
                }
                words.resize(*length, U256::ZERO);

                Ok(AdaptedProof::Flat {
                    proof: words,
                    input,
                })
            }
        }
    }
}

fn parse_decimal(s: &str, what: &str) -> Result<U256> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PipelineError::MalformedProof(format!(
            "{} is not a decimal integer: {:?}",
            what, s
        )));
    }
    U256::from_str_radix(s, 10)
        .map_err(|e| PipelineError::MalformedProof(format!("{} out of range: {}", what, e)))
}

fn parse_value(value: &Value, what: &str) -> Result<U256> {
    match value.as_str() {
        Some(s) => parse_decimal(s, what),
        None => Err(PipelineError::MalformedProof(format!(
            "{} is not a decimal string",
            what
        ))),
    }
}

fn get<'a>(fields: &'a Map<String, Value>, field: &str) -> Result<&'a Value> {
    fields
        .get(field)
        .ok_or_else(|| PipelineError::MalformedProof(format!("{} is missing", field)))
}

fn coordinate(fields: &Map<String, Value>, field: &str, index: usize) -> Result<U256> {
    let coords = get(fields, field)?.as_array().ok_or_else(|| {
        PipelineError::MalformedProof(format!("{} is not an array", field))
    })?;
    let value = coords.get(index).ok_or_else(|| {
        PipelineError::MalformedProof(format!("{} has no coordinate {}", field, index))
    })?;
    parse_value(value, &format!("{}[{}]", field, index))
}

/// First two (affine) coordinates of a G1 point; the projective z is ignored
fn point(fields: &Map<String, Value>, field: &str) -> Result<[U256; 2]> {
    Ok([coordinate(fields, field, 0)?, coordinate(fields, field, 1)?])
}

/// First two rows of a G2 point, in prover order
fn rows(fields: &Map<String, Value>, field: &str) -> Result<[[U256; 2]; 2]> {
    let rows = get(fields, field)?.as_array().ok_or_else(|| {
        PipelineError::MalformedProof(format!("{} is not an array", field))
    })?;
    if rows.len() < 2 {
        return Err(PipelineError::MalformedProof(format!(
            "{} has {} rows, expected at least 2",
            field,
            rows.len()
        )));
    }

    let mut out = [[U256::ZERO; 2]; 2];
    for (r, row) in rows.iter().take(2).enumerate() {
        let row = row.as_array().filter(|row| row.len() >= 2).ok_or_else(|| {
            PipelineError::MalformedProof(format!("{}[{}] is not a coordinate pair", field, r))
        })?;
        for (i, value) in row.iter().take(2).enumerate() {
            out[r][i] = parse_value(value, &format!("{}[{}][{}]", field, r, i))?;
        }
    }
    Ok(out)
}
