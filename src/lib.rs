//! Telematics-to-proof pipeline
//!
//! Encodes vehicle telematics readings as circuit field elements, proves a
//! speed-threshold statement over them, re-encodes the proof for the
//! on-chain verifier and submits commitment and proof as two dependent
//! transactions.

pub mod adapter;
pub mod chain_client;
pub mod commitment;
pub mod config;
pub mod coordinator;
pub mod encoder;
pub mod error;
pub mod ingest;
pub mod input_builder;
pub mod oracle;
pub mod risk;
pub mod types;

pub use coordinator::SubmissionCoordinator;
pub use error::{BatchError, DanglingCommitment, PipelineError, Result};
pub use types::{AdaptedProof, CircuitInput, Reading};
