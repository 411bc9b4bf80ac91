pub mod params;
pub mod proof;

pub use params::{calibrate, chain_input, compute, compute_iterations, default_parameters, verify, verify_with_progress, BatchVerifier, Parameters, VerifyResult};
pub use proof::VdfProof;
