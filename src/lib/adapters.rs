pub mod mock_ledger;
pub mod mock_prover;
pub mod snarkjs_prover;
