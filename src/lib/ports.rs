pub mod ledger;
pub mod prover;
