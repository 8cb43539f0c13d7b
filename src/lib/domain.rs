pub mod account;
pub mod action;
pub mod commitment;
pub mod merkle;
pub mod nullifier;
pub mod proof;
pub mod selector;
pub mod transaction_params;
pub mod utxo;
pub mod verifier;
