pub mod eddsa;
pub mod encryption;
pub mod field;
pub mod poseidon;
