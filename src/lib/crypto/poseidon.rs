use alloy::primitives::B256;
use ark_bn254::Fr;
use ark_ff::{
    BigInteger,
    PrimeField,
};
use light_poseidon::{
    Poseidon,
    PoseidonError,
    PoseidonHasher,
};

/// Convert B256 to BN254 field element (big-endian, reduced mod p).
pub fn b256_to_fr(value: B256) -> Fr {
    Fr::from_be_bytes_mod_order(value.as_ref())
}

/// Convert BN254 field element to B256 (big-endian).
pub fn fr_to_b256(value: Fr) -> B256 {
    let big_int = value.into_bigint();
    let bytes = big_int.to_bytes_be();
    B256::left_padding_from(&bytes)
}

/// Poseidon hash over an arbitrary number of inputs (1..=12, circom parameters).
///
/// Used for the amount and asset hashes of a UTXO, the commitment itself and
/// the transaction hash, where the width follows a configurable arity.
pub fn poseidon_hash(inputs: &[B256]) -> Result<B256, PoseidonError> {
    let mut hasher = Poseidon::<Fr>::new_circom(inputs.len())?;
    let frs: Vec<Fr> = inputs.iter().copied().map(b256_to_fr).collect();
    let result = hasher.hash(&frs)?;
    Ok(fr_to_b256(result))
}

/// Poseidon hash over a fixed-size array of inputs.
///
/// `N` must be within 1..=12; every call site uses a compile-time width.
pub fn poseidon_array<const N: usize>(inputs: [B256; N]) -> B256 {
    let mut hasher =
        Poseidon::<Fr>::new_circom(N).expect("Failed to create Poseidon hasher");
    let frs = inputs.map(b256_to_fr);
    let result = hasher
        .hash(&frs)
        .expect("Failed to compute Poseidon hash");
    fr_to_b256(result)
}

/// Poseidon hash with 1 input (for key derivation).
/// Used for: public_key = poseidon1(private_scalar)
pub fn poseidon1(a: B256) -> B256 {
    let mut hasher =
        Poseidon::<Fr>::new_circom(1).expect("Failed to create Poseidon hasher");
    let result = hasher
        .hash(&[b256_to_fr(a)])
        .expect("Failed to compute Poseidon hash");
    fr_to_b256(result)
}

/// Poseidon hash with 2 inputs (Merkle nodes, keyed signatures).
pub fn poseidon2(a: B256, b: B256) -> B256 {
    let mut hasher =
        Poseidon::<Fr>::new_circom(2).expect("Failed to create Poseidon hasher");
    let inputs = [b256_to_fr(a), b256_to_fr(b)];
    let result = hasher
        .hash(&inputs)
        .expect("Failed to compute Poseidon hash");
    fr_to_b256(result)
}

/// Poseidon hash with 3 inputs.
/// Used for:
/// - signature = poseidon3(private_scalar, commitment, index)
/// - nullifier = poseidon3(commitment, index, signature)
pub fn poseidon3(a: B256, b: B256, c: B256) -> B256 {
    let mut hasher =
        Poseidon::<Fr>::new_circom(3).expect("Failed to create Poseidon hasher");
    let inputs = [b256_to_fr(a), b256_to_fr(b), b256_to_fr(c)];
    let result = hasher
        .hash(&inputs)
        .expect("Failed to compute Poseidon hash");
    fr_to_b256(result)
}
