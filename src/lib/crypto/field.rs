use alloy::primitives::{
    B256,
    U256,
    keccak256,
};

/// BN254 scalar field modulus.
/// 21888242871839275222246405745257275088548364400416034343698204186575808495617
pub const FIELD_SIZE: U256 = U256::from_limbs([
    0x43e1_f593_f000_0001,
    0x2833_e848_79b9_7091,
    0xb850_45b6_8181_585d,
    0x3064_4e72_e131_a029,
]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("not a decimal field element: {0}")]
    InvalidDecimal(String),
    #[error("value {0} is not below the field modulus")]
    NotInField(U256),
}

/// Reduce an arbitrary 256-bit value into the field.
pub fn to_field(value: U256) -> U256 {
    value % FIELD_SIZE
}

/// `(out - in + p) mod p`, the wrap-around encoding of a signed value movement.
///
/// A net inflow is a small positive value; a net outflow lands just below `p`.
pub fn wrap_sub(out: U256, input: U256) -> U256 {
    (to_field(out) + FIELD_SIZE - to_field(input)) % FIELD_SIZE
}

/// `(a + b) mod p`.
pub fn field_add(a: U256, b: U256) -> U256 {
    (to_field(a) + to_field(b)) % FIELD_SIZE
}

/// Whether a wrap-around encoded value represents an outflow.
pub fn is_outflow(value: U256) -> bool {
    value > FIELD_SIZE >> 1
}

/// Magnitude of an outflow: `p - value`. Zero maps to zero.
pub fn outflow_magnitude(value: U256) -> U256 {
    if value.is_zero() {
        U256::ZERO
    } else {
        FIELD_SIZE - to_field(value)
    }
}

/// Decode the wrap-around convention into a signed integer.
/// Returns `None` when the magnitude does not fit `i128`.
pub fn decode_signed(value: U256) -> Option<i128> {
    if is_outflow(value) {
        let magnitude: u128 = outflow_magnitude(value).try_into().ok()?;
        i128::try_from(magnitude).ok().map(|m| -m)
    } else {
        let magnitude: u128 = value.try_into().ok()?;
        i128::try_from(magnitude).ok()
    }
}

/// Field element from a u64 amount.
pub fn u64_to_b256(value: u64) -> B256 {
    B256::from(U256::from(value))
}

/// keccak256 with the most significant byte cleared so the digest fits the field.
pub fn hash_and_truncate(bytes: &[u8]) -> B256 {
    let mut digest = keccak256(bytes);
    digest.0[0] = 0;
    digest
}

/// Parse a decimal string produced by the proof generator.
pub fn parse_decimal(value: &str) -> Result<U256, FieldError> {
    let parsed = U256::from_str_radix(value.trim(), 10)
        .map_err(|_| FieldError::InvalidDecimal(value.to_string()))?;
    if parsed >= FIELD_SIZE {
        return Err(FieldError::NotInField(parsed));
    }
    Ok(parsed)
}

/// Decimal string of a big-endian field element, as the proof generator expects it.
pub fn to_decimal(value: &B256) -> String {
    U256::from_be_bytes(value.0).to_string()
}

/// Little-endian 32-byte encoding of a field element (the prover's convention).
pub fn to_le_bytes(value: U256) -> [u8; 32] {
    value.to_le_bytes::<32>()
}

/// Reverse a little-endian field element into the ledger's big-endian layout.
pub fn le_to_be(le: [u8; 32]) -> [u8; 32] {
    let mut be = le;
    be.reverse();
    be
}

/// Decimal signal from the prover to the ledger's big-endian bytes.
pub fn decimal_to_be_bytes(value: &str) -> Result<[u8; 32], FieldError> {
    Ok(le_to_be(to_le_bytes(parse_decimal(value)?)))
}
