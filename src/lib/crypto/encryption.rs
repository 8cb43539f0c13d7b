use alloy::primitives::B256;
use blake2::{
    Blake2b,
    Digest,
    digest::consts::U32,
};
use chacha20poly1305::{
    ChaCha20Poly1305,
    Nonce,
    aead::{
        Aead,
        KeyInit,
    },
};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{
    PublicKey,
    StaticSecret,
};

/// Domain separator for HKDF key derivation.
const HKDF_INFO: &[u8] = b"shielded-tx-engine-utxo-encryption-v1";

/// Seed of the protocol-wide sender key. Recipients know its public half,
/// so ciphertexts carry no ephemeral key and fit a fixed-size slot.
const SENDER_KEY_SEED: &[u8] = b"shielded-tx-engine-sender-key";

/// BLAKE2b with a 32-byte digest.
pub type Blake2b256 = Blake2b<U32>;

/// Hash the concatenation of `parts` with BLAKE2b-256.
pub fn blake2b256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn sender_secret() -> StaticSecret {
    StaticSecret::from(blake2b256(&[SENDER_KEY_SEED]))
}

/// Public half of the protocol sender key.
pub fn sender_public_key() -> PublicKey {
    PublicKey::from(&sender_secret())
}

/// Nonce bound to the UTXO commitment; commitments never repeat for a live UTXO.
fn commitment_nonce(commitment: &B256) -> Nonce {
    *Nonce::from_slice(&commitment[..12])
}

fn derive_box_key(shared_secret: &[u8; 32]) -> Result<[u8; 32], EncryptionError> {
    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
    let mut key = [0u8; 32];
    hkdf.expand(HKDF_INFO, &mut key)
        .map_err(|_| EncryptionError::KeyDerivationFailed)?;
    Ok(key)
}

/// Encrypt `plaintext` to a recipient's x25519 public key.
///
/// Scheme:
/// 1. ECDH: shared = sender_secret * recipient_pubkey
/// 2. HKDF-SHA256: symmetric key from shared
/// 3. ChaCha20-Poly1305 with nonce = commitment[0..12]
pub fn encrypt_to_recipient(
    plaintext: &[u8],
    recipient: &PublicKey,
    commitment: &B256,
) -> Result<Vec<u8>, EncryptionError> {
    let shared = sender_secret().diffie_hellman(recipient);
    let key = derive_box_key(shared.as_bytes())?;
    seal(&key, plaintext, commitment)
}

/// Decrypt a payload produced by [`encrypt_to_recipient`].
pub fn decrypt_as_recipient(
    ciphertext: &[u8],
    recipient_secret: &StaticSecret,
    commitment: &B256,
) -> Result<Vec<u8>, DecryptionError> {
    let shared = recipient_secret.diffie_hellman(&sender_public_key());
    let key = derive_box_key(shared.as_bytes())
        .map_err(|_| DecryptionError::KeyDerivationFailed)?;
    open(&key, ciphertext, commitment)
}

/// Symmetric key for UTXOs an account encrypts to itself.
/// key = blake2b256(viewing_secret || tree_id || commitment)
pub fn derive_symmetric_key(
    viewing_secret: &[u8; 32],
    tree_id: &B256,
    commitment: &B256,
) -> [u8; 32] {
    blake2b256(&[
        viewing_secret.as_slice(),
        tree_id.as_slice(),
        commitment.as_slice(),
    ])
}

/// Encrypt with a symmetric key (self-addressed UTXOs).
pub fn encrypt_symmetric(
    key: &[u8; 32],
    plaintext: &[u8],
    commitment: &B256,
) -> Result<Vec<u8>, EncryptionError> {
    seal(key, plaintext, commitment)
}

/// Decrypt a payload produced by [`encrypt_symmetric`].
pub fn decrypt_symmetric(
    key: &[u8; 32],
    ciphertext: &[u8],
    commitment: &B256,
) -> Result<Vec<u8>, DecryptionError> {
    open(key, ciphertext, commitment)
}

fn seal(key: &[u8; 32], plaintext: &[u8], commitment: &B256) -> Result<Vec<u8>, EncryptionError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| EncryptionError::CipherInitFailed)?;
    cipher
        .encrypt(&commitment_nonce(commitment), plaintext)
        .map_err(|_| EncryptionError::EncryptionFailed)
}

fn open(key: &[u8; 32], ciphertext: &[u8], commitment: &B256) -> Result<Vec<u8>, DecryptionError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| DecryptionError::CipherInitFailed)?;
    cipher
        .decrypt(&commitment_nonce(commitment), ciphertext)
        .map_err(|_| DecryptionError::DecryptionFailed)
}

/// Errors that can occur during encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EncryptionError {
    #[error("Key derivation failed")]
    KeyDerivationFailed,
    #[error("Cipher initialization failed")]
    CipherInitFailed,
    #[error("Encryption failed")]
    EncryptionFailed,
}

/// Errors that can occur during decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecryptionError {
    #[error("Key derivation failed")]
    KeyDerivationFailed,
    #[error("Cipher initialization failed")]
    CipherInitFailed,
    #[error("Decryption failed (wrong key or corrupted data)")]
    DecryptionFailed,
    #[error("Decrypted payload is malformed")]
    MalformedPayload,
    #[error("Decrypted UTXO does not match the expected commitment")]
    CommitmentMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(byte: u8) -> StaticSecret {
        StaticSecret::from([byte; 32])
    }

    #[test]
    fn test_recipient_roundtrip() {
        let recipient = secret(7);
        let commitment = B256::repeat_byte(0x11);
        let ciphertext =
            encrypt_to_recipient(b"utxo bytes", &PublicKey::from(&recipient), &commitment)
                .unwrap();
        let plaintext = decrypt_as_recipient(&ciphertext, &recipient, &commitment).unwrap();
        assert_eq!(plaintext, b"utxo bytes");
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let recipient = secret(7);
        let commitment = B256::repeat_byte(0x11);
        let ciphertext =
            encrypt_to_recipient(b"utxo bytes", &PublicKey::from(&recipient), &commitment)
                .unwrap();

        let result = decrypt_as_recipient(&ciphertext, &secret(8), &commitment);
        assert_eq!(result.unwrap_err(), DecryptionError::DecryptionFailed);
    }

    #[test]
    fn test_decrypt_with_wrong_commitment_fails() {
        let recipient = secret(7);
        let ciphertext = encrypt_to_recipient(
            b"utxo bytes",
            &PublicKey::from(&recipient),
            &B256::repeat_byte(0x11),
        )
        .unwrap();

        let result = decrypt_as_recipient(&ciphertext, &recipient, &B256::repeat_byte(0x12));
        assert!(result.is_err());
    }

    #[test]
    fn test_symmetric_roundtrip_and_tamper() {
        let commitment = B256::repeat_byte(0x21);
        let key = derive_symmetric_key(&[3u8; 32], &B256::repeat_byte(0x01), &commitment);
        let mut ciphertext = encrypt_symmetric(&key, b"payload", &commitment).unwrap();
        assert_eq!(decrypt_symmetric(&key, &ciphertext, &commitment).unwrap(), b"payload");

        ciphertext[0] ^= 0xff;
        assert_eq!(
            decrypt_symmetric(&key, &ciphertext, &commitment).unwrap_err(),
            DecryptionError::DecryptionFailed
        );
    }

    #[test]
    fn test_symmetric_key_depends_on_tree() {
        let commitment = B256::repeat_byte(0x21);
        let a = derive_symmetric_key(&[3u8; 32], &B256::repeat_byte(0x01), &commitment);
        let b = derive_symmetric_key(&[3u8; 32], &B256::repeat_byte(0x02), &commitment);
        assert_ne!(a, b);
    }
}
