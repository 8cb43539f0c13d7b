use std::fmt;

use alloy::primitives::B256;
use rand::Rng;
use x25519_dalek::{
    PublicKey,
    StaticSecret,
};

use crate::crypto::{
    eddsa::{
        SigningKey,
        VerifyingKey,
    },
    encryption::blake2b256,
    field::u64_to_b256,
    poseidon::{
        poseidon1,
        poseidon3,
    },
};

/// Minimum seed length in bytes.
pub const MIN_SEED_LENGTH: usize = 32;

const SHIELDED_DOMAIN: &[u8] = b"shielded";
const ENCRYPTION_DOMAIN: &[u8] = b"encryption";
const SIGNATURE_DOMAIN: &[u8] = b"poseidonEddsaKeypair";
const VIEWING_DOMAIN: &[u8] = b"aes";
const BURNER_DOMAIN: &[u8] = b"burnerSeed";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("INVALID_SEED_SIZE: seed must be at least {MIN_SEED_LENGTH} bytes, got {0}")]
    InvalidSeedSize(usize),
    #[error("account holds no private material (built from a public key)")]
    MissingPrivateMaterial,
}

#[derive(Clone)]
struct PrivateMaterial {
    private_scalar: B256,
    encryption_secret: StaticSecret,
    signing_key: SigningKey,
    viewing_secret: [u8; 32],
}

/// A shielded account: every per-user secret is derived from one seed.
///
/// Accounts built with [`Account::from_public_key`] can receive UTXOs but
/// cannot sign, derive nullifiers or decrypt.
#[derive(Clone)]
pub struct Account {
    public_key: B256,
    encryption_public_key: PublicKey,
    private: Option<PrivateMaterial>,
    burner_seed: Option<String>,
}

impl Account {
    /// Derive an account from a seed string.
    pub fn from_seed(seed: &str) -> Result<Self, AccountError> {
        if seed.len() < MIN_SEED_LENGTH {
            return Err(AccountError::InvalidSeedSize(seed.len()));
        }
        Ok(Self::derive(seed.as_bytes()))
    }

    fn derive(seed: &[u8]) -> Self {
        let mut shielded = blake2b256(&[seed, SHIELDED_DOMAIN]);
        // keep within the field
        shielded[0] = 0;
        let private_scalar = poseidon1(B256::from(shielded));
        let public_key = poseidon1(private_scalar);

        let encryption_secret = StaticSecret::from(blake2b256(&[seed, ENCRYPTION_DOMAIN]));
        let encryption_public_key = PublicKey::from(&encryption_secret);

        Self {
            public_key,
            encryption_public_key,
            private: Some(PrivateMaterial {
                private_scalar,
                encryption_secret,
                signing_key: SigningKey::from_secret(&blake2b256(&[seed, SIGNATURE_DOMAIN])),
                viewing_secret: blake2b256(&[seed, VIEWING_DOMAIN]),
            }),
            burner_seed: None,
        }
    }

    /// Generate an account from a random 32-byte seed.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill(&mut bytes);
        Self::derive(bs58::encode(bytes).into_string().as_bytes())
    }

    /// Derive an unlinkable burner account for `index`.
    /// burner_seed = bs58(blake2b256(seed || "burnerSeed" || index))
    pub fn burner(seed: &str, index: u32) -> Result<Self, AccountError> {
        if seed.len() < MIN_SEED_LENGTH {
            return Err(AccountError::InvalidSeedSize(seed.len()));
        }
        let index = index.to_string();
        let burner_seed = bs58::encode(blake2b256(&[
            seed.as_bytes(),
            BURNER_DOMAIN,
            index.as_bytes(),
        ]))
        .into_string();
        let mut account = Self::derive(burner_seed.as_bytes());
        account.burner_seed = Some(burner_seed);
        Ok(account)
    }

    /// Build a public-only account from `shielded pubkey (32) || encryption pubkey (32)`.
    pub fn from_public_key(bytes: &[u8; 64]) -> Self {
        let mut shielded = [0u8; 32];
        shielded.copy_from_slice(&bytes[..32]);
        let mut encryption = [0u8; 32];
        encryption.copy_from_slice(&bytes[32..]);
        Self {
            public_key: B256::from(shielded),
            encryption_public_key: PublicKey::from(encryption),
            private: None,
            burner_seed: None,
        }
    }

    /// The 64-byte form accepted by [`Account::from_public_key`].
    pub fn public_key_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(self.public_key.as_slice());
        bytes[32..].copy_from_slice(self.encryption_public_key.as_bytes());
        bytes
    }

    pub fn public_key(&self) -> B256 {
        self.public_key
    }

    pub fn encryption_public_key(&self) -> &PublicKey {
        &self.encryption_public_key
    }

    pub fn burner_seed(&self) -> Option<&str> {
        self.burner_seed.as_deref()
    }

    pub fn has_private_material(&self) -> bool {
        self.private.is_some()
    }

    fn private(&self) -> Result<&PrivateMaterial, AccountError> {
        self.private.as_ref().ok_or(AccountError::MissingPrivateMaterial)
    }

    pub fn private_scalar(&self) -> Result<B256, AccountError> {
        Ok(self.private()?.private_scalar)
    }

    pub fn encryption_secret(&self) -> Result<&StaticSecret, AccountError> {
        Ok(&self.private()?.encryption_secret)
    }

    pub fn viewing_secret(&self) -> Result<&[u8; 32], AccountError> {
        Ok(&self.private()?.viewing_secret)
    }

    /// EdDSA key for signing messages outside the nullifier scheme.
    pub fn signing_key(&self) -> Result<&SigningKey, AccountError> {
        Ok(&self.private()?.signing_key)
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey, AccountError> {
        Ok(self.signing_key()?.verifying_key())
    }

    /// Ownership signature mixed into a nullifier.
    /// signature = poseidon3(private_scalar, commitment, index)
    pub fn sign(&self, commitment: B256, index: u64) -> Result<B256, AccountError> {
        let private_scalar = self.private_scalar()?;
        Ok(poseidon3(private_scalar, commitment, u64_to_b256(index)))
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
            && self.encryption_public_key == other.encryption_public_key
            && self.private.as_ref().map(|p| p.private_scalar)
                == other.private.as_ref().map(|p| p.private_scalar)
    }
}

impl Eq for Account {}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("public_key", &self.public_key)
            .field("encryption_public_key", &self.encryption_public_key.as_bytes())
            .field("has_private_material", &self.private.is_some())
            .field("burner", &self.burner_seed.is_some())
            .finish()
    }
}
