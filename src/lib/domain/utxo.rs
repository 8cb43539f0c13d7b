use std::sync::OnceLock;

use alloy::primitives::B256;
use rand::Rng;
use serde::{
    Deserialize,
    Serialize,
};
use x25519_dalek::PublicKey;

use super::{
    account::{
        Account,
        AccountError,
    },
    commitment::Commitment,
    nullifier::Nullifier,
};
use crate::crypto::{
    encryption::{
        DecryptionError,
        EncryptionError,
        decrypt_as_recipient,
        decrypt_symmetric,
        derive_symmetric_key,
        encrypt_symmetric,
        encrypt_to_recipient,
    },
    field::{
        hash_and_truncate,
        u64_to_b256,
    },
    poseidon::poseidon_array,
};

/// Assets per UTXO. Slot 0 always holds the native fee asset.
pub const N_ASSETS: usize = 2;

/// Identifier of the native fee asset.
pub const NATIVE_ASSET: B256 = B256::ZERO;

/// blinding | amounts | asset index | verifier index | pool type | app data hash
pub const COMPRESSED_UTXO_BYTES_LENGTH: usize = 32 + 8 * N_ASSETS + 8 + 8 + 8 + 32;

/// Compressed record followed by owner public key and encryption public key.
pub const UNCOMPRESSED_UTXO_BYTES_LENGTH: usize = COMPRESSED_UTXO_BYTES_LENGTH + 64;

/// Random tag in front of every encrypted UTXO.
pub const UTXO_PREFIX_LENGTH: usize = 4;

/// Prefix, compressed record and the 16-byte Poly1305 tag.
pub const ENCRYPTED_UTXO_LENGTH: usize = UTXO_PREFIX_LENGTH + COMPRESSED_UTXO_BYTES_LENGTH + 16;

#[derive(Debug, thiserror::Error)]
pub enum UtxoError {
    #[error("too many assets: {0} > {N_ASSETS}")]
    TooManyAssets(usize),
    #[error("assets ({assets}) and amounts ({amounts}) differ in length")]
    AssetsAmountsMismatch { assets: usize, amounts: usize },
    #[error("asset slot 0 must hold the native asset, found {0}")]
    FirstAssetNotNative(B256),
    #[error("asset {0} appears twice")]
    DuplicateAsset(B256),
    #[error("utxo index is not set; insert it into the accumulator first")]
    IndexNotSet,
    #[error("account {account} does not own utxo owned by {owner}")]
    OwnerMismatch { owner: B256, account: B256 },
    #[error("asset {0} not found in lookup table")]
    AssetNotFound(B256),
    #[error("verifier {0} not found in lookup table")]
    VerifierNotFound(B256),
    #[error("lookup table has no entry at index {0}")]
    LookupIndexOutOfRange(u64),
    #[error("invalid serialized utxo length {0}")]
    InvalidLength(usize),
    #[error("an account is required to deserialize a compressed utxo")]
    AccountRequired,
    #[error("utxo has no encryption public key")]
    MissingEncryptionKey,
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error("encryption failed: {0}")]
    Encryption(#[from] EncryptionError),
    #[error("cannot decrypt: {0}")]
    Decryption(#[from] DecryptionError),
}

/// Asset and verifier identifiers referenced by index in serialized UTXOs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupTables {
    pub assets: Vec<B256>,
    pub verifiers: Vec<B256>,
}

impl Default for LookupTables {
    fn default() -> Self {
        Self {
            assets: vec![NATIVE_ASSET],
            verifiers: vec![B256::ZERO],
        }
    }
}

impl LookupTables {
    pub fn asset_index(&self, asset: &B256) -> Result<u64, UtxoError> {
        self.assets
            .iter()
            .position(|a| a == asset)
            .map(|i| i as u64)
            .ok_or(UtxoError::AssetNotFound(*asset))
    }

    pub fn asset_at(&self, index: u64) -> Result<B256, UtxoError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.assets.get(i).copied())
            .ok_or(UtxoError::LookupIndexOutOfRange(index))
    }

    pub fn verifier_index(&self, verifier: &B256) -> Result<u64, UtxoError> {
        self.verifiers
            .iter()
            .position(|v| v == verifier)
            .map(|i| i as u64)
            .ok_or(UtxoError::VerifierNotFound(*verifier))
    }

    pub fn verifier_at(&self, index: u64) -> Result<B256, UtxoError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.verifiers.get(i).copied())
            .ok_or(UtxoError::LookupIndexOutOfRange(index))
    }
}

/// A value container in the shielded pool.
///
/// Fields are fixed at construction so the cached commitment stays valid;
/// the `with_*` builders return a fresh value with an empty cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utxo {
    amounts: [u64; N_ASSETS],
    assets: [B256; N_ASSETS],
    blinding: B256,
    owner: B256,
    encryption_public_key: Option<[u8; 32]>,
    pool_type: u64,
    verifier_address: B256,
    app_data_hash: B256,
    index: Option<u64>,
    #[serde(skip)]
    commitment: OnceLock<Commitment>,
}

fn random_blinding() -> B256 {
    let mut bytes = [0u8; 32];
    // keep within the field
    rand::thread_rng().fill(&mut bytes[1..]);
    B256::from(bytes)
}

impl Utxo {
    /// Create a UTXO owned by `owner` with a random blinding.
    ///
    /// `assets` and `amounts` are zero-padded to [`N_ASSETS`].
    pub fn new(owner: &Account, assets: &[B256], amounts: &[u64]) -> Result<Self, UtxoError> {
        if assets.len() > N_ASSETS {
            return Err(UtxoError::TooManyAssets(assets.len()));
        }
        if amounts.len() > N_ASSETS {
            return Err(UtxoError::TooManyAssets(amounts.len()));
        }
        if assets.len() != amounts.len() {
            return Err(UtxoError::AssetsAmountsMismatch {
                assets: assets.len(),
                amounts: amounts.len(),
            });
        }

        let mut padded_assets = [NATIVE_ASSET; N_ASSETS];
        padded_assets[..assets.len()].copy_from_slice(assets);
        let mut padded_amounts = [0u64; N_ASSETS];
        padded_amounts[..amounts.len()].copy_from_slice(amounts);

        if padded_assets[0] != NATIVE_ASSET {
            return Err(UtxoError::FirstAssetNotNative(padded_assets[0]));
        }
        for (i, asset) in padded_assets.iter().enumerate().skip(1) {
            if *asset != NATIVE_ASSET && padded_assets[..i].contains(asset) {
                return Err(UtxoError::DuplicateAsset(*asset));
            }
        }

        Ok(Self {
            amounts: padded_amounts,
            assets: padded_assets,
            blinding: random_blinding(),
            owner: owner.public_key(),
            encryption_public_key: Some(*owner.encryption_public_key().as_bytes()),
            pool_type: 0,
            verifier_address: B256::ZERO,
            app_data_hash: B256::ZERO,
            index: None,
            commitment: OnceLock::new(),
        })
    }

    /// An all-zero placeholder used to pad fixed-arity input/output arrays.
    pub fn empty(owner: &Account) -> Self {
        Self {
            amounts: [0; N_ASSETS],
            assets: [NATIVE_ASSET; N_ASSETS],
            blinding: random_blinding(),
            owner: owner.public_key(),
            encryption_public_key: Some(*owner.encryption_public_key().as_bytes()),
            pool_type: 0,
            verifier_address: B256::ZERO,
            app_data_hash: B256::ZERO,
            index: None,
            commitment: OnceLock::new(),
        }
    }

    pub fn with_blinding(self, blinding: B256) -> Self {
        Self {
            blinding,
            commitment: OnceLock::new(),
            ..self
        }
    }

    pub fn with_app_data_hash(self, app_data_hash: B256) -> Self {
        Self {
            app_data_hash,
            commitment: OnceLock::new(),
            ..self
        }
    }

    pub fn with_pool_type(self, pool_type: u64) -> Self {
        Self {
            pool_type,
            commitment: OnceLock::new(),
            ..self
        }
    }

    pub fn with_verifier_address(self, verifier_address: B256) -> Self {
        Self {
            verifier_address,
            commitment: OnceLock::new(),
            ..self
        }
    }

    /// Record the accumulator position; the commitment does not depend on it.
    pub fn with_index(self, index: u64) -> Self {
        Self {
            index: Some(index),
            ..self
        }
    }

    pub fn amounts(&self) -> &[u64; N_ASSETS] {
        &self.amounts
    }

    pub fn assets(&self) -> &[B256; N_ASSETS] {
        &self.assets
    }

    pub fn blinding(&self) -> B256 {
        self.blinding
    }

    pub fn owner(&self) -> B256 {
        self.owner
    }

    pub fn encryption_public_key(&self) -> Option<PublicKey> {
        self.encryption_public_key.map(PublicKey::from)
    }

    pub fn pool_type(&self) -> u64 {
        self.pool_type
    }

    pub fn verifier_address(&self) -> B256 {
        self.verifier_address
    }

    pub fn app_data_hash(&self) -> B256 {
        self.app_data_hash
    }

    pub fn index(&self) -> Option<u64> {
        self.index
    }

    /// Amount held of `asset`, zero when the UTXO does not carry it.
    pub fn amount_of(&self, asset: &B256) -> u64 {
        self.assets
            .iter()
            .zip(self.amounts.iter())
            .filter(|(a, _)| *a == asset)
            .map(|(_, amount)| *amount)
            .sum()
    }

    pub fn is_zero(&self) -> bool {
        self.amounts.iter().all(|a| *a == 0)
    }

    /// Asset identifiers as the circuit sees them.
    ///
    /// Slot 0 is always hashed; a native asset in any other slot is encoded as 0.
    pub fn assets_circuit(&self) -> [B256; N_ASSETS] {
        let mut circuit = [B256::ZERO; N_ASSETS];
        for (i, asset) in self.assets.iter().enumerate() {
            circuit[i] = if i != 0 && *asset == NATIVE_ASSET {
                B256::ZERO
            } else {
                hash_and_truncate(asset.as_slice())
            };
        }
        circuit
    }

    /// Verifier address as the circuit sees it; the zero address stays zero.
    pub fn verifier_address_circuit(&self) -> B256 {
        if self.verifier_address == B256::ZERO {
            B256::ZERO
        } else {
            hash_and_truncate(self.verifier_address.as_slice())
        }
    }

    pub fn amount_hash(&self) -> B256 {
        poseidon_array(self.amounts.map(u64_to_b256))
    }

    pub fn asset_hash(&self) -> B256 {
        poseidon_array(self.assets_circuit())
    }

    /// commitment = poseidon6(amount_hash, owner, blinding, asset_hash, app_data_hash, pool_type)
    pub fn commitment(&self) -> Commitment {
        *self.commitment.get_or_init(|| {
            Commitment(poseidon_array([
                self.amount_hash(),
                self.owner,
                self.blinding,
                self.asset_hash(),
                self.app_data_hash,
                u64_to_b256(self.pool_type),
            ]))
        })
    }

    /// nullifier = poseidon3(commitment, index, sign(private_scalar, commitment, index))
    ///
    /// Zero-amount placeholders are signed by `account` at index 0 (unless
    /// set), matching the private key the circuit receives for every slot.
    pub fn nullifier(&self, account: &Account) -> Result<Nullifier, UtxoError> {
        let commitment = self.commitment();
        let index = if self.is_zero() {
            self.index.unwrap_or(0)
        } else {
            if account.public_key() != self.owner {
                return Err(UtxoError::OwnerMismatch {
                    owner: self.owner,
                    account: account.public_key(),
                });
            }
            self.index.ok_or(UtxoError::IndexNotSet)?
        };
        let signature = account.sign(commitment.0, index)?;
        Ok(commitment.nullifier(index, signature))
    }

    /// Fixed-width record. Integers are little-endian.
    pub fn to_bytes(&self, tables: &LookupTables, compressed: bool) -> Result<Vec<u8>, UtxoError> {
        let mut bytes = Vec::with_capacity(UNCOMPRESSED_UTXO_BYTES_LENGTH);
        bytes.extend_from_slice(self.blinding.as_slice());
        for amount in &self.amounts {
            bytes.extend_from_slice(&amount.to_le_bytes());
        }
        bytes.extend_from_slice(&tables.asset_index(&self.assets[1])?.to_le_bytes());
        bytes.extend_from_slice(&tables.verifier_index(&self.verifier_address)?.to_le_bytes());
        bytes.extend_from_slice(&self.pool_type.to_le_bytes());
        bytes.extend_from_slice(self.app_data_hash.as_slice());
        if !compressed {
            bytes.extend_from_slice(self.owner.as_slice());
            bytes.extend_from_slice(&self.encryption_public_key.unwrap_or([0u8; 32]));
        }
        Ok(bytes)
    }

    /// Parse a record produced by [`Utxo::to_bytes`].
    ///
    /// Compressed records omit the owner, which is taken from `account`.
    pub fn from_bytes(
        bytes: &[u8],
        tables: &LookupTables,
        account: Option<&Account>,
    ) -> Result<Self, UtxoError> {
        let compressed = match bytes.len() {
            COMPRESSED_UTXO_BYTES_LENGTH => true,
            UNCOMPRESSED_UTXO_BYTES_LENGTH => false,
            other => return Err(UtxoError::InvalidLength(other)),
        };

        let mut reader = ByteReader::new(bytes);
        let blinding = reader.b256();
        let mut amounts = [0u64; N_ASSETS];
        for amount in amounts.iter_mut() {
            *amount = reader.u64();
        }
        let asset = tables.asset_at(reader.u64())?;
        let verifier_address = tables.verifier_at(reader.u64())?;
        let pool_type = reader.u64();
        let app_data_hash = reader.b256();

        let (owner, encryption_public_key) = if compressed {
            let account = account.ok_or(UtxoError::AccountRequired)?;
            (
                account.public_key(),
                Some(*account.encryption_public_key().as_bytes()),
            )
        } else {
            let owner = reader.b256();
            let key = reader.b256();
            (owner, (!key.is_zero()).then_some(key.0))
        };

        Ok(Self {
            amounts,
            assets: [NATIVE_ASSET, asset],
            blinding,
            owner,
            encryption_public_key,
            pool_type,
            verifier_address,
            app_data_hash,
            index: None,
            commitment: OnceLock::new(),
        })
    }

    /// Encrypt to the owner's encryption public key: `prefix | ciphertext`.
    pub fn encrypt(&self, tables: &LookupTables) -> Result<Vec<u8>, UtxoError> {
        let recipient = self
            .encryption_public_key()
            .ok_or(UtxoError::MissingEncryptionKey)?;
        let plaintext = self.to_bytes(tables, true)?;
        let ciphertext = encrypt_to_recipient(&plaintext, &recipient, &self.commitment().0)?;
        Ok(with_prefix(ciphertext))
    }

    /// Encrypt to the owner itself with a key bound to the accumulator `tree_id`.
    pub fn encrypt_symmetric(
        &self,
        account: &Account,
        tree_id: &B256,
        tables: &LookupTables,
    ) -> Result<Vec<u8>, UtxoError> {
        let commitment = self.commitment().0;
        let key = derive_symmetric_key(account.viewing_secret()?, tree_id, &commitment);
        let plaintext = self.to_bytes(tables, true)?;
        Ok(with_prefix(encrypt_symmetric(&key, &plaintext, &commitment)?))
    }

    /// Decrypt a payload from [`Utxo::encrypt`]. Fails closed on a wrong key.
    pub fn decrypt(
        encrypted: &[u8],
        account: &Account,
        commitment: &Commitment,
        index: Option<u64>,
        tables: &LookupTables,
    ) -> Result<Self, UtxoError> {
        let ciphertext = strip_prefix(encrypted)?;
        let plaintext = decrypt_as_recipient(ciphertext, account.encryption_secret()?, &commitment.0)?;
        Self::from_decrypted(&plaintext, account, commitment, index, tables)
    }

    /// Decrypt a payload from [`Utxo::encrypt_symmetric`].
    pub fn decrypt_symmetric(
        encrypted: &[u8],
        account: &Account,
        tree_id: &B256,
        commitment: &Commitment,
        index: Option<u64>,
        tables: &LookupTables,
    ) -> Result<Self, UtxoError> {
        let ciphertext = strip_prefix(encrypted)?;
        let key = derive_symmetric_key(account.viewing_secret()?, tree_id, &commitment.0);
        let plaintext = decrypt_symmetric(&key, ciphertext, &commitment.0)?;
        Self::from_decrypted(&plaintext, account, commitment, index, tables)
    }

    fn from_decrypted(
        plaintext: &[u8],
        account: &Account,
        commitment: &Commitment,
        index: Option<u64>,
        tables: &LookupTables,
    ) -> Result<Self, UtxoError> {
        let utxo = Self::from_bytes(plaintext, tables, Some(account))
            .map_err(|_| DecryptionError::MalformedPayload)?;
        if utxo.commitment() != *commitment {
            return Err(DecryptionError::CommitmentMismatch.into());
        }
        Ok(match index {
            Some(index) => utxo.with_index(index),
            None => utxo,
        })
    }
}

impl PartialEq for Utxo {
    fn eq(&self, other: &Self) -> bool {
        self.amounts == other.amounts
            && self.assets == other.assets
            && self.blinding == other.blinding
            && self.owner == other.owner
            && self.encryption_public_key == other.encryption_public_key
            && self.pool_type == other.pool_type
            && self.verifier_address == other.verifier_address
            && self.app_data_hash == other.app_data_hash
            && self.index == other.index
    }
}

impl Eq for Utxo {}

fn with_prefix(ciphertext: Vec<u8>) -> Vec<u8> {
    let mut prefix = [0u8; UTXO_PREFIX_LENGTH];
    rand::thread_rng().fill(&mut prefix);
    let mut out = Vec::with_capacity(UTXO_PREFIX_LENGTH + ciphertext.len());
    out.extend_from_slice(&prefix);
    out.extend_from_slice(&ciphertext);
    out
}

fn strip_prefix(encrypted: &[u8]) -> Result<&[u8], UtxoError> {
    encrypted
        .get(UTXO_PREFIX_LENGTH..)
        .filter(|rest| !rest.is_empty())
        .ok_or(UtxoError::Decryption(DecryptionError::MalformedPayload))
}

/// Cursor over a record whose length was checked up front.
struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.offset..self.offset + N]);
        self.offset += N;
        out
    }

    fn b256(&mut self) -> B256 {
        B256::from(self.take::<32>())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take::<8>())
    }
}
