use alloy::primitives::{
    B256,
    U256,
    keccak256,
};
use light_poseidon::PoseidonError;
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};

use super::{
    account::Account,
    action::Action,
    nullifier::Nullifier,
    utxo::{
        LookupTables,
        NATIVE_ASSET,
        Utxo,
        UtxoError,
    },
    verifier::VerifierConfig,
};
use crate::crypto::{
    field::{
        decode_signed,
        field_add,
        hash_and_truncate,
        outflow_magnitude,
        to_field,
        wrap_sub,
    },
    poseidon::{
        poseidon_hash,
        poseidon3,
    },
};

/// Distinct assets a single transaction may touch.
pub const N_ASSET_PUBKEYS: usize = 3;

/// Bytes reserved per output in the encrypted-output blob.
pub const ENCRYPTED_UTXO_SLOT: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("RELAYER_DEFINED: shield must not name a relayer")]
    RelayerDefined,
    #[error("RELAYER_UNDEFINED: {0} needs a relayer")]
    RelayerUndefined(Action),
    #[error("PUBLIC_AMOUNT_NOT_U64: public sol amount {0} does not fit u64")]
    PublicAmountSolNotU64(U256),
    #[error("PUBLIC_AMOUNT_NOT_U64: public spl amount {0} does not fit u64")]
    PublicAmountSplNotU64(U256),
    #[error("PUBLIC_AMOUNT_SPL_NOT_ZERO: transfer moves spl amount {0} across the pool boundary")]
    PublicAmountSplNotZero(U256),
    #[error("PUBLIC_AMOUNT_SOL_NOT_ZERO: transfer sol outflow {outflow} must equal the relayer fee {fee}")]
    PublicAmountSolNotZero { outflow: U256, fee: u64 },
    #[error("SOL_RECIPIENT_DEFINED")]
    SolRecipientDefined,
    #[error("SPL_RECIPIENT_DEFINED")]
    SplRecipientDefined,
    #[error("SOL_RECIPIENT_UNDEFINED: a non-zero public sol amount needs a recipient")]
    SolRecipientUndefined,
    #[error("SPL_RECIPIENT_UNDEFINED: a non-zero public spl amount needs a recipient")]
    SplRecipientUndefined,
    #[error("SOL_SENDER_DEFINED")]
    SolSenderDefined,
    #[error("SPL_SENDER_DEFINED")]
    SplSenderDefined,
    #[error("SOL_SENDER_UNDEFINED: a non-zero public sol amount needs a sender")]
    SolSenderUndefined,
    #[error("SPL_SENDER_UNDEFINED: a non-zero public spl amount needs a sender")]
    SplSenderUndefined,
    #[error("INVALID_INPUT_UTXO_LENGTH: {found} inputs, verifier accepts {max}")]
    InvalidInputUtxoLength { found: usize, max: usize },
    #[error("INVALID_OUTPUT_UTXO_LENGTH: {found} outputs, verifier accepts {max}")]
    InvalidOutputUtxoLength { found: usize, max: usize },
    #[error("EXCEEDED_MAX_ASSETS: {0} distinct assets, at most {N_ASSET_PUBKEYS}")]
    TooManyDistinctAssets(usize),
    #[error("NO_UTXOS_PROVIDED: no input or output utxos")]
    NoUtxosProvided,
    #[error("ENCRYPTED_UTXOS_TOO_LONG: {found} bytes, at most {max}")]
    EncryptedUtxosTooLong { found: usize, max: usize },
    #[error("input utxo {0} has no leaf index")]
    InputIndexUnset(usize),
    #[error(transparent)]
    Utxo(#[from] UtxoError),
    #[error("poseidon: {0}")]
    Poseidon(#[from] PoseidonError),
}

/// Submits unshield and transfer transactions and is paid `fee` in the native asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relayer {
    pub pubkey: B256,
    pub fee: u64,
}

/// Public-side accounts of a transaction after role assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAccounts {
    pub sender_spl: B256,
    pub sender_sol: B256,
    pub recipient_spl: B256,
    pub recipient_sol: B256,
}

fn derive_address(seeds: &[&[u8]]) -> B256 {
    hash_and_truncate(keccak256(seeds.concat()).as_slice())
}

/// Pool account holding native funds.
pub fn sol_pool_address(program_id: &B256) -> B256 {
    derive_address(&[b"sol_pool", program_id.as_slice()])
}

/// Pool account holding funds of `mint`.
pub fn spl_pool_address(program_id: &B256, mint: &B256) -> B256 {
    derive_address(&[mint.as_slice(), b"spl_pool", program_id.as_slice()])
}

/// Placeholder used when no public recipient or sender is involved.
pub fn authority_address(program_id: &B256) -> B256 {
    derive_address(&[b"authority", program_id.as_slice()])
}

/// Escrow from which the verifier pulls shielded native funds.
pub fn escrow_address(verifier_program_id: &B256) -> B256 {
    derive_address(&[b"escrow", verifier_program_id.as_slice()])
}

#[derive(Debug, Clone)]
pub struct TransactionParametersInput {
    pub action: Action,
    pub input_utxos: Vec<Utxo>,
    pub output_utxos: Vec<Utxo>,
    pub verifier: VerifierConfig,
    pub sender_spl: Option<B256>,
    pub sender_sol: Option<B256>,
    pub recipient_spl: Option<B256>,
    pub recipient_sol: Option<B256>,
    pub relayer: Option<Relayer>,
    /// The signing account: owns the inputs and the change output.
    pub account: Account,
    pub program_id: B256,
    pub merkle_tree_id: B256,
    pub lookup_tables: LookupTables,
}

/// Validated, padded description of one transaction.
#[derive(Debug, Clone)]
pub struct TransactionParameters {
    action: Action,
    input_utxos: Vec<Utxo>,
    output_utxos: Vec<Utxo>,
    verifier: VerifierConfig,
    asset_pubkeys: [B256; N_ASSET_PUBKEYS],
    asset_pubkeys_circuit: [B256; N_ASSET_PUBKEYS],
    public_amount_sol: U256,
    public_amount_spl: U256,
    accounts: TransactionAccounts,
    relayer: Relayer,
    account: Account,
    merkle_tree_id: B256,
    encrypted_utxos: Vec<u8>,
    tx_integrity_hash: B256,
}

impl TransactionParameters {
    pub fn new(mut input: TransactionParametersInput) -> Result<Self, ValidationError> {
        let verifier = input.verifier;
        if input.input_utxos.is_empty() && input.output_utxos.is_empty() {
            return Err(ValidationError::NoUtxosProvided);
        }
        if input.input_utxos.len() > verifier.in_arity() {
            return Err(ValidationError::InvalidInputUtxoLength {
                found: input.input_utxos.len(),
                max: verifier.in_arity(),
            });
        }
        if input.output_utxos.len() > verifier.out_arity() {
            return Err(ValidationError::InvalidOutputUtxoLength {
                found: input.output_utxos.len(),
                max: verifier.out_arity(),
            });
        }

        let input_utxos = pad(
            std::mem::take(&mut input.input_utxos),
            verifier.in_arity(),
            &input.account,
        );
        let output_utxos = pad(
            std::mem::take(&mut input.output_utxos),
            verifier.out_arity(),
            &input.account,
        );

        let (asset_pubkeys, asset_pubkeys_circuit) = asset_pubkeys(&input_utxos, &output_utxos)?;
        let public_amount_sol =
            public_amount(0, &input_utxos, &output_utxos, &asset_pubkeys_circuit);
        let public_amount_spl =
            public_amount(1, &input_utxos, &output_utxos, &asset_pubkeys_circuit);

        let relayer = validate_action(&input, public_amount_sol, public_amount_spl)?;
        let accounts = assign_accounts(&input, &asset_pubkeys, &verifier);

        let encrypted_utxos = encrypt_out_utxos(
            &output_utxos,
            &input.account,
            &input.merkle_tree_id,
            &input.lookup_tables,
            verifier.out_arity(),
        )?;
        let tx_integrity_hash =
            integrity_hash(&accounts, &relayer, &encrypted_utxos, verifier.out_arity())?;

        Ok(Self {
            action: input.action,
            input_utxos,
            output_utxos,
            verifier,
            asset_pubkeys,
            asset_pubkeys_circuit,
            public_amount_sol,
            public_amount_spl,
            accounts,
            relayer,
            account: input.account,
            merkle_tree_id: input.merkle_tree_id,
            encrypted_utxos,
            tx_integrity_hash,
        })
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn input_utxos(&self) -> &[Utxo] {
        &self.input_utxos
    }

    pub fn output_utxos(&self) -> &[Utxo] {
        &self.output_utxos
    }

    pub fn verifier(&self) -> &VerifierConfig {
        &self.verifier
    }

    pub fn asset_pubkeys(&self) -> &[B256; N_ASSET_PUBKEYS] {
        &self.asset_pubkeys
    }

    pub fn asset_pubkeys_circuit(&self) -> &[B256; N_ASSET_PUBKEYS] {
        &self.asset_pubkeys_circuit
    }

    pub fn public_amount_sol(&self) -> U256 {
        self.public_amount_sol
    }

    pub fn public_amount_spl(&self) -> U256 {
        self.public_amount_spl
    }

    /// Amount the public sol recipient receives: the outflow before the fee is deducted.
    pub fn public_amount_sol_before_fee(&self) -> U256 {
        field_add(self.public_amount_sol, U256::from(self.relayer.fee))
    }

    /// Signed public amount for asset slot 0 (sol) or 1 (spl).
    pub fn public_amount_signed(&self, asset_index: usize) -> Option<i128> {
        match asset_index {
            0 => decode_signed(self.public_amount_sol),
            1 => decode_signed(self.public_amount_spl),
            _ => None,
        }
    }

    /// Circuit form of the public mint, or zero when no spl moves publicly.
    pub fn public_mint_circuit(&self) -> B256 {
        if self.public_amount_spl.is_zero() {
            B256::ZERO
        } else {
            self.asset_pubkeys_circuit[1]
        }
    }

    pub fn accounts(&self) -> &TransactionAccounts {
        &self.accounts
    }

    pub fn relayer(&self) -> &Relayer {
        &self.relayer
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn merkle_tree_id(&self) -> B256 {
        self.merkle_tree_id
    }

    pub fn encrypted_utxos(&self) -> &[u8] {
        &self.encrypted_utxos
    }

    pub fn tx_integrity_hash(&self) -> B256 {
        self.tx_integrity_hash
    }

    pub fn input_nullifiers(&self) -> Result<Vec<Nullifier>, ValidationError> {
        self.input_utxos
            .iter()
            .enumerate()
            .map(|(i, utxo)| match utxo.nullifier(&self.account) {
                Err(UtxoError::IndexNotSet) => Err(ValidationError::InputIndexUnset(i)),
                other => Ok(other?),
            })
            .collect()
    }

    /// transaction_hash = poseidon3(poseidon(in commitments), poseidon(out commitments), integrity hash)
    pub fn transaction_hash(&self) -> Result<B256, ValidationError> {
        let inputs: Vec<B256> = self.input_utxos.iter().map(|u| u.commitment().0).collect();
        let outputs: Vec<B256> = self.output_utxos.iter().map(|u| u.commitment().0).collect();
        Ok(poseidon3(
            poseidon_hash(&inputs)?,
            poseidon_hash(&outputs)?,
            self.tx_integrity_hash,
        ))
    }
}

fn pad(mut utxos: Vec<Utxo>, arity: usize, account: &Account) -> Vec<Utxo> {
    while utxos.len() < arity {
        utxos.push(Utxo::empty(account));
    }
    utxos
}

/// Native asset first, then each distinct non-zero spl asset in input-then-output order.
fn asset_pubkeys(
    inputs: &[Utxo],
    outputs: &[Utxo],
) -> Result<([B256; N_ASSET_PUBKEYS], [B256; N_ASSET_PUBKEYS]), ValidationError> {
    let mut assets = vec![NATIVE_ASSET];
    let mut circuit = vec![hash_and_truncate(NATIVE_ASSET.as_slice())];
    for utxo in inputs.iter().chain(outputs) {
        let asset_circuit = utxo.assets_circuit()[1];
        if !asset_circuit.is_zero() && !circuit.contains(&asset_circuit) {
            circuit.push(asset_circuit);
            assets.push(utxo.assets()[1]);
        }
    }
    if assets.len() > N_ASSET_PUBKEYS {
        return Err(ValidationError::TooManyDistinctAssets(assets.len()));
    }

    let mut asset_pubkeys = [NATIVE_ASSET; N_ASSET_PUBKEYS];
    let mut asset_pubkeys_circuit = [B256::ZERO; N_ASSET_PUBKEYS];
    asset_pubkeys[..assets.len()].copy_from_slice(&assets);
    asset_pubkeys_circuit[..circuit.len()].copy_from_slice(&circuit);
    Ok((asset_pubkeys, asset_pubkeys_circuit))
}

/// `(Σ out[a] - Σ in[a] + p) mod p` over the UTXOs whose slot `a` holds asset `a`.
fn public_amount(
    asset_index: usize,
    inputs: &[Utxo],
    outputs: &[Utxo],
    asset_pubkeys_circuit: &[B256; N_ASSET_PUBKEYS],
) -> U256 {
    let sum = |utxos: &[Utxo]| {
        utxos
            .iter()
            .filter(|u| u.assets_circuit()[asset_index] == asset_pubkeys_circuit[asset_index])
            .fold(U256::ZERO, |acc, u| acc + U256::from(u.amounts()[asset_index]))
    };
    wrap_sub(sum(outputs), sum(inputs))
}

fn fits_u64(value: U256) -> bool {
    value <= U256::from(u64::MAX)
}

fn validate_action(
    input: &TransactionParametersInput,
    public_amount_sol: U256,
    public_amount_spl: U256,
) -> Result<Relayer, ValidationError> {
    match input.action {
        Action::Shield => {
            if input.relayer.is_some() {
                return Err(ValidationError::RelayerDefined);
            }
            if !fits_u64(public_amount_sol) {
                return Err(ValidationError::PublicAmountSolNotU64(public_amount_sol));
            }
            if !fits_u64(public_amount_spl) {
                return Err(ValidationError::PublicAmountSplNotU64(public_amount_spl));
            }
            if !public_amount_sol.is_zero() && input.recipient_sol.is_some() {
                return Err(ValidationError::SolRecipientDefined);
            }
            if !public_amount_spl.is_zero() && input.recipient_spl.is_some() {
                return Err(ValidationError::SplRecipientDefined);
            }
            if !public_amount_sol.is_zero() && input.sender_sol.is_none() {
                return Err(ValidationError::SolSenderUndefined);
            }
            if !public_amount_spl.is_zero() && input.sender_spl.is_none() {
                return Err(ValidationError::SplSenderUndefined);
            }
            // the depositor signs and pays
            Ok(Relayer {
                pubkey: input.sender_sol.unwrap_or(B256::ZERO),
                fee: 0,
            })
        }
        Action::Unshield => {
            let relayer = input
                .relayer
                .ok_or(ValidationError::RelayerUndefined(Action::Unshield))?;
            let sol_out = outflow_magnitude(public_amount_sol);
            let spl_out = outflow_magnitude(public_amount_spl);
            if !fits_u64(sol_out) {
                return Err(ValidationError::PublicAmountSolNotU64(public_amount_sol));
            }
            if !fits_u64(spl_out) {
                return Err(ValidationError::PublicAmountSplNotU64(public_amount_spl));
            }
            let sol_to_recipient = sol_out.saturating_sub(U256::from(relayer.fee));
            if !sol_to_recipient.is_zero() && input.recipient_sol.is_none() {
                return Err(ValidationError::SolRecipientUndefined);
            }
            if !public_amount_spl.is_zero() && input.recipient_spl.is_none() {
                return Err(ValidationError::SplRecipientUndefined);
            }
            if !public_amount_sol.is_zero() && input.sender_sol.is_some() {
                return Err(ValidationError::SolSenderDefined);
            }
            if !public_amount_spl.is_zero() && input.sender_spl.is_some() {
                return Err(ValidationError::SplSenderDefined);
            }
            Ok(relayer)
        }
        Action::Transfer => {
            let relayer = input
                .relayer
                .ok_or(ValidationError::RelayerUndefined(Action::Transfer))?;
            if !public_amount_spl.is_zero() {
                return Err(ValidationError::PublicAmountSplNotZero(public_amount_spl));
            }
            let outflow = outflow_magnitude(public_amount_sol);
            if outflow != U256::from(relayer.fee) {
                return Err(ValidationError::PublicAmountSolNotZero {
                    outflow,
                    fee: relayer.fee,
                });
            }
            if input.recipient_spl.is_some() {
                return Err(ValidationError::SplRecipientDefined);
            }
            if input.recipient_sol.is_some() {
                return Err(ValidationError::SolRecipientDefined);
            }
            if input.sender_sol.is_some() {
                return Err(ValidationError::SolSenderDefined);
            }
            if input.sender_spl.is_some() {
                return Err(ValidationError::SplSenderDefined);
            }
            Ok(relayer)
        }
    }
}

/// Map public senders and recipients to pool accounts according to `action`.
fn assign_accounts(
    input: &TransactionParametersInput,
    asset_pubkeys: &[B256; N_ASSET_PUBKEYS],
    verifier: &VerifierConfig,
) -> TransactionAccounts {
    let authority = authority_address(&input.program_id);
    let spl_pool = spl_pool_address(&input.program_id, &asset_pubkeys[1]);
    let sol_pool = sol_pool_address(&input.program_id);
    match input.action {
        Action::Shield => TransactionAccounts {
            sender_spl: input.sender_spl.unwrap_or(authority),
            sender_sol: escrow_address(&verifier.program_id()),
            recipient_spl: spl_pool,
            recipient_sol: sol_pool,
        },
        Action::Unshield | Action::Transfer => TransactionAccounts {
            sender_spl: spl_pool,
            sender_sol: sol_pool,
            recipient_spl: input.recipient_spl.unwrap_or(authority),
            recipient_sol: input.recipient_sol.unwrap_or(authority),
        },
    }
}

/// One fixed slot per output. Outputs owned by the signer are encrypted to
/// themselves; others to the owner's encryption key. Empty outputs and
/// slot tails are zero-filled.
fn encrypt_out_utxos(
    outputs: &[Utxo],
    account: &Account,
    merkle_tree_id: &B256,
    tables: &LookupTables,
    out_arity: usize,
) -> Result<Vec<u8>, ValidationError> {
    let mut blob = vec![0u8; ENCRYPTED_UTXO_SLOT * out_arity];
    for (i, utxo) in outputs.iter().enumerate() {
        if utxo.is_zero() {
            continue;
        }
        let encrypted = if utxo.owner() == account.public_key() && account.has_private_material() {
            utxo.encrypt_symmetric(account, merkle_tree_id, tables)?
        } else {
            utxo.encrypt(tables)?
        };
        if encrypted.len() > ENCRYPTED_UTXO_SLOT {
            return Err(ValidationError::EncryptedUtxosTooLong {
                found: encrypted.len(),
                max: ENCRYPTED_UTXO_SLOT,
            });
        }
        let start = i * ENCRYPTED_UTXO_SLOT;
        blob[start..start + encrypted.len()].copy_from_slice(&encrypted);
    }
    Ok(blob)
}

/// sha256(recipient_spl | recipient_sol | relayer | fee (u64 LE) | encrypted_utxos) mod p
fn integrity_hash(
    accounts: &TransactionAccounts,
    relayer: &Relayer,
    encrypted_utxos: &[u8],
    out_arity: usize,
) -> Result<B256, ValidationError> {
    let max = ENCRYPTED_UTXO_SLOT * out_arity;
    if encrypted_utxos.len() > max {
        return Err(ValidationError::EncryptedUtxosTooLong {
            found: encrypted_utxos.len(),
            max,
        });
    }
    let digest = Sha256::new()
        .chain_update(accounts.recipient_spl)
        .chain_update(accounts.recipient_sol)
        .chain_update(relayer.pubkey)
        .chain_update(relayer.fee.to_le_bytes())
        .chain_update(encrypted_utxos)
        .finalize();
    Ok(B256::from(to_field(U256::from_be_slice(&digest))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::field::FIELD_SIZE,
        domain::utxo::ENCRYPTED_UTXO_LENGTH,
    };

    const SEED: &str = "params-test-seed-params-test-seed-params";

    fn mint() -> B256 {
        B256::repeat_byte(0x0c)
    }

    fn tables() -> LookupTables {
        LookupTables {
            assets: vec![NATIVE_ASSET, mint()],
            verifiers: vec![B256::ZERO],
        }
    }

    fn base(action: Action, inputs: Vec<Utxo>, outputs: Vec<Utxo>) -> TransactionParametersInput {
        TransactionParametersInput {
            action,
            input_utxos: inputs,
            output_utxos: outputs,
            verifier: VerifierConfig::Zero,
            sender_spl: None,
            sender_sol: None,
            recipient_spl: None,
            recipient_sol: None,
            relayer: None,
            account: Account::from_seed(SEED).unwrap(),
            program_id: B256::repeat_byte(0x01),
            merkle_tree_id: B256::repeat_byte(0x02),
            lookup_tables: tables(),
        }
    }

    fn relayer(fee: u64) -> Option<Relayer> {
        Some(Relayer {
            pubkey: B256::repeat_byte(0x0f),
            fee,
        })
    }

    fn account() -> Account {
        Account::from_seed(SEED).unwrap()
    }

    #[test]
    fn test_shield_public_amount() {
        let owner = account();
        let out = Utxo::new(&owner, &[NATIVE_ASSET], &[100]).unwrap();
        let params = TransactionParameters::new(TransactionParametersInput {
            sender_sol: Some(B256::repeat_byte(0x05)),
            ..base(Action::Shield, vec![], vec![out])
        })
        .unwrap();

        assert_eq!(params.public_amount_sol(), U256::from(100));
        assert_eq!(params.public_amount_signed(0), Some(100));
        assert!(params.public_amount_spl().is_zero());
        assert_eq!(params.input_utxos().len(), 2);
        assert_eq!(params.output_utxos().len(), 2);
        assert_eq!(params.relayer().fee, 0);
        assert_eq!(
            params.accounts().recipient_sol,
            sol_pool_address(&B256::repeat_byte(0x01))
        );
    }

    #[test]
    fn test_unshield_public_amount_includes_fee() {
        let owner = account();
        let input = Utxo::new(&owner, &[NATIVE_ASSET], &[100]).unwrap().with_index(0);
        let change = Utxo::new(&owner, &[NATIVE_ASSET], &[65]).unwrap();
        let params = TransactionParameters::new(TransactionParametersInput {
            recipient_sol: Some(B256::repeat_byte(0x06)),
            relayer: relayer(5),
            ..base(Action::Unshield, vec![input], vec![change])
        })
        .unwrap();

        assert_eq!(params.public_amount_sol(), FIELD_SIZE - U256::from(35));
        assert_eq!(params.public_amount_sol_before_fee(), FIELD_SIZE - U256::from(30));
        assert_eq!(params.public_amount_signed(0), Some(-35));
        assert_eq!(
            params.accounts().sender_sol,
            sol_pool_address(&B256::repeat_byte(0x01))
        );
    }

    #[test]
    fn test_transfer_rejects_public_spl() {
        let owner = account();
        let input = Utxo::new(&owner, &[NATIVE_ASSET, mint()], &[10, 10])
            .unwrap()
            .with_index(0);
        let out = Utxo::new(&owner, &[NATIVE_ASSET, mint()], &[5, 7]).unwrap();
        let result = TransactionParameters::new(TransactionParametersInput {
            relayer: relayer(5),
            ..base(Action::Transfer, vec![input], vec![out])
        });
        assert!(matches!(result, Err(ValidationError::PublicAmountSplNotZero(_))));
    }

    #[test]
    fn test_transfer_sol_outflow_must_equal_fee() {
        let owner = account();
        let input = Utxo::new(&owner, &[NATIVE_ASSET], &[10]).unwrap().with_index(0);
        let out = Utxo::new(&Account::random(), &[NATIVE_ASSET], &[4]).unwrap();
        let result = TransactionParameters::new(TransactionParametersInput {
            relayer: relayer(5),
            ..base(Action::Transfer, vec![input.clone()], vec![out])
        });
        assert!(matches!(
            result,
            Err(ValidationError::PublicAmountSolNotZero { fee: 5, .. })
        ));

        let out = Utxo::new(&Account::random(), &[NATIVE_ASSET], &[5]).unwrap();
        let params = TransactionParameters::new(TransactionParametersInput {
            relayer: relayer(5),
            ..base(Action::Transfer, vec![input], vec![out])
        })
        .unwrap();
        assert_eq!(params.public_amount_signed(0), Some(-5));
    }

    #[test]
    fn test_action_role_errors() {
        let owner = account();
        let deposit = Utxo::new(&owner, &[NATIVE_ASSET], &[100]).unwrap();
        assert!(matches!(
            TransactionParameters::new(TransactionParametersInput {
                sender_sol: Some(B256::repeat_byte(0x05)),
                relayer: relayer(1),
                ..base(Action::Shield, vec![], vec![deposit.clone()])
            }),
            Err(ValidationError::RelayerDefined)
        ));
        assert!(matches!(
            TransactionParameters::new(base(Action::Shield, vec![], vec![deposit.clone()])),
            Err(ValidationError::SolSenderUndefined)
        ));
        assert!(matches!(
            TransactionParameters::new(TransactionParametersInput {
                sender_sol: Some(B256::repeat_byte(0x05)),
                recipient_sol: Some(B256::repeat_byte(0x06)),
                ..base(Action::Shield, vec![], vec![deposit])
            }),
            Err(ValidationError::SolRecipientDefined)
        ));

        let input = Utxo::new(&owner, &[NATIVE_ASSET], &[100]).unwrap().with_index(0);
        assert!(matches!(
            TransactionParameters::new(base(Action::Unshield, vec![input.clone()], vec![])),
            Err(ValidationError::RelayerUndefined(Action::Unshield))
        ));
        assert!(matches!(
            TransactionParameters::new(TransactionParametersInput {
                relayer: relayer(5),
                ..base(Action::Unshield, vec![input.clone()], vec![])
            }),
            Err(ValidationError::SolRecipientUndefined)
        ));
        assert!(matches!(
            TransactionParameters::new(TransactionParametersInput {
                relayer: relayer(5),
                recipient_sol: Some(B256::repeat_byte(0x06)),
                sender_sol: Some(B256::repeat_byte(0x05)),
                ..base(Action::Unshield, vec![input], vec![])
            }),
            Err(ValidationError::SolSenderDefined)
        ));
    }

    #[test]
    fn test_unshield_inflow_is_not_u64() {
        let owner = account();
        let out = Utxo::new(&owner, &[NATIVE_ASSET], &[10]).unwrap();
        let result = TransactionParameters::new(TransactionParametersInput {
            relayer: relayer(1),
            recipient_sol: Some(B256::repeat_byte(0x06)),
            ..base(Action::Unshield, vec![], vec![out])
        });
        assert!(matches!(result, Err(ValidationError::PublicAmountSolNotU64(_))));
    }

    #[test]
    fn test_arity_and_asset_limits() {
        let owner = account();
        let inputs: Vec<Utxo> = (0..3)
            .map(|i| Utxo::new(&owner, &[NATIVE_ASSET], &[1]).unwrap().with_index(i))
            .collect();
        assert!(matches!(
            TransactionParameters::new(TransactionParametersInput {
                relayer: relayer(1),
                ..base(Action::Transfer, inputs, vec![])
            }),
            Err(ValidationError::InvalidInputUtxoLength { found: 3, max: 2 })
        ));

        let assets: Vec<Utxo> = (1..=3u8)
            .map(|b| Utxo::new(&owner, &[NATIVE_ASSET, B256::repeat_byte(b)], &[0, 1]).unwrap())
            .collect();
        let result = TransactionParameters::new(TransactionParametersInput {
            verifier: VerifierConfig::Two,
            sender_sol: Some(B256::repeat_byte(0x05)),
            sender_spl: Some(B256::repeat_byte(0x05)),
            ..base(Action::Shield, vec![], assets)
        });
        assert!(matches!(result, Err(ValidationError::TooManyDistinctAssets(4))));

        assert!(matches!(
            TransactionParameters::new(base(Action::Shield, vec![], vec![])),
            Err(ValidationError::NoUtxosProvided)
        ));
    }

    #[test]
    fn test_asset_pubkeys_padding() {
        let owner = account();
        let out = Utxo::new(&owner, &[NATIVE_ASSET, mint()], &[0, 9]).unwrap();
        let params = TransactionParameters::new(TransactionParametersInput {
            sender_spl: Some(B256::repeat_byte(0x05)),
            ..base(Action::Shield, vec![], vec![out])
        })
        .unwrap();
        assert_eq!(params.asset_pubkeys()[1], mint());
        assert_eq!(params.asset_pubkeys()[2], NATIVE_ASSET);
        assert_eq!(params.asset_pubkeys_circuit()[1], hash_and_truncate(mint().as_slice()));
        assert!(params.asset_pubkeys_circuit()[2].is_zero());
        assert_eq!(params.public_amount_spl(), U256::from(9));
        assert_eq!(params.public_mint_circuit(), params.asset_pubkeys_circuit()[1]);
    }

    #[test]
    fn test_encrypted_outputs_and_hashes() {
        let owner = account();
        let out = Utxo::new(&owner, &[NATIVE_ASSET], &[100]).unwrap();
        let params = TransactionParameters::new(TransactionParametersInput {
            sender_sol: Some(B256::repeat_byte(0x05)),
            ..base(Action::Shield, vec![], vec![out.clone()])
        })
        .unwrap();

        let blob = params.encrypted_utxos();
        assert_eq!(blob.len(), 2 * ENCRYPTED_UTXO_SLOT);
        assert!(blob[ENCRYPTED_UTXO_SLOT..].iter().all(|b| *b == 0));

        let decrypted = Utxo::decrypt_symmetric(
            &blob[..ENCRYPTED_UTXO_LENGTH],
            &owner,
            &params.merkle_tree_id(),
            &out.commitment(),
            Some(0),
            &tables(),
        )
        .unwrap();
        assert_eq!(decrypted, out.with_index(0));

        assert!(U256::from_be_bytes(params.tx_integrity_hash().0) < FIELD_SIZE);
        assert_eq!(
            params.transaction_hash().unwrap(),
            params.transaction_hash().unwrap()
        );
    }

    #[test]
    fn test_input_nullifiers_need_indices() {
        let owner = account();
        let input = Utxo::new(&owner, &[NATIVE_ASSET], &[100]).unwrap();
        let change = Utxo::new(&owner, &[NATIVE_ASSET], &[95]).unwrap();
        let params = TransactionParameters::new(TransactionParametersInput {
            relayer: relayer(5),
            ..base(Action::Transfer, vec![input], vec![change])
        })
        .unwrap();
        assert!(matches!(
            params.input_nullifiers(),
            Err(ValidationError::InputIndexUnset(0))
        ));
    }
}
