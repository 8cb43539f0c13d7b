use alloy::primitives::B256;
use tracing::info;

use crate::{
    assembler::{
        ProofInputAssembler,
        ProvedTransaction,
    },
    config::EngineConfig,
    domain::{
        account::Account,
        action::Action,
        selector::{
            OutUtxoRequest,
            Recipient,
            SelectionRequest,
            create_out_utxos,
            select_in_utxos,
        },
        transaction_params::{
            Relayer,
            TransactionParameters,
            TransactionParametersInput,
        },
        utxo::Utxo,
    },
    error::EngineError,
    ports::{
        ledger::Ledger,
        prover::Prover,
    },
    sync::{
        ensure_unspent,
        fetch_unspent_utxos,
    },
};

/// What the user wants to do; inputs and outputs are chosen from it.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub action: Action,
    pub public_mint: Option<B256>,
    pub public_amount_sol: Option<u64>,
    pub public_amount_spl: Option<u64>,
    pub recipients: Vec<Recipient>,
    pub relayer: Option<Relayer>,
    /// Public source of shielded funds.
    pub sender_sol: Option<B256>,
    pub sender_spl: Option<B256>,
    /// Public destination of unshielded funds.
    pub recipient_sol: Option<B256>,
    pub recipient_spl: Option<B256>,
}

impl TransactionRequest {
    fn empty(action: Action) -> Self {
        Self {
            action,
            public_mint: None,
            public_amount_sol: None,
            public_amount_spl: None,
            recipients: Vec::new(),
            relayer: None,
            sender_sol: None,
            sender_spl: None,
            recipient_sol: None,
            recipient_spl: None,
        }
    }

    /// Deposit `amount` of the native asset from `sender`.
    pub fn shield(sender: B256, amount: u64) -> Self {
        Self {
            public_amount_sol: Some(amount),
            sender_sol: Some(sender),
            ..Self::empty(Action::Shield)
        }
    }

    /// Withdraw `amount` of the native asset to `recipient`, paying `relayer`.
    pub fn unshield(recipient: B256, amount: u64, relayer: Relayer) -> Self {
        Self {
            public_amount_sol: Some(amount),
            recipient_sol: Some(recipient),
            relayer: Some(relayer),
            ..Self::empty(Action::Unshield)
        }
    }

    pub fn transfer(recipients: Vec<Recipient>, relayer: Relayer) -> Self {
        Self {
            recipients,
            relayer: Some(relayer),
            ..Self::empty(Action::Transfer)
        }
    }

    /// Also move `amount` of `mint` across the pool boundary through `account`
    /// (the sender for shield, the recipient for unshield).
    pub fn with_spl(mut self, mint: B256, amount: u64, account: B256) -> Self {
        self.public_mint = Some(mint);
        self.public_amount_spl = Some(amount);
        match self.action {
            Action::Shield => self.sender_spl = Some(account),
            _ => self.recipient_spl = Some(account),
        }
        self
    }
}

/// One user's view of the pool: syncs with the ledger, builds and proves
/// transactions for the user's account.
pub struct ShieldedClient<L, P> {
    account: Account,
    ledger: L,
    assembler: ProofInputAssembler<P>,
    config: EngineConfig,
}

impl<L: Ledger, P: Prover> ShieldedClient<L, P> {
    pub fn new(account: Account, ledger: L, prover: P, config: EngineConfig) -> Self {
        let assembler = ProofInputAssembler::new(prover, config.prover.timeout);
        Self {
            account,
            ledger,
            assembler,
            config,
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Unspent UTXOs owned by the account.
    pub async fn utxos(&self) -> Result<Vec<Utxo>, EngineError> {
        let (_, utxos) = fetch_unspent_utxos(&self.ledger, &self.account, &self.config).await?;
        Ok(utxos)
    }

    /// Shielded balance of `asset`.
    pub async fn balance(&self, asset: &B256) -> Result<u128, EngineError> {
        Ok(self
            .utxos()
            .await?
            .iter()
            .map(|u| u.amount_of(asset) as u128)
            .sum())
    }

    /// Select inputs, shape outputs, validate, and prove `request`.
    pub async fn prepare(
        &self,
        request: &TransactionRequest,
    ) -> Result<ProvedTransaction, EngineError> {
        let (synced, utxos) =
            fetch_unspent_utxos(&self.ledger, &self.account, &self.config).await?;
        let verifier = self.config.verifier;
        let relayer_fee = request.relayer.as_ref().map(|r| r.fee);

        let inputs = select_in_utxos(&SelectionRequest {
            utxos: &utxos,
            action: request.action,
            public_mint: request.public_mint,
            public_amount_spl: request.public_amount_spl,
            public_amount_sol: request.public_amount_sol,
            relayer_fee,
            recipients: &request.recipients,
            max_in: verifier.in_arity(),
            max_out: verifier.out_arity(),
        })?;
        let outputs = create_out_utxos(&OutUtxoRequest {
            in_utxos: &inputs,
            recipients: &request.recipients,
            action: request.action,
            public_mint: request.public_mint,
            public_amount_spl: request.public_amount_spl,
            public_amount_sol: request.public_amount_sol,
            relayer_fee,
            change_account: &self.account,
            max_out: verifier.out_arity(),
        })?;
        info!(
            action = %request.action,
            inputs = inputs.len(),
            outputs = outputs.len(),
            "Selected transaction utxos"
        );

        let params = TransactionParameters::new(TransactionParametersInput {
            action: request.action,
            input_utxos: inputs,
            output_utxos: outputs,
            verifier,
            sender_spl: request.sender_spl,
            sender_sol: request.sender_sol,
            recipient_spl: request.recipient_spl,
            recipient_sol: request.recipient_sol,
            relayer: request.relayer,
            account: self.account.clone(),
            program_id: self.config.ledger.program_id,
            merkle_tree_id: self.config.ledger.merkle_tree_id,
            lookup_tables: self.config.lookup_tables.clone(),
        })?;
        ensure_unspent(&self.ledger, &params.input_nullifiers()?, &self.config).await?;

        self.assembler
            .prove(params, &synced.accumulator, &synced.state)
            .await
    }
}
