//! End-to-end flows against the in-memory ledger and the mock prover.
//!
//! 1. Alice shields native tokens
//! 2. Alice unshields part of them through a relayer
//! 3. Alice transfers to Bob, who finds the output by scanning the ledger
//!
//! Running:
//!
//! ```bash
//! cargo test --test integration -- --nocapture
//! ```

use std::{
    sync::Arc,
    time::Duration,
};

use alloy::primitives::{
    B256,
    U256,
};
use proptest::prelude::*;

use shielded_tx_engine::{
    EngineConfig,
    EngineError,
    ShieldedClient,
    TransactionRequest,
    adapters::{
        mock_ledger::MockLedger,
        mock_prover::MockProver,
    },
    crypto::field::{
        FIELD_SIZE,
        field_add,
    },
    domain::{
        account::Account,
        action::Action,
        selector::{
            OutUtxoRequest,
            Recipient,
            SelectionError,
            SelectionRequest,
            create_out_utxos,
            select_in_utxos,
        },
        transaction_params::{
            Relayer,
            TransactionParameters,
            TransactionParametersInput,
            ValidationError,
        },
        utxo::{
            LookupTables,
            NATIVE_ASSET,
            Utxo,
        },
        verifier::VerifierConfig,
    },
    ports::ledger::LedgerError,
};

const ALICE_SEED: &str = "integration-alice-seed-integration-alice";

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.accumulator.height = 10;
    config.accumulator.root_history_size = 20;
    config.ledger.program_id = B256::repeat_byte(0x01);
    config.ledger.merkle_tree_id = B256::repeat_byte(0x02);
    config.ledger.retry.initial_backoff = Duration::from_millis(1);
    config.lookup_tables = LookupTables {
        assets: vec![NATIVE_ASSET, mint()],
        verifiers: vec![B256::ZERO],
    };
    config
}

fn mint() -> B256 {
    B256::repeat_byte(0x0c)
}

fn relayer(fee: u64) -> Relayer {
    Relayer {
        pubkey: B256::repeat_byte(0x0f),
        fee,
    }
}

fn client(
    account: Account,
    ledger: &Arc<MockLedger>,
    config: EngineConfig,
) -> ShieldedClient<Arc<MockLedger>, MockProver> {
    ShieldedClient::new(account, Arc::clone(ledger), MockProver::new(), config)
}

fn ledger(config: &EngineConfig) -> Arc<MockLedger> {
    Arc::new(
        MockLedger::new(
            config.accumulator.height,
            config.accumulator.root_history_size,
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn test_shield_then_unshield_with_fee() {
    let config = config();
    let ledger = ledger(&config);
    let alice = client(Account::from_seed(ALICE_SEED).unwrap(), &ledger, config);

    // Shield 100
    let shield = alice
        .prepare(&TransactionRequest::shield(B256::repeat_byte(0xa1), 100))
        .await
        .unwrap();
    assert_eq!(shield.params.public_amount_sol(), U256::from(100));
    assert_eq!(shield.params.output_utxos()[0].amounts()[0], 100);
    ledger.apply(&shield).await.unwrap();
    assert_eq!(alice.balance(&NATIVE_ASSET).await.unwrap(), 100);

    // Unshield 30, fee 5: change 65
    let unshield = alice
        .prepare(&TransactionRequest::unshield(
            B256::repeat_byte(0xa2),
            30,
            relayer(5),
        ))
        .await
        .unwrap();
    let params = &unshield.params;
    assert_eq!(params.output_utxos()[0].amounts()[0], 65);
    assert_eq!(params.public_amount_sol(), FIELD_SIZE - U256::from(35));
    assert_eq!(
        params.public_amount_sol_before_fee(),
        FIELD_SIZE - U256::from(30)
    );
    assert_eq!(params.accounts().recipient_sol, B256::repeat_byte(0xa2));
    assert_eq!(unshield.public_inputs.to_vec().len(), 9);

    ledger.apply(&unshield).await.unwrap();
    assert_eq!(alice.balance(&NATIVE_ASSET).await.unwrap(), 65);
    assert_eq!(ledger.next_index().await, 4);
}

#[tokio::test]
async fn test_transfer_reaches_recipient() {
    let config = config();
    let ledger = ledger(&config);
    let alice = client(Account::from_seed(ALICE_SEED).unwrap(), &ledger, config.clone());
    let bob = client(Account::random(), &ledger, config);

    let shield = alice
        .prepare(&TransactionRequest::shield(B256::repeat_byte(0xa1), 100))
        .await
        .unwrap();
    ledger.apply(&shield).await.unwrap();

    let payee = Account::from_public_key(&bob.account().public_key_bytes());
    let transfer = alice
        .prepare(&TransactionRequest::transfer(
            vec![Recipient {
                account: payee,
                mint: None,
                sol_amount: 20,
                spl_amount: 0,
            }],
            relayer(5),
        ))
        .await
        .unwrap();
    assert_eq!(transfer.params.public_amount_signed(0), Some(-5));
    assert!(transfer.params.public_amount_spl().is_zero());
    ledger.apply(&transfer).await.unwrap();

    assert_eq!(alice.balance(&NATIVE_ASSET).await.unwrap(), 75);
    let bob_utxos = bob.utxos().await.unwrap();
    assert_eq!(bob_utxos.len(), 1);
    assert_eq!(bob_utxos[0].amounts()[0], 20);
    assert_eq!(bob_utxos[0].owner(), bob.account().public_key());
}

#[tokio::test]
async fn test_spl_shield_then_unshield() {
    let config = config();
    let ledger = ledger(&config);
    let alice = client(Account::from_seed(ALICE_SEED).unwrap(), &ledger, config);

    let shield = alice
        .prepare(
            &TransactionRequest::shield(B256::repeat_byte(0xa1), 10).with_spl(
                mint(),
                50,
                B256::repeat_byte(0xb1),
            ),
        )
        .await
        .unwrap();
    assert_eq!(shield.params.output_utxos()[0].amounts(), &[10, 50]);
    assert_eq!(shield.params.public_amount_spl(), U256::from(50));
    ledger.apply(&shield).await.unwrap();
    assert_eq!(alice.balance(&mint()).await.unwrap(), 50);

    // Withdraw 20 of the mint; the fee comes out of the native balance
    let unshield = alice
        .prepare(
            &TransactionRequest::unshield(B256::repeat_byte(0xa2), 0, relayer(1)).with_spl(
                mint(),
                20,
                B256::repeat_byte(0xb2),
            ),
        )
        .await
        .unwrap();
    let params = &unshield.params;
    assert_eq!(params.output_utxos()[0].amounts(), &[9, 30]);
    assert_eq!(params.public_amount_signed(0), Some(-1));
    assert_eq!(params.public_amount_signed(1), Some(-20));
    assert_eq!(params.accounts().recipient_spl, B256::repeat_byte(0xb2));
    ledger.apply(&unshield).await.unwrap();

    assert_eq!(alice.balance(&mint()).await.unwrap(), 30);
    assert_eq!(alice.balance(&NATIVE_ASSET).await.unwrap(), 9);
}

#[tokio::test]
async fn test_transfer_with_public_spl_rejected() {
    let account = Account::from_seed(ALICE_SEED).unwrap();
    let input = Utxo::new(&account, &[NATIVE_ASSET, mint()], &[10, 10])
        .unwrap()
        .with_index(0);
    let output = Utxo::new(&account, &[NATIVE_ASSET, mint()], &[5, 7]).unwrap();

    let result = TransactionParameters::new(TransactionParametersInput {
        action: Action::Transfer,
        input_utxos: vec![input],
        output_utxos: vec![output],
        verifier: VerifierConfig::Zero,
        sender_spl: None,
        sender_sol: None,
        recipient_spl: None,
        recipient_sol: None,
        relayer: Some(relayer(5)),
        account,
        program_id: B256::repeat_byte(0x01),
        merkle_tree_id: B256::repeat_byte(0x02),
        lookup_tables: config().lookup_tables,
    });
    assert!(matches!(
        result,
        Err(ValidationError::PublicAmountSplNotZero(_))
    ));
}

#[tokio::test]
async fn test_double_spend_rejected_by_ledger() {
    let config = config();
    let ledger = ledger(&config);
    let alice = client(Account::from_seed(ALICE_SEED).unwrap(), &ledger, config);

    let shield = alice
        .prepare(&TransactionRequest::shield(B256::repeat_byte(0xa1), 50))
        .await
        .unwrap();
    ledger.apply(&shield).await.unwrap();

    let unshield = alice
        .prepare(&TransactionRequest::unshield(
            B256::repeat_byte(0xa2),
            10,
            relayer(1),
        ))
        .await
        .unwrap();
    ledger.apply(&unshield).await.unwrap();
    assert!(matches!(
        ledger.apply(&unshield).await,
        Err(LedgerError::Rejected(_))
    ));
}

#[tokio::test]
async fn test_unshield_without_funds_fails_selection() {
    let config = config();
    let ledger = ledger(&config);
    let alice = client(Account::from_seed(ALICE_SEED).unwrap(), &ledger, config);

    let result = alice
        .prepare(&TransactionRequest::unshield(
            B256::repeat_byte(0xa2),
            10,
            relayer(1),
        ))
        .await;
    assert!(matches!(result, Err(EngineError::Selection(_))));
}

#[tokio::test]
async fn test_app_verifier_exposes_transaction_hash() {
    let mut config = config();
    config.verifier = VerifierConfig::Two;
    let ledger = ledger(&config);
    let alice = client(Account::from_seed(ALICE_SEED).unwrap(), &ledger, config);

    let shield = alice
        .prepare(&TransactionRequest::shield(B256::repeat_byte(0xa1), 100))
        .await
        .unwrap();
    assert_eq!(shield.public_inputs.to_vec().len(), 15);
    assert_eq!(shield.public_inputs.input_nullifiers.len(), 4);
    assert_eq!(
        shield.public_inputs.transaction_hash,
        Some(shield.params.transaction_hash().unwrap().0)
    );
    ledger.apply(&shield).await.unwrap();
    assert_eq!(ledger.next_index().await, 4);
}

#[tokio::test]
async fn test_sync_survives_transient_ledger_errors() {
    let config = config();
    let ledger = ledger(&config);
    let alice = client(Account::from_seed(ALICE_SEED).unwrap(), &ledger, config);

    let shield = alice
        .prepare(&TransactionRequest::shield(B256::repeat_byte(0xa1), 100))
        .await
        .unwrap();
    ledger.apply(&shield).await.unwrap();

    ledger
        .inject_failures([
            LedgerError::Rpc("connection reset".to_string()),
            LedgerError::Timeout(Duration::from_secs(1)),
        ])
        .await;
    assert_eq!(alice.balance(&NATIVE_ASSET).await.unwrap(), 100);
}

#[tokio::test]
async fn test_missing_relayer_error_mapping() {
    let config = config();
    let ledger = ledger(&config);
    let alice = client(Account::from_seed(ALICE_SEED).unwrap(), &ledger, config);

    let mut request = TransactionRequest::unshield(B256::repeat_byte(0xa2), 10, relayer(1));
    request.relayer = None;
    let result = alice.prepare(&request).await;
    assert!(matches!(
        result,
        Err(EngineError::Selection(SelectionError::RelayerFeeUndefined(
            Action::Unshield
        )))
    ));

    let account = Account::from_seed(ALICE_SEED).unwrap();
    let input = Utxo::new(&account, &[NATIVE_ASSET], &[10])
        .unwrap()
        .with_index(0);
    let result = TransactionParameters::new(TransactionParametersInput {
        recipient_sol: Some(B256::repeat_byte(0xa2)),
        relayer: None,
        ..parameters(Action::Unshield, vec![input], Vec::new(), account)
    })
    .map_err(EngineError::from);
    assert!(matches!(
        result,
        Err(EngineError::Validation(ValidationError::RelayerUndefined(
            Action::Unshield
        )))
    ));
}

fn parameters(
    action: Action,
    input_utxos: Vec<Utxo>,
    output_utxos: Vec<Utxo>,
    account: Account,
) -> TransactionParametersInput {
    TransactionParametersInput {
        action,
        input_utxos,
        output_utxos,
        verifier: VerifierConfig::Zero,
        sender_spl: None,
        sender_sol: None,
        recipient_spl: None,
        recipient_sol: None,
        relayer: None,
        account,
        program_id: B256::repeat_byte(0x01),
        merkle_tree_id: B256::repeat_byte(0x02),
        lookup_tables: config().lookup_tables,
    }
}

/// Field sum of one asset slot across `utxos`.
fn slot_sum(utxos: &[Utxo], slot: usize) -> U256 {
    utxos
        .iter()
        .map(|u| U256::from(u.amounts()[slot]))
        .fold(U256::ZERO, field_add)
}

fn out_request<'a>(
    in_utxos: &'a [Utxo],
    action: Action,
    change_account: &'a Account,
) -> OutUtxoRequest<'a> {
    OutUtxoRequest {
        in_utxos,
        recipients: &[],
        action,
        public_mint: None,
        public_amount_spl: None,
        public_amount_sol: None,
        relayer_fee: None,
        change_account,
        max_out: 2,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_shield_conserves_value(
        held_sol in 1u64..1_000,
        held_spl in 0u64..1_000,
        sol in 1u64..1_000_000,
        spl in 0u64..1_000_000,
    ) {
        let account = Account::from_seed(ALICE_SEED).unwrap();
        let inputs = vec![
            Utxo::new(&account, &[NATIVE_ASSET, mint()], &[held_sol, held_spl])
                .unwrap()
                .with_index(0),
        ];
        let outputs = create_out_utxos(&OutUtxoRequest {
            public_mint: Some(mint()),
            public_amount_spl: Some(spl),
            public_amount_sol: Some(sol),
            ..out_request(&inputs, Action::Shield, &account)
        })
        .unwrap();
        prop_assert_eq!(outputs.len(), 1);
        prop_assert_eq!(outputs[0].amounts(), &[held_sol + sol, held_spl + spl]);

        let params = TransactionParameters::new(TransactionParametersInput {
            sender_sol: Some(B256::repeat_byte(0xa1)),
            sender_spl: Some(B256::repeat_byte(0xb1)),
            ..parameters(Action::Shield, inputs, outputs, account)
        })
        .unwrap();
        prop_assert_eq!(params.public_amount_sol(), U256::from(sol));
        prop_assert_eq!(params.public_amount_spl(), U256::from(spl));
        for (slot, public) in [params.public_amount_sol(), params.public_amount_spl()]
            .into_iter()
            .enumerate()
        {
            prop_assert_eq!(
                field_add(slot_sum(params.input_utxos(), slot), public),
                slot_sum(params.output_utxos(), slot)
            );
        }
    }

    #[test]
    fn prop_transfer_conserves_value(
        held in 2u64..1_000_000,
        sent_share in 1u64..=100,
        fee in 0u64..1_000,
    ) {
        prop_assume!(fee < held);
        let sent = ((held - fee) * sent_share / 100).max(1);
        prop_assume!(sent + fee <= held);

        let account = Account::from_seed(ALICE_SEED).unwrap();
        let bob = Account::from_seed("integration-bob-seed-integration-bob-seed").unwrap();
        let inputs = vec![
            Utxo::new(&account, &[NATIVE_ASSET], &[held]).unwrap().with_index(0),
        ];
        let recipients = vec![Recipient {
            account: bob.clone(),
            mint: None,
            sol_amount: sent,
            spl_amount: 0,
        }];
        let outputs = create_out_utxos(&OutUtxoRequest {
            recipients: &recipients,
            relayer_fee: Some(fee),
            ..out_request(&inputs, Action::Transfer, &account)
        })
        .unwrap();
        prop_assert!(outputs.iter().all(|u| !u.is_zero()));
        prop_assert!(outputs.iter().any(|u| u.owner() == bob.public_key()));

        let params = TransactionParameters::new(TransactionParametersInput {
            relayer: Some(relayer(fee)),
            ..parameters(Action::Transfer, inputs, outputs, account)
        })
        .unwrap();
        prop_assert_eq!(params.public_amount_signed(0), Some(-(fee as i128)));
        prop_assert!(params.public_amount_spl().is_zero());
        prop_assert_eq!(
            field_add(slot_sum(params.input_utxos(), 0), params.public_amount_sol()),
            slot_sum(params.output_utxos(), 0)
        );
    }

    /// Native value sitting in a UTXO that also carries a mint is spendable.
    #[test]
    fn prop_native_in_spl_utxo_is_spendable(
        held_sol in 2u64..1_000_000,
        held_spl in 1u64..1_000_000,
        withdraw_share in 1u64..=100,
        fee in 0u64..1_000,
    ) {
        prop_assume!(fee < held_sol);
        let withdraw = ((held_sol - fee) * withdraw_share / 100).max(1);
        prop_assume!(withdraw + fee <= held_sol);

        let account = Account::from_seed(ALICE_SEED).unwrap();
        let available = vec![
            Utxo::new(&account, &[NATIVE_ASSET, mint()], &[held_sol, held_spl])
                .unwrap()
                .with_index(0),
        ];
        let inputs = select_in_utxos(&SelectionRequest {
            utxos: &available,
            action: Action::Unshield,
            public_mint: None,
            public_amount_spl: None,
            public_amount_sol: Some(withdraw),
            relayer_fee: Some(fee),
            recipients: &[],
            max_in: 2,
            max_out: 2,
        })
        .unwrap();
        prop_assert_eq!(&inputs, &available);

        let outputs = create_out_utxos(&OutUtxoRequest {
            public_amount_sol: Some(withdraw),
            relayer_fee: Some(fee),
            ..out_request(&inputs, Action::Unshield, &account)
        })
        .unwrap();
        prop_assert_eq!(outputs.len(), 1);
        prop_assert_eq!(outputs[0].assets()[1], mint());
        prop_assert_eq!(outputs[0].amounts(), &[held_sol - withdraw - fee, held_spl]);

        let params = TransactionParameters::new(TransactionParametersInput {
            recipient_sol: Some(B256::repeat_byte(0xa2)),
            relayer: Some(relayer(fee)),
            ..parameters(Action::Unshield, inputs, outputs, account)
        })
        .unwrap();
        prop_assert!(params.public_amount_spl().is_zero());
        prop_assert_eq!(
            params.public_amount_signed(0),
            Some(-((withdraw + fee) as i128))
        );
    }

    #[test]
    fn prop_shield_with_relayer_fee_rejected(
        sol in 1u64..1_000_000,
        fee in any::<u64>(),
    ) {
        let account = Account::from_seed(ALICE_SEED).unwrap();
        let selection = select_in_utxos(&SelectionRequest {
            utxos: &[],
            action: Action::Shield,
            public_mint: None,
            public_amount_spl: None,
            public_amount_sol: Some(sol),
            relayer_fee: Some(fee),
            recipients: &[],
            max_in: 2,
            max_out: 2,
        });
        prop_assert!(matches!(selection, Err(SelectionError::RelayerFeeDefined)));

        let outputs = create_out_utxos(&OutUtxoRequest {
            public_amount_sol: Some(sol),
            relayer_fee: Some(fee),
            ..out_request(&[], Action::Shield, &account)
        });
        prop_assert!(matches!(outputs, Err(SelectionError::RelayerFeeDefined)));
    }

    /// Σ inputs + public amount ≡ Σ outputs (mod p) for every asset slot.
    #[test]
    fn prop_unshield_conserves_value(
        a in 1u64..1_000_000,
        b in 0u64..1_000_000,
        withdraw_share in 0u64..=100,
        fee in 0u64..1_000,
    ) {
        let total = a + b;
        prop_assume!(fee < total);
        let withdraw = ((total - fee) * withdraw_share / 100).max(1);
        prop_assume!(withdraw + fee <= total);

        let account = Account::from_seed(ALICE_SEED).unwrap();
        let inputs = vec![
            Utxo::new(&account, &[NATIVE_ASSET], &[a]).unwrap().with_index(0),
            Utxo::new(&account, &[NATIVE_ASSET], &[b]).unwrap().with_index(1),
        ];
        let outputs = create_out_utxos(&OutUtxoRequest {
            in_utxos: &inputs,
            recipients: &[],
            action: Action::Unshield,
            public_mint: None,
            public_amount_spl: None,
            public_amount_sol: Some(withdraw),
            relayer_fee: Some(fee),
            change_account: &account,
            max_out: 2,
        })
        .unwrap();
        let change: u64 = outputs.iter().map(|u| u.amounts()[0]).sum();
        prop_assert_eq!(change, total - withdraw - fee);
        prop_assert!(outputs.iter().all(|u| !u.is_zero()));

        let params = TransactionParameters::new(TransactionParametersInput {
            action: Action::Unshield,
            input_utxos: inputs,
            output_utxos: outputs,
            verifier: VerifierConfig::Zero,
            sender_spl: None,
            sender_sol: None,
            recipient_spl: None,
            recipient_sol: Some(B256::repeat_byte(0xa2)),
            relayer: Some(relayer(fee)),
            account,
            program_id: B256::repeat_byte(0x01),
            merkle_tree_id: B256::repeat_byte(0x02),
            lookup_tables: LookupTables::default(),
        })
        .unwrap();

        let sum = |utxos: &[Utxo]| {
            utxos
                .iter()
                .map(|u| U256::from(u.amounts()[0]))
                .fold(U256::ZERO, field_add)
        };
        prop_assert_eq!(
            field_add(sum(params.input_utxos()), params.public_amount_sol()),
            sum(params.output_utxos())
        );
        prop_assert_eq!(
            params.public_amount_signed(0),
            Some(-((withdraw + fee) as i128))
        );
    }
}
