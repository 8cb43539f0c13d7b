//! End-to-end walk through shield, unshield and transfer against an
//! in-memory ledger and a mock prover.

use std::{
    path::PathBuf,
    sync::Arc,
};

use alloy::primitives::B256;
use anyhow::Context;
use clap::Parser;
use shielded_tx_engine::{
    EngineConfig,
    ShieldedClient,
    TransactionRequest,
    adapters::{
        mock_ledger::MockLedger,
        mock_prover::MockProver,
    },
    domain::{
        account::Account,
        selector::Recipient,
        transaction_params::Relayer,
        utxo::NATIVE_ASSET,
    },
};
use tracing::info;

#[derive(clap::Parser)]
#[command(name = "demo", about = "Shielded transaction engine demo")]
struct Args {
    /// Optional TOML configuration; defaults are used when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for the demo sender (at least 32 bytes).
    #[arg(long, default_value = "demo-alice-seed-demo-alice-seed-demo-alice")]
    seed: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // ── Config ──
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if args.config.is_none() {
        config.ledger.program_id = B256::repeat_byte(0x01);
        config.ledger.merkle_tree_id = B256::repeat_byte(0x02);
    }

    let ledger = Arc::new(MockLedger::new(
        config.accumulator.height,
        config.accumulator.root_history_size,
    )?);
    let alice = Account::from_seed(&args.seed)?;
    let bob = Account::random();
    info!(alice = %alice.public_key(), bob = %bob.public_key(), "Accounts ready");

    let alice_client = ShieldedClient::new(
        alice,
        Arc::clone(&ledger),
        MockProver::new(),
        config.clone(),
    );
    let bob_client = ShieldedClient::new(bob, Arc::clone(&ledger), MockProver::new(), config);
    let relayer = Relayer {
        pubkey: B256::repeat_byte(0x0f),
        fee: 5,
    };

    // ── Step 1: Shield 100 ──
    let shield = alice_client
        .prepare(&TransactionRequest::shield(B256::repeat_byte(0xa1), 100))
        .await?;
    ledger.apply(&shield).await?;
    info!(
        balance = alice_client.balance(&NATIVE_ASSET).await?,
        "Alice shielded 100"
    );

    // ── Step 2: Unshield 30, relayer fee 5 ──
    let unshield = alice_client
        .prepare(&TransactionRequest::unshield(
            B256::repeat_byte(0xa2),
            30,
            relayer,
        ))
        .await?;
    ledger.apply(&unshield).await?;
    info!(
        public_amount_sol = %unshield.params.public_amount_sol(),
        received = %unshield.params.public_amount_sol_before_fee(),
        balance = alice_client.balance(&NATIVE_ASSET).await?,
        "Alice unshielded 30"
    );

    // ── Step 3: Transfer 20 to Bob ──
    let bob_payee = Account::from_public_key(&bob_client.account().public_key_bytes());
    let transfer = alice_client
        .prepare(&TransactionRequest::transfer(
            vec![Recipient {
                account: bob_payee,
                mint: None,
                sol_amount: 20,
                spl_amount: 0,
            }],
            relayer,
        ))
        .await?;
    ledger.apply(&transfer).await?;
    info!(
        alice = alice_client.balance(&NATIVE_ASSET).await?,
        bob = bob_client.balance(&NATIVE_ASSET).await?,
        proof_bytes = transfer.proof.to_bytes().len(),
        "Alice transferred 20 to Bob"
    );

    Ok(())
}
