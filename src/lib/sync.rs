use std::{
    future::Future,
    time::Duration,
};

use alloy::primitives::B256;
use tracing::{
    debug,
    info,
    warn,
};

use crate::{
    config::{
        EngineConfig,
        RetryConfig,
    },
    domain::{
        account::Account,
        commitment::Commitment,
        merkle::{
            ConsistencyError,
            LeafRecord,
            MerkleAccumulator,
            MerkleState,
        },
        nullifier::Nullifier,
        transaction_params::ENCRYPTED_UTXO_SLOT,
        utxo::{
            ENCRYPTED_UTXO_LENGTH,
            LookupTables,
            Utxo,
        },
    },
    error::{
        EngineError,
        StateError,
    },
    ports::ledger::{
        Ledger,
        LedgerError,
    },
};

/// Local accumulator rebuilt from the ledger together with the ledger's own
/// view it was checked against.
#[derive(Debug, Clone)]
pub struct SyncedLedger {
    pub accumulator: MerkleAccumulator,
    pub state: MerkleState,
    pub records: Vec<LeafRecord>,
}

/// Run a ledger read under `timeout`, retrying transient failures with
/// exponential backoff. Non-transient errors are returned immediately.
pub async fn fetch_with_retry<T, F, Fut>(
    what: &str,
    timeout: Duration,
    retry: &RetryConfig,
    mut op: F,
) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let err = match tokio::time::timeout(timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => LedgerError::Timeout(timeout),
        };
        if !err.is_transient() || attempt >= max_attempts {
            warn!(what, attempt, error = %err, "Ledger fetch failed");
            return Err(err);
        }
        let backoff = retry.backoff(attempt);
        warn!(what, attempt, error = %err, ?backoff, "Ledger fetch failed, retrying");
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

/// Rebuild the accumulator from every leaf record and check it against the
/// ledger's current root. A mismatch is fatal: the local tree cannot be used
/// to prove anything.
pub async fn sync_accumulator<L: Ledger>(
    ledger: &L,
    config: &EngineConfig,
) -> Result<SyncedLedger, EngineError> {
    let timeout = config.ledger.fetch_timeout;
    let retry = &config.ledger.retry;

    let state = fetch_with_retry("merkle state", timeout, retry, || {
        ledger.fetch_merkle_state()
    })
    .await?;
    let records = fetch_with_retry("leaf records", timeout, retry, || {
        ledger.fetch_leaf_records(0)
    })
    .await?;

    let accumulator = MerkleAccumulator::from_leaf_records(
        &records,
        config.accumulator.height,
        config.accumulator.root_history_size,
    )?;
    if accumulator.next_index() != state.next_index {
        return Err(ConsistencyError::LeafRecordGap {
            expected: state.next_index,
            found: accumulator.next_index(),
        }
        .into());
    }

    let ledger_root = state.current_root()?;
    if accumulator.root() != ledger_root {
        return Err(ConsistencyError::RootMismatch {
            local: accumulator.root(),
            ledger: ledger_root,
        }
        .into());
    }

    info!(
        leaves = accumulator.next_index(),
        root = %ledger_root,
        "Accumulator synced with ledger"
    );
    Ok(SyncedLedger {
        accumulator,
        state,
        records,
    })
}

/// Fail if any of `nullifiers` is already on the ledger.
pub async fn ensure_unspent<L: Ledger>(
    ledger: &L,
    nullifiers: &[Nullifier],
    config: &EngineConfig,
) -> Result<(), EngineError> {
    let timeout = config.ledger.fetch_timeout;
    let retry = &config.ledger.retry;
    for (input, nullifier) in nullifiers.iter().enumerate() {
        let spent = fetch_with_retry("nullifier", timeout, retry, || {
            ledger.is_nullifier_spent(*nullifier)
        })
        .await?;
        if spent {
            return Err(StateError::NullifierAlreadySpent {
                input,
                nullifier: nullifier.0,
            }
            .into());
        }
    }
    Ok(())
}

/// Decrypt every output in `records` that belongs to `account`.
///
/// Outputs the account sent to itself are tried with the tree-bound
/// symmetric key first, then as a recipient.
pub fn scan_utxos(
    records: &[LeafRecord],
    account: &Account,
    merkle_tree_id: &B256,
    tables: &LookupTables,
) -> Vec<Utxo> {
    let mut found = Vec::new();
    for record in records {
        let leaves = [record.node_left, record.node_right];
        for (slot, leaf) in leaves.iter().enumerate() {
            let start = slot * ENCRYPTED_UTXO_SLOT;
            let Some(encrypted) = record
                .encrypted_outputs
                .get(start..start + ENCRYPTED_UTXO_LENGTH)
            else {
                continue;
            };
            let commitment = Commitment(*leaf);
            let index = Some(record.left_leaf_index + slot as u64);
            let utxo = Utxo::decrypt_symmetric(
                encrypted,
                account,
                merkle_tree_id,
                &commitment,
                index,
                tables,
            )
            .or_else(|_| Utxo::decrypt(encrypted, account, &commitment, index, tables));
            match utxo {
                Ok(utxo) => found.push(utxo),
                Err(e) => debug!(leaf = %leaf, error = %e, "Skipping output not addressed to account"),
            }
        }
    }
    found
}

/// Sync, scan for the account's outputs and drop the ones already spent.
pub async fn fetch_unspent_utxos<L: Ledger>(
    ledger: &L,
    account: &Account,
    config: &EngineConfig,
) -> Result<(SyncedLedger, Vec<Utxo>), EngineError> {
    let synced = sync_accumulator(ledger, config).await?;
    let owned = scan_utxos(
        &synced.records,
        account,
        &config.ledger.merkle_tree_id,
        &config.lookup_tables,
    );

    let timeout = config.ledger.fetch_timeout;
    let retry = &config.ledger.retry;
    let mut unspent = Vec::with_capacity(owned.len());
    for utxo in owned {
        let nullifier = utxo.nullifier(account)?;
        let spent = fetch_with_retry("nullifier", timeout, retry, || {
            ledger.is_nullifier_spent(nullifier)
        })
        .await?;
        if !spent {
            unspent.push(utxo);
        }
    }
    debug!(unspent = unspent.len(), "Scanned ledger for owned UTXOs");
    Ok((synced, unspent))
}
