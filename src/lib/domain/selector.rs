//! Input selection and output construction for a transaction.
//!
//! Amounts are summed as `u128` so that up to ten `u64` inputs cannot overflow.

use alloy::primitives::B256;

use super::{
    account::Account,
    action::Action,
    utxo::{
        N_ASSETS,
        NATIVE_ASSET,
        Utxo,
        UtxoError,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("NO_UTXOS_PROVIDED: {0} needs at least one input utxo")]
    NoUtxosProvided(Action),
    #[error("NO_PUBLIC_AMOUNTS_PROVIDED: {0} needs a public sol or spl amount")]
    NoPublicAmountsProvided(Action),
    #[error("NO_PUBLIC_MINT_PROVIDED: a public spl amount needs a mint")]
    NoPublicMintProvided,
    #[error("RELAYER_FEE_UNDEFINED: {0} needs a relayer fee")]
    RelayerFeeUndefined(Action),
    #[error("RELAYER_FEE_DEFINED: shield does not pay a relayer")]
    RelayerFeeDefined,
    #[error("INVALID_NUMBER_OF_RECIPIENTS: {count} recipients, at most {max} allowed")]
    InvalidNumberOfRecipients { count: usize, max: usize },
    #[error("FAILED_TO_FIND_UTXO_COMBINATION: no inputs cover {target} of asset {asset}")]
    FailedToFindUtxoCombination { asset: B256, target: u128 },
    #[error("INVALID_RECIPIENT_MINT: recipient asset {0} is neither an input asset nor the public mint")]
    InvalidRecipientMint(B256),
    #[error(
        "RECIPIENTS_SUM_AMOUNT_MISMATCH: recipients want {requested} of asset {asset}, only {available} available"
    )]
    RecipientsSumAmountMismatch {
        asset: B256,
        requested: u128,
        available: u128,
    },
    #[error("INVALID_OUTPUT_UTXO_LENGTH: {0}")]
    InvalidOutputUtxoLength(String),
    #[error("insufficient funds of asset {asset}: need {required}, have {available}")]
    InsufficientFunds {
        asset: B256,
        required: u128,
        available: u128,
    },
    #[error("change amount of asset {0} does not fit in u64")]
    AmountOverflow(B256),
    #[error(transparent)]
    Utxo(#[from] UtxoError),
}

/// A shielded payee.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub account: Account,
    pub mint: Option<B256>,
    pub sol_amount: u64,
    pub spl_amount: u64,
}

impl Recipient {
    fn spl_mint(&self) -> Result<Option<B256>, SelectionError> {
        if self.spl_amount == 0 {
            return Ok(None);
        }
        match self.mint {
            Some(mint) if mint != NATIVE_ASSET => Ok(Some(mint)),
            other => Err(SelectionError::InvalidRecipientMint(
                other.unwrap_or(NATIVE_ASSET),
            )),
        }
    }
}

/// Build one UTXO per recipient.
pub fn create_recipient_utxos(recipients: &[Recipient]) -> Result<Vec<Utxo>, SelectionError> {
    recipients
        .iter()
        .map(|r| {
            let utxo = match r.spl_mint()? {
                Some(mint) => Utxo::new(
                    &r.account,
                    &[NATIVE_ASSET, mint],
                    &[r.sol_amount, r.spl_amount],
                )?,
                None => Utxo::new(&r.account, &[NATIVE_ASSET], &[r.sol_amount])?,
            };
            Ok(utxo)
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct SelectionRequest<'a> {
    pub utxos: &'a [Utxo],
    pub action: Action,
    pub public_mint: Option<B256>,
    pub public_amount_spl: Option<u64>,
    pub public_amount_sol: Option<u64>,
    pub relayer_fee: Option<u64>,
    pub recipients: &'a [Recipient],
    pub max_in: usize,
    pub max_out: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct OutUtxoRequest<'a> {
    pub in_utxos: &'a [Utxo],
    pub recipients: &'a [Recipient],
    pub action: Action,
    pub public_mint: Option<B256>,
    pub public_amount_spl: Option<u64>,
    pub public_amount_sol: Option<u64>,
    pub relayer_fee: Option<u64>,
    pub change_account: &'a Account,
    pub max_out: usize,
}

fn amount(value: Option<u64>) -> u128 {
    value.unwrap_or(0) as u128
}

fn check_public_amounts(
    action: Action,
    public_mint: Option<B256>,
    public_amount_spl: Option<u64>,
    public_amount_sol: Option<u64>,
) -> Result<(), SelectionError> {
    let spl = amount(public_amount_spl);
    let sol = amount(public_amount_sol);
    if action != Action::Transfer && spl == 0 && sol == 0 {
        return Err(SelectionError::NoPublicAmountsProvided(action));
    }
    if spl > 0 && public_mint.is_none_or(|m| m == NATIVE_ASSET) {
        return Err(SelectionError::NoPublicMintProvided);
    }
    Ok(())
}

/// Shield is paid by the depositor; unshield and transfer need a relayer.
fn check_relayer_fee(action: Action, relayer_fee: Option<u64>) -> Result<(), SelectionError> {
    match (action, relayer_fee) {
        (Action::Shield, Some(_)) => Err(SelectionError::RelayerFeeDefined),
        (Action::Unshield | Action::Transfer, None) => {
            Err(SelectionError::RelayerFeeUndefined(action))
        }
        _ => Ok(()),
    }
}

fn check_recipients(
    action: Action,
    recipients: &[Recipient],
    max_out: usize,
) -> Result<(), SelectionError> {
    // one output slot is reserved for change
    let max = max_out.saturating_sub(1);
    if recipients.len() > max || (action == Action::Transfer && recipients.is_empty()) {
        return Err(SelectionError::InvalidNumberOfRecipients {
            count: recipients.len(),
            max,
        });
    }
    Ok(())
}

/// The single spl asset a transaction moves, if any.
fn spend_mint(
    public_mint: Option<B256>,
    public_amount_spl: Option<u64>,
    recipients: &[Recipient],
) -> Result<Option<B256>, SelectionError> {
    let mut mint = public_mint.filter(|m| *m != NATIVE_ASSET && amount(public_amount_spl) > 0);
    for recipient in recipients {
        if let Some(recipient_mint) = recipient.spl_mint()? {
            match mint {
                None => mint = Some(recipient_mint),
                Some(m) if m == recipient_mint => {}
                Some(_) => return Err(SelectionError::InvalidRecipientMint(recipient_mint)),
            }
        }
    }
    Ok(mint)
}

/// Choose input UTXOs for a transaction.
///
/// Shield returns existing UTXOs of the shielded asset so the deposit is
/// merged into them. Unshield and transfer search for inputs covering the
/// withdrawn or transferred amount plus the relayer fee.
pub fn select_in_utxos(request: &SelectionRequest<'_>) -> Result<Vec<Utxo>, SelectionError> {
    let action = request.action;
    check_relayer_fee(action, request.relayer_fee)?;
    if action != Action::Shield && request.utxos.is_empty() {
        return Err(SelectionError::NoUtxosProvided(action));
    }
    check_public_amounts(
        action,
        request.public_mint,
        request.public_amount_spl,
        request.public_amount_sol,
    )?;
    check_recipients(action, request.recipients, request.max_out)?;

    let mint = spend_mint(
        request.public_mint,
        request.public_amount_spl,
        request.recipients,
    )?;

    if action == Action::Shield {
        return Ok(select_merge_inputs(request.utxos, mint, request.max_in));
    }

    let fee = amount(request.relayer_fee);
    let recipients_sol: u128 = request.recipients.iter().map(|r| r.sol_amount as u128).sum();
    let recipients_spl: u128 = request.recipients.iter().map(|r| r.spl_amount as u128).sum();
    let (spl_target, sol_target) = match action {
        Action::Unshield => (
            amount(request.public_amount_spl) + recipients_spl,
            amount(request.public_amount_sol) + recipients_sol + fee,
        ),
        _ => (recipients_spl, recipients_sol + fee),
    };

    match mint {
        Some(mint) if spl_target > 0 => {
            let candidates: Vec<&Utxo> = request
                .utxos
                .iter()
                .filter(|u| u.assets()[1] == mint && u.amount_of(&mint) > 0)
                .collect();
            let mut selected = pick_covering(
                &candidates,
                |u| u.amount_of(&mint) as u128,
                spl_target,
                request.max_in,
            )
            .ok_or(SelectionError::FailedToFindUtxoCombination {
                asset: mint,
                target: spl_target,
            })?;

            let fee_pool: Vec<&Utxo> = request
                .utxos
                .iter()
                .filter(|u| u.assets()[1] == mint || u.assets()[1] == NATIVE_ASSET)
                .collect();
            top_up_native(
                &mut selected,
                &fee_pool,
                sol_target,
                request.max_in,
                |s| sum_of(s, &mint) >= spl_target,
            )?;
            Ok(selected)
        }
        _ => {
            let candidates: Vec<&Utxo> = request
                .utxos
                .iter()
                .filter(|u| u.amount_of(&NATIVE_ASSET) > 0)
                .collect();
            pick_covering(
                &candidates,
                |u| u.amount_of(&NATIVE_ASSET) as u128,
                sol_target,
                request.max_in,
            )
            .ok_or(SelectionError::FailedToFindUtxoCombination {
                asset: NATIVE_ASSET,
                target: sol_target,
            })
        }
    }
}

fn sum_of(utxos: &[Utxo], asset: &B256) -> u128 {
    utxos.iter().map(|u| u.amount_of(asset) as u128).sum()
}

fn select_merge_inputs(utxos: &[Utxo], mint: Option<B256>, max_in: usize) -> Vec<Utxo> {
    let asset = mint.unwrap_or(NATIVE_ASSET);
    let mut candidates: Vec<&Utxo> = utxos
        .iter()
        .filter(|u| u.assets()[1] == asset && u.amount_of(&asset) > 0)
        .collect();
    candidates.sort_by_key(|u| std::cmp::Reverse(u.amount_of(&asset)));
    candidates.into_iter().take(max_in).cloned().collect()
}

/// Exact single, exact pair, smallest covering single or pair, then greedy
/// largest-first up to `max_in`.
fn pick_covering(
    candidates: &[&Utxo],
    value: impl Fn(&Utxo) -> u128,
    target: u128,
    max_in: usize,
) -> Option<Vec<Utxo>> {
    if max_in == 0 {
        return None;
    }

    if let Some(single) = candidates.iter().find(|u| value(**u) == target) {
        return Some(vec![(*single).clone()]);
    }

    let pairs = || {
        (0..candidates.len()).flat_map(move |i| ((i + 1)..candidates.len()).map(move |j| (i, j)))
    };
    if max_in >= 2 {
        let exact_pair =
            pairs().find(|(i, j)| value(candidates[*i]) + value(candidates[*j]) == target);
        if let Some((i, j)) = exact_pair {
            return Some(vec![candidates[i].clone(), candidates[j].clone()]);
        }
    }

    let best_single = candidates
        .iter()
        .filter(|u| value(**u) >= target)
        .min_by_key(|u| value(**u))
        .map(|u| (value(*u), vec![(*u).clone()]));
    let best_pair = if max_in >= 2 {
        pairs()
            .map(|(i, j)| (value(candidates[i]) + value(candidates[j]), i, j))
            .filter(|(total, _, _)| *total >= target)
            .min_by_key(|(total, _, _)| *total)
            .map(|(total, i, j)| (total, vec![candidates[i].clone(), candidates[j].clone()]))
    } else {
        None
    };
    let best = match (best_single, best_pair) {
        (Some(s), Some(p)) => Some(if p.0 < s.0 { p } else { s }),
        (s, p) => s.or(p),
    };
    if let Some((_, picked)) = best {
        return Some(picked);
    }

    let mut sorted: Vec<&Utxo> = candidates.to_vec();
    sorted.sort_by_key(|u| std::cmp::Reverse(value(*u)));
    let mut picked = Vec::new();
    let mut total = 0u128;
    for utxo in sorted.into_iter().take(max_in) {
        total += value(utxo);
        picked.push(utxo.clone());
        if total >= target {
            return Some(picked);
        }
    }
    None
}

/// Add the smallest native-holding UTXO that lifts the native balance of
/// `selected` to `target`, replacing the weakest member when already full.
fn top_up_native(
    selected: &mut Vec<Utxo>,
    pool: &[&Utxo],
    target: u128,
    max_in: usize,
    keeps_primary: impl Fn(&[Utxo]) -> bool,
) -> Result<(), SelectionError> {
    let native = sum_of(selected, &NATIVE_ASSET);
    if native >= target {
        return Ok(());
    }

    let mut candidates: Vec<&Utxo> = pool
        .iter()
        .copied()
        .filter(|u| u.amount_of(&NATIVE_ASSET) > 0 && !selected.contains(u))
        .collect();
    candidates.sort_by_key(|u| u.amount_of(&NATIVE_ASSET));

    for candidate in &candidates {
        if selected.len() < max_in {
            if native + candidate.amount_of(&NATIVE_ASSET) as u128 >= target {
                selected.push((*candidate).clone());
                return Ok(());
            }
            continue;
        }

        let mut order: Vec<usize> = (0..selected.len()).collect();
        order.sort_by_key(|i| selected[*i].amount_of(&NATIVE_ASSET));
        for i in order {
            let mut trial = selected.clone();
            trial[i] = (*candidate).clone();
            if sum_of(&trial, &NATIVE_ASSET) >= target && keeps_primary(&trial) {
                *selected = trial;
                return Ok(());
            }
        }
    }

    // no single addition suffices: add the largest until covered
    let mut total = native;
    for candidate in candidates.iter().rev() {
        if selected.len() >= max_in {
            break;
        }
        total += candidate.amount_of(&NATIVE_ASSET) as u128;
        selected.push((*candidate).clone());
        if total >= target {
            return Ok(());
        }
    }
    Err(SelectionError::FailedToFindUtxoCombination {
        asset: NATIVE_ASSET,
        target,
    })
}

/// Build the output UTXOs: a change UTXO for `change_account` followed by
/// one UTXO per recipient. The change UTXO is left out when it would be empty.
///
/// change[a] = inputs[a] - recipients[a] (+ shielded | - unshielded)[a], and the
/// relayer fee is taken from the native change.
pub fn create_out_utxos(request: &OutUtxoRequest<'_>) -> Result<Vec<Utxo>, SelectionError> {
    let action = request.action;
    check_relayer_fee(action, request.relayer_fee)?;
    check_public_amounts(
        action,
        request.public_mint,
        request.public_amount_spl,
        request.public_amount_sol,
    )?;
    check_recipients(action, request.recipients, request.max_out)?;

    let mut spl_assets: Vec<B256> = Vec::new();
    for utxo in request.in_utxos {
        for asset in &utxo.assets()[1..] {
            if *asset != NATIVE_ASSET && !spl_assets.contains(asset) {
                spl_assets.push(*asset);
            }
        }
    }
    if amount(request.public_amount_spl) > 0 {
        if let Some(mint) = request.public_mint {
            if !spl_assets.contains(&mint) {
                spl_assets.push(mint);
            }
        }
    }
    for recipient in request.recipients {
        if let Some(mint) = recipient.spl_mint()? {
            if !spl_assets.contains(&mint) {
                return Err(SelectionError::InvalidRecipientMint(mint));
            }
        }
    }
    if spl_assets.len() > N_ASSETS - 1 {
        return Err(SelectionError::InvalidOutputUtxoLength(format!(
            "{} distinct assets do not fit a {N_ASSETS}-asset change utxo",
            spl_assets.len() + 1
        )));
    }
    let spl = spl_assets.first().copied();

    let (shield_sol, shield_spl, unshield_sol, unshield_spl) = match action {
        Action::Shield => (
            amount(request.public_amount_sol),
            amount(request.public_amount_spl),
            0,
            0,
        ),
        Action::Unshield => (
            0,
            0,
            amount(request.public_amount_sol),
            amount(request.public_amount_spl),
        ),
        Action::Transfer => (0, 0, 0, 0),
    };
    let fee = amount(request.relayer_fee);

    let change_sol = change_for(
        NATIVE_ASSET,
        sum_of(request.in_utxos, &NATIVE_ASSET) + shield_sol,
        request.recipients.iter().map(|r| r.sol_amount as u128).sum(),
        unshield_sol + fee,
    )?;
    let change_spl = match spl {
        Some(mint) => change_for(
            mint,
            sum_of(request.in_utxos, &mint) + shield_spl,
            request.recipients.iter().map(|r| r.spl_amount as u128).sum(),
            unshield_spl,
        )?,
        None => 0,
    };

    let mut outputs = Vec::with_capacity(request.recipients.len() + 1);
    if change_sol > 0 || change_spl > 0 {
        outputs.push(match spl {
            Some(mint) => Utxo::new(
                request.change_account,
                &[NATIVE_ASSET, mint],
                &[change_sol, change_spl],
            )?,
            None => Utxo::new(request.change_account, &[NATIVE_ASSET], &[change_sol])?,
        });
    }
    outputs.extend(create_recipient_utxos(request.recipients)?);
    Ok(outputs)
}

fn change_for(
    asset: B256,
    available: u128,
    to_recipients: u128,
    outflow: u128,
) -> Result<u64, SelectionError> {
    if to_recipients > available {
        return Err(SelectionError::RecipientsSumAmountMismatch {
            asset,
            requested: to_recipients,
            available,
        });
    }
    let residual = available - to_recipients;
    let change = residual
        .checked_sub(outflow)
        .ok_or(SelectionError::InsufficientFunds {
            asset,
            required: to_recipients + outflow,
            available,
        })?;
    u64::try_from(change).map_err(|_| SelectionError::AmountOverflow(asset))
}
