use crate::balance::{participants_of, round_to_cents, share, skip_overflowing};
use crate::schemas::{Expense, UserId};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::mem::swap;

#[derive(Clone, Debug)]
struct Position {
    user: UserId,
    amount: Decimal,
}

#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug)]
struct UserPair {
    low: UserId,
    high: UserId,
}

/// A suggested payment of `amount` from `from` to `to`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub from: UserId,
    pub to: UserId,
    pub amount: Decimal,
}

// Adds every delta to `totals`, or none of them when any sum overflows.
fn apply_all<K: Ord + Copy>(totals: &mut BTreeMap<K, Decimal>, deltas: &[(K, Decimal)]) -> bool {
    let mut staged: BTreeMap<K, Decimal> = BTreeMap::new();
    for &(key, delta) in deltas {
        let current = staged
            .get(&key)
            .or_else(|| totals.get(&key))
            .copied()
            .unwrap_or_default();
        match current.checked_add(delta) {
            Some(sum) => {
                staged.insert(key, sum);
            }
            None => return false,
        }
    }
    totals.extend(staged);
    true
}

/// Net position of every user in the ledger, rounded to cents. Positive means
/// the user is owed money.
pub fn net_positions(expenses: &[Expense]) -> BTreeMap<UserId, Decimal> {
    let mut positions: BTreeMap<UserId, Decimal> = BTreeMap::new();
    for expense in expenses {
        let Some(participants) = participants_of(expense) else {
            continue;
        };
        let per_person = share(expense.amount, participants.len());
        let Some(claimed) = per_person.checked_mul(Decimal::from(participants.len())) else {
            skip_overflowing(expense);
            continue;
        };
        let mut deltas = vec![(expense.payer, claimed)];
        deltas.extend(participants.iter().map(|&participant| (participant, -per_person)));
        if !apply_all(&mut positions, &deltas) {
            skip_overflowing(expense);
        }
    }
    positions
        .into_iter()
        .map(|(user, amount)| (user, round_to_cents(amount)))
        .collect()
}

// The transfers that happen if every participant pays every payer directly
fn pairwise_transfers(expenses: &[Expense]) -> Vec<Transfer> {
    let mut between_pairs: BTreeMap<UserPair, Decimal> = BTreeMap::new();

    for expense in expenses {
        let Some(participants) = participants_of(expense) else {
            continue;
        };
        let per_person = share(expense.amount, participants.len());
        let mut deltas = Vec::with_capacity(participants.len());
        for participant in participants {
            if participant == expense.payer {
                continue;
            }
            // Positive: `high` owes `low`. Keying by the ordered pair lets
            // debts in both directions cancel out.
            let (pair, amount) = if expense.payer < participant {
                (
                    UserPair {
                        low: expense.payer,
                        high: participant,
                    },
                    per_person,
                )
            } else {
                (
                    UserPair {
                        low: participant,
                        high: expense.payer,
                    },
                    -per_person,
                )
            };
            deltas.push((pair, amount));
        }
        if !apply_all(&mut between_pairs, &deltas) {
            skip_overflowing(expense);
        }
    }

    let mut transfers = Vec::new();
    for (pair, balance) in between_pairs {
        let amount = round_to_cents(balance.abs());
        if amount.is_zero() {
            continue;
        }
        let mut from = pair.high;
        let mut to = pair.low;
        if balance.is_sign_negative() {
            swap(&mut from, &mut to);
        }
        transfers.push(Transfer { from, to, amount });
    }
    transfers.sort_by(|a, b| (a.from, a.to).cmp(&(b.from, b.to)));
    transfers
}

// Greedily matches the largest debtor with the largest creditor
fn simplified_transfers(
    mut debtors: Vec<Position>,
    mut creditors: Vec<Position>,
) -> Vec<Transfer> {
    debtors.sort_by(|a, b| a.amount.cmp(&b.amount).then(b.user.cmp(&a.user)));
    creditors.sort_by(|a, b| a.amount.cmp(&b.amount).then(b.user.cmp(&a.user)));

    let mut transfers = Vec::new();

    while let (Some(debtor), Some(creditor)) = (debtors.last_mut(), creditors.last_mut()) {
        let amount = debtor.amount.min(creditor.amount);
        transfers.push(Transfer {
            from: debtor.user,
            to: creditor.user,
            amount,
        });
        debtor.amount -= amount;
        creditor.amount -= amount;
        if debtor.amount.is_zero() {
            debtors.pop();
        }
        if creditor.amount.is_zero() {
            creditors.pop();
        }
    }
    transfers
}

/// Transfers that settle every balance in the ledger.
///
/// Rounding each position to cents can leave a cent unmatched; it stays with
/// whichever side ends up larger.
pub fn plan_settlements(expenses: &[Expense]) -> Vec<Transfer> {
    let mut debtors = Vec::new();
    let mut creditors = Vec::new();

    for (user, amount) in net_positions(expenses) {
        if amount.is_zero() {
            continue;
        }
        let position = Position {
            user,
            amount: amount.abs(),
        };
        if amount.is_sign_negative() {
            debtors.push(position);
        } else {
            creditors.push(position);
        }
    }

    let pairwise = pairwise_transfers(expenses);
    let simplified = simplified_transfers(debtors, creditors);

    // The greedy plan is usually shorter, but not always
    if simplified.len() < pairwise.len() {
        simplified
    } else {
        pairwise
    }
}
