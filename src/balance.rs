use log::{debug, warn};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::schemas::{Expense, UserId};

/// What one user owes and is owed across the whole ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Balances {
    pub owed: Decimal,
    pub owed_to: Decimal,
    pub net: Decimal,
}

/// Rounds a money total to cents, half-up, carrying two decimals.
///
/// Values with more than 26 integer digits cannot hold two decimals and keep
/// scale 0. Intake caps amounts far below that, so only old rows can get there.
pub fn round_to_cents(amount: Decimal) -> Decimal {
    let mut cents = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    cents.rescale(2);
    cents
}

/// One person's share when `amount` is split evenly between the payer and
/// `participants` other users.
pub fn share(amount: Decimal, participants: usize) -> Decimal {
    amount / Decimal::from(participants + 1)
}

/// Participants of an expense, or `None` when its stored split is malformed.
pub(crate) fn participants_of(expense: &Expense) -> Option<Vec<UserId>> {
    let participants = expense.split_with.participants();
    if participants.is_none() {
        debug!(
            "Skipping expense {}: malformed split_with {:?}",
            expense.id, expense.split_with
        );
    }
    participants
}

pub(crate) fn skip_overflowing(expense: &Expense) {
    warn!(
        "Skipping expense {}: amount {} overflows the running total",
        expense.id, expense.amount
    );
}

/// Total `user` owes to other payers, rounded to cents.
pub fn owed_by(user: UserId, expenses: &[Expense]) -> Decimal {
    let mut owed = Decimal::ZERO;
    for expense in expenses {
        if expense.payer == user {
            continue;
        }
        let Some(participants) = participants_of(expense) else {
            continue;
        };
        if participants.contains(&user) {
            match owed.checked_add(share(expense.amount, participants.len())) {
                Some(total) => owed = total,
                None => skip_overflowing(expense),
            }
        }
    }
    round_to_cents(owed)
}

/// Total other participants owe `user` for expenses `user` paid, rounded to
/// cents.
pub fn owed_to(user: UserId, expenses: &[Expense]) -> Decimal {
    let mut owed_to = Decimal::ZERO;
    for expense in expenses.iter().filter(|expense| expense.payer == user) {
        let Some(participants) = participants_of(expense) else {
            continue;
        };
        let claimed = share(expense.amount, participants.len())
            .checked_mul(Decimal::from(participants.len()))
            .and_then(|claimed| owed_to.checked_add(claimed));
        match claimed {
            Some(total) => owed_to = total,
            None => skip_overflowing(expense),
        }
    }
    round_to_cents(owed_to)
}

pub fn compute_balances(user: UserId, expenses: &[Expense]) -> Balances {
    let owed = owed_by(user, expenses);
    let owed_to = owed_to(user, expenses);
    Balances {
        owed,
        owed_to,
        net: owed_to - owed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::SplitWith;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn expense(id: i64, amount: &str, payer: UserId, split_with: SplitWith) -> Expense {
        Expense {
            id,
            description: format!("expense {id}"),
            amount: dec(amount),
            group: None,
            payer,
            split_with,
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        }
    }

    #[test]
    fn empty_ledger_owes_nothing() {
        let balances = compute_balances(1, &[]);
        assert_eq!(balances.owed, dec("0.00"));
        assert_eq!(balances.owed_to, dec("0.00"));
        assert_eq!(balances.net, Decimal::ZERO);
    }

    #[test]
    fn three_way_split() {
        let ledger = vec![expense(1, "90", 1, SplitWith::Ids(vec![2, 3]))];
        assert_eq!(owed_by(2, &ledger), dec("30.00"));
        assert_eq!(owed_by(3, &ledger), dec("30.00"));
        assert_eq!(owed_to(1, &ledger), dec("60.00"));
        assert_eq!(owed_by(1, &ledger), Decimal::ZERO);
        assert_eq!(owed_to(2, &ledger), Decimal::ZERO);
    }

    #[test]
    fn malformed_split_is_skipped_for_everyone() {
        let ledger = vec![
            expense(1, "90", 1, SplitWith::Delimited("abc,2".to_string())),
            expense(2, "10", 3, SplitWith::Ids(vec![2])),
        ];
        for user in 1..=3 {
            let balances = compute_balances(user, &ledger[..1]);
            assert_eq!(balances, Balances::default());
        }
        assert_eq!(owed_by(2, &ledger), dec("5.00"));
        assert_eq!(owed_to(1, &ledger), Decimal::ZERO);
    }

    #[test]
    fn legacy_delimited_rows_count() {
        let ledger = vec![expense(1, "90", 1, SplitWith::Delimited("2,3".to_string()))];
        assert_eq!(owed_by(3, &ledger), dec("30.00"));
        assert_eq!(owed_to(1, &ledger), dec("60.00"));
    }

    #[test]
    fn empty_split_leaves_payer_with_full_amount() {
        let ledger = vec![expense(1, "42.50", 1, SplitWith::Ids(vec![]))];
        assert_eq!(owed_to(1, &ledger), Decimal::ZERO);
        assert_eq!(owed_by(1, &ledger), Decimal::ZERO);
    }

    #[test]
    fn owed_to_matches_closed_form() {
        for n in 0..6usize {
            let participants: Vec<UserId> = (2..2 + n as i64).collect();
            let ledger = vec![expense(1, "100", 1, SplitWith::Ids(participants))];
            let expected = round_to_cents(dec("100") * Decimal::from(n) / Decimal::from(n + 1));
            assert_eq!(owed_to(1, &ledger), expected);
        }
    }

    #[test]
    fn shares_reconstruct_the_amount() {
        let amount = dec("100");
        let n = 2;
        let ledger = vec![expense(1, "100", 1, SplitWith::Ids(vec![2, 3]))];
        let owed: Decimal = [2, 3].iter().map(|u| owed_by(*u, &ledger)).sum();
        let payer_share = round_to_cents(share(amount, n));
        assert_eq!(owed, dec("66.66"));
        assert_eq!(owed_to(1, &ledger), dec("66.67"));
        assert!((owed + payer_share - amount).abs() <= dec("0.01") * Decimal::from(n));
    }

    #[test]
    fn totals_round_half_up() {
        // 0.01 / 2 = 0.005
        let ledger = vec![expense(1, "0.01", 1, SplitWith::Ids(vec![2]))];
        assert_eq!(owed_by(2, &ledger), dec("0.01"));
        assert_eq!(owed_to(1, &ledger), dec("0.01"));
    }

    #[test]
    fn shares_are_summed_before_rounding() {
        // Three times 10/3 rounds once to 10.00, not to 3 * 3.33.
        let ledger: Vec<Expense> = (1..=3)
            .map(|id| expense(id, "10", 1, SplitWith::Ids(vec![2, 3])))
            .collect();
        assert_eq!(owed_by(2, &ledger), dec("10.00"));
    }

    #[test]
    fn huge_legacy_amounts_do_not_overflow() {
        let ledger: Vec<Expense> = (1..=3)
            .map(|id| expense(id, "79228162514264337593543950335", 1, SplitWith::Ids(vec![2])))
            .chain(std::iter::once(expense(4, "10", 1, SplitWith::Ids(vec![2]))))
            .collect();
        let owed = owed_by(2, &ledger);
        let owed_to = owed_to(1, &ledger);
        // Rows that would overflow are skipped, the same ones on both sides.
        assert_eq!(owed, owed_to);
        assert!(owed > dec("39614081257132168796771975167"));
    }

    #[test]
    fn rounding_keeps_scale_zero_past_the_decimal_range() {
        assert_eq!(round_to_cents(Decimal::MAX).scale(), 0);
        assert_eq!(round_to_cents(dec("999999999999999.99")).to_string(), "999999999999999.99");
    }

    #[test]
    fn recomputation_is_idempotent() {
        let ledger = vec![
            expense(1, "90", 1, SplitWith::Ids(vec![2, 3])),
            expense(2, "20", 2, SplitWith::Ids(vec![1])),
        ];
        let first = compute_balances(1, &ledger);
        let second = compute_balances(1, &ledger);
        assert_eq!(first, second);
        assert_eq!(first.owed, dec("10.00"));
        assert_eq!(first.owed_to, dec("60.00"));
        assert_eq!(first.net, dec("50.00"));
    }
}
