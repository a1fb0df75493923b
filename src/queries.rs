use crate::balance::{compute_balances, Balances};
use crate::error::StoreError;
use crate::schemas::{Expense, ExpenseId, SplitWith, UserId};
use crate::settlement::{plan_settlements, Transfer};
use crate::store::LedgerStore;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

pub const DEFAULT_RECENT_LIMIT: usize = 20;
pub const MAX_RECENT_LIMIT: usize = 100;

/// An expense as shown to the frontend.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExpenseView {
    pub id: ExpenseId,
    pub description: String,
    pub amount: Decimal,
    pub group: Option<String>,
    pub split_with: SplitWith,
    pub date: NaiveDate,
    pub payer_id: UserId,
}

impl From<Expense> for ExpenseView {
    fn from(expense: Expense) -> Self {
        ExpenseView {
            id: expense.id,
            description: expense.description,
            amount: expense.amount,
            group: expense.group,
            split_with: expense.split_with,
            date: expense.date,
            payer_id: expense.payer,
        }
    }
}

pub async fn get_balances(store: &dyn LedgerStore, user: UserId) -> Result<Balances, StoreError> {
    let ledger = store.all().await?;
    Ok(compute_balances(user, &ledger))
}

pub async fn recent_expenses(
    store: &dyn LedgerStore,
    limit: Option<usize>,
) -> Result<Vec<ExpenseView>, StoreError> {
    let limit = limit.unwrap_or(DEFAULT_RECENT_LIMIT).min(MAX_RECENT_LIMIT);
    let expenses = store.list_recent(limit).await?;
    Ok(expenses.into_iter().map(ExpenseView::from).collect())
}

pub async fn settlements(store: &dyn LedgerStore) -> Result<Vec<Transfer>, StoreError> {
    let ledger = store.all().await?;
    Ok(plan_settlements(&ledger))
}
