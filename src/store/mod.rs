//! The append-only ledger and the user table behind it.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::schemas::{Expense, ExpenseId, NewExpense, User, UserId};

mod memory;
mod mongo;

pub use memory::MemoryLedgerStore;
pub use mongo::MongoLedgerStore;

/// Durable storage for users and expenses.
///
/// Expenses can only be appended. An expense returned from `append` is
/// visible to every later `all` and `list_recent` call.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateUser`] when the handle is taken.
    async fn create_user(&self, username: &str, password_hash: &str)
        -> Result<UserId, StoreError>;

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_user_by_name(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// The ids from `ids` that do not name a user, in the order given.
    async fn missing_users(&self, ids: &[UserId]) -> Result<Vec<UserId>, StoreError>;

    async fn append(&self, expense: NewExpense) -> Result<ExpenseId, StoreError>;

    /// At most `limit` expenses, latest date first, ties broken by latest id.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Expense>, StoreError>;

    /// Every expense in insertion order.
    async fn all(&self) -> Result<Vec<Expense>, StoreError>;
}
