use async_trait::async_trait;
use tokio::sync::RwLock;

use super::LedgerStore;
use crate::error::StoreError;
use crate::schemas::{Expense, ExpenseId, NewExpense, User, UserId};

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    expenses: Vec<Expense>,
}

/// Ledger kept in process memory. Lost on restart.
///
/// Used by tests and by `STORAGE=memory` for local frontend work.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    tables: RwLock<Tables>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(expenses: &mut [Expense]) {
    expenses.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<UserId, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|user| user.username == username) {
            return Err(StoreError::DuplicateUser(username.to_string()));
        }
        let id = tables.users.len() as UserId + 1;
        tables.users.push(User {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        });
        Ok(id)
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_user_by_name(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn missing_users(&self, ids: &[UserId]) -> Result<Vec<UserId>, StoreError> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .copied()
            .filter(|id| !tables.users.iter().any(|user| user.id == *id))
            .collect())
    }

    async fn append(&self, expense: NewExpense) -> Result<ExpenseId, StoreError> {
        let mut tables = self.tables.write().await;
        let id = tables.expenses.len() as ExpenseId + 1;
        tables.expenses.push(expense.into_expense(id));
        Ok(id)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Expense>, StoreError> {
        let mut expenses = self.tables.read().await.expenses.clone();
        newest_first(&mut expenses);
        expenses.truncate(limit);
        Ok(expenses)
    }

    async fn all(&self) -> Result<Vec<Expense>, StoreError> {
        Ok(self.tables.read().await.expenses.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn new_expense(description: &str, day: u32) -> NewExpense {
        NewExpense {
            description: description.to_string(),
            amount: Decimal::new(1000, 2),
            group: None,
            payer: 1,
            split_with: vec![2],
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
        }
    }

    #[actix_web::test]
    async fn duplicate_usernames_are_rejected() {
        let store = MemoryLedgerStore::new();
        let id = store.create_user("alice", "first").await.unwrap();
        let err = store.create_user("alice", "second").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUser(name) if name == "alice"));

        let alice = store.find_user(id).await.unwrap().unwrap();
        assert_eq!(alice.password_hash, "first");
    }

    #[actix_web::test]
    async fn appended_expenses_are_visible() {
        let store = MemoryLedgerStore::new();
        assert!(store.all().await.unwrap().is_empty());

        let first = store.append(new_expense("rent", 1)).await.unwrap();
        let second = store.append(new_expense("food", 2)).await.unwrap();
        assert_eq!((first, second), (1, 2));

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].description, "rent");
    }

    #[actix_web::test]
    async fn recent_expenses_are_newest_first() {
        let store = MemoryLedgerStore::new();
        store.append(new_expense("later", 5)).await.unwrap();
        store.append(new_expense("earlier", 1)).await.unwrap();
        store.append(new_expense("same day, newer", 5)).await.unwrap();

        let recent = store.list_recent(2).await.unwrap();
        let names: Vec<_> = recent.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(names, ["same day, newer", "later"]);

        assert!(store.list_recent(0).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn missing_users_lists_unknown_ids() {
        let store = MemoryLedgerStore::new();
        store.create_user("alice", "x").await.unwrap();
        store.create_user("bob", "y").await.unwrap();
        assert_eq!(store.missing_users(&[2, 7, 1, 9]).await.unwrap(), vec![7, 9]);
    }
}
