use async_trait::async_trait;
use futures::TryStreamExt;
use log::{debug, info};
use mongodb::{
    bson::doc,
    error::{Error, ErrorKind, WriteError, WriteFailure},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Client, Collection, Database, IndexModel,
};
use tokio::sync::Mutex;

use super::LedgerStore;
use crate::error::StoreError;
use crate::schemas::{Expense, ExpenseId, NewExpense, User, UserId};

const USERS: &str = "users";
const EXPENSES: &str = "expenses";
const COUNTERS: &str = "counters";

const DUPLICATE_KEY: i32 = 11000;

/// Ledger persisted in MongoDB.
///
/// Ids are sequential integers drawn from the `counters` collection.
pub struct MongoLedgerStore {
    database: Database,
    append_lock: Mutex<()>,
}

impl MongoLedgerStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        let store = MongoLedgerStore {
            database: client.database(database),
            append_lock: Mutex::new(()),
        };
        store.ensure_indexes().await?;
        info!("Connected to MongoDB database {database}");
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique_username = IndexModel::builder()
            .keys(doc! { "username": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.users().create_index(unique_username, None).await?;
        let recent = IndexModel::builder()
            .keys(doc! { "date": -1, "_id": -1 })
            .build();
        self.expenses().create_index(recent, None).await?;
        Ok(())
    }

    fn users(&self) -> Collection<User> {
        self.database.collection(USERS)
    }

    fn expenses(&self) -> Collection<Expense> {
        self.database.collection(EXPENSES)
    }

    async fn next_id(&self, sequence: &str) -> Result<i64, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let counter = self
            .database
            .collection::<mongodb::bson::Document>(COUNTERS)
            .find_one_and_update(
                doc! { "_id": sequence },
                doc! { "$inc": { "seq": 1_i64 } },
                options,
            )
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("counter {sequence} missing")))?;
        counter
            .get_i64("seq")
            .map_err(|err| StoreError::Corrupt(format!("counter {sequence}: {err}")))
    }
}

fn is_duplicate_key(err: &Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(WriteError { code: DUPLICATE_KEY, .. }))
    )
}

// Newest first. A limit of zero means "no limit" to the server, so it gets no
// query at all.
fn recent_options(limit: usize) -> Option<FindOptions> {
    if limit == 0 {
        return None;
    }
    Some(
        FindOptions::builder()
            .sort(doc! { "date": -1, "_id": -1 })
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .build(),
    )
}

#[async_trait]
impl LedgerStore for MongoLedgerStore {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<UserId, StoreError> {
        if self.find_user_by_name(username).await?.is_some() {
            return Err(StoreError::DuplicateUser(username.to_string()));
        }
        let user = User {
            id: self.next_id(USERS).await?,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        };
        // The unique index still catches a registration racing this one
        match self.users().insert_one(&user, None).await {
            Ok(_) => Ok(user.id),
            Err(err) if is_duplicate_key(&err) => {
                Err(StoreError::DuplicateUser(username.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users().find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_user_by_name(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users()
            .find_one(doc! { "username": username }, None)
            .await?)
    }

    async fn missing_users(&self, ids: &[UserId]) -> Result<Vec<UserId>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let found: Vec<User> = self
            .users()
            .find(doc! { "_id": { "$in": ids.to_vec() } }, None)
            .await?
            .try_collect()
            .await?;
        Ok(ids
            .iter()
            .copied()
            .filter(|id| !found.iter().any(|user| user.id == *id))
            .collect())
    }

    async fn append(&self, expense: NewExpense) -> Result<ExpenseId, StoreError> {
        let _guard = self.append_lock.lock().await;
        let id = self.next_id(EXPENSES).await?;
        self.expenses()
            .insert_one(expense.into_expense(id), None)
            .await?;
        debug!("Appended expense {id}");
        Ok(id)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Expense>, StoreError> {
        let Some(options) = recent_options(limit) else {
            return Ok(Vec::new());
        };
        Ok(self
            .expenses()
            .find(None, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn all(&self) -> Result<Vec<Expense>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        Ok(self
            .expenses()
            .find(None, options)
            .await?
            .try_collect()
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson;

    fn write_error(code: i32) -> Error {
        let write_error: WriteError = bson::from_document(doc! {
            "code": code,
            "errmsg": "E11000 duplicate key error collection: PotShare.users",
        })
        .unwrap();
        Error::from(ErrorKind::Write(WriteFailure::WriteError(write_error)))
    }

    #[test]
    fn duplicate_key_errors_are_recognised() {
        assert!(is_duplicate_key(&write_error(DUPLICATE_KEY)));
    }

    #[test]
    fn other_write_errors_are_not_duplicates() {
        // 121: document failed validation
        assert!(!is_duplicate_key(&write_error(121)));
    }

    #[test]
    fn zero_limit_skips_the_query() {
        assert!(recent_options(0).is_none());
        let options = recent_options(5).unwrap();
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.sort, Some(doc! { "date": -1, "_id": -1 }));
    }
}
