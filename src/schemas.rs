use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type ExpenseId = i64;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
}

/// The users an expense is shared with, as found in storage.
///
/// Rows written by this service hold an array of ids. Older rows hold the
/// comma-delimited text the first version of the app wrote.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SplitWith {
    Ids(Vec<UserId>),
    Delimited(String),
}

impl SplitWith {
    /// Participant ids, or `None` when a delimited row holds a token that is
    /// not an integer id.
    pub fn participants(&self) -> Option<Vec<UserId>> {
        match self {
            SplitWith::Ids(ids) => Some(ids.clone()),
            SplitWith::Delimited(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(|token| token.parse::<UserId>().ok())
                .collect(),
        }
    }
}

impl Default for SplitWith {
    fn default() -> Self {
        SplitWith::Ids(Vec::new())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    #[serde(rename = "_id")]
    pub id: ExpenseId,
    pub description: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    #[serde(rename = "group_name", default)]
    pub group: Option<String>,
    #[serde(rename = "payer_id")]
    pub payer: UserId,
    #[serde(default)]
    pub split_with: SplitWith,
    pub date: NaiveDate,
}

/// A validated expense that has not been assigned an id yet.
#[derive(Clone, Debug, PartialEq)]
pub struct NewExpense {
    pub description: String,
    pub amount: Decimal,
    pub group: Option<String>,
    pub payer: UserId,
    pub split_with: Vec<UserId>,
    pub date: NaiveDate,
}

impl NewExpense {
    pub fn into_expense(self, id: ExpenseId) -> Expense {
        Expense {
            id,
            description: self.description,
            amount: self.amount,
            group: self.group,
            payer: self.payer,
            split_with: SplitWith::Ids(self.split_with),
            date: self.date,
        }
    }
}
