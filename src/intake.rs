use crate::error::{AppError, ValidationError};
use crate::schemas::{ExpenseId, NewExpense, UserId};
use crate::store::LedgerStore;
use chrono::NaiveDate;
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::str::FromStr;

/// Largest accepted expense amount, exclusive. Keeps every ledger sum far
/// inside `Decimal`'s range.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(2_764_472_320, 232_830, 0, false, 0);
/// Most users one expense can be split with.
pub const MAX_PARTICIPANTS: usize = 100;

/// Raw expense fields as submitted by a form or JSON body.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct ExpenseForm {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub amount: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub split_with: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub payer_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(serde_json::Number),
}

// JSON clients send amounts and ids as numbers, forms send them as text
fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<TextOrNumber>::deserialize(deserializer)?.map(|value| match value {
            TextOrNumber::Text(text) => text,
            TextOrNumber::Number(number) => number.to_string(),
        }),
    )
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_description(raw: Option<&str>) -> Result<String, ValidationError> {
    present(raw)
        .map(str::to_string)
        .ok_or_else(|| ValidationError::new("description", "is required"))
}

fn parse_amount(raw: Option<&str>) -> Result<Decimal, ValidationError> {
    let raw = present(raw).ok_or_else(|| ValidationError::new("amount", "is required"))?;
    let amount = Decimal::from_str(raw)
        .map_err(|_| ValidationError::new("amount", format!("{raw:?} is not a number")))?;
    if amount <= Decimal::ZERO {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }
    if amount >= MAX_AMOUNT {
        return Err(ValidationError::new(
            "amount",
            format!("must be less than {MAX_AMOUNT}"),
        ));
    }
    if amount.normalize().scale() > 2 {
        return Err(ValidationError::new(
            "amount",
            "must have at most two decimal places",
        ));
    }
    Ok(amount)
}

fn parse_date(raw: Option<&str>) -> Result<NaiveDate, ValidationError> {
    let raw = present(raw).ok_or_else(|| ValidationError::new("date", "is required"))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        ValidationError::new("date", format!("{raw:?} is not a YYYY-MM-DD calendar date"))
    })
}

/// Parses a comma-delimited id list. Blank tokens are ignored and repeated
/// ids keep their first position.
pub fn parse_split_with(raw: Option<&str>) -> Result<Vec<UserId>, ValidationError> {
    let mut ids: Vec<UserId> = Vec::new();
    let mut seen: HashSet<UserId> = HashSet::new();
    for token in raw.unwrap_or_default().split(',').map(str::trim) {
        if token.is_empty() {
            continue;
        }
        let id = token
            .parse::<UserId>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| {
                ValidationError::new("split_with", format!("{token:?} is not a user id"))
            })?;
        if seen.insert(id) {
            if ids.len() == MAX_PARTICIPANTS {
                return Err(ValidationError::new(
                    "split_with",
                    format!("can name at most {MAX_PARTICIPANTS} users"),
                ));
            }
            ids.push(id);
        }
    }
    Ok(ids)
}

fn resolve_payer(raw: Option<&str>, caller: UserId) -> Result<UserId, ValidationError> {
    match present(raw) {
        None => Ok(caller),
        Some(raw) => match raw.parse::<UserId>() {
            Ok(payer) if payer == caller => Ok(payer),
            _ => Err(ValidationError::new(
                "payer_id",
                "must be the signed-in user",
            )),
        },
    }
}

fn join_ids(ids: &[UserId]) -> String {
    ids.iter()
        .map(UserId::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validates a submission from `caller` and appends it to the ledger.
///
/// Checks run in a fixed order and the first failure is returned. Nothing is
/// written unless every check passes.
pub async fn submit_expense(
    store: &dyn LedgerStore,
    caller: UserId,
    form: ExpenseForm,
) -> Result<ExpenseId, AppError> {
    let description = parse_description(form.description.as_deref())?;
    let amount = parse_amount(form.amount.as_deref())?;
    let date = parse_date(form.date.as_deref())?;

    let split_with = parse_split_with(form.split_with.as_deref())?;
    let missing = store.missing_users(&split_with).await?;
    if !missing.is_empty() {
        return Err(ValidationError::new(
            "split_with",
            format!("unknown user ids: {}", join_ids(&missing)),
        )
        .into());
    }

    let payer = resolve_payer(form.payer_id.as_deref(), caller)?;
    if split_with.contains(&payer) {
        return Err(ValidationError::new("split_with", "must not include the payer").into());
    }

    let expense = NewExpense {
        description,
        amount,
        group: present(form.group.as_deref()).map(str::to_string),
        payer,
        split_with,
        date,
    };
    debug!("Accepted expense from user {caller}: {expense:?}");
    let id = store.append(expense).await?;
    info!("User {caller} recorded expense {id}");
    Ok(id)
}
