use crate::auth::{self, Credentials, Identity, SessionKeys};
use crate::error::{AppError, ValidationError};
use crate::intake::{submit_expense, ExpenseForm};
use crate::queries;
use crate::store::LedgerStore;
use actix_web::{get, post, web, Either, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
}

#[post("/auth/register")]
async fn register(
    store: web::Data<dyn LedgerStore>,
    keys: web::Data<SessionKeys>,
    json: web::Json<Credentials>,
) -> Result<HttpResponse, AppError> {
    let session = auth::register(store.get_ref(), &keys, json.into_inner()).await?;
    Ok(HttpResponse::Created().json(session))
}

#[post("/auth/login")]
async fn login(
    store: web::Data<dyn LedgerStore>,
    keys: web::Data<SessionKeys>,
    json: web::Json<Credentials>,
) -> Result<HttpResponse, AppError> {
    let session = auth::login(store.get_ref(), &keys, json.into_inner()).await?;
    Ok(HttpResponse::Ok().json(session))
}

#[get("/auth/me")]
async fn current_user(
    store: web::Data<dyn LedgerStore>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    let user = auth::current_user(store.get_ref(), identity.0).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[post("/expenses")]
async fn add_expense(
    store: web::Data<dyn LedgerStore>,
    identity: Identity,
    body: Either<web::Json<ExpenseForm>, web::Form<ExpenseForm>>,
) -> Result<HttpResponse, AppError> {
    let form = match body {
        Either::Left(json) => json.into_inner(),
        Either::Right(form) => form.into_inner(),
    };
    let id = submit_expense(store.get_ref(), identity.0, form).await?;
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[get("/expenses")]
async fn recent_expenses(
    store: web::Data<dyn LedgerStore>,
    _identity: Identity,
    query: web::Query<RecentQuery>,
) -> Result<HttpResponse, AppError> {
    let expenses = queries::recent_expenses(store.get_ref(), query.limit).await?;
    Ok(HttpResponse::Ok().json(expenses))
}

#[get("/balance")]
async fn get_balance(
    store: web::Data<dyn LedgerStore>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    let balances = queries::get_balances(store.get_ref(), identity.0).await?;
    Ok(HttpResponse::Ok().json(balances))
}

#[get("/settlements")]
async fn get_settlements(
    store: web::Data<dyn LedgerStore>,
    _identity: Identity,
) -> Result<HttpResponse, AppError> {
    let transfers = queries::settlements(store.get_ref()).await?;
    Ok(HttpResponse::Ok().json(transfers))
}

// Bodies and query strings that fail to parse get the same JSON error shape
// as a failed validation.
fn rejected(field: &'static str, err: impl ToString) -> actix_web::Error {
    AppError::from(ValidationError::new(field, err.to_string())).into()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::JsonConfig::default().error_handler(|err, _| rejected("body", err)))
            .app_data(web::FormConfig::default().error_handler(|err, _| rejected("body", err)))
            .app_data(web::QueryConfig::default().error_handler(|err, _| rejected("query", err)))
            .service(register)
            .service(login)
            .service(current_user)
            .service(add_expense)
            .service(recent_expenses)
            .service(get_balance)
            .service(get_settlements),
    );
}
