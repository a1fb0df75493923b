use crate::error::{AppError, AuthError, ValidationError};
use crate::schemas::UserId;
use crate::store::LedgerStore;
use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use futures::future::{ready, Ready};
use hmac::{Hmac, Mac};
use log::{error, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::ParseIntError;

type HmacSha256 = Hmac<Sha256>;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 32;

/// Keys derived from the session secret, shared by every worker.
#[derive(Clone)]
pub struct SessionKeys {
    key: Vec<u8>,
    ttl: Duration,
}

#[derive(Deserialize, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: UserId,
    pub username: String,
}

#[derive(Serialize, Debug)]
pub struct Session {
    pub token: String,
    pub user: SessionUser,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        let mut sha256_hasher = Sha256::new();
        sha256_hasher.update(secret.as_bytes());
        SessionKeys {
            key: sha256_hasher.finalize().to_vec(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    fn mac(&self, purpose: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(purpose.as_bytes());
        mac.update(b"\n");
        mac
    }

    pub fn hash_password(&self, username: &str, password: &str) -> String {
        let mut mac = self.mac("password");
        mac.update(format!("{username}\n{password}").as_bytes());
        to_hex(&mac.finalize().into_bytes())
    }

    pub fn verify_password(&self, username: &str, password: &str, stored_hash: &str) -> bool {
        let Some(expected) = from_hex(stored_hash) else {
            return false;
        };
        let mut mac = self.mac("password");
        mac.update(format!("{username}\n{password}").as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    pub fn issue_token(&self, user: UserId) -> String {
        self.issue_token_at(user, Utc::now().timestamp())
    }

    fn issue_token_at(&self, user: UserId, issued_at: i64) -> String {
        let claims = format!("{user}.{issued_at}");
        let mut mac = self.mac("session");
        mac.update(claims.as_bytes());
        format!("{claims}.{}", to_hex(&mac.finalize().into_bytes()))
    }

    pub fn verify_token(&self, token: &str) -> Result<UserId, AuthError> {
        self.verify_token_at(token, Utc::now().timestamp())
    }

    fn verify_token_at(&self, token: &str, now: i64) -> Result<UserId, AuthError> {
        let (claims, signature) = token.rsplit_once('.').ok_or(AuthError::InvalidToken)?;
        let signature = from_hex(signature).ok_or(AuthError::InvalidToken)?;
        let mut mac = self.mac("session");
        mac.update(claims.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let (user, issued_at) = claims.split_once('.').ok_or(AuthError::InvalidToken)?;
        let user: UserId = user.parse().map_err(|_| AuthError::InvalidToken)?;
        let issued_at: i64 = issued_at.parse().map_err(|_| AuthError::InvalidToken)?;
        if now - issued_at > self.ttl.num_seconds() {
            return Err(AuthError::Expired);
        }
        Ok(user)
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| u8::from_str_radix(std::str::from_utf8(pair).unwrap_or("zz"), 16))
        .collect::<Result<Vec<u8>, ParseIntError>>()
        .ok()
}

/// The signed-in user, taken from the `Authorization: Bearer` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity(pub UserId);

pub fn check_authorization(request: &HttpRequest) -> Result<UserId, AuthError> {
    let Some(keys) = request.app_data::<web::Data<SessionKeys>>() else {
        error!("SessionKeys missing from app data");
        return Err(AuthError::InvalidToken);
    };
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidToken)?;
    let token = authorization
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidToken)?;
    keys.verify_token(token.trim())
}

impl FromRequest for Identity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(request: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            check_authorization(request)
                .map(Identity)
                .map_err(AppError::from),
        )
    }
}

fn validate_credentials(credentials: &Credentials) -> Result<(), ValidationError> {
    let username = credentials.username.as_str();
    if username.is_empty() {
        return Err(ValidationError::new("username", "is required"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ValidationError::new(
            "username",
            format!("must be at most {MAX_USERNAME_LEN} characters"),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ValidationError::new(
            "username",
            "may only contain letters, digits, '_', '-' and '.'",
        ));
    }
    if credentials.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

pub async fn register(
    store: &dyn LedgerStore,
    keys: &SessionKeys,
    credentials: Credentials,
) -> Result<Session, AppError> {
    let credentials = Credentials {
        username: credentials.username.trim().to_string(),
        password: credentials.password,
    };
    validate_credentials(&credentials)?;
    let password_hash = keys.hash_password(&credentials.username, &credentials.password);
    let id = store
        .create_user(&credentials.username, &password_hash)
        .await?;
    info!("Registered user {id} ({})", credentials.username);
    Ok(Session {
        token: keys.issue_token(id),
        user: SessionUser {
            id,
            username: credentials.username,
        },
    })
}

pub async fn login(
    store: &dyn LedgerStore,
    keys: &SessionKeys,
    credentials: Credentials,
) -> Result<Session, AppError> {
    let username = credentials.username.trim();
    let user = store
        .find_user_by_name(username)
        .await?
        .filter(|user| keys.verify_password(&user.username, &credentials.password, &user.password_hash))
        .ok_or(AuthError::InvalidCredentials)?;
    Ok(Session {
        token: keys.issue_token(user.id),
        user: SessionUser {
            id: user.id,
            username: user.username,
        },
    })
}

/// The account behind a verified token. A token for a user that no longer
/// resolves is treated as invalid.
pub async fn current_user(store: &dyn LedgerStore, id: UserId) -> Result<SessionUser, AppError> {
    let user = store.find_user(id).await?.ok_or(AuthError::InvalidToken)?;
    Ok(SessionUser {
        id: user.id,
        username: user.username,
    })
}
