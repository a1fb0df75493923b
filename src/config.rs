use std::env;
use std::net::IpAddr;
use thiserror::Error;

const MIN_SECRET_LEN: usize = 16;
const DEFAULT_SESSION_TTL_HOURS: i64 = 168;
/// One year.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 366;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("You need to add the {0} to the env")]
    Missing(&'static str),

    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("SESSION_SECRET must be at least 16 bytes long")]
    WeakSecret,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Storage {
    Mongo { uri: String, database: String },
    Memory,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub storage: Storage,
    pub session_secret: String,
    pub session_ttl_hours: i64,
    pub bind_addr: IpAddr,
    pub port: u16,
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let storage = match var("STORAGE").as_deref() {
            None | Some("mongo") => Storage::Mongo {
                uri: var("MONGODB_URI").ok_or(ConfigError::Missing("MONGODB_URI"))?,
                database: var("MONGODB_DATABASE").unwrap_or_else(|| "PotShare".to_string()),
            },
            Some("memory") => Storage::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE",
                    value: other.to_string(),
                })
            }
        };

        let session_secret = var("SESSION_SECRET").ok_or(ConfigError::Missing("SESSION_SECRET"))?;
        if session_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }

        let session_ttl_hours =
            parse_or(var("SESSION_TTL_HOURS"), "SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS)?;
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&session_ttl_hours) {
            return Err(ConfigError::Invalid {
                name: "SESSION_TTL_HOURS",
                value: session_ttl_hours.to_string(),
            });
        }

        Ok(Config {
            storage,
            session_secret,
            session_ttl_hours,
            bind_addr: parse_or(var("BIND_ADDR"), "BIND_ADDR", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or(var("PORT"), "PORT", 8080)?,
            cors_origin: var("CORS_ORIGIN"),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
