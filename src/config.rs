// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read once from the environment at startup into
//! [`Config`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `EASYFLIX_DB_PATH` | redb database file | `easyflix.redb` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `EASYFLIX_CHANNEL_SECRET` | Shared secret phrase for the secure channel | Required |
//! | `EASYFLIX_CHANNEL_SALT` | Base64 of the 16-byte key-derivation salt | Required |
//! | `EASYFLIX_KDF_ITERATIONS` | PBKDF2 iterations for the channel key | `100000` |
//! | `EASYFLIX_TOKEN_TTL_SECS` | Maximum age of a sealed token | `300` |
//! | `EASYFLIX_SESSION_TTL_SECS` | Idle lifetime of a login session | `1800` |
//! | `EASYFLIX_SESSION_CAPACITY` | Maximum live sessions | `1024` |
//! | `EASYFLIX_UPGRADE_PRICE` | Basic to Premium upgrade charge | `80.00` |
//! | `EASYFLIX_BASIC_SIGNUP_FEE` | Charge for a new Basic account | `0.00` |
//! | `EASYFLIX_PREMIUM_SIGNUP_FEE` | Charge for a new Premium account | `0.00` |
//! | `EASYFLIX_ADMIN_USERNAME` | Admin created at startup if absent | `admin` |
//! | `EASYFLIX_ADMIN_PASSWORD` | Password for that admin; no bootstrap if unset | Optional |
//! | `EASYFLIX_SEED_CATALOG` | Insert the built-in catalog into an empty database | `false` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use base64ct::{Base64, Encoding};

use crate::commands::Pricing;
use crate::crypto::channel::{CHANNEL_SALT_LEN, MIN_KDF_ITERATIONS};
use crate::models::Money;

pub const DB_PATH_ENV: &str = "EASYFLIX_DB_PATH";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const CHANNEL_SECRET_ENV: &str = "EASYFLIX_CHANNEL_SECRET";
pub const CHANNEL_SALT_ENV: &str = "EASYFLIX_CHANNEL_SALT";
pub const KDF_ITERATIONS_ENV: &str = "EASYFLIX_KDF_ITERATIONS";
pub const TOKEN_TTL_ENV: &str = "EASYFLIX_TOKEN_TTL_SECS";
pub const SESSION_TTL_ENV: &str = "EASYFLIX_SESSION_TTL_SECS";
pub const SESSION_CAPACITY_ENV: &str = "EASYFLIX_SESSION_CAPACITY";
pub const UPGRADE_PRICE_ENV: &str = "EASYFLIX_UPGRADE_PRICE";
pub const BASIC_SIGNUP_FEE_ENV: &str = "EASYFLIX_BASIC_SIGNUP_FEE";
pub const PREMIUM_SIGNUP_FEE_ENV: &str = "EASYFLIX_PREMIUM_SIGNUP_FEE";
pub const ADMIN_USERNAME_ENV: &str = "EASYFLIX_ADMIN_USERNAME";
pub const ADMIN_PASSWORD_ENV: &str = "EASYFLIX_ADMIN_PASSWORD";
pub const SEED_CATALOG_ENV: &str = "EASYFLIX_SEED_CATALOG";

/// Logging format selector.
///
/// # Default
/// `pretty`
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

const DEFAULT_DB_PATH: &str = "easyflix.redb";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_KDF_ITERATIONS: u32 = 100_000;
const DEFAULT_TOKEN_TTL_SECS: u64 = 300;
const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;
const DEFAULT_SESSION_CAPACITY: usize = 1024;
const DEFAULT_ADMIN_USERNAME: &str = "admin";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

fn invalid(var: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Credentials for the admin account ensured at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub channel_secret: String,
    pub channel_salt: [u8; CHANNEL_SALT_LEN],
    pub kdf_iterations: u32,
    pub token_ttl: Duration,
    pub session_ttl: Duration,
    pub session_capacity: usize,
    pub pricing: Pricing,
    pub admin: Option<AdminBootstrap>,
    pub seed_catalog: bool,
    pub log_format: LogFormat,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("db_path", &self.db_path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("channel_secret", &"<redacted>")
            .field("kdf_iterations", &self.kdf_iterations)
            .field("token_ttl", &self.token_ttl)
            .field("session_ttl", &self.session_ttl)
            .field("session_capacity", &self.session_capacity)
            .field("pricing", &self.pricing)
            .field("admin", &self.admin)
            .field("seed_catalog", &self.seed_catalog)
            .field("log_format", &self.log_format)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let channel_secret =
            get(CHANNEL_SECRET_ENV).ok_or(ConfigError::Missing(CHANNEL_SECRET_ENV))?;
        let channel_salt = parse_salt(
            &get(CHANNEL_SALT_ENV).ok_or(ConfigError::Missing(CHANNEL_SALT_ENV))?,
        )?;

        let kdf_iterations =
            parse_or(get(KDF_ITERATIONS_ENV), KDF_ITERATIONS_ENV, DEFAULT_KDF_ITERATIONS)?;
        if kdf_iterations < MIN_KDF_ITERATIONS {
            return Err(invalid(
                KDF_ITERATIONS_ENV,
                format!("must be at least {MIN_KDF_ITERATIONS}"),
            ));
        }

        let session_capacity =
            parse_or(get(SESSION_CAPACITY_ENV), SESSION_CAPACITY_ENV, DEFAULT_SESSION_CAPACITY)?;
        if session_capacity == 0 {
            return Err(invalid(SESSION_CAPACITY_ENV, "must be positive"));
        }

        let defaults = Pricing::default();
        let pricing = Pricing {
            upgrade_price: parse_money(
                get(UPGRADE_PRICE_ENV),
                UPGRADE_PRICE_ENV,
                defaults.upgrade_price,
            )?,
            basic_signup_fee: parse_money(
                get(BASIC_SIGNUP_FEE_ENV),
                BASIC_SIGNUP_FEE_ENV,
                defaults.basic_signup_fee,
            )?,
            premium_signup_fee: parse_money(
                get(PREMIUM_SIGNUP_FEE_ENV),
                PREMIUM_SIGNUP_FEE_ENV,
                defaults.premium_signup_fee,
            )?,
        };

        let admin = get(ADMIN_PASSWORD_ENV).map(|password| AdminBootstrap {
            username: get(ADMIN_USERNAME_ENV)
                .unwrap_or_else(|| DEFAULT_ADMIN_USERNAME.to_string()),
            password,
        });

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(invalid(LOG_FORMAT_ENV, format!("unknown format '{other}'")))
            }
        };

        Ok(Self {
            db_path: get(DB_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(get(PORT_ENV), PORT_ENV, DEFAULT_PORT)?,
            channel_secret,
            channel_salt,
            kdf_iterations,
            token_ttl: Duration::from_secs(parse_or(
                get(TOKEN_TTL_ENV),
                TOKEN_TTL_ENV,
                DEFAULT_TOKEN_TTL_SECS,
            )?),
            session_ttl: Duration::from_secs(parse_or(
                get(SESSION_TTL_ENV),
                SESSION_TTL_ENV,
                DEFAULT_SESSION_TTL_SECS,
            )?),
            session_capacity,
            pricing,
            admin,
            seed_catalog: parse_bool(get(SEED_CATALOG_ENV), SEED_CATALOG_ENV)?,
            log_format,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| invalid(HOST_ENV, e.to_string()))
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| invalid(var, e.to_string())),
    }
}

fn parse_money(
    value: Option<String>,
    var: &'static str,
    default: Money,
) -> Result<Money, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    let amount: f64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(var, format!("'{raw}' is not an amount")))?;
    match Money::from_decimal(amount) {
        Some(money) if !money.is_negative() => Ok(money),
        _ => Err(invalid(var, "must be a non-negative amount")),
    }
}

fn parse_bool(value: Option<String>, var: &'static str) -> Result<bool, ConfigError> {
    match value.as_deref().map(str::trim) {
        None => Ok(false),
        Some("1" | "true" | "yes") => Ok(true),
        Some("0" | "false" | "no") => Ok(false),
        Some(other) => Err(invalid(var, format!("'{other}' is not a boolean"))),
    }
}

fn parse_salt(raw: &str) -> Result<[u8; CHANNEL_SALT_LEN], ConfigError> {
    let bytes = Base64::decode_vec(raw.trim())
        .map_err(|_| invalid(CHANNEL_SALT_ENV, "not valid base64"))?;
    bytes.try_into().map_err(|_| {
        invalid(
            CHANNEL_SALT_ENV,
            format!("must decode to {CHANNEL_SALT_LEN} bytes"),
        )
    })
}
