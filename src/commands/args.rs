// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Typed command arguments.
//!
//! A request's `args` object is consumed field by field through [`Args`], so
//! every rejection names the exact argument at fault. Arguments a command
//! does not know are rejected too.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::registry::Operation;
use crate::auth::Target;
use crate::error::MediatorError;
use crate::models::{AccessGroup, Money, Rating, SubscriptionLevel};

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 50;
pub const EMAIL_MAX: usize = 100;
pub const PASSWORD_MIN: usize = 8;
pub const TEXT_MAX: usize = 200;
pub const PAGE_LIMIT_MAX: u32 = 100;
pub const PAGE_LIMIT_DEFAULT: u32 = 20;

// =============================================================================
// Argument Reader
// =============================================================================

/// The `args` object of a request, consumed one field at a time.
pub struct Args {
    map: Map<String, Value>,
}

impl Args {
    /// Accepts an object, or `null` for "no arguments".
    pub fn new(value: Value) -> Result<Self, MediatorError> {
        match value {
            Value::Object(map) => Ok(Self { map }),
            Value::Null => Ok(Self { map: Map::new() }),
            _ => Err(MediatorError::validation("args", "must be an object")),
        }
    }

    /// Absent and `null` both read as `None`.
    pub fn optional<T: DeserializeOwned>(&mut self, field: &str) -> Result<Option<T>, MediatorError> {
        match self.map.remove(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| MediatorError::validation(field, e.to_string())),
        }
    }

    pub fn required<T: DeserializeOwned>(&mut self, field: &str) -> Result<T, MediatorError> {
        self.optional(field)?
            .ok_or_else(|| MediatorError::validation(field, "is required"))
    }

    /// Distinguishes an absent field (`None`) from an explicit `null`
    /// (`Some(None)`).
    pub fn nullable<T: DeserializeOwned>(
        &mut self,
        field: &str,
    ) -> Result<Option<Option<T>>, MediatorError> {
        match self.map.remove(field) {
            None => Ok(None),
            Some(Value::Null) => Ok(Some(None)),
            Some(value) => serde_json::from_value(value)
                .map(|v| Some(Some(v)))
                .map_err(|e| MediatorError::validation(field, e.to_string())),
        }
    }

    /// Reject any argument that was not consumed.
    pub fn finish(self) -> Result<(), MediatorError> {
        match self.map.keys().min() {
            Some(unknown) => Err(MediatorError::validation(
                unknown.clone(),
                "unknown argument",
            )),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Field Validation
// =============================================================================

fn text(field: &str, value: String, max: usize) -> Result<String, MediatorError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MediatorError::validation(field, "must not be empty"));
    }
    if trimmed.chars().count() > max {
        return Err(MediatorError::validation(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

fn username(field: &str, value: String) -> Result<String, MediatorError> {
    let value = value.trim().to_string();
    let len = value.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(MediatorError::validation(
            field,
            format!("must be {USERNAME_MIN} to {USERNAME_MAX} characters"),
        ));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(MediatorError::validation(field, "must not contain whitespace"));
    }
    Ok(value)
}

fn email(field: &str, value: String) -> Result<String, MediatorError> {
    let value = value.trim().to_string();
    if value.chars().count() > EMAIL_MAX {
        return Err(MediatorError::validation(
            field,
            format!("must be at most {EMAIL_MAX} characters"),
        ));
    }
    let well_formed = matches!(
        value.split_once('@'),
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@')
    );
    if !well_formed {
        return Err(MediatorError::validation(field, "must be a valid email address"));
    }
    Ok(value)
}

fn password(field: &str, value: String) -> Result<String, MediatorError> {
    if value.chars().count() < PASSWORD_MIN {
        return Err(MediatorError::validation(
            field,
            format!("must be at least {PASSWORD_MIN} characters"),
        ));
    }
    Ok(value)
}

fn id(field: &str, value: u64) -> Result<u64, MediatorError> {
    if value == 0 {
        return Err(MediatorError::validation(field, "must be a positive id"));
    }
    Ok(value)
}

fn cost(field: &str, value: Money) -> Result<Money, MediatorError> {
    if value.is_negative() {
        return Err(MediatorError::validation(field, "must not be negative"));
    }
    Ok(value)
}

fn length(field: &str, value: u32) -> Result<u32, MediatorError> {
    if value == 0 {
        return Err(MediatorError::validation(field, "must be greater than zero"));
    }
    Ok(value)
}

// =============================================================================
// Argument Types
// =============================================================================

#[derive(Clone)]
pub struct CreateAccountArgs {
    pub username: String,
    pub email: String,
    pub password: String,
    pub subscription_level: SubscriptionLevel,
    pub marketing_opt_in: bool,
}

impl std::fmt::Debug for CreateAccountArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateAccountArgs")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("subscription_level", &self.subscription_level)
            .field("marketing_opt_in", &self.marketing_opt_in)
            .finish()
    }
}

#[derive(Clone)]
pub struct LoginArgs {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginArgs")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct ChangePasswordArgs {
    pub current_password: String,
    pub new_password: String,
}

impl std::fmt::Debug for ChangePasswordArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangePasswordArgs").finish_non_exhaustive()
    }
}

/// Catalog listing sort column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    Rating,
    ReleaseDate,
    Genre,
    Length,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListShowsArgs {
    pub genre: Option<String>,
    pub access_group: Option<AccessGroup>,
    pub rating: Option<Rating>,
    pub search: Option<String>,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
    pub page: u32,
    pub limit: u32,
}

impl Default for ListShowsArgs {
    fn default() -> Self {
        Self {
            genre: None,
            access_group: None,
            rating: None,
            search: None,
            sort_by: SortKey::Name,
            sort_order: SortOrder::Asc,
            page: 1,
            limit: PAGE_LIMIT_DEFAULT,
        }
    }
}

/// Every column of a show, as supplied to `admin_add_show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowFields {
    pub name: String,
    pub release_date: NaiveDate,
    pub rating: Rating,
    pub director: String,
    pub length_minutes: u32,
    pub genre: String,
    pub access_group: AccessGroup,
    pub cost_to_buy: Option<Money>,
}

/// Changes for `admin_edit_show`; `None` leaves a column unchanged.
///
/// `cost_to_buy: Some(None)` clears the price.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShowPatch {
    pub name: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub rating: Option<Rating>,
    pub director: Option<String>,
    pub length_minutes: Option<u32>,
    pub genre: Option<String>,
    pub access_group: Option<AccessGroup>,
    pub cost_to_buy: Option<Option<Money>>,
}

impl ShowPatch {
    pub fn is_empty(&self) -> bool {
        *self == ShowPatch::default()
    }
}

/// Inclusive date window; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

// =============================================================================
// Command
// =============================================================================

/// A fully parsed and validated request.
#[derive(Debug, Clone)]
pub enum Command {
    CreateAccount(CreateAccountArgs),
    Login(LoginArgs),
    AdminLogin(LoginArgs),
    Logout,
    GetAccount,
    ChangePassword(ChangePasswordArgs),
    ChangeSubscription { level: SubscriptionLevel },
    SetMarketingOptIn { opt_in: bool },
    ListShows(ListShowsArgs),
    GetShow { show_id: u64 },
    ListGenres,
    GetLibrary,
    PurchaseShow { show_id: u64 },
    RemoveShowFromLibrary { show_id: u64 },
    GetPurchaseHistory { customer_id: Option<u64> },
    AdminAddShow(ShowFields),
    AdminEditShow { show_id: u64, changes: ShowPatch },
    AdminDeleteShow { show_id: u64 },
    AdminDeleteUser { user_id: u64 },
    AdminListUsers,
    AdminGetUser { user_id: u64 },
    AdminChangePassword(ChangePasswordArgs),
    GetStatistics(DateRange),
    GetFinancials(DateRange),
}

impl Command {
    /// Parse and validate the arguments of `operation`.
    pub fn parse(operation: Operation, args: Value) -> Result<Command, MediatorError> {
        let mut args = Args::new(args)?;
        let command = match operation {
            Operation::CreateAccount => Command::CreateAccount(CreateAccountArgs {
                username: username("username", args.required("username")?)?,
                email: email("email", args.required("email")?)?,
                password: password("password", args.required("password")?)?,
                subscription_level: args
                    .optional("subscription_level")?
                    .unwrap_or(SubscriptionLevel::Basic),
                marketing_opt_in: args.optional("marketing_opt_in")?.unwrap_or(false),
            }),
            Operation::Login => Command::Login(login_args(&mut args)?),
            Operation::AdminLogin => Command::AdminLogin(login_args(&mut args)?),
            Operation::Logout => Command::Logout,
            Operation::GetAccount => Command::GetAccount,
            Operation::ChangePassword => Command::ChangePassword(change_password_args(&mut args)?),
            Operation::ChangeSubscription => Command::ChangeSubscription {
                level: args.required("subscription_level")?,
            },
            Operation::SetMarketingOptIn => Command::SetMarketingOptIn {
                opt_in: args.required("opt_in")?,
            },
            Operation::ListShows => Command::ListShows(list_shows_args(&mut args)?),
            Operation::GetShow => Command::GetShow {
                show_id: id("show_id", args.required("show_id")?)?,
            },
            Operation::ListGenres => Command::ListGenres,
            Operation::GetLibrary => Command::GetLibrary,
            Operation::PurchaseShow => Command::PurchaseShow {
                show_id: id("show_id", args.required("show_id")?)?,
            },
            Operation::RemoveShowFromLibrary => Command::RemoveShowFromLibrary {
                show_id: id("show_id", args.required("show_id")?)?,
            },
            Operation::GetPurchaseHistory => Command::GetPurchaseHistory {
                customer_id: args
                    .optional("customer_id")?
                    .map(|v| id("customer_id", v))
                    .transpose()?,
            },
            Operation::AdminAddShow => Command::AdminAddShow(show_fields(&mut args)?),
            Operation::AdminEditShow => {
                let show_id = id("show_id", args.required("show_id")?)?;
                let changes = show_patch(&mut args)?;
                if changes.is_empty() {
                    return Err(MediatorError::validation("args", "no changes given"));
                }
                Command::AdminEditShow { show_id, changes }
            }
            Operation::AdminDeleteShow => Command::AdminDeleteShow {
                show_id: id("show_id", args.required("show_id")?)?,
            },
            Operation::AdminDeleteUser => Command::AdminDeleteUser {
                user_id: id("user_id", args.required("user_id")?)?,
            },
            Operation::AdminListUsers => Command::AdminListUsers,
            Operation::AdminGetUser => Command::AdminGetUser {
                user_id: id("user_id", args.required("user_id")?)?,
            },
            Operation::AdminChangePassword => {
                Command::AdminChangePassword(change_password_args(&mut args)?)
            }
            Operation::GetStatistics => Command::GetStatistics(date_range(&mut args)?),
            Operation::GetFinancials => Command::GetFinancials(date_range(&mut args)?),
        };
        args.finish()?;
        Ok(command)
    }

    pub fn operation(&self) -> Operation {
        match self {
            Command::CreateAccount(_) => Operation::CreateAccount,
            Command::Login(_) => Operation::Login,
            Command::AdminLogin(_) => Operation::AdminLogin,
            Command::Logout => Operation::Logout,
            Command::GetAccount => Operation::GetAccount,
            Command::ChangePassword(_) => Operation::ChangePassword,
            Command::ChangeSubscription { .. } => Operation::ChangeSubscription,
            Command::SetMarketingOptIn { .. } => Operation::SetMarketingOptIn,
            Command::ListShows(_) => Operation::ListShows,
            Command::GetShow { .. } => Operation::GetShow,
            Command::ListGenres => Operation::ListGenres,
            Command::GetLibrary => Operation::GetLibrary,
            Command::PurchaseShow { .. } => Operation::PurchaseShow,
            Command::RemoveShowFromLibrary { .. } => Operation::RemoveShowFromLibrary,
            Command::GetPurchaseHistory { .. } => Operation::GetPurchaseHistory,
            Command::AdminAddShow(_) => Operation::AdminAddShow,
            Command::AdminEditShow { .. } => Operation::AdminEditShow,
            Command::AdminDeleteShow { .. } => Operation::AdminDeleteShow,
            Command::AdminDeleteUser { .. } => Operation::AdminDeleteUser,
            Command::AdminListUsers => Operation::AdminListUsers,
            Command::AdminGetUser { .. } => Operation::AdminGetUser,
            Command::AdminChangePassword(_) => Operation::AdminChangePassword,
            Command::GetStatistics(_) => Operation::GetStatistics,
            Command::GetFinancials(_) => Operation::GetFinancials,
        }
    }

    /// The customer row this command names explicitly, if any.
    pub fn target(&self) -> Target {
        match self {
            Command::GetPurchaseHistory {
                customer_id: Some(id),
            } => Target::Customer(*id),
            Command::AdminDeleteUser { user_id } | Command::AdminGetUser { user_id } => {
                Target::Customer(*user_id)
            }
            _ => Target::None,
        }
    }
}

fn login_args(args: &mut Args) -> Result<LoginArgs, MediatorError> {
    let username: String = args.required("username")?;
    let password: String = args.required("password")?;
    if username.trim().is_empty() {
        return Err(MediatorError::validation("username", "must not be empty"));
    }
    if password.is_empty() {
        return Err(MediatorError::validation("password", "must not be empty"));
    }
    Ok(LoginArgs {
        username: username.trim().to_string(),
        password,
    })
}

fn change_password_args(args: &mut Args) -> Result<ChangePasswordArgs, MediatorError> {
    let current_password: String = args.required("current_password")?;
    let new_password = password("new_password", args.required("new_password")?)?;
    if current_password == new_password {
        return Err(MediatorError::validation(
            "new_password",
            "must differ from the current password",
        ));
    }
    Ok(ChangePasswordArgs {
        current_password,
        new_password,
    })
}

fn list_shows_args(args: &mut Args) -> Result<ListShowsArgs, MediatorError> {
    let page: u32 = args.optional("page")?.unwrap_or(1);
    if page == 0 {
        return Err(MediatorError::validation("page", "must be at least 1"));
    }
    let limit: u32 = args.optional("limit")?.unwrap_or(PAGE_LIMIT_DEFAULT);
    if !(1..=PAGE_LIMIT_MAX).contains(&limit) {
        return Err(MediatorError::validation(
            "limit",
            format!("must be between 1 and {PAGE_LIMIT_MAX}"),
        ));
    }

    Ok(ListShowsArgs {
        genre: args
            .optional::<String>("genre")?
            .map(|g| text("genre", g, TEXT_MAX))
            .transpose()?,
        access_group: args.optional("access_group")?,
        rating: args.optional("rating")?,
        search: args
            .optional::<String>("search")?
            .map(|s| text("search", s, TEXT_MAX))
            .transpose()?,
        sort_by: args.optional("sort_by")?.unwrap_or_default(),
        sort_order: args.optional("sort_order")?.unwrap_or_default(),
        page,
        limit,
    })
}

fn show_fields(args: &mut Args) -> Result<ShowFields, MediatorError> {
    Ok(ShowFields {
        name: text("name", args.required("name")?, TEXT_MAX)?,
        release_date: args.required("release_date")?,
        rating: args.required("rating")?,
        director: text("director", args.required("director")?, TEXT_MAX)?,
        length_minutes: length("length_minutes", args.required("length_minutes")?)?,
        genre: text("genre", args.required("genre")?, TEXT_MAX)?,
        access_group: args.required("access_group")?,
        cost_to_buy: args
            .optional("cost_to_buy")?
            .map(|c| cost("cost_to_buy", c))
            .transpose()?,
    })
}

fn show_patch(args: &mut Args) -> Result<ShowPatch, MediatorError> {
    Ok(ShowPatch {
        name: args
            .optional("name")?
            .map(|v| text("name", v, TEXT_MAX))
            .transpose()?,
        release_date: args.optional("release_date")?,
        rating: args.optional("rating")?,
        director: args
            .optional("director")?
            .map(|v| text("director", v, TEXT_MAX))
            .transpose()?,
        length_minutes: args
            .optional("length_minutes")?
            .map(|v| length("length_minutes", v))
            .transpose()?,
        genre: args
            .optional("genre")?
            .map(|v| text("genre", v, TEXT_MAX))
            .transpose()?,
        access_group: args.optional("access_group")?,
        cost_to_buy: match args.nullable("cost_to_buy")? {
            Some(Some(c)) => Some(Some(cost("cost_to_buy", c)?)),
            other => other,
        },
    })
}

fn date_range(args: &mut Args) -> Result<DateRange, MediatorError> {
    let range = DateRange {
        from: args.optional("from")?,
        to: args.optional("to")?,
    };
    if let (Some(from), Some(to)) = (range.from, range.to) {
        if from > to {
            return Err(MediatorError::validation("to", "must not be before from"));
        }
    }
    Ok(range)
}
