// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Command execution.
//!
//! For every call:
//!
//! 1. Parse and validate the arguments ([`Command::parse`])
//! 2. Authorize against the policy table ([`crate::auth::may`])
//! 3. Run the handler inside one redb transaction, including the aggregate
//!    updates its events cause
//! 4. Commit only if every step succeeded
//!
//! Handlers are synchronous and may block (PBKDF2, redb I/O); async callers
//! run them on the blocking pool.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::args::{
    ChangePasswordArgs, Command, CreateAccountArgs, DateRange, LoginArgs, ShowFields, ShowPatch,
};
use super::registry::Operation;
use super::rules::{self, Acquisition};
use crate::aggregation::{self, AggregateEvent};
use crate::auth::{self, Principal, SessionStore};
use crate::crypto::{hash_password, verify_password};
use crate::error::MediatorError;
use crate::models::{
    Customer, CustomerView, DailyFinancials, DailyStatistics, Money, Purchase, Show,
    SubscriptionLevel,
};
use crate::storage::{
    AdminRepository, AggregateRepository, CustomerRepository, NewCustomer, NewShow,
    PurchaseRepository, ShowRepository, Store, StoreResult, WriteScope,
};

/// Prices the mediator charges outside of show purchases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    pub upgrade_price: Money,
    pub basic_signup_fee: Money,
    pub premium_signup_fee: Money,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            upgrade_price: Money::from_cents(8000),
            basic_signup_fee: Money::ZERO,
            premium_signup_fee: Money::ZERO,
        }
    }
}

/// Who is calling, and through which session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub principal: Principal,
    pub session: Option<String>,
}

impl Caller {
    pub fn new(principal: Principal, session: Option<String>) -> Self {
        Self { principal, session }
    }
}

impl From<Principal> for Caller {
    fn from(principal: Principal) -> Self {
        Self {
            principal,
            session: None,
        }
    }
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Serialize)]
struct LoginResponse {
    session: String,
    user: CustomerView,
}

#[derive(Debug, Serialize)]
struct AdminLoginResponse {
    session: String,
    admin_id: u64,
    username: String,
    role: String,
}

#[derive(Debug, Serialize)]
struct PurchaseOutcome {
    show_id: u64,
    charged: Money,
    purchase: Option<Purchase>,
    user: CustomerView,
}

#[derive(Debug, Serialize)]
struct SubscriptionOutcome {
    charged: Money,
    user: CustomerView,
}

#[derive(Debug, Serialize)]
struct ShowDeletion {
    deleted_show_id: u64,
    affected_customers: Vec<u64>,
    purchases_removed: usize,
}

#[derive(Debug, Serialize)]
struct UserDeletion {
    deleted_user_id: u64,
    purchases_removed: usize,
    sessions_revoked: usize,
}

#[derive(Debug, Serialize)]
struct StatisticsReport {
    days: Vec<DailyStatistics>,
}

#[derive(Debug, Serialize)]
struct FinancialsReport {
    days: Vec<DailyFinancials>,
    total_combined_revenue: Money,
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, MediatorError> {
    serde_json::to_value(value).map_err(|e| MediatorError::Internal(e.to_string()))
}

fn ok_flag(name: &str) -> Value {
    let mut map = Map::new();
    map.insert(name.to_string(), Value::Bool(true));
    Value::Object(map)
}

const INVALID_LOGIN: &str = "invalid username or password";

// =============================================================================
// Dispatcher
// =============================================================================

pub struct Dispatcher {
    store: Arc<Store>,
    sessions: Arc<SessionStore>,
    pricing: Pricing,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, sessions: Arc<SessionStore>, pricing: Pricing) -> Self {
        Self {
            store,
            sessions,
            pricing,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Parse, validate, authorize and execute a raw request.
    pub fn dispatch(
        &self,
        caller: &Caller,
        operation: &str,
        args: Value,
    ) -> Result<Value, MediatorError> {
        let operation = Operation::from_name(operation).ok_or_else(|| {
            MediatorError::validation("operation", format!("unknown operation '{operation}'"))
        })?;
        let command = Command::parse(operation, args)?;
        self.execute_at(caller, command, Utc::now())
    }

    /// Authorize and execute an already-parsed command.
    pub fn execute(&self, principal: &Principal, command: Command) -> Result<Value, MediatorError> {
        self.execute_at(&Caller::from(principal.clone()), command, Utc::now())
    }

    /// Like [`execute`](Self::execute) with an explicit clock.
    pub fn execute_at(
        &self,
        caller: &Caller,
        command: Command,
        now: DateTime<Utc>,
    ) -> Result<Value, MediatorError> {
        let operation = command.operation();
        let principal = &caller.principal;

        if !auth::may(principal, operation, command.target()) {
            tracing::warn!(
                target: "audit",
                operation = %operation,
                principal = %principal.label(),
                "Command denied"
            );
            return Err(MediatorError::Authorization(format!(
                "{operation} is not permitted for {}",
                principal.role().map_or("anonymous callers".to_string(), |r| format!("{r}s"))
            )));
        }

        let today = now.date_naive();
        match command {
            Command::CreateAccount(args) => self.create_account(args, today, now),
            Command::Login(args) => self.login(args),
            Command::AdminLogin(args) => self.admin_login(args),
            Command::Logout => self.logout(caller),
            Command::GetAccount => self.get_account(self_id(principal)?),
            Command::ChangePassword(args) => self.change_password(self_id(principal)?, args),
            Command::ChangeSubscription { level } => {
                self.change_subscription(self_id(principal)?, level, today, now)
            }
            Command::SetMarketingOptIn { opt_in } => {
                self.set_marketing_opt_in(self_id(principal)?, opt_in)
            }
            Command::ListShows(query) => {
                let shows = self.store.read(|scope| ShowRepository::new(scope).list())?;
                to_value(&rules::select_shows(shows, &query))
            }
            Command::GetShow { show_id } => {
                let show = self.store.read(|scope| ShowRepository::new(scope).get(show_id))?;
                to_value(&show)
            }
            Command::ListGenres => {
                let genres = self.store.read(|scope| ShowRepository::new(scope).genres())?;
                to_value(&genres)
            }
            Command::GetLibrary => self.get_library(self_id(principal)?),
            Command::PurchaseShow { show_id } => {
                self.purchase_show(self_id(principal)?, show_id, today, now)
            }
            Command::RemoveShowFromLibrary { show_id } => {
                self.remove_show_from_library(self_id(principal)?, show_id)
            }
            Command::GetPurchaseHistory { customer_id } => {
                self.get_purchase_history(principal, customer_id)
            }
            Command::AdminAddShow(fields) => self.add_show(principal, fields),
            Command::AdminEditShow { show_id, changes } => {
                self.edit_show(principal, show_id, changes)
            }
            Command::AdminDeleteShow { show_id } => self.delete_show(principal, show_id, today, now),
            Command::AdminDeleteUser { user_id } => self.delete_user(principal, user_id, today, now),
            Command::AdminListUsers => {
                let views = self.store.read(|scope| {
                    let repo = CustomerRepository::new(scope);
                    repo.list()?
                        .iter()
                        .map(|customer| repo.view(customer))
                        .collect::<StoreResult<Vec<_>>>()
                })?;
                to_value(&views)
            }
            Command::AdminGetUser { user_id } => self.get_account(user_id),
            Command::AdminChangePassword(args) => {
                let admin_id = principal
                    .admin_id()
                    .ok_or_else(|| MediatorError::Authorization("admin session required".into()))?;
                self.admin_change_password(admin_id, args)
            }
            Command::GetStatistics(range) => {
                let days = self.store.read(|scope| {
                    AggregateRepository::new(scope).statistics_range(range.from, range.to)
                })?;
                to_value(&StatisticsReport { days })
            }
            Command::GetFinancials(range) => self.get_financials(range),
        }
    }

    // -------------------------------------------------------------------------
    // Account
    // -------------------------------------------------------------------------

    fn create_account(
        &self,
        args: CreateAccountArgs,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Value, MediatorError> {
        let password = hash_password(&args.password)?;
        let level = args.subscription_level;
        let fee = rules::signup_fee(
            level,
            self.pricing.basic_signup_fee,
            self.pricing.premium_signup_fee,
        );

        let view = self.store.write(|scope| {
            let repo = CustomerRepository::new(scope);
            let mut customer = repo.create(NewCustomer {
                username: args.username,
                email: args.email,
                password,
                subscription_level: level,
                marketing_opt_in: args.marketing_opt_in,
                created_at: now,
            })?;
            if fee != Money::ZERO {
                customer.total_spent = rules::add_spend(customer.total_spent, fee)?;
                repo.update(&customer)?;
            }
            aggregation::on_event(scope, &AggregateEvent::UserCreated { level, fee }, today, now)?;
            Ok::<_, MediatorError>(repo.view(&customer)?)
        })?;

        tracing::info!(user_id = view.user_id, level = %level, "Customer account created");
        to_value(&view)
    }

    fn login(&self, args: LoginArgs) -> Result<Value, MediatorError> {
        let found = self
            .store
            .read(|scope| CustomerRepository::new(scope).find_by_username(&args.username))?;

        let customer = match found {
            Some(c) if verify_password(&args.password, &c.password_hash, &c.salt) => c,
            _ => {
                tracing::warn!(target: "audit", username = %args.username, "Customer login failed");
                return Err(MediatorError::Authentication(INVALID_LOGIN.to_string()));
            }
        };

        let view = self
            .store
            .read(|scope| CustomerRepository::new(scope).view(&customer))?;
        let session = self.sessions.issue(Principal::Customer {
            id: customer.id,
            username: customer.username.clone(),
        });
        tracing::info!(target: "audit", user_id = customer.id, "Customer logged in");
        to_value(&LoginResponse { session, user: view })
    }

    fn admin_login(&self, args: LoginArgs) -> Result<Value, MediatorError> {
        let found = self
            .store
            .read(|scope| AdminRepository::new(scope).find_by_username(&args.username))?;

        let admin = match found {
            Some(a) if verify_password(&args.password, &a.password_hash, &a.salt) => a,
            _ => {
                tracing::warn!(target: "audit", username = %args.username, "Admin login failed");
                return Err(MediatorError::Authentication(INVALID_LOGIN.to_string()));
            }
        };

        let session = self.sessions.issue(Principal::Admin {
            id: admin.id,
            username: admin.username.clone(),
        });
        tracing::info!(target: "audit", admin_id = admin.id, "Admin logged in");
        to_value(&AdminLoginResponse {
            session,
            admin_id: admin.id,
            username: admin.username,
            role: admin.role,
        })
    }

    fn logout(&self, caller: &Caller) -> Result<Value, MediatorError> {
        let revoked = caller
            .session
            .as_deref()
            .is_some_and(|token| self.sessions.revoke(token));
        tracing::debug!(principal = %caller.principal.label(), revoked, "Logout");
        Ok(ok_flag("logged_out"))
    }

    fn get_account(&self, customer_id: u64) -> Result<Value, MediatorError> {
        let view = self.store.read(|scope| {
            let repo = CustomerRepository::new(scope);
            let customer = repo.get(customer_id)?;
            repo.view(&customer)
        })?;
        to_value(&view)
    }

    fn change_password(
        &self,
        customer_id: u64,
        args: ChangePasswordArgs,
    ) -> Result<Value, MediatorError> {
        let fresh = hash_password(&args.new_password)?;
        self.store.write(|scope| {
            let repo = CustomerRepository::new(scope);
            let mut customer = repo.get(customer_id)?;
            if !verify_password(&args.current_password, &customer.password_hash, &customer.salt) {
                tracing::warn!(target: "audit", user_id = customer_id, "Password change rejected");
                return Err(MediatorError::Authentication(
                    "current password is incorrect".to_string(),
                ));
            }
            customer.password_hash = fresh.hash;
            customer.salt = fresh.salt;
            repo.update(&customer)?;
            Ok(())
        })?;

        tracing::info!(target: "audit", user_id = customer_id, "Customer password changed");
        Ok(ok_flag("password_changed"))
    }

    fn change_subscription(
        &self,
        customer_id: u64,
        level: SubscriptionLevel,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Value, MediatorError> {
        let upgrade_price = self.pricing.upgrade_price;
        let outcome = self.store.write(|scope| {
            let repo = CustomerRepository::new(scope);
            let mut customer = repo.get(customer_id)?;
            let from = customer.subscription_level;
            let charge = rules::subscription_charge(from, level, upgrade_price)?;

            customer.subscription_level = level;
            customer.total_spent = rules::add_spend(customer.total_spent, charge)?;
            repo.update(&customer)?;
            aggregation::on_event(
                scope,
                &AggregateEvent::SubscriptionChanged {
                    from,
                    to: level,
                    charge,
                },
                today,
                now,
            )?;

            Ok::<_, MediatorError>(SubscriptionOutcome {
                charged: charge,
                user: repo.view(&customer)?,
            })
        })?;

        tracing::info!(
            user_id = customer_id,
            level = %level,
            charged = %outcome.charged,
            "Subscription changed"
        );
        to_value(&outcome)
    }

    fn set_marketing_opt_in(&self, customer_id: u64, opt_in: bool) -> Result<Value, MediatorError> {
        let view = self.store.write(|scope| {
            let repo = CustomerRepository::new(scope);
            let mut customer = repo.get(customer_id)?;
            customer.marketing_opt_in = opt_in;
            refresh_favourite(scope, &mut customer)?;
            repo.update(&customer)?;
            Ok::<_, MediatorError>(repo.view(&customer)?)
        })?;
        to_value(&view)
    }

    // -------------------------------------------------------------------------
    // Library
    // -------------------------------------------------------------------------

    fn get_library(&self, customer_id: u64) -> Result<Value, MediatorError> {
        let shows = self.store.read(|scope| {
            let ids = CustomerRepository::new(scope).owned_show_ids(customer_id)?;
            let catalog = ShowRepository::new(scope);
            let mut shows = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(show) = catalog.find(id)? {
                    shows.push(show);
                }
            }
            Ok::<_, MediatorError>(shows)
        })?;
        to_value(&shows)
    }

    fn purchase_show(
        &self,
        customer_id: u64,
        show_id: u64,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Value, MediatorError> {
        let outcome = self.store.write(|scope| {
            let customers = CustomerRepository::new(scope);
            let purchases = PurchaseRepository::new(scope);
            let mut customer = customers.get(customer_id)?;
            let show = ShowRepository::new(scope).get(show_id)?;

            if customers.owns(customer_id, show_id)? {
                return Err(MediatorError::Conflict(format!(
                    "show {show_id} is already owned"
                )));
            }

            let mut charged = Money::ZERO;
            let mut purchase = None;
            let acquisition = rules::acquisition(customer.subscription_level, &show)?;
            if let Acquisition::Purchase(cost) = acquisition {
                // A show bought earlier and later removed is re-added for free
                if !purchases.exists(customer_id, show_id)? {
                    purchase = Some(purchases.create(customer_id, show_id, today, cost)?);
                    customer.total_spent = rules::add_spend(customer.total_spent, cost)?;
                    charged = cost;
                    let event = AggregateEvent::ShowPurchased { cost };
                    aggregation::on_event(scope, &event, today, now)?;
                }
            }

            customers.add_to_library(customer_id, show_id, now)?;
            refresh_favourite(scope, &mut customer)?;
            customers.update(&customer)?;

            Ok::<_, MediatorError>(PurchaseOutcome {
                show_id,
                charged,
                purchase,
                user: customers.view(&customer)?,
            })
        })?;

        tracing::info!(
            user_id = customer_id,
            show_id,
            charged = %outcome.charged,
            "Show added to library"
        );
        to_value(&outcome)
    }

    fn remove_show_from_library(
        &self,
        customer_id: u64,
        show_id: u64,
    ) -> Result<Value, MediatorError> {
        let view = self.store.write(|scope| {
            let repo = CustomerRepository::new(scope);
            let mut customer = repo.get(customer_id)?;
            if !repo.remove_from_library(customer_id, show_id)? {
                return Err(MediatorError::NotFound(format!(
                    "Show {show_id} in library"
                )));
            }
            refresh_favourite(scope, &mut customer)?;
            repo.update(&customer)?;
            Ok(repo.view(&customer)?)
        })?;

        tracing::info!(user_id = customer_id, show_id, "Show removed from library");
        to_value(&view)
    }

    fn get_purchase_history(
        &self,
        principal: &Principal,
        customer_id: Option<u64>,
    ) -> Result<Value, MediatorError> {
        // Policy has already restricted customers to their own id
        let scope_id = customer_id.or(principal.customer_id());
        let purchases = self.store.read(|scope| {
            let repo = PurchaseRepository::new(scope);
            match scope_id {
                Some(id) => {
                    CustomerRepository::new(scope).get(id)?;
                    repo.list_for_customer(id)
                }
                None => repo.list(),
            }
        })?;
        to_value(&purchases)
    }

    // -------------------------------------------------------------------------
    // Administration
    // -------------------------------------------------------------------------

    fn add_show(&self, principal: &Principal, fields: ShowFields) -> Result<Value, MediatorError> {
        rules::check_new_show(&fields)?;
        let show = self.store.write(|scope| {
            ShowRepository::new(scope).create(NewShow {
                name: fields.name,
                release_date: fields.release_date,
                rating: fields.rating,
                director: fields.director,
                length_minutes: fields.length_minutes,
                genre: fields.genre,
                access_group: fields.access_group,
                cost_to_buy: fields.cost_to_buy,
            })
        })?;

        tracing::info!(
            target: "audit",
            admin = %principal.label(),
            show_id = show.id,
            "Show added"
        );
        to_value(&show)
    }

    fn edit_show(
        &self,
        principal: &Principal,
        show_id: u64,
        changes: ShowPatch,
    ) -> Result<Value, MediatorError> {
        let show = self.store.write(|scope| {
            let repo = ShowRepository::new(scope);
            let current = repo.get(show_id)?;
            let edited = rules::apply_patch(&current, &changes)?;
            repo.update(&edited)?;

            if edited.genre != current.genre {
                let customers = CustomerRepository::new(scope);
                for owner in customers.owners_of(show_id)? {
                    let mut customer = customers.get(owner)?;
                    if refresh_favourite(scope, &mut customer)? {
                        customers.update(&customer)?;
                    }
                }
            }
            Ok::<_, MediatorError>(edited)
        })?;

        tracing::info!(target: "audit", admin = %principal.label(), show_id, "Show edited");
        to_value(&show)
    }

    fn delete_show(
        &self,
        principal: &Principal,
        show_id: u64,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Value, MediatorError> {
        let deletion = self.store.write(|scope| {
            let removal = ShowRepository::new(scope).delete(show_id)?;

            let customers = CustomerRepository::new(scope);
            for owner in &removal.owners {
                let mut customer = customers.get(*owner)?;
                if refresh_favourite(scope, &mut customer)? {
                    customers.update(&customer)?;
                }
            }
            if !removal.purchases.is_empty() {
                aggregation::on_event(
                    scope,
                    &AggregateEvent::ShowUnpurchasedByDeletion {
                        purchases: removal.purchases.len() as u64,
                    },
                    today,
                    now,
                )?;
            }

            Ok::<_, MediatorError>(ShowDeletion {
                deleted_show_id: removal.show.id,
                affected_customers: removal.owners,
                purchases_removed: removal.purchases.len(),
            })
        })?;

        tracing::warn!(
            target: "audit",
            admin = %principal.label(),
            show_id,
            affected_customers = deletion.affected_customers.len(),
            purchases_removed = deletion.purchases_removed,
            "Show deleted"
        );
        to_value(&deletion)
    }

    fn delete_user(
        &self,
        principal: &Principal,
        user_id: u64,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Value, MediatorError> {
        let (customer, purchases_removed) = self.store.write(|scope| {
            let removed = PurchaseRepository::new(scope).delete_for_customer(user_id)?;
            let customer: Customer = CustomerRepository::new(scope).delete(user_id)?;
            aggregation::on_event(
                scope,
                &AggregateEvent::UserDeleted {
                    level: customer.subscription_level,
                },
                today,
                now,
            )?;
            Ok::<_, MediatorError>((customer, removed.len()))
        })?;

        let sessions_revoked = self.sessions.revoke_customer(customer.id);
        tracing::warn!(
            target: "audit",
            admin = %principal.label(),
            user_id,
            purchases_removed,
            sessions_revoked,
            "Customer deleted"
        );
        to_value(&UserDeletion {
            deleted_user_id: customer.id,
            purchases_removed,
            sessions_revoked,
        })
    }

    fn admin_change_password(
        &self,
        admin_id: u64,
        args: ChangePasswordArgs,
    ) -> Result<Value, MediatorError> {
        let fresh = hash_password(&args.new_password)?;
        self.store.write(|scope| {
            let repo = AdminRepository::new(scope);
            let admin = repo.get(admin_id)?;
            if !verify_password(&args.current_password, &admin.password_hash, &admin.salt) {
                tracing::warn!(target: "audit", admin_id, "Admin password change rejected");
                return Err(MediatorError::Authentication(
                    "current password is incorrect".to_string(),
                ));
            }
            repo.set_password(admin_id, fresh)?;
            Ok(())
        })?;

        tracing::info!(target: "audit", admin_id, "Admin password changed");
        Ok(ok_flag("password_changed"))
    }

    fn get_financials(&self, range: DateRange) -> Result<Value, MediatorError> {
        let days = self.store.read(|scope| {
            AggregateRepository::new(scope).financials_range(range.from, range.to)
        })?;
        let mut total = Money::ZERO;
        for day in &days {
            total = rules::add_spend(total, day.total_combined_revenue)?;
        }
        to_value(&FinancialsReport {
            days,
            total_combined_revenue: total,
        })
    }
}

/// The calling customer's own id.
fn self_id(principal: &Principal) -> Result<u64, MediatorError> {
    principal
        .customer_id()
        .ok_or_else(|| MediatorError::Authorization("customer session required".to_string()))
}

/// Recompute a customer's favourite genre from their current library.
///
/// Every show in the library counts, paid or included with the plan, and
/// removed or deleted shows stop counting. Cleared while the customer is
/// opted out. Returns whether it changed.
fn refresh_favourite(scope: &WriteScope, customer: &mut Customer) -> Result<bool, MediatorError> {
    let favourite = if customer.marketing_opt_in {
        let catalog = ShowRepository::new(scope);
        let mut owned: Vec<Show> = Vec::new();
        for id in CustomerRepository::new(scope).owned_show_ids(customer.id)? {
            if let Some(show) = catalog.find(id)? {
                owned.push(show);
            }
        }
        rules::favourite_genre(owned.iter().map(|s| s.genre.as_str()))
    } else {
        None
    };

    let changed = customer.favourite_genre != favourite;
    customer.favourite_genre = favourite;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionStore;
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("test.redb")).unwrap());
        let sessions = Arc::new(SessionStore::new(64, Duration::from_secs(600)));
        Harness {
            dispatcher: Arc::new(Dispatcher::new(store, sessions, Pricing::default())),
            _dir: dir,
        }
    }

    fn admin() -> Principal {
        Principal::Admin {
            id: 1,
            username: "root".to_string(),
        }
    }

    fn at(day: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2026, 6, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc()
    }

    impl Harness {
        fn run(
            &self,
            principal: &Principal,
            operation: &str,
            args: Value,
        ) -> Result<Value, MediatorError> {
            self.run_at(principal, operation, args, at(1))
        }

        fn run_at(
            &self,
            principal: &Principal,
            operation: &str,
            args: Value,
            now: DateTime<Utc>,
        ) -> Result<Value, MediatorError> {
            let op = Operation::from_name(operation).unwrap();
            let command = Command::parse(op, args)?;
            self.dispatcher
                .execute_at(&Caller::from(principal.clone()), command, now)
        }

        fn signup(&self, username: &str, level: &str) -> Principal {
            let view = self
                .run(
                    &Principal::Anonymous,
                    "create_account",
                    json!({
                        "username": username,
                        "email": format!("{username}@example.com"),
                        "password": "password123",
                        "subscription_level": level,
                    }),
                )
                .unwrap();
            Principal::Customer {
                id: view["user_id"].as_u64().unwrap(),
                username: username.to_string(),
            }
        }

        fn add_show(&self, name: &str, genre: &str, price: Option<f64>) -> u64 {
            let (group, cost) = match price {
                Some(p) => ("Premium", json!(p)),
                None => ("Basic", Value::Null),
            };
            let show = self
                .run(
                    &admin(),
                    "admin_add_show",
                    json!({
                        "name": name,
                        "release_date": "2020-01-01",
                        "rating": "M",
                        "director": "Someone",
                        "length_minutes": 100,
                        "genre": genre,
                        "access_group": group,
                        "cost_to_buy": cost,
                    }),
                )
                .unwrap();
            show["id"].as_u64().unwrap()
        }

        fn account(&self, principal: &Principal) -> Value {
            self.run(principal, "get_account", json!({})).unwrap()
        }

        fn financials(&self) -> Value {
            self.run(&admin(), "get_financials", json!({})).unwrap()
        }

        fn statistics(&self) -> Value {
            self.run(&admin(), "get_statistics", json!({})).unwrap()
        }
    }

    #[test]
    fn basic_customer_buying_premium_show_is_charged() {
        let h = harness();
        let alice = h.signup("alice", "Basic");
        let heist = h.add_show("Heist", "Crime", Some(12.5));

        let outcome = h
            .run(&alice, "purchase_show", json!({"show_id": heist}))
            .unwrap();
        assert_eq!(outcome["charged"], json!(12.5));
        assert_eq!(outcome["purchase"]["cost"], json!(12.5));
        assert_eq!(outcome["user"]["total_spent"], json!(12.5));
        assert_eq!(outcome["user"]["owned_show_ids"], json!([heist]));

        let fin = h.financials();
        assert_eq!(fin["days"][0]["revenue_buys"], json!(12.5));
        assert_eq!(fin["days"][0]["total_combined_revenue"], json!(12.5));
        let stats = h.statistics();
        assert_eq!(stats["days"][0]["total_shows_bought"], json!(1));

        let history = h.run(&alice, "get_purchase_history", json!({})).unwrap();
        assert_eq!(history.as_array().unwrap().len(), 1);
    }

    #[test]
    fn premium_customers_and_basic_shows_are_free() {
        let h = harness();
        let bob = h.signup("bob", "Premium");
        let carol = h.signup("carol", "Basic");
        let heist = h.add_show("Heist", "Crime", Some(9.99));
        let up = h.add_show("Up", "Animation", None);

        let premium = h.run(&bob, "purchase_show", json!({"show_id": heist})).unwrap();
        assert_eq!(premium["charged"], json!(0.0));
        assert!(premium["purchase"].is_null());

        let basic = h.run(&carol, "purchase_show", json!({"show_id": up})).unwrap();
        assert_eq!(basic["charged"], json!(0.0));

        let all = h.run(&admin(), "get_purchase_history", json!({})).unwrap();
        assert!(all.as_array().unwrap().is_empty());
    }

    #[test]
    fn duplicate_purchase_conflicts_without_side_effects() {
        let h = harness();
        let alice = h.signup("alice", "Basic");
        let heist = h.add_show("Heist", "Crime", Some(12.5));
        h.run(&alice, "purchase_show", json!({"show_id": heist}))
            .unwrap();
        let fin_before = h.financials();
        let stats_before = h.statistics();

        let err = h
            .run(&alice, "purchase_show", json!({"show_id": heist}))
            .unwrap_err();
        assert_eq!(err.kind(), "conflict_error");

        assert_eq!(h.account(&alice)["total_spent"], json!(12.5));
        assert_eq!(h.financials()["days"], fin_before["days"]);
        assert_eq!(
            h.statistics()["days"][0]["total_shows_bought"],
            stats_before["days"][0]["total_shows_bought"]
        );
        let history = h.run(&alice, "get_purchase_history", json!({})).unwrap();
        assert_eq!(history.as_array().unwrap().len(), 1);
    }

    #[test]
    fn removing_a_show_keeps_the_purchase_and_readding_is_free() {
        let h = harness();
        let alice = h.signup("alice", "Basic");
        let heist = h.add_show("Heist", "Crime", Some(5.0));
        h.run(&alice, "purchase_show", json!({"show_id": heist}))
            .unwrap();

        let view = h
            .run(&alice, "remove_show_from_library", json!({"show_id": heist}))
            .unwrap();
        assert_eq!(view["owned_show_ids"], json!([]));
        assert_eq!(view["total_spent"], json!(5.0));

        let again = h
            .run(&alice, "remove_show_from_library", json!({"show_id": heist}))
            .unwrap_err();
        assert_eq!(again.kind(), "not_found_error");

        let readd = h.run(&alice, "purchase_show", json!({"show_id": heist})).unwrap();
        assert_eq!(readd["charged"], json!(0.0));
        assert_eq!(readd["user"]["total_spent"], json!(5.0));
    }

    #[test]
    fn opting_out_clears_favourite_genre() {
        let h = harness();
        let alice = h.signup("alice", "Premium");
        let a = h.add_show("A", "Drama", None);
        let b = h.add_show("B", "Crime", None);
        let c = h.add_show("C", "Drama", None);
        for id in [a, b, c] {
            h.run(&alice, "purchase_show", json!({"show_id": id}))
                .unwrap();
        }
        assert!(h.account(&alice)["favourite_genre"].is_null());

        let opted_in = h
            .run(&alice, "set_marketing_opt_in", json!({"opt_in": true}))
            .unwrap();
        assert_eq!(opted_in["favourite_genre"], json!("Drama"));

        let opted_out = h
            .run(&alice, "set_marketing_opt_in", json!({"opt_in": false}))
            .unwrap();
        assert!(opted_out["favourite_genre"].is_null());
        assert_eq!(opted_out["marketing_opt_in"], json!(false));
    }

    #[test]
    fn favourite_genre_follows_the_current_library() {
        let h = harness();
        let alice = h.signup("alice", "Basic");
        h.run(&alice, "set_marketing_opt_in", json!({"opt_in": true}))
            .unwrap();
        let heist = h.add_show("Heist", "Crime", Some(4.0));
        let noir = h.add_show("Noir", "Crime", Some(4.0));
        let up = h.add_show("Up", "Animation", None);

        for id in [heist, noir, up] {
            h.run(&alice, "purchase_show", json!({"show_id": id}))
                .unwrap();
        }
        assert_eq!(h.account(&alice)["favourite_genre"], json!("Crime"));

        // Paid purchases stay in the history but no longer count once removed
        for id in [heist, noir] {
            h.run(&alice, "remove_show_from_library", json!({"show_id": id}))
                .unwrap();
        }
        assert_eq!(h.account(&alice)["favourite_genre"], json!("Animation"));
        let history = h.run(&alice, "get_purchase_history", json!({})).unwrap();
        assert_eq!(history.as_array().unwrap().len(), 2);
    }

    #[test]
    fn racing_purchases_of_one_show_charge_once() {
        let h = harness();
        let anonymous = Caller::from(Principal::Anonymous);
        let view = h
            .dispatcher
            .dispatch(
                &anonymous,
                "create_account",
                json!({"username": "alice", "email": "alice@example.com", "password": "password123"}),
            )
            .unwrap();
        let alice = Principal::Customer {
            id: view["user_id"].as_u64().unwrap(),
            username: "alice".to_string(),
        };
        let show = h
            .dispatcher
            .dispatch(
                &Caller::from(admin()),
                "admin_add_show",
                json!({
                    "name": "Heist",
                    "release_date": "2020-01-01",
                    "rating": "M",
                    "director": "Someone",
                    "length_minutes": 100,
                    "genre": "Crime",
                    "access_group": "Premium",
                    "cost_to_buy": 12.5,
                }),
            )
            .unwrap();
        let show_id = show["id"].as_u64().unwrap();

        let barrier = Arc::new(std::sync::Barrier::new(8));
        let racers: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = h.dispatcher.clone();
                let barrier = barrier.clone();
                let caller = Caller::from(alice.clone());
                std::thread::spawn(move || {
                    barrier.wait();
                    dispatcher.dispatch(&caller, "purchase_show", json!({"show_id": show_id}))
                })
            })
            .collect();
        let results: Vec<_> = racers.into_iter().map(|t| t.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.kind(), "conflict_error");
        }

        let caller = Caller::from(alice.clone());
        let history = h
            .dispatcher
            .dispatch(&caller, "get_purchase_history", json!({}))
            .unwrap();
        assert_eq!(history.as_array().unwrap().len(), 1);
        let account = h.dispatcher.dispatch(&caller, "get_account", json!({})).unwrap();
        assert_eq!(account["total_spent"], json!(12.5));

        let fin = h
            .dispatcher
            .dispatch(&Caller::from(admin()), "get_financials", json!({}))
            .unwrap();
        let revenue: f64 = fin["days"]
            .as_array()
            .unwrap()
            .iter()
            .map(|day| day["revenue_buys"].as_f64().unwrap())
            .sum();
        assert_eq!(revenue, 12.5);
    }

    #[test]
    fn show_deletion_cascades_across_owners() {
        let h = harness();
        let alice = h.signup("alice", "Basic");
        let bob = h.signup("bob", "Premium");
        let heist = h.add_show("Heist", "Crime", Some(12.5));
        let up = h.add_show("Up", "Animation", None);

        h.run(&alice, "set_marketing_opt_in", json!({"opt_in": true}))
            .unwrap();
        for principal in [&alice, &bob] {
            h.run(principal, "purchase_show", json!({"show_id": heist}))
                .unwrap();
        }
        h.run(&alice, "purchase_show", json!({"show_id": up})).unwrap();
        // Tie between Animation and Crime goes to Animation
        assert_eq!(h.account(&alice)["favourite_genre"], json!("Animation"));

        let deletion = h
            .run(&admin(), "admin_delete_show", json!({"show_id": heist}))
            .unwrap();
        assert_eq!(deletion["purchases_removed"], json!(1));
        let mut affected: Vec<u64> = deletion["affected_customers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_u64().unwrap())
            .collect();
        affected.sort();
        assert_eq!(
            affected,
            vec![alice.customer_id().unwrap(), bob.customer_id().unwrap()]
        );

        assert_eq!(h.account(&alice)["owned_show_ids"], json!([up]));
        assert_eq!(h.account(&bob)["owned_show_ids"], json!([]));
        assert_eq!(h.account(&alice)["favourite_genre"], json!("Animation"));

        let history = h.run(&admin(), "get_purchase_history", json!({})).unwrap();
        assert!(history.as_array().unwrap().is_empty());

        // Revenue already booked is kept
        assert_eq!(h.financials()["days"][0]["revenue_buys"], json!(12.5));
        let missing = h.run(&admin(), "get_show", json!({"show_id": heist})).unwrap_err();
        assert_eq!(missing.kind(), "not_found_error");
    }

    #[test]
    fn upgrade_charges_configured_price() {
        let h = harness();
        let alice = h.signup("alice", "Basic");

        let outcome = h
            .run(&alice, "change_subscription", json!({"subscription_level": "Premium"}))
            .unwrap();
        assert_eq!(outcome["charged"], json!(80.0));
        assert_eq!(outcome["user"]["subscription_level"], json!("Premium"));
        assert_eq!(outcome["user"]["total_spent"], json!(80.0));

        let fin = h.financials();
        assert_eq!(fin["days"][0]["premium_subscription_revenue"], json!(80.0));
        assert_eq!(fin["days"][0]["revenue_subscriptions"], json!(80.0));
        assert_eq!(fin["days"][0]["total_combined_revenue"], json!(80.0));
        assert_eq!(fin["total_combined_revenue"], json!(80.0));

        let stats = h.statistics();
        assert_eq!(stats["days"][0]["premium_subscriptions"], json!(1));
        assert_eq!(stats["days"][0]["basic_subscriptions"], json!(0));

        let same = h
            .run(&alice, "change_subscription", json!({"subscription_level": "Premium"}))
            .unwrap_err();
        assert_eq!(same.kind(), "conflict_error");

        let downgrade = h
            .run(&alice, "change_subscription", json!({"subscription_level": "Basic"}))
            .unwrap();
        assert_eq!(downgrade["charged"], json!(0.0));
        assert_eq!(downgrade["user"]["total_spent"], json!(80.0));
    }

    #[test]
    fn day_rollover_carries_levels_and_resets_flows() {
        let h = harness();
        let alice = h.signup("alice", "Basic");
        let heist = h.add_show("Heist", "Crime", Some(3.0));
        h.run(&alice, "purchase_show", json!({"show_id": heist}))
            .unwrap();

        h.run_at(
            &alice,
            "change_subscription",
            json!({"subscription_level": "Premium"}),
            at(2),
        )
        .unwrap();

        let stats = h.statistics();
        let days = stats["days"].as_array().unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[1]["date"], json!("2026-06-02"));
        assert_eq!(days[1]["total_users"], json!(1));
        assert_eq!(days[1]["total_shows_bought"], json!(0));
        assert_eq!(days[1]["premium_subscriptions"], json!(1));

        let fin = h.financials();
        assert_eq!(fin["days"][0]["revenue_buys"], json!(3.0));
        assert_eq!(fin["days"][1]["revenue_buys"], json!(0.0));
        assert_eq!(fin["total_combined_revenue"], json!(83.0));

        let window = h
            .run(&admin(), "get_financials", json!({"from": "2026-06-02"}))
            .unwrap();
        assert_eq!(window["days"].as_array().unwrap().len(), 1);

        // An event stamped before the latest aggregate day is refused
        let late = h.run_at(
            &Principal::Anonymous,
            "create_account",
            json!({"username": "late", "email": "late@x.io", "password": "password123"}),
            at(1),
        );
        assert_eq!(late.unwrap_err().kind(), "consistency_error");
    }

    #[test]
    fn authorization_is_enforced_after_validation() {
        let h = harness();
        let alice = h.signup("alice", "Basic");
        let bob = h.signup("bob", "Basic");

        let err = h
            .run(&Principal::Anonymous, "list_shows", json!({}))
            .unwrap_err();
        assert_eq!(err.kind(), "authorization_error");

        let err = h
            .run(&alice, "admin_delete_user", json!({"user_id": bob.customer_id().unwrap()}))
            .unwrap_err();
        assert_eq!(err.kind(), "authorization_error");

        let err = h
            .run(
                &alice,
                "get_purchase_history",
                json!({"customer_id": bob.customer_id().unwrap()}),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "authorization_error");

        let err = h
            .run(&admin(), "purchase_show", json!({"show_id": 1}))
            .unwrap_err();
        assert_eq!(err.kind(), "authorization_error");

        // Bad arguments are reported before the caller is checked
        let err = h
            .run(&Principal::Anonymous, "admin_delete_user", json!({"user_id": "x"}))
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(err.field(), Some("user_id"));
    }

    #[test]
    fn login_issues_session_and_logout_revokes_it() {
        let h = harness();
        h.signup("alice", "Basic");

        let wrong = h
            .run(
                &Principal::Anonymous,
                "login",
                json!({"username": "alice", "password": "not-the-password"}),
            )
            .unwrap_err();
        assert_eq!(wrong.kind(), "authentication_error");

        let unknown = h
            .run(
                &Principal::Anonymous,
                "login",
                json!({"username": "nobody", "password": "password123"}),
            )
            .unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());

        let login = h
            .run(
                &Principal::Anonymous,
                "login",
                json!({"username": "ALICE", "password": "password123"}),
            )
            .unwrap();
        let token = login["session"].as_str().unwrap().to_string();
        let principal = h.dispatcher.sessions().resolve(&token);
        assert_eq!(principal.customer_id(), login["user"]["user_id"].as_u64());

        let caller = Caller::new(principal, Some(token.clone()));
        h.dispatcher
            .dispatch(&caller, "logout", json!({}))
            .unwrap();
        assert!(!h.dispatcher.sessions().resolve(&token).is_authenticated());
    }

    #[test]
    fn admin_login_and_password_rotation() {
        let h = harness();
        crate::storage::seed::ensure_admin(
            h.dispatcher.store(),
            "root",
            hash_password("admin-password").unwrap(),
        )
        .unwrap();

        let login = h
            .run(
                &Principal::Anonymous,
                "admin_login",
                json!({"username": "root", "password": "admin-password"}),
            )
            .unwrap();
        let principal = h
            .dispatcher
            .sessions()
            .resolve(login["session"].as_str().unwrap());
        assert_eq!(principal.admin_id(), Some(1));

        let rejected = h
            .run(
                &principal,
                "admin_change_password",
                json!({"current_password": "wrong-password", "new_password": "rotated-password"}),
            )
            .unwrap_err();
        assert_eq!(rejected.kind(), "authentication_error");

        h.run(
            &principal,
            "admin_change_password",
            json!({"current_password": "admin-password", "new_password": "rotated-password"}),
        )
        .unwrap();
        let relogin = h.run(
            &Principal::Anonymous,
            "admin_login",
            json!({"username": "root", "password": "rotated-password"}),
        );
        assert!(relogin.is_ok());
    }

    #[test]
    fn change_password_requires_current_password() {
        let h = harness();
        let alice = h.signup("alice", "Basic");

        let err = h
            .run(
                &alice,
                "change_password",
                json!({"current_password": "wrong-one!", "new_password": "brand-new-pass"}),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "authentication_error");

        h.run(
            &alice,
            "change_password",
            json!({"current_password": "password123", "new_password": "brand-new-pass"}),
        )
        .unwrap();
        let login = h.run(
            &Principal::Anonymous,
            "login",
            json!({"username": "alice", "password": "brand-new-pass"}),
        );
        assert!(login.is_ok());
    }

    #[test]
    fn deleting_a_user_cascades_and_revokes_sessions() {
        let h = harness();
        let alice = h.signup("alice", "Basic");
        h.signup("bob", "Premium");
        let heist = h.add_show("Heist", "Crime", Some(4.0));
        h.run(&alice, "purchase_show", json!({"show_id": heist}))
            .unwrap();
        h.run(
            &Principal::Anonymous,
            "login",
            json!({"username": "alice", "password": "password123"}),
        )
        .unwrap();

        let id = alice.customer_id().unwrap();
        let deletion = h
            .run(&admin(), "admin_delete_user", json!({"user_id": id}))
            .unwrap();
        assert_eq!(deletion["purchases_removed"], json!(1));
        assert_eq!(deletion["sessions_revoked"], json!(1));

        let gone = h
            .run(&admin(), "admin_get_user", json!({"user_id": id}))
            .unwrap_err();
        assert_eq!(gone.kind(), "not_found_error");

        let stats = h.statistics();
        assert_eq!(stats["days"][0]["total_users"], json!(1));
        assert_eq!(stats["days"][0]["basic_subscriptions"], json!(0));
        assert_eq!(stats["days"][0]["premium_subscriptions"], json!(1));

        let users = h.run(&admin(), "admin_list_users", json!({})).unwrap();
        assert_eq!(users.as_array().unwrap().len(), 1);

        // The username can be registered again
        h.signup("alice", "Basic");
    }

    #[test]
    fn duplicate_signup_is_a_conflict() {
        let h = harness();
        h.signup("alice", "Basic");
        let err = h
            .run(
                &Principal::Anonymous,
                "create_account",
                json!({"username": "Alice", "email": "other@x.io", "password": "password123"}),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "conflict_error");

        let stats = h.statistics();
        assert_eq!(stats["days"][0]["total_users"], json!(1));
    }

    #[test]
    fn catalog_listing_and_edits() {
        let h = harness();
        let alice = h.signup("alice", "Premium");
        let heist = h.add_show("Heist", "Crime", Some(6.0));
        h.add_show("Up", "Animation", None);
        h.run(&alice, "set_marketing_opt_in", json!({"opt_in": true}))
            .unwrap();
        h.run(&alice, "purchase_show", json!({"show_id": heist}))
            .unwrap();

        let page = h
            .run(&alice, "list_shows", json!({"access_group": "Premium"}))
            .unwrap();
        assert_eq!(page["pagination"]["total_count"], json!(1));
        assert_eq!(page["shows"][0]["name"], json!("Heist"));

        let genres = h.run(&alice, "list_genres", json!({})).unwrap();
        assert_eq!(genres, json!(["Animation", "Crime"]));

        let edited = h
            .run(
                &admin(),
                "admin_edit_show",
                json!({"show_id": heist, "genre": "Thriller", "access_group": "Basic"}),
            )
            .unwrap();
        assert_eq!(edited["access_group"], json!("Basic"));
        assert!(edited["cost_to_buy"].is_null());
        assert_eq!(h.account(&alice)["favourite_genre"], json!("Thriller"));

        let bad = h
            .run(
                &admin(),
                "admin_add_show",
                json!({
                    "name": "Priced Basic",
                    "release_date": "2020-01-01",
                    "rating": "G",
                    "director": "Someone",
                    "length_minutes": 90,
                    "genre": "Family",
                    "access_group": "Basic",
                    "cost_to_buy": 1.0,
                }),
            )
            .unwrap_err();
        assert_eq!(bad.field(), Some("cost_to_buy"));

        let library = h.run(&alice, "get_library", json!({})).unwrap();
        assert_eq!(library[0]["genre"], json!("Thriller"));
    }
}
