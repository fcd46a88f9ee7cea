// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process session table.
//!
//! `login` and `admin_login` issue an opaque UUID v4 token mapped to the
//! authenticated [`Principal`]. Entries expire after a fixed TTL measured
//! from issue time; the least recently used entry is evicted when the table
//! is full.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::Principal;

struct SessionEntry {
    principal: Principal,
    issued_at: Instant,
}

/// Bounded LRU of live sessions.
pub struct SessionStore {
    sessions: Mutex<LruCache<String, SessionEntry>>,
    ttl: Duration,
}

impl SessionStore {
    /// Create a session table.
    ///
    /// - `capacity`: Max number of concurrent sessions.
    /// - `ttl`: Lifetime of a session from login.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn table(&self) -> MutexGuard<'_, LruCache<String, SessionEntry>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a session for an authenticated principal and return its token.
    pub fn issue(&self, principal: Principal) -> String {
        let token = Uuid::new_v4().to_string();
        self.table().put(
            token.clone(),
            SessionEntry {
                principal,
                issued_at: Instant::now(),
            },
        );
        token
    }

    /// Resolve a token to its principal.
    ///
    /// Unknown and expired tokens resolve to [`Principal::Anonymous`].
    pub fn resolve(&self, token: &str) -> Principal {
        let mut sessions = self.table();
        if let Some(entry) = sessions.get(token) {
            if entry.issued_at.elapsed() < self.ttl {
                return entry.principal.clone();
            }
            // Expired
            sessions.pop(token);
        }
        Principal::Anonymous
    }

    /// End a session. Returns whether the token was live.
    pub fn revoke(&self, token: &str) -> bool {
        self.table().pop(token).is_some()
    }

    /// End every session belonging to a customer.
    pub fn revoke_customer(&self, customer_id: u64) -> usize {
        self.revoke_where(|principal| principal.customer_id() == Some(customer_id))
    }

    /// Drop all expired sessions. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut sessions = self.table();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| entry.issued_at.elapsed() >= ttl)
            .map(|(token, _)| token.clone())
            .collect();
        for token in &expired {
            sessions.pop(token);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn revoke_where(&self, predicate: impl Fn(&Principal) -> bool) -> usize {
        let mut sessions = self.table();
        let matching: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| predicate(&entry.principal))
            .map(|(token, _)| token.clone())
            .collect();
        for token in &matching {
            sessions.pop(token);
        }
        matching.len()
    }
}

// =============================================================================
// Background Sweeper
// =============================================================================

/// Default interval between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically drops expired sessions so they do not hold LRU slots.
pub struct SessionSweeper {
    sessions: Arc<SessionStore>,
    interval: Duration,
}

impl SessionSweeper {
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self {
            sessions,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Session sweeper starting");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Session sweeper shutting down");
                    return;
                }
            }

            let purged = self.sessions.purge_expired();
            if purged > 0 {
                debug!(purged, live = self.sessions.len(), "Expired sessions purged");
            }
        }
    }
}
