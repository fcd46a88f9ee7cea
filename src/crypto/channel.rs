// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Symmetric secure channel between client processes and the mediator.
//!
//! ## Key Derivation
//!
//! The AES-256 key is derived from a shared secret phrase with
//! PBKDF2-HMAC-SHA256 and a configuration-supplied salt. Both sides must use
//! the same phrase, salt and iteration count.
//!
//! ## Token Layout
//!
//! ```text
//! base64( version(1) | issued_at(8, big-endian unix secs) | nonce(12) | ciphertext | tag(16) )
//! ```
//!
//! Version and timestamp are bound to the ciphertext as associated data, so
//! neither can be altered without failing the integrity check. Tokens older
//! than the TTL, or stamped too far in the future, are rejected.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64ct::{Base64, Encoding};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::SystemRandom;

use super::credentials::random_bytes;

/// Minimum accepted PBKDF2 iteration count.
pub const MIN_KDF_ITERATIONS: u32 = 10_000;

/// Required salt length for key derivation.
pub const CHANNEL_SALT_LEN: usize = 16;

const TOKEN_VERSION: u8 = 0x01;
const HEADER_LEN: usize = 1 + 8;
const TAG_LEN: usize = 16;

/// How far ahead of our clock a token timestamp may be.
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Channel failures. Everything after key setup is a potential tampering
/// signal and is reported to clients as a decryption error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel iteration count must be at least {MIN_KDF_ITERATIONS}")]
    WeakKdf,

    #[error("channel salt must be {CHANNEL_SALT_LEN} bytes")]
    BadSalt,

    #[error("token is not valid base64")]
    Encoding,

    #[error("token is truncated or has an unknown version")]
    Malformed,

    #[error("token failed integrity verification")]
    Integrity,

    #[error("token has expired")]
    Expired,

    #[error("token timestamp is in the future")]
    FromFuture,

    #[error("token nonce was already used")]
    Replayed,

    #[error("too many requests in the replay window")]
    Saturated,

    #[error("encryption failed")]
    Seal,
}

/// A successfully opened token.
#[derive(Debug)]
pub struct Opened {
    pub plaintext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub issued_at: u64,
}

/// Shared-key authenticated encryption for request and response payloads.
pub struct SecureChannel {
    key: LessSafeKey,
    rng: SystemRandom,
    ttl: Duration,
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SecureChannel {
    /// Derive the channel key from a shared secret phrase.
    pub fn derive(
        secret: &str,
        salt: &[u8],
        iterations: u32,
        ttl: Duration,
    ) -> Result<Self, ChannelError> {
        if iterations < MIN_KDF_ITERATIONS {
            return Err(ChannelError::WeakKdf);
        }
        let iterations = NonZeroU32::new(iterations).ok_or(ChannelError::WeakKdf)?;
        if salt.len() != CHANNEL_SALT_LEN {
            return Err(ChannelError::BadSalt);
        }

        let mut key_bytes = [0u8; 32];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            salt,
            secret.as_bytes(),
            &mut key_bytes,
        );
        let unbound =
            UnboundKey::new(&aead::AES_256_GCM, &key_bytes).map_err(|_| ChannelError::Seal)?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Encrypt a payload into a transport token stamped with the current time.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, ChannelError> {
        self.encrypt_at(plaintext, unix_now())
    }

    pub fn encrypt_at(&self, plaintext: &[u8], issued_at: u64) -> Result<String, ChannelError> {
        let nonce_bytes: [u8; NONCE_LEN] =
            random_bytes(&self.rng).map_err(|_| ChannelError::Seal)?;
        let header = header(issued_at);

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(&header[..]),
                &mut in_out,
            )
            .map_err(|_| ChannelError::Seal)?;

        let mut token = Vec::with_capacity(HEADER_LEN + NONCE_LEN + in_out.len());
        token.extend_from_slice(&header);
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&in_out);
        Ok(Base64::encode_string(&token))
    }

    /// Decrypt a token, enforcing integrity and freshness.
    pub fn decrypt(&self, token: &str) -> Result<Vec<u8>, ChannelError> {
        self.open_at(token, unix_now()).map(|opened| opened.plaintext)
    }

    /// Decrypt a token as of `now`, returning the nonce for replay tracking.
    pub fn open_at(&self, token: &str, now: u64) -> Result<Opened, ChannelError> {
        let raw = Base64::decode_vec(token.trim()).map_err(|_| ChannelError::Encoding)?;
        if raw.len() < HEADER_LEN + NONCE_LEN + TAG_LEN || raw[0] != TOKEN_VERSION {
            return Err(ChannelError::Malformed);
        }

        let (header, rest) = raw.split_at(HEADER_LEN);
        let (nonce_slice, sealed) = rest.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_slice);
        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(&header[1..]);
        let issued_at = u64::from_be_bytes(stamp);

        let mut in_out = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(
                Nonce::assume_unique_for_key(nonce),
                Aad::from(header),
                &mut in_out,
            )
            .map_err(|_| ChannelError::Integrity)?
            .to_vec();

        // Freshness is only meaningful once the timestamp is authenticated.
        if issued_at > now.saturating_add(CLOCK_SKEW_LEEWAY) {
            return Err(ChannelError::FromFuture);
        }
        if now.saturating_sub(issued_at) > self.ttl.as_secs() {
            return Err(ChannelError::Expired);
        }

        Ok(Opened {
            plaintext,
            nonce,
            issued_at,
        })
    }
}

fn header(issued_at: u64) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = TOKEN_VERSION;
    header[1..].copy_from_slice(&issued_at.to_be_bytes());
    header
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// =============================================================================
// Replay Guard
// =============================================================================

/// Remembers accepted request nonces until their tokens expire.
///
/// A nonce is held until `issued_at + window`, after which the token itself
/// is rejected as expired. Entries are never evicted early: once `capacity`
/// live nonces are held, new requests are refused until some expire.
pub struct ReplayGuard {
    seen: Mutex<SeenNonces>,
    capacity: usize,
    window: Duration,
}

#[derive(Default)]
struct SeenNonces {
    expires: HashMap<[u8; NONCE_LEN], u64>,
    by_expiry: BinaryHeap<Reverse<(u64, [u8; NONCE_LEN])>>,
}

impl SeenNonces {
    fn prune(&mut self, now: u64) {
        while let Some(Reverse((expires_at, nonce))) = self.by_expiry.peek().copied() {
            if expires_at >= now {
                break;
            }
            self.by_expiry.pop();
            self.expires.remove(&nonce);
        }
    }
}

impl ReplayGuard {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            seen: Mutex::new(SeenNonces::default()),
            capacity: capacity.max(1),
            window,
        }
    }

    /// Record a nonce; fails if it is still held or the table is full.
    pub fn check(&self, opened: &Opened, now: u64) -> Result<(), ChannelError> {
        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        seen.prune(now);

        if seen.expires.contains_key(&opened.nonce) {
            return Err(ChannelError::Replayed);
        }
        if seen.expires.len() >= self.capacity {
            return Err(ChannelError::Saturated);
        }

        let expires_at = opened.issued_at.saturating_add(self.window.as_secs());
        seen.expires.insert(opened.nonce, expires_at);
        seen.by_expiry.push(Reverse((expires_at, opened.nonce)));
        Ok(())
    }

    /// Nonces currently held.
    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .expires
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
