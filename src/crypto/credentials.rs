// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Salted password hashing for customer and admin credentials.
//!
//! Hashes are PBKDF2-HMAC-SHA256 with a fresh 16-byte salt per password.
//! Both hash and salt are stored base64-encoded next to the account row.
//! Verification goes through `ring::pbkdf2::verify`, which compares in
//! constant time.

use std::num::NonZeroU32;

use base64ct::{Base64, Encoding};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

const HASH_LEN: usize = ring::digest::SHA256_OUTPUT_LEN;

const PASSWORD_ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(n) => n,
    None => unreachable!(),
};

static ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// The operating system random source failed.
#[derive(Debug, thiserror::Error)]
#[error("system random source unavailable")]
pub struct EntropyError;

/// A stored password hash and the salt it was derived with.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash {
    pub hash: String,
    pub salt: String,
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHash").finish_non_exhaustive()
    }
}

/// Fill a buffer from the system CSPRNG.
pub(crate) fn random_bytes<const N: usize>(rng: &SystemRandom) -> Result<[u8; N], EntropyError> {
    let mut buf = [0u8; N];
    rng.fill(&mut buf).map_err(|_| EntropyError)?;
    Ok(buf)
}

/// Hash a plaintext password with a freshly generated salt.
pub fn hash_password(plaintext: &str) -> Result<PasswordHash, EntropyError> {
    let salt: [u8; SALT_LEN] = random_bytes(&SystemRandom::new())?;
    let mut out = [0u8; HASH_LEN];
    pbkdf2::derive(ALGORITHM, PASSWORD_ITERATIONS, &salt, plaintext.as_bytes(), &mut out);

    Ok(PasswordHash {
        hash: Base64::encode_string(&out),
        salt: Base64::encode_string(&salt),
    })
}

/// Check a plaintext password against a stored hash and salt.
///
/// Returns `false` on mismatch and on any malformed stored value.
pub fn verify_password(plaintext: &str, hash: &str, salt: &str) -> bool {
    let (Ok(expected), Ok(salt)) = (Base64::decode_vec(hash), Base64::decode_vec(salt)) else {
        return false;
    };
    if expected.len() != HASH_LEN || salt.len() != SALT_LEN {
        return false;
    }

    pbkdf2::verify(
        ALGORITHM,
        PASSWORD_ITERATIONS,
        &salt,
        plaintext.as_bytes(),
        &expected,
    )
    .is_ok()
}
