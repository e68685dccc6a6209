//! Password hashing: PBKDF2-HMAC-SHA256 with a random per-user salt
//!
//! Stored form: `pbkdf2-sha256$<iterations>$<salt>$<hash>`, salt and hash in
//! unpadded base64. Verification is constant time.

use agentlab_core::{Error, Result};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};
use ring::{digest, pbkdf2};
use std::num::NonZeroU32;

const SCHEME: &str = "pbkdf2-sha256";
const ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = digest::SHA256_OUTPUT_LEN;

pub const MIN_PASSWORD_LEN: usize = 8;

static ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

pub fn validate(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String> {
    let rounds = NonZeroU32::new(ITERATIONS)
        .ok_or_else(|| Error::Internal("pbkdf2 iterations must be non-zero".into()))?;
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| Error::Internal("system randomness unavailable".into()))?;
    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(ALGORITHM, rounds, &salt, password.as_bytes(), &mut hash);
    Ok(format!(
        "{}${}${}${}",
        SCHEME,
        ITERATIONS,
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash)
    ))
}

/// False for a wrong password and for anything not produced by `hash_password`.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    let [scheme, iterations, salt, hash] = parts.as_slice() else {
        return false;
    };
    if *scheme != SCHEME {
        return false;
    }
    let Some(rounds) = iterations.parse::<u32>().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (STANDARD_NO_PAD.decode(salt), STANDARD_NO_PAD.decode(hash)) else {
        return false;
    };
    pbkdf2::verify(ALGORITHM, rounds, &salt, password.as_bytes(), &hash).is_ok()
}
