use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;

const BCRYPT_PREFIX: &str = "$2";

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?
        .to_string())
}

/// Checks `password` against a stored hash. Argon2 PHC strings are the
/// current format; `$2…` bcrypt hashes come from rows created before it.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    if password_hash.starts_with(BCRYPT_PREFIX) {
        return bcrypt::verify(password, password_hash).map_err(|err| anyhow!(err));
    }

    let parsed_hash = PasswordHash::new(password_hash).map_err(|err| anyhow!(err))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
