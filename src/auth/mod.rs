pub mod password;

use diesel::prelude::*;
use diesel::PgConnection;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::models::User;
use crate::schema::users;

pub const KIND_PLAINTEXT: &str = "plaintext";
pub const KIND_HASHED: &str = "hashed";

/// A stored password. Plaintext rows predate hashing and stay valid until
/// they are migrated; both variants go through [`Credential::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Plaintext(String),
    Hashed(String),
}

impl Credential {
    pub fn from_stored(kind: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if kind == KIND_PLAINTEXT {
            Credential::Plaintext(value)
        } else {
            Credential::Hashed(value)
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Plaintext(_) => KIND_PLAINTEXT,
            Credential::Hashed(_) => KIND_HASHED,
        }
    }

    pub fn verify(&self, candidate: &str) -> anyhow::Result<bool> {
        match self {
            Credential::Plaintext(stored) => Ok(stored == candidate),
            Credential::Hashed(hash) => password::verify_password(candidate, hash),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated {
        profile: String,
    },
    MustChangePassword {
        user_id: Uuid,
        username: String,
        profile: String,
    },
    Mismatch,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user {0} does not exist")]
    UnknownUser(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

/// Looks the user up before touching the password, so an unknown username is
/// reported without any comparison.
pub fn authenticate(
    conn: &mut PgConnection,
    username: &str,
    candidate: &str,
) -> Result<LoginOutcome, AuthError> {
    let user: User = users::table
        .filter(users::username.eq(username))
        .first(conn)
        .optional()?
        .ok_or_else(|| AuthError::UnknownUser(username.to_string()))?;

    let credential = Credential::from_stored(&user.credential_kind, user.credential.clone());
    let matches = credential.verify(candidate).unwrap_or_else(|err| {
        warn!(username = %user.username, error = %err, "stored credential could not be verified");
        false
    });

    if !matches {
        return Ok(LoginOutcome::Mismatch);
    }

    if user.must_change_password {
        return Ok(LoginOutcome::MustChangePassword {
            user_id: user.id,
            username: user.username,
            profile: user.profile,
        });
    }

    Ok(LoginOutcome::Authenticated {
        profile: user.profile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_requires_exact_match() {
        let credential = Credential::from_stored(KIND_PLAINTEXT, "1234");
        assert!(credential.verify("1234").unwrap());
        assert!(!credential.verify("1234 ").unwrap());
        assert!(!credential.verify("").unwrap());
    }

    #[test]
    fn hashed_credential_uses_hash_verification() {
        let hash = password::hash_password("mecanico").unwrap();
        let credential = Credential::from_stored(KIND_HASHED, hash.clone());
        assert_eq!(credential, Credential::Hashed(hash.clone()));
        assert!(credential.verify("mecanico").unwrap());
        assert!(!credential.verify(&hash).unwrap());
    }

    #[test]
    fn unknown_kind_is_treated_as_hashed() {
        let credential = Credential::from_stored("bcrypt", "$2b$04$abc");
        assert_eq!(credential.kind(), KIND_HASHED);
    }
}
