//! Opaque access tokens and password digests.
//!
//! A token is `user_id:core:salt` with the core and salt base64-encoded.
//! Only the argon2 hash of the core is stored server-side, so a leaked
//! sessions table does not leak usable tokens. Passwords go through the
//! same raw argon2 derivation with a per-user salt.

use crate::{
    model::{Id, user::UserMarker},
    util::PositiveDuration,
};
use argon2::{Argon2, Params};
use base64::{DecodeError, Engine, display::Base64Display, prelude::BASE64_STANDARD};
use std::{
    fmt::{Debug, Formatter},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;
use time::UtcDateTime;

pub const TOKEN_CORE_LEN: usize = 24;
pub const TOKEN_SALT_LEN: usize = 18;
pub const TOKEN_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;

pub const PASSWORD_SALT_LEN: usize = 16;
pub const PASSWORD_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Argon2 derivation failed: {0}")]
pub struct HashError(argon2::Error);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum TokenDecodeError {
    #[error("Not enough parts separated by ':'")]
    NotEnoughParts,
    #[error("Invalid user id: {0}")]
    InvalidUserId(ParseIntError),
    #[error("Decoding base64 failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("The length of the core part is incorrect")]
    InvalidCoreLength,
    #[error("The length of the salt part is incorrect")]
    InvalidSaltLength,
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AccessToken {
    pub user_id: Id<UserMarker>,
    pub core: [u8; TOKEN_CORE_LEN],
    pub salt: [u8; TOKEN_SALT_LEN],
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AccessTokenHash(pub Box<[u8; TOKEN_HASH_LEN]>);

/// A stored login session: the hashed token plus its validity window.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Session {
    pub user: Id<UserMarker>,
    pub token_hash: AccessTokenHash,
    pub created_at: UtcDateTime,
    pub expires_after: Option<PositiveDuration>,
}

impl Session {
    #[must_use]
    pub fn is_expired_at(&self, now: UtcDateTime) -> bool {
        self.expires_after
            .is_some_and(|expires_after| self.created_at + expires_after.get() < now)
    }
}

impl AccessToken {
    #[must_use]
    pub fn generate_random(user_id: Id<UserMarker>) -> Self {
        let core = rand::random();
        let salt = rand::random();

        Self {
            user_id,
            core,
            salt,
        }
    }

    #[must_use]
    pub fn as_token_str(&self) -> String {
        let user_id = self.user_id;
        let encoded_core = Base64Display::new(&self.core, &BASE64_STANDARD);
        let encoded_salt = Base64Display::new(&self.salt, &BASE64_STANDARD);

        format!("{user_id}:{encoded_core}:{encoded_salt}")
    }

    pub fn hash(&self) -> Result<AccessTokenHash, HashError> {
        let mut hash = Box::new([0; TOKEN_HASH_LEN]);
        Argon2::default()
            .hash_password_into(&self.core, &self.salt, &mut *hash)
            .map_err(HashError)?;

        Ok(AccessTokenHash(hash))
    }
}

impl FromStr for AccessToken {
    type Err = TokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');

        let user_id_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let core_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let salt_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;

        let user_id = u64::from_str(user_id_part)
            .map_err(Self::Err::InvalidUserId)?
            .into();
        let core = BASE64_STANDARD
            .decode(core_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidCoreLength)?;
        let salt = BASE64_STANDARD
            .decode(salt_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidSaltLength)?;

        Ok(Self {
            user_id,
            core,
            salt,
        })
    }
}

/// A password hash with the salt it was derived under.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PasswordDigest {
    pub hash: Box<[u8; PASSWORD_HASH_LEN]>,
    pub salt: [u8; PASSWORD_SALT_LEN],
}

impl PasswordDigest {
    pub fn derive(password: &str) -> Result<Self, HashError> {
        let salt = rand::random();
        Ok(Self {
            hash: derive_password_hash(password, &salt)?,
            salt,
        })
    }

    pub fn verify(&self, password: &str) -> Result<bool, HashError> {
        let candidate = derive_password_hash(password, &self.salt)?;
        Ok(candidate == self.hash)
    }
}

fn derive_password_hash(
    password: &str,
    salt: &[u8; PASSWORD_SALT_LEN],
) -> Result<Box<[u8; PASSWORD_HASH_LEN]>, HashError> {
    let mut hash = Box::new([0; PASSWORD_HASH_LEN]);
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut *hash)
        .map_err(HashError)?;
    Ok(hash)
}

impl Debug for AccessToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("user_id", &self.user_id)
            .field("core", &"[redacted]")
            .field("salt", &"[redacted]")
            .finish()
    }
}

impl Debug for AccessTokenHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AccessTokenHash").field(&"[redacted]").finish()
    }
}

impl Debug for PasswordDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordDigest")
            .field("hash", &"[redacted]")
            .field("salt", &"[redacted]")
            .finish()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("A stored hash had an invalid length")]
pub struct InvalidTokenHashError;

impl TryFrom<Box<[u8]>> for AccessTokenHash {
    type Error = InvalidTokenHashError;

    fn try_from(value: Box<[u8]>) -> Result<Self, Self::Error> {
        Ok(Self(
            value.try_into().map_err(|_| InvalidTokenHashError)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::auth::{AccessToken, PasswordDigest, TokenDecodeError};
    use std::str::FromStr;

    #[test]
    fn token_string_round_trips() {
        let token = AccessToken::generate_random(42_u64.into());
        let parsed = AccessToken::from_str(&token.as_token_str()).unwrap();
        assert_eq!(parsed, token);
    }

    #[test]
    fn malformed_tokens_fail_to_parse() {
        assert!(matches!(
            AccessToken::from_str("no-separators"),
            Err(TokenDecodeError::NotEnoughParts)
        ));
        assert!(matches!(
            AccessToken::from_str("abc:AAAA:AAAA"),
            Err(TokenDecodeError::InvalidUserId(_))
        ));
        assert!(matches!(
            AccessToken::from_str("1:AAAA:AAAA"),
            Err(TokenDecodeError::InvalidCoreLength)
        ));
    }

    #[test]
    fn password_verification() {
        let digest = PasswordDigest::derive("correct horse").unwrap();
        assert!(digest.verify("correct horse").unwrap());
        assert!(!digest.verify("battery staple").unwrap());
    }
}
