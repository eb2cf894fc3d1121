//! Identity and token models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Domain user. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User with password hash, only used where credentials are checked.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// Insert payload for a new identity.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Partial update of an identity. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

/// Which half of a token pair a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims embedded in access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user ID (standard JWT `sub` claim, decimal string).
    pub sub: String,
    /// Issuer: host the token was requested from.
    pub iss: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Unique token id.
    pub jti: String,
    pub typ: TokenKind,
    /// Role names held at issuance.
    #[serde(default)]
    pub roles: Vec<String>,
    /// `group:name` permission strings held at issuance.
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl TokenClaims {
    /// Numeric subject id, if `sub` is a positive integer.
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse::<i64>().ok().filter(|id| *id > 0)
    }
}

/// An issued access + refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}
