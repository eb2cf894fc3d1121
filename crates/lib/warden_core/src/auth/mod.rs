//! Authentication and authorization.
//!
//! Token signing and verification, password hashing, the single-slot
//! refresh-token store, the login/refresh/register/logout flows and the
//! per-request authorization decision.

pub mod authorize;
pub mod password;
pub mod refresh;
pub mod service;
pub mod token;

use std::time::Duration;

pub use authorize::{AuthContext, AuthRejection, authorize, authorize_optional};
pub use refresh::RefreshTokenStore;
pub use service::AuthService;
pub use token::{SigningAlgorithm, TokenError, TokenPayload, TokenService};

/// Access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

/// Refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// What to do when a presented refresh token does not match the stored one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReusePolicy {
    /// Reject the refresh; the stored token stays valid.
    #[default]
    Reject,
    /// Reject the refresh and delete the stored token, forcing a new login.
    RevokeSession,
}

/// Tunables for [`AuthService`].
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub bcrypt_cost: u32,
    pub reuse_policy: ReusePolicy,
    /// Role every new identity is assigned at registration.
    pub default_role: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
            bcrypt_cost: password::DEFAULT_COST,
            reuse_policy: ReusePolicy::Reject,
            default_role: crate::rbac::seed::USER_ROLE.to_string(),
        }
    }
}
