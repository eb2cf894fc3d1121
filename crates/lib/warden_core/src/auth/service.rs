//! Login, refresh, registration and logout flows.

use std::sync::Arc;

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{info, warn};

use super::password::{hash_password, verify_password};
use super::refresh::RefreshTokenStore;
use super::token::{TokenError, TokenPayload, TokenService};
use super::{AuthSettings, ReusePolicy};
use crate::error::{ErrorKind, ServiceError, ServiceErrors, ServiceResult};
use crate::models::auth::{NewUser, TokenKind, TokenPair, User};
use crate::rbac::PermissionResolver;
use crate::repo::{Repositories, Resources, RoleAssignmentRepository, UserRepository};
use crate::store::StoreError;
use crate::tx::TxManager;
use crate::validation::is_valid_email;

const LOGIN: &str = "auth::login";
const REFRESH: &str = "auth::refresh";
const REGISTER: &str = "auth::register";
const LOGOUT: &str = "auth::logout";
const LOOKUP: &str = "auth::user_by_email";
const ISSUE: &str = "auth::issue";

/// Random token id, unique per issued token.
fn generate_jti() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn invalid_credentials() -> ServiceErrors {
    ServiceError::unauthorized(LOGIN, "Invalid credentials").into()
}

#[derive(Clone)]
pub struct AuthService {
    users: UserRepository,
    assignments: RoleAssignmentRepository,
    resolver: PermissionResolver,
    refresh_tokens: RefreshTokenStore,
    tx: TxManager,
    tokens: Arc<TokenService>,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(res: &Resources, tokens: Arc<TokenService>, settings: AuthSettings) -> Self {
        let repos = Repositories::new(res);
        Self {
            users: repos.users.clone(),
            assignments: repos.assignments.clone(),
            resolver: PermissionResolver::new(&repos),
            refresh_tokens: RefreshTokenStore::new(res.sessions.clone()),
            tx: TxManager::new(res),
            tokens,
            settings,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Check credentials and issue a token pair for `issuer`.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(&self, email: &str, password: &str, issuer: &str) -> ServiceResult<TokenPair> {
        if !is_valid_email(email) {
            return Err(ServiceError::bad_request(LOGIN, "Invalid email").into());
        }

        let creds = match self.users.credentials_by_email(email).await {
            Ok(creds) => creds,
            Err(e) if e.is_not_found() => return Err(invalid_credentials()),
            Err(e) => return Err(ServiceErrors::wrapped(LOGIN, e, "user")),
        };
        if !verify_password(password, &creds.password_hash).await? {
            return Err(invalid_credentials());
        }

        let pair = self.issue(creds.user.id, issuer).await?;
        info!(user_id = creds.user.id, "user logged in");
        Ok(pair)
    }

    /// Exchange the current refresh token for a new pair.
    ///
    /// The presented token must equal the one last issued to its subject;
    /// permissions are resolved afresh rather than copied from the old token.
    pub async fn refresh(&self, token: &str) -> ServiceResult<TokenPair> {
        let claims = match self.tokens.verify_kind(token, TokenKind::Refresh) {
            Ok(claims) => claims,
            Err(e) => {
                if matches!(e, TokenError::Expired)
                    && let Ok(stale) = TokenService::parse_unverified(token)
                {
                    info!(sub = %stale.sub, "expired refresh token presented");
                }
                return Err(ServiceError::unauthorized(REFRESH, e.to_string()).into());
            }
        };
        let user_id = claims
            .user_id()
            .ok_or_else(|| ServiceError::unauthorized(REFRESH, "Invalid token subject"))?;

        match self.refresh_tokens.matches(user_id, token).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(user_id, policy = ?self.settings.reuse_policy, "refresh token reuse detected");
                if self.settings.reuse_policy == ReusePolicy::RevokeSession {
                    self.refresh_tokens.delete(user_id).await?;
                }
                return Err(
                    ServiceError::unauthorized(REFRESH, "Refresh token reuse detected").into(),
                );
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ServiceError::unauthorized(REFRESH, "Refresh token revoked").into());
            }
            Err(e) => return Err(e),
        }

        match self.users.get_by_id(user_id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                return Err(ServiceError::unauthorized(REFRESH, "User no longer exists").into());
            }
            Err(e) => return Err(ServiceErrors::wrapped(REFRESH, e, "user")),
        }

        self.issue(user_id, &claims.iss).await
    }

    /// Create an identity together with its default role assignment.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> ServiceResult<User> {
        let mut invalid = Vec::new();
        if username.trim().is_empty() {
            invalid.push(ServiceError::bad_request(REGISTER, "Username is required"));
        }
        if !is_valid_email(email) {
            invalid.push(ServiceError::bad_request(REGISTER, "Invalid email"));
        }
        if password.is_empty() {
            invalid.push(ServiceError::bad_request(REGISTER, "Password is required"));
        }
        let mut invalid = invalid.into_iter();
        if let Some(first) = invalid.next() {
            return Err(invalid.fold(ServiceErrors::new(first), ServiceErrors::with));
        }

        let new = NewUser {
            username: username.trim().to_string(),
            email: email.to_string(),
            password_hash: hash_password(password, self.settings.bcrypt_cost).await?,
        };
        let default_role = self.settings.default_role.clone();

        let user = self
            .tx
            .with_transaction(move |tx| {
                Box::pin(async move {
                    let user = tx
                        .insert_user(&new)
                        .await
                        .map_err(|e| ServiceErrors::wrapped(REGISTER, e, "user"))?;
                    let role = match tx.role_by_name(&default_role).await {
                        Ok(role) => role,
                        Err(StoreError::NotFound(_)) => {
                            return Err(ServiceError::not_found(
                                REGISTER,
                                "Default role not found",
                            )
                            .into());
                        }
                        Err(e) => return Err(ServiceErrors::wrapped(REGISTER, e, "role")),
                    };
                    tx.insert_assignment(user.id, role.id)
                        .await
                        .map_err(|e| ServiceErrors::wrapped(REGISTER, e, "user role"))?;
                    Ok(user)
                })
            })
            .await?;

        self.users.invalidate(&user).await;
        self.assignments.invalidate_user(user.id).await;
        info!(user_id = user.id, "user registered");
        Ok(user)
    }

    /// Look an identity up by email; malformed addresses never reach storage.
    pub async fn get_user_by_email(&self, email: &str) -> ServiceResult<User> {
        if !is_valid_email(email) {
            return Err(ServiceError::bad_request(LOOKUP, "Invalid email").into());
        }
        match self.users.get_by_email(email).await {
            Ok(user) => Ok(user),
            Err(e) if e.is_not_found() => {
                Err(ServiceError::not_found(LOOKUP, "User not found").into())
            }
            Err(e) => Err(ServiceErrors::wrapped(LOOKUP, e, "user")),
        }
    }

    /// End the user's session by dropping the stored refresh token.
    pub async fn logout(&self, user_id: i64) -> ServiceResult<()> {
        self.refresh_tokens.delete(user_id).await?;
        info!(user_id, source = LOGOUT, "user logged out");
        Ok(())
    }

    /// Resolve permissions, sign both tokens and persist the refresh token.
    async fn issue(&self, user_id: i64, issuer: &str) -> ServiceResult<TokenPair> {
        let access = self.resolver.resolve(user_id).await?;
        let base = TokenPayload {
            user_id,
            issuer: issuer.to_string(),
            kind: TokenKind::Access,
            jti: generate_jti(),
            roles: access.roles,
            permissions: access.permissions,
        };
        let refresh = TokenPayload {
            kind: TokenKind::Refresh,
            jti: generate_jti(),
            ..base.clone()
        };

        let tokens = self.tokens.clone();
        let (access_ttl, refresh_ttl) = (self.settings.access_token_ttl, self.settings.refresh_token_ttl);
        let pair = tokio::task::spawn_blocking(move || -> Result<TokenPair, TokenError> {
            Ok(TokenPair {
                access_token: tokens.sign(&base, access_ttl)?,
                refresh_token: tokens.sign(&refresh, refresh_ttl)?,
            })
        })
        .await
        .map_err(|e| ServiceError::internal(ISSUE, format!("signing task: {e}")))?
        .map_err(|e| ServiceError::internal(ISSUE, e.to_string()))?;

        self.refresh_tokens
            .save(user_id, &pair.refresh_token, refresh_ttl)
            .await?;
        Ok(pair)
    }
}
