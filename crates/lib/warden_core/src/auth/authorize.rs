//! Per-request authorization decision.
//!
//! A request moves through `NoCredential`, `MalformedHeader`, `TokenInvalid`
//! or a valid token. With a valid token the caller's permissions must
//! intersect the route's required set: any one listed permission suffices.

use thiserror::Error;
use tracing::debug;

use super::token::{TokenError, TokenService};
use crate::error::{ErrorKind, ServiceError};
use crate::models::auth::TokenKind;

const SOURCE: &str = "auth::authorize";

/// Identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: i64,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl AuthContext {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// True when `required` is empty or shares at least one entry with the
    /// caller's permissions.
    pub fn has_any(&self, required: &[&str]) -> bool {
        required.is_empty() || required.iter().any(|r| self.has_permission(r))
    }
}

#[derive(Debug, Error)]
pub enum AuthRejection {
    #[error("Authentication required")]
    NoCredential,

    #[error("Authorization header must be `Bearer <token>`")]
    MalformedHeader,

    #[error("{0}")]
    TokenInvalid(#[from] TokenError),

    #[error("Insufficient permissions")]
    Forbidden,
}

impl AuthRejection {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthRejection::Forbidden => ErrorKind::Forbidden,
            _ => ErrorKind::Unauthorized,
        }
    }

    pub fn to_service_error(&self) -> ServiceError {
        ServiceError::new(self.kind(), SOURCE, self.to_string())
    }
}

/// Extract the token from an `Authorization` value of exactly
/// `Bearer <token>`.
pub fn parse_bearer(header: &str) -> Result<&str, AuthRejection> {
    match header.split_once(' ') {
        Some(("Bearer", token)) if !token.is_empty() && !token.contains(char::is_whitespace) => {
            Ok(token)
        }
        _ => Err(AuthRejection::MalformedHeader),
    }
}

fn context_from_token(tokens: &TokenService, token: &str) -> Result<AuthContext, AuthRejection> {
    let claims = tokens.verify_kind(token, TokenKind::Access)?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| TokenError::Malformed("subject is not a user id".into()))?;
    Ok(AuthContext {
        user_id,
        roles: claims.roles,
        permissions: claims.permissions,
    })
}

/// Authenticate `header` and require one of `required`.
pub fn authorize(
    tokens: &TokenService,
    header: Option<&str>,
    required: &[&str],
) -> Result<AuthContext, AuthRejection> {
    let header = header.ok_or(AuthRejection::NoCredential)?;
    let token = parse_bearer(header)?;
    let ctx = context_from_token(tokens, token)?;
    if !ctx.has_any(required) {
        debug!(user_id = ctx.user_id, ?required, "permission denied");
        return Err(AuthRejection::Forbidden);
    }
    Ok(ctx)
}

/// Authenticate `header` if present; never rejects.
pub fn authorize_optional(tokens: &TokenService, header: Option<&str>) -> Option<AuthContext> {
    let header = header?;
    match parse_bearer(header).and_then(|token| context_from_token(tokens, token)) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            debug!(reason = %e, "ignoring invalid optional credential");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auth::token::TokenPayload;

    fn tokens() -> TokenService {
        let pem = std::fs::read_to_string(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/keys/ed25519.pem"
        ))
        .unwrap();
        TokenService::from_pem(&pem).unwrap()
    }

    fn bearer(svc: &TokenService, kind: TokenKind, permissions: &[&str]) -> String {
        let token = svc
            .sign(
                &TokenPayload {
                    user_id: 3,
                    issuer: "localhost".into(),
                    kind,
                    jti: "j".into(),
                    roles: vec!["user".into()],
                    permissions: permissions.iter().map(|p| p.to_string()).collect(),
                },
                Duration::from_secs(60),
            )
            .unwrap();
        format!("Bearer {token}")
    }

    #[test]
    fn header_must_be_exactly_bearer_token() {
        assert_eq!(parse_bearer("Bearer abc").unwrap(), "abc");
        for bad in ["", "Bearer", "Bearer ", "bearer abc", "Basic abc", "Bearer a b", "Bearer  abc"] {
            assert!(
                matches!(parse_bearer(bad), Err(AuthRejection::MalformedHeader)),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn state_machine_outcomes() {
        let svc = tokens();
        assert!(matches!(
            authorize(&svc, None, &[]),
            Err(AuthRejection::NoCredential)
        ));
        assert!(matches!(
            authorize(&svc, Some("Token x"), &[]),
            Err(AuthRejection::MalformedHeader)
        ));
        assert!(matches!(
            authorize(&svc, Some("Bearer x.y.z"), &[]),
            Err(AuthRejection::TokenInvalid(_))
        ));

        let header = bearer(&svc, TokenKind::Access, &["user:read", "user:me"]);
        let ctx = authorize(&svc, Some(&header), &[]).unwrap();
        assert_eq!(ctx.user_id, 3);
        assert_eq!(ctx.roles, vec!["user"]);
    }

    #[test]
    fn required_permissions_are_alternatives() {
        let svc = tokens();
        let header = bearer(&svc, TokenKind::Access, &["user:read"]);
        assert!(authorize(&svc, Some(&header), &["role:create", "user:read"]).is_ok());
        let err = authorize(&svc, Some(&header), &["role:create"]).unwrap_err();
        assert!(matches!(err, AuthRejection::Forbidden));
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.to_service_error().status_code(), 403);
    }

    #[test]
    fn refresh_token_is_not_an_access_credential() {
        let svc = tokens();
        let header = bearer(&svc, TokenKind::Refresh, &["user:read"]);
        let err = authorize(&svc, Some(&header), &[]).unwrap_err();
        assert!(matches!(
            err,
            AuthRejection::TokenInvalid(TokenError::WrongTokenKind { .. })
        ));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn expired_access_token_is_unauthorized() {
        let svc = tokens();
        let token = svc
            .sign_at(
                &TokenPayload {
                    user_id: 3,
                    issuer: "localhost".into(),
                    kind: TokenKind::Access,
                    jti: "j".into(),
                    roles: vec!["user".into()],
                    permissions: vec!["user:me".into()],
                },
                Duration::from_secs(60),
                chrono::Utc::now() - chrono::Duration::minutes(5),
            )
            .unwrap();
        let header = format!("Bearer {token}");

        let err = authorize(&svc, Some(&header), &["user:me"]).unwrap_err();
        assert!(matches!(err, AuthRejection::TokenInvalid(TokenError::Expired)));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.to_service_error().message, "Token expired");
        assert!(authorize_optional(&svc, Some(&header)).is_none());
    }

    #[test]
    fn optional_mode_never_rejects() {
        let svc = tokens();
        assert!(authorize_optional(&svc, None).is_none());
        assert!(authorize_optional(&svc, Some("garbage")).is_none());
        assert!(authorize_optional(&svc, Some("Bearer x.y.z")).is_none());
        let header = bearer(&svc, TokenKind::Access, &[]);
        assert_eq!(authorize_optional(&svc, Some(&header)).unwrap().user_id, 3);
    }
}
