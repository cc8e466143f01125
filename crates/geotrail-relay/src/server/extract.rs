//! Bearer-token extractor for protected routes.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::auth::Claims;
use crate::storage::{DatabaseError, User};

use super::AppState;
use super::error::ApiError;

/// The caller of a protected route, resolved from `Authorization: Bearer`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub claims: Claims,
    pub user: User,
}

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }
}

/// The token part of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Not authorized, no token".into()))?;

        let claims = state
            .jwt
            .validate_access(token)
            .ok_or_else(|| ApiError::Unauthorized("Not authorized, token failed".into()))?;

        let user = match state.db.get_user(&claims.sub).await {
            Ok(user) => user,
            Err(DatabaseError::NotFound(_)) => {
                return Err(ApiError::Unauthorized("User not found".into()));
            }
            Err(e) => return Err(e.into()),
        };
        if !user.is_active {
            return Err(ApiError::Unauthorized("Account is disabled".into()));
        }

        Ok(Self { claims, user })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    use crate::server::test_helpers::{seeded_state, token_for};

    async fn extract(state: &AppState, auth: Option<&str>) -> Result<AuthUser, ApiError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        AuthUser::from_request_parts(&mut parts, state).await
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Token abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());

        headers.insert("authorization", "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert("authorization", "Bearer ".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }

    #[tokio::test]
    async fn valid_access_token_resolves_user() {
        let state = seeded_state().await;
        let token = token_for(&state, "user-7");

        let auth = extract(&state, Some(&format!("Bearer {token}")))
            .await
            .unwrap();
        assert_eq!(auth.id(), "user-7");
        assert_eq!(auth.claims.email, "seven@example.com");
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let state = seeded_state().await;
        let err = extract(&state, None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_token_is_rejected() {
        let state = seeded_state().await;
        let pair = state
            .jwt
            .issue_pair("user-7", "seven@example.com")
            .unwrap();

        let err = extract(&state, Some(&format!("Bearer {}", pair.refresh_token)))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_for_deleted_user_is_rejected() {
        let state = seeded_state().await;
        let pair = state.jwt.issue_pair("ghost", "ghost@example.com").unwrap();

        let err = extract(&state, Some(&format!("Bearer {}", pair.access_token)))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(ref m) if m == "User not found"));
    }
}
