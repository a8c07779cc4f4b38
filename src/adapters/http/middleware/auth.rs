//! Bearer authentication for the reference server.
//!
//! The reference server has no account system: the bearer token *is* the
//! acting user's id. Real deployments put the messaging API behind the
//! school's own authentication.
//!
//! ```text
//! Authorization: Bearer <user id>
//! ```

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::adapters::http::messaging::dto::ErrorResponse;
use crate::domain::foundation::UserId;

/// Extractor that requires a bearer token and yields the acting user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(AuthRejection::Unauthenticated)?;

        UserId::new(token.trim())
            .map(RequireUser)
            .map_err(|_| AuthRejection::Unauthenticated)
    }
}

/// Rejection type for authentication failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// No usable bearer token was provided.
    Unauthenticated,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = match self {
            AuthRejection::Unauthenticated => ErrorResponse {
                code: "UNAUTHENTICATED".to_string(),
                message: "Authentication required".to_string(),
                field: None,
            },
        };
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(auth: Option<&str>) -> Result<RequireUser, AuthRejection> {
        let mut builder = Request::builder().uri("/conversations");
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        RequireUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn bearer_token_becomes_user_id() {
        let RequireUser(user) = extract(Some("Bearer teacher-1")).await.unwrap();
        assert_eq!(user.as_str(), "teacher-1");
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        assert_eq!(extract(None).await, Err(AuthRejection::Unauthenticated));
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_rejected() {
        assert_eq!(
            extract(Some("Basic dXNlcjpwYXNz")).await,
            Err(AuthRejection::Unauthenticated)
        );
    }

    #[tokio::test]
    async fn blank_token_is_rejected() {
        assert_eq!(extract(Some("Bearer   ")).await, Err(AuthRejection::Unauthenticated));
    }

    #[test]
    fn rejection_is_401() {
        let response = AuthRejection::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
