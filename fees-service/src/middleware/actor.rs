//! Actor context extracted from request headers.
//!
//! The fronting gateway authenticates the caller and forwards their
//! identity and role in headers; this service trusts those headers and
//! only enforces role checks on staff operations.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    Payer,
    Staff,
}

impl ActorRole {
    fn from_header(value: &str) -> Self {
        match value {
            "staff" => ActorRole::Staff,
            _ => ActorRole::Payer,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActorContext {
    pub actor_id: String,
    pub role: ActorRole,
}

impl ActorContext {
    /// Errors with Forbidden unless the actor is staff.
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.role == ActorRole::Staff {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "this operation requires a staff role"
            )))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor_id = parts
            .headers
            .get("X-Actor-Id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::AuthError(anyhow::anyhow!(
                    "Missing X-Actor-Id header (required from the gateway)"
                ))
            })?;

        let role = parts
            .headers
            .get("X-Actor-Role")
            .and_then(|v| v.to_str().ok())
            .map(ActorRole::from_header)
            .unwrap_or(ActorRole::Payer);

        Ok(ActorContext {
            actor_id: actor_id.to_string(),
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(builder: axum::http::request::Builder) -> Result<ActorContext, AppError> {
        let request = builder.body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        ActorContext::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn missing_actor_header_is_unauthenticated() {
        let result = extract(Request::builder().uri("/")).await;
        assert!(matches!(result, Err(AppError::AuthError(_))));
    }

    #[tokio::test]
    async fn role_defaults_to_payer() {
        let ctx = extract(Request::builder().uri("/").header("X-Actor-Id", "u-1"))
            .await
            .unwrap();
        assert_eq!(ctx.role, ActorRole::Payer);
        assert!(ctx.require_staff().is_err());
    }

    #[tokio::test]
    async fn staff_role_is_honored() {
        let ctx = extract(
            Request::builder()
                .uri("/")
                .header("X-Actor-Id", "u-2")
                .header("X-Actor-Role", "staff"),
        )
        .await
        .unwrap();
        assert_eq!(ctx.role, ActorRole::Staff);
        assert!(ctx.require_staff().is_ok());
    }
}
