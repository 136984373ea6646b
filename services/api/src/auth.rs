use crate::error::ApiError;
use crate::routes::AppState;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use hireai_core::policy::{Area, AuthorizationPolicy, Principal};

/// The signed-in user behind a request, resolved from its bearer token.
pub struct Authenticated(pub Principal);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthenticated)?;
        let user_id = state.identity.authenticate(token).await?;
        let principal = state.identity.get_user(&user_id).await?;
        tracing::debug!("Authenticated {}", principal.user_id);
        Ok(Self(principal))
    }
}

/// Resolves the principal's policy and checks it against `area`.
pub async fn require(
    state: &AppState,
    principal: &Principal,
    area: Area,
) -> Result<AuthorizationPolicy, ApiError> {
    let policy = state.approvals.resolve_policy(principal).await?;
    if let Err(denial) = policy.authorize(area) {
        tracing::warn!("{} denied {:?}: {}", principal.user_id, area, denial);
        return Err(denial.into());
    }
    Ok(policy)
}
