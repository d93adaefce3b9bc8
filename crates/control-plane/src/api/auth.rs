use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use contracts::ApiError;
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub tenant_id: String,
}

pub struct AuthConfig {
    pub bypass: bool,
    pub jwt_secret: String,
}

/// Bearer-token gate in front of every mutating route. `AUTHZ_BYPASS` skips
/// verification entirely, for local development against a data plane that
/// also runs unauthenticated.
pub async fn require_bearer_token(
    State(auth): State<Arc<AuthConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if auth.bypass {
        return Ok(next.run(request).await);
    }

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthenticated("missing Authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthenticated("Authorization header must be a bearer token"))?;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|err| ApiError::unauthenticated(format!("invalid token: {err}")))?;

    Ok(next.run(request).await)
}
