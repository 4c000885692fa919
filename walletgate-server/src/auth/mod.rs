//! Request authentication
//!
//! Two schemes share the `Authorization: Bearer <token>` header:
//! - wallet routes resolve the token to a local user (the token is the
//!   provider session token stored at onboarding)
//! - housekeeping routes compare the token against `HOUSEKEEPING_SECRET_KEY`

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use walletgate_core::model::User;

use crate::error::ApiError;
use crate::state::AppState;

/// Extract the Bearer token from the Authorization header
fn extract_bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let auth_header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| {
            ApiError::auth_error("AUTH_MISSING_TOKEN", "Missing Authorization header")
        })?;

    let auth_value = auth_header.to_str().map_err(|_| {
        ApiError::auth_error(
            "AUTH_INVALID_TOKEN",
            "Invalid Authorization header encoding",
        )
    })?;

    auth_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            ApiError::auth_error(
                "AUTH_INVALID_TOKEN",
                "Authorization header must use Bearer scheme",
            )
        })
}

/// Constant-time string comparison for shared secrets.
fn secrets_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Raw bearer token, passed through to the wallet provider unchecked.
pub struct BearerToken(pub String);

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        extract_bearer_token(parts).map(|t| BearerToken(t.to_string()))
    }
}

/// Wallet user resolved from the bearer token.
///
/// Returns 401 when the header is missing or the token matches no user.
pub struct WalletUser(pub User);

impl FromRequestParts<AppState> for WalletUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts)?;

        let user = state
            .users
            .find_by_token(token)
            .await?
            .ok_or_else(|| ApiError::auth_error("AUTH_INVALID_TOKEN", "Invalid or expired token"))?;

        Ok(WalletUser(user))
    }
}

/// Guard for `/housekeeping/*`.
///
/// Rejects every request when no secret is configured.
pub struct HousekeepingAuth;

impl FromRequestParts<AppState> for HousekeepingAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.housekeeping_secret.as_deref() else {
            tracing::warn!("Housekeeping request rejected: HOUSEKEEPING_SECRET_KEY not set");
            return Err(ApiError::unauthorized("Housekeeping is not enabled"));
        };

        let token = extract_bearer_token(parts)?;
        if !secrets_match(token, expected) {
            return Err(ApiError::auth_error(
                "AUTH_INVALID_SECRET",
                "Invalid housekeeping secret",
            ));
        }
        Ok(HousekeepingAuth)
    }
}
