//! Watch registration and provider callback handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use walletgate_core::provider::CallbackPayload;
use walletgate_core::WatchVcRequest;

use crate::auth::WalletUser;
use crate::error::ApiError;
use crate::state::AppState;

fn status_or_bad_gateway(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY)
}

/// POST /api/wallet/vcs/watch
///
/// Registers a watcher on behalf of the authenticated user. The response
/// status mirrors the registration outcome.
pub async fn watch_handler(
    State(state): State<AppState>,
    WalletUser(user): WalletUser,
    Json(request): Json<WatchVcRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.wallet.watch_vc(&user, &request).await?;
    Ok((status_or_bad_gateway(result.status_code), Json(result)))
}

/// POST /api/wallet/vcs/watch/callback
///
/// Unauthenticated provider webhook. Always answers with the status the
/// relay computed; partial forwarding failures still return 200.
pub async fn watch_callback_handler(
    State(state): State<AppState>,
    Json(payload): Json<CallbackPayload>,
) -> impl IntoResponse {
    let response = state.callbacks.process_watch_callback(&payload).await;
    (status_or_bad_gateway(response.status_code), Json(response))
}
