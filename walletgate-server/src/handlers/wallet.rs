//! Wallet passthrough handlers
//!
//! Onboarding, login and VC access. Provider responses are wrapped in a
//! `{statusCode, message, data}` envelope.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use walletgate_core::provider::{
    LoginRequest, LoginVerifyRequest, LoginVerifyResponse, OnboardRequest, ResendOtpRequest,
    UploadReceipt, VcDetails, VcSummary,
};
use walletgate_core::wallet::{LoginResult, OnboardResult};
use walletgate_core::WalletError;

use crate::auth::{BearerToken, WalletUser};
use crate::error::ApiError;
use crate::state::AppState;

/// Response envelope shared by the wallet routes
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse<T> {
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> WalletResponse<T> {
    fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            status_code: 200,
            message: message.into(),
            data: Some(data),
        })
    }
}

/// Request body for `POST /api/wallet/{user_id}/vcs/upload-qr`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQrRequest {
    pub qr_data: String,
}

/// POST /api/wallet/onboard
pub async fn onboard_handler(
    State(state): State<AppState>,
    Json(request): Json<OnboardRequest>,
) -> Result<Json<WalletResponse<OnboardResult>>, ApiError> {
    let result = state.wallet.onboard_user(&request).await?;
    Ok(WalletResponse::ok("User onboarded successfully", result))
}

/// POST /api/wallet/login
pub async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<WalletResponse<LoginResult>>, ApiError> {
    let result = state.wallet.login(&request).await?;
    Ok(WalletResponse::ok("Login successful", result))
}

/// POST /api/wallet/login/verify
pub async fn verify_login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginVerifyRequest>,
) -> Result<Json<WalletResponse<LoginVerifyResponse>>, ApiError> {
    let result = state.wallet.verify_login(&request).await?;
    let message = result.message.clone();
    Ok(WalletResponse::ok(message, result))
}

/// POST /api/wallet/login/resend-otp
pub async fn resend_otp_handler(
    State(state): State<AppState>,
    Json(request): Json<ResendOtpRequest>,
) -> Result<Json<WalletResponse<()>>, ApiError> {
    let message = state.wallet.resend_otp(&request).await?;
    Ok(Json(WalletResponse {
        status_code: 200,
        message,
        data: None,
    }))
}

/// GET /api/wallet/{user_id}/vcs
pub async fn list_vcs_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    BearerToken(token): BearerToken,
) -> Result<Json<WalletResponse<Vec<VcSummary>>>, ApiError> {
    let vcs = state.wallet.list_vcs(&user_id, &token).await?;
    Ok(WalletResponse::ok("VCs retrieved successfully", vcs))
}

/// GET /api/wallet/{user_id}/vcs/{vc_id}
pub async fn get_vc_handler(
    State(state): State<AppState>,
    Path((user_id, vc_id)): Path<(String, String)>,
    BearerToken(token): BearerToken,
) -> Result<Json<WalletResponse<VcDetails>>, ApiError> {
    let vc = state.wallet.get_vc(&user_id, &vc_id, &token).await?;
    Ok(WalletResponse::ok("VC retrieved successfully", vc))
}

/// POST /api/wallet/{user_id}/vcs/upload-qr
///
/// The path id must name the authenticated user, by account id or local id.
pub async fn upload_qr_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    WalletUser(user): WalletUser,
    Json(request): Json<UploadQrRequest>,
) -> Result<Json<WalletResponse<UploadReceipt>>, ApiError> {
    if user_id != user.account_id && user_id != user.id.to_string() {
        return Err(WalletError::Forbidden("Token does not belong to this user".into()).into());
    }
    if request.qr_data.trim().is_empty() {
        return Err(ApiError::bad_request("qrData is required"));
    }

    let receipt = state
        .wallet
        .upload_vc_from_qr(&user, request.qr_data.trim())
        .await?;
    Ok(WalletResponse::ok("VC uploaded successfully", receipt))
}
