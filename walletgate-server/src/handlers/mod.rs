//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod health;
pub mod housekeeping;
pub mod wallet;
pub mod watch;

pub use crate::state::AppState;
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use housekeeping::{
    add_watchers_handler, register_watchers_handler, stats_handler, sync_handler, ChunkQuery,
    StatsResponse, TaskResponse,
};
pub use wallet::{
    get_vc_handler, list_vcs_handler, login_handler, onboard_handler, resend_otp_handler,
    upload_qr_handler, verify_login_handler, UploadQrRequest, WalletResponse,
};
pub use watch::{watch_callback_handler, watch_handler};
