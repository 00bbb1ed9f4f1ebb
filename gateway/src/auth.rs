//! 认证路由
//!
//! 登录端点对照配置的用户目录校验口令并签发会话令牌。角色由
//! 服务端指定，令牌签名保证 role 声明防篡改。

use axum::extract::{Json, State};
use argon2::password_hash::PasswordHash;
use argon2::{Argon2, PasswordVerifier};
use crewdesk_errors::AppError;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::middleware::AuthPrincipal;
use crate::state::GatewayState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub async fn login(
    State(state): State<GatewayState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .users
        .iter()
        .find(|u| u.email == req.email)
        .ok_or_else(|| AppError::unauthenticated("Invalid email or password"))?;

    let parsed = PasswordHash::new(user.password_hash.expose_secret())
        .map_err(|e| AppError::internal(format!("Malformed password hash in config: {}", e)))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed)
        .map_err(|_| AppError::unauthenticated("Invalid email or password"))?;

    let access_token = state
        .tokens
        .issue_session_token(&user.id, &user.email, user.role)?;

    info!(user_id = %user.id, "Session token issued");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.tokens.expires_in(),
    }))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    /// 显示提示；服务端检查只信任签名声明
    pub role: String,
}

pub async fn me(AuthPrincipal(principal): AuthPrincipal) -> Json<MeResponse> {
    Json(MeResponse {
        id: principal.id.to_string(),
        email: principal.email.clone(),
        role: principal.role.as_str().to_string(),
    })
}
