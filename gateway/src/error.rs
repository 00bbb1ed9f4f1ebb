//! API 错误响应

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use crewdesk_errors::AppError;
use tracing::error;

/// 把 AppError 转为 Problem Details JSON 响应
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // 策略数据缺失/不可达是意外情况，高等级记录
        if self.0.is_policy_failure() {
            error!(error = %self.0, "Policy failure surfaced at API boundary");
        }

        let problem = self.0.to_problem_details();
        let status =
            StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(problem)).into_response()
    }
}
