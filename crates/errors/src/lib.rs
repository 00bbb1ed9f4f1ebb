//! crewdesk-errors - 统一错误处理
//!
//! 基于 RFC 7807 Problem Details 规范

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 凭证缺失、格式错误或已过期
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// 凭证有效但权限检查未通过
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// 管理写入载荷未通过形状校验
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// 策略矩阵缺少应在启动时播种的行 —— 致命配置错误
    #[error("Policy not found: {0}")]
    PolicyNotFound(String),

    /// 策略存储不可达，有限重试耗尽
    #[error("Policy unavailable: {0}")]
    PolicyUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn policy_not_found(msg: impl Into<String>) -> Self {
        Self::PolicyNotFound(msg.into())
    }

    pub fn policy_unavailable(msg: impl Into<String>) -> Self {
        Self::PolicyUnavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 策略数据不可用或不完整 —— 执行点必须将其转为拒绝
    pub fn is_policy_failure(&self) -> bool {
        matches!(self, Self::PolicyNotFound(_) | Self::PolicyUnavailable(_))
    }

    /// 转换为 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated(_) => 401,
            Self::Forbidden(_) => 403,
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::PolicyNotFound(_) => 500,
            Self::PolicyUnavailable(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// 转换为 Problem Details
    pub fn to_problem_details(&self) -> ProblemDetails {
        ProblemDetails {
            r#type: self.problem_type(),
            title: self.problem_title(),
            status: self.status_code(),
            detail: self.to_string(),
            instance: None,
        }
    }

    fn problem_type(&self) -> String {
        let slug = match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not-found",
            Self::PolicyNotFound(_) => "policy-not-found",
            Self::PolicyUnavailable(_) => "policy-unavailable",
            Self::Internal(_) => "internal",
        };
        format!("https://api.crewdesk.io/problems/{}", slug)
    }

    fn problem_title(&self) -> String {
        match self {
            Self::Unauthenticated(_) => "Unauthenticated",
            Self::Forbidden(_) => "Forbidden",
            Self::Validation(_) => "Validation Error",
            Self::NotFound(_) => "Resource Not Found",
            Self::PolicyNotFound(_) => "Policy Not Found",
            Self::PolicyUnavailable(_) => "Policy Unavailable",
            Self::Internal(_) => "Internal Server Error",
        }
        .to_string()
    }
}

/// RFC 7807 Problem Details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;
