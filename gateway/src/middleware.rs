//! 执行点中间件
//!
//! 路由守卫（重定向）与 API 守卫（401/403）。两者共享同一个
//! 授权生命周期：凭证 → Principal → check，每个请求只解析一次
//! 凭证，解析出的 Principal 放进请求扩展供下游处理器使用。

use axum::extract::{FromRequestParts, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use crewdesk_access::{Action, Resource};
use crewdesk_auth_core::Principal;
use metrics::counter;
use tracing::{debug, error, warn};

use crate::error::ApiError;
use crate::state::GatewayState;

/// 会话 Cookie 名
pub const SESSION_COOKIE: &str = "crewdesk_session";

/// 路由的访问要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// 任意已认证主体
    Authenticated,
    /// 特定 资源:动作 权限
    Permission(Resource, Action),
}

/// 单个请求的授权结果
///
/// 终态：Unauthenticated、Denied、Allowed；一次请求内不会回退
/// 到更早的状态。
#[derive(Debug)]
pub enum Authorization {
    Unauthenticated,
    Denied(Principal),
    Allowed(Principal),
}

/// 从请求头提取会话凭证
///
/// API 调用方使用 Authorization: Bearer，页面导航使用会话
/// Cookie；两者承载同一种签名令牌。
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    let prefix = format!("{}=", SESSION_COOKIE);
    headers
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .map(str::trim)
                .find_map(|c| c.strip_prefix(prefix.as_str()))
                .map(str::to_string)
        })
}

/// 共享的授权生命周期
///
/// 权限检查出错（策略缺失/不可用）时失败关闭：记录高等级日志
/// 并按拒绝处理，绝不放行。
pub fn authorize(
    state: &GatewayState,
    credential: Option<&str>,
    requirement: Requirement,
) -> Authorization {
    let principal = match state.principals.resolve(credential) {
        Ok(principal) => principal,
        Err(e) => {
            debug!(error = %e, "Credential resolution failed");
            counter!("gateway_authn_failed_total").increment(1);
            return Authorization::Unauthenticated;
        }
    };

    match requirement {
        Requirement::Authenticated => Authorization::Allowed(principal),
        Requirement::Permission(resource, action) => {
            match state.checker.check(&principal, resource, action) {
                Ok(true) => Authorization::Allowed(principal),
                Ok(false) => Authorization::Denied(principal),
                Err(e) => {
                    error!(error = %e, "Permission check failed, denying request");
                    Authorization::Denied(principal)
                }
            }
        }
    }
}

/// 受保护路径模式
///
/// `/finance` 精确匹配，`/finance/*` 匹配所有子路径。
#[derive(Debug, Clone)]
enum RoutePattern {
    Exact(String),
    Prefix(String),
}

impl RoutePattern {
    fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix("/*") {
            Some(prefix) => Self::Prefix(format!("{}/", prefix)),
            None => Self::Exact(pattern.to_string()),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(p) => path == p,
            Self::Prefix(p) => path.starts_with(p.as_str()),
        }
    }
}

/// 受保护路由表
///
/// 显式、封闭的路径清单；不在表内的路径视为公开（默认放行），
/// 绝不从路由结构推断。
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<(RoutePattern, Requirement)>,
}

impl RouteTable {
    pub fn new(rules: impl IntoIterator<Item = (&'static str, Requirement)>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|(pattern, requirement)| (RoutePattern::parse(pattern), requirement))
                .collect(),
        }
    }

    /// 第一条匹配规则的要求；无匹配时路径是公开的
    pub fn requirement_for(&self, path: &str) -> Option<Requirement> {
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(_, requirement)| *requirement)
    }
}

/// 路由守卫（页面路由，处理器运行前求值）
///
/// 未认证 → 重定向登录页；已认证但被拒 → 重定向拒绝页；
/// 放行时把 Principal 注入请求扩展，后续不再解析凭证。
pub async fn route_guard(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(requirement) = state.routes.requirement_for(request.uri().path()) else {
        return next.run(request).await;
    };

    let credential = extract_credential(request.headers());
    match authorize(&state, credential.as_deref(), requirement) {
        Authorization::Unauthenticated => Redirect::to("/login").into_response(),
        Authorization::Denied(principal) => {
            warn!(
                principal_id = %principal.id,
                path = request.uri().path(),
                "Route access denied"
            );
            counter!("gateway_authz_denied_total", "point" => "route").increment(1);
            Redirect::to("/denied").into_response()
        }
        Authorization::Allowed(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
    }
}

/// API 端点的访问要求，随路由以扩展注入
#[derive(Debug, Clone, Copy)]
pub struct Required(pub Requirement);

/// API 守卫（数据变更端点）
///
/// 未认证 → 401，已认证但被拒 → 403；两种情况都不会执行被
/// 保护的处理器。未声明 Required 的端点只要求已认证。
pub async fn api_guard(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    let requirement = request
        .extensions()
        .get::<Required>()
        .map(|r| r.0)
        .unwrap_or(Requirement::Authenticated);

    let credential = extract_credential(request.headers());
    match authorize(&state, credential.as_deref(), requirement) {
        Authorization::Unauthenticated => {
            ApiError(crewdesk_errors::AppError::unauthenticated(
                "Missing or invalid session credential",
            ))
            .into_response()
        }
        Authorization::Denied(principal) => {
            warn!(
                principal_id = %principal.id,
                path = request.uri().path(),
                "API access denied"
            );
            counter!("gateway_authz_denied_total", "point" => "api").increment(1);
            ApiError(crewdesk_errors::AppError::forbidden(
                "Insufficient permissions for this operation",
            ))
            .into_response()
        }
        Authorization::Allowed(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
    }
}

/// 已认证主体提取器
///
/// 在 route_guard / api_guard 之后使用
pub struct AuthPrincipal(pub Principal);

impl<S> FromRequestParts<S> for AuthPrincipal
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthPrincipal)
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing principal in request extensions (guard may not have run)",
            ))
    }
}
