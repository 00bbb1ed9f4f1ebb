//! 可见性门
//!
//! 第三个执行点：包裹一个带 (资源, 动作) 要求的可渲染单元。
//! 被拒时渲染调用方提供的降级内容；没有降级内容则重定向到
//! 拒绝页。受保护内容和降级内容互斥，检查出错时失败关闭。

use axum::response::{IntoResponse, Redirect, Response};
use crewdesk_access::{Action, PermissionCheck, Resource};
use crewdesk_auth_core::Principal;
use metrics::counter;
use tracing::{error, warn};

/// 按权限渲染受保护单元
pub fn render_gated<P, F>(
    checker: &dyn PermissionCheck,
    principal: &Principal,
    resource: Resource,
    action: Action,
    protected: P,
    fallback: Option<F>,
) -> Response
where
    P: FnOnce() -> Response,
    F: FnOnce() -> Response,
{
    let allowed = match checker.check(principal, resource, action) {
        Ok(allowed) => allowed,
        Err(e) => {
            error!(error = %e, "Visibility check failed, hiding protected content");
            false
        }
    };

    if allowed {
        return protected();
    }

    warn!(
        principal_id = %principal.id,
        resource = %resource,
        action = %action,
        "Visibility denied"
    );
    counter!("gateway_authz_denied_total", "point" => "gate").increment(1);

    match fallback {
        Some(render) => render(),
        None => Redirect::to("/denied").into_response(),
    }
}
