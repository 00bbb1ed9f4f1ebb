//! 策略管理 API
//!
//! 管理端策略编辑界面的后端。载荷先做形状校验（失败时原策略
//! 不被触碰），随后解析器对调用主体再做一次权限校验：读取要求
//! team:view，写入要求策略管理权限。

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use crewdesk_access::{Action, Resource, ResourceActions, RolePermissionMatrix};
use crewdesk_common::{Role, UserId};
use crewdesk_errors::{AppError, AppResult};
use tracing::info;

use crate::error::ApiError;
use crate::middleware::AuthPrincipal;
use crate::state::GatewayState;

/// 校验 资源→动作列表 载荷
///
/// 未知资源或动作名被点名拒绝，载荷必须是对象。
fn parse_row(value: &serde_json::Value) -> AppResult<ResourceActions> {
    let map = value
        .as_object()
        .ok_or_else(|| AppError::validation("Policy row must be an object of resource to actions"))?;

    let mut row = ResourceActions::new();
    for (key, actions) in map {
        let resource = Resource::parse(key)
            .ok_or_else(|| AppError::validation(format!("Unknown resource '{}'", key)))?;

        let list = actions.as_array().ok_or_else(|| {
            AppError::validation(format!("Actions for resource '{}' must be an array", key))
        })?;

        let mut set = crewdesk_access::ActionSet::new();
        for entry in list {
            let name = entry.as_str().ok_or_else(|| {
                AppError::validation(format!("Actions for resource '{}' must be strings", key))
            })?;
            let action = Action::parse(name).ok_or_else(|| {
                AppError::validation(format!("Unknown action '{}' for resource '{}'", name, key))
            })?;
            set.insert(action);
        }
        row.set(resource, set);
    }
    Ok(row)
}

fn parse_role(role: &str) -> AppResult<Role> {
    Role::parse(role).ok_or_else(|| AppError::validation(format!("Unknown role '{}'", role)))
}

fn parse_principal_id(id: &str) -> AppResult<UserId> {
    UserId::from_string(id)
        .map_err(|_| AppError::validation(format!("Invalid principal id '{}'", id)))
}

/// GET /api/policy/roles
pub async fn get_roles(
    State(state): State<GatewayState>,
    AuthPrincipal(actor): AuthPrincipal,
) -> Result<Json<RolePermissionMatrix>, ApiError> {
    let matrix = state.policy.matrix(&actor)?;
    Ok(Json(matrix))
}

/// PUT /api/policy/roles/{role}
pub async fn put_role_defaults(
    State(state): State<GatewayState>,
    AuthPrincipal(actor): AuthPrincipal,
    Path(role): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    let role = parse_role(&role)?;
    let row = parse_row(&body)?;

    state.policy.upsert_role_defaults(&actor, role, row).await?;
    info!(actor_id = %actor.id, role = %role, "Role defaults replaced via policy API");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/policy/overrides/{principal_id}
pub async fn get_override(
    State(state): State<GatewayState>,
    AuthPrincipal(actor): AuthPrincipal,
    Path(principal_id): Path<String>,
) -> Result<Json<ResourceActions>, ApiError> {
    let principal_id = parse_principal_id(&principal_id)?;
    let row = state
        .policy
        .override_entry(&actor, &principal_id)?
        .ok_or_else(|| AppError::not_found("No override for principal"))?;
    Ok(Json(row))
}

/// PUT /api/policy/overrides/{principal_id}
pub async fn put_override(
    State(state): State<GatewayState>,
    AuthPrincipal(actor): AuthPrincipal,
    Path(principal_id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    let principal_id = parse_principal_id(&principal_id)?;
    let partial = parse_row(&body)?;

    state
        .policy
        .upsert_override(&actor, principal_id, partial)
        .await?;
    info!(actor_id = %actor.id, principal_id = %principal_id, "Override updated via policy API");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/policy/overrides/{principal_id}
pub async fn delete_override(
    State(state): State<GatewayState>,
    AuthPrincipal(actor): AuthPrincipal,
    Path(principal_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let principal_id = parse_principal_id(&principal_id)?;
    state.policy.remove_override(&actor, &principal_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
