//! 权限解析器
//!
//! 统一访问控制决策点：把策略快照和 Principal 组合成有效权限
//! 与布尔 check。三个执行点都只依赖 PermissionCheck 接口，
//! 测试可以用替身替换。

use std::sync::Arc;

use crewdesk_auth_core::Principal;
use crewdesk_common::{Role, UserId};
use crewdesk_errors::{AppError, AppResult};
use metrics::counter;

use crate::model::{Action, Resource, ResourceActions, RolePermissionMatrix};
use crate::store::PolicyStore;

/// 策略管理权限
///
/// 策略存储的所有变更都要求调用主体持有它，堵住普通主体改写
/// 自己覆盖条目的提权路径。
pub const MANAGE_POLICY: (Resource, Action) = (Resource::Team, Action::Edit);

/// 权限检查接口
pub trait PermissionCheck: Send + Sync {
    /// 主体的有效权限：有覆盖且提到该资源时用覆盖的动作集
    /// （整体替换），否则用角色默认
    fn effective_permissions(&self, principal: &Principal) -> AppResult<ResourceActions>;

    /// `action ∈ effective_permissions(principal)[resource]`
    fn check(&self, principal: &Principal, resource: Resource, action: Action) -> AppResult<bool>;
}

/// 权限解析器
///
/// 无自有缓存，每次调用都读策略存储的当前快照。
pub struct PermissionResolver {
    store: Arc<PolicyStore>,
}

impl PermissionResolver {
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self { store }
    }

    fn require(&self, actor: &Principal, resource: Resource, action: Action) -> AppResult<()> {
        if self.check(actor, resource, action)? {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "Requires {}:{} permission",
                resource, action
            )))
        }
    }

    fn require_manage_policy(&self, actor: &Principal) -> AppResult<()> {
        self.require(actor, MANAGE_POLICY.0, MANAGE_POLICY.1)
    }

    /// 读取完整角色矩阵（管理界面用），要求 team:view
    pub fn matrix(&self, actor: &Principal) -> AppResult<RolePermissionMatrix> {
        self.require(actor, Resource::Team, Action::View)?;
        Ok(self.store.snapshot().matrix.clone())
    }

    /// 读取某主体的覆盖条目，要求 team:view
    pub fn override_entry(
        &self,
        actor: &Principal,
        principal_id: &UserId,
    ) -> AppResult<Option<ResourceActions>> {
        self.require(actor, Resource::Team, Action::View)?;
        Ok(self.store.override_for(principal_id))
    }

    /// 整体替换角色默认行，要求策略管理权限
    pub async fn upsert_role_defaults(
        &self,
        actor: &Principal,
        role: Role,
        row: ResourceActions,
    ) -> AppResult<()> {
        self.require_manage_policy(actor)?;
        self.store.upsert_role_defaults(role, row).await
    }

    /// 按资源键合并主体覆盖，要求策略管理权限
    pub async fn upsert_override(
        &self,
        actor: &Principal,
        principal_id: UserId,
        partial: ResourceActions,
    ) -> AppResult<()> {
        self.require_manage_policy(actor)?;
        self.store.upsert_override(principal_id, partial).await
    }

    /// 移除主体覆盖，要求策略管理权限
    pub async fn remove_override(
        &self,
        actor: &Principal,
        principal_id: &UserId,
    ) -> AppResult<()> {
        self.require_manage_policy(actor)?;
        self.store.remove_override(principal_id).await
    }
}

impl PermissionCheck for PermissionResolver {
    fn effective_permissions(&self, principal: &Principal) -> AppResult<ResourceActions> {
        let mut row = self.store.role_defaults(principal.role)?;

        if let Some(overrides) = self.store.override_for(&principal.id) {
            for (resource, actions) in overrides.iter() {
                row.set(*resource, actions.clone());
            }
        }

        Ok(row)
    }

    fn check(&self, principal: &Principal, resource: Resource, action: Action) -> AppResult<bool> {
        let allowed = self
            .effective_permissions(principal)?
            .allows(resource, action);

        counter!(
            "authorization_checks_total",
            "resource" => resource.as_str(),
            "allowed" => if allowed { "true" } else { "false" }
        )
        .increment(1);

        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryPolicyRepository;
    use crate::store::PolicySnapshot;
    use chrono::{Duration, Utc};

    fn principal(role: Role) -> Principal {
        let now = Utc::now();
        Principal {
            id: UserId::new(),
            email: format!("{}@crewdesk.io", role.as_str().to_lowercase()),
            role,
            issued_at: now,
            expires_at: now + Duration::hours(1),
        }
    }

    fn resolver() -> PermissionResolver {
        let store = PolicyStore::new(
            Arc::new(InMemoryPolicyRepository::new()),
            PolicySnapshot::bootstrap(),
        );
        PermissionResolver::new(Arc::new(store))
    }

    #[test]
    fn test_default_deny_for_unlisted_actions() {
        let resolver = resolver();
        let user = principal(Role::User);

        // USER 对 finance 没有任何授权
        for action in Action::ALL {
            assert!(!resolver.check(&user, Resource::Finance, action).unwrap());
        }
        // USER 对 projects 只有 view
        assert!(!resolver.check(&user, Resource::Projects, Action::Delete).unwrap());
    }

    #[test]
    fn test_user_cannot_view_finance() {
        let resolver = resolver();
        let user = principal(Role::User);
        assert!(!resolver.check(&user, Resource::Finance, Action::View).unwrap());
    }

    #[test]
    fn test_admin_can_delete_finance() {
        let resolver = resolver();
        let admin = principal(Role::Admin);
        assert!(resolver.check(&admin, Resource::Finance, Action::Delete).unwrap());
    }

    #[tokio::test]
    async fn test_override_replaces_not_merges() {
        let resolver = resolver();
        let admin = principal(Role::Admin);
        let user = principal(Role::User);

        // USER 的 tasks 默认是 {view, create, edit}；覆盖为 {delete}
        resolver
            .upsert_override(
                &admin,
                user.id,
                ResourceActions::new().grant(Resource::Tasks, [Action::Delete]),
            )
            .await
            .unwrap();

        let effective = resolver.effective_permissions(&user).unwrap();
        let tasks = effective.get(Resource::Tasks).unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks.contains(&Action::Delete));
        assert!(!effective.allows(Resource::Tasks, Action::View));
        assert!(!effective.allows(Resource::Tasks, Action::Create));
    }

    #[tokio::test]
    async fn test_unaffected_resources_fall_back_to_role_defaults() {
        let resolver = resolver();
        let admin = principal(Role::Admin);
        let user = principal(Role::User);

        resolver
            .upsert_override(
                &admin,
                user.id,
                ResourceActions::new().grant(Resource::Finance, [Action::View]),
            )
            .await
            .unwrap();

        let effective = resolver.effective_permissions(&user).unwrap();
        assert!(effective.allows(Resource::Finance, Action::View));
        // 其余资源维持 USER 默认
        assert!(effective.allows(Resource::Tasks, Action::Edit));
        assert!(effective.allows(Resource::Projects, Action::View));
        assert!(effective.allows(Resource::Team, Action::View));
        assert!(!effective.allows(Resource::Team, Action::Edit));
    }

    #[tokio::test]
    async fn test_user_override_team_view_keeps_tasks_default() {
        let resolver = resolver();
        let admin = principal(Role::Admin);
        let user = principal(Role::User);

        resolver
            .upsert_override(
                &admin,
                user.id,
                ResourceActions::new().grant(Resource::Team, [Action::View]),
            )
            .await
            .unwrap();

        let effective = resolver.effective_permissions(&user).unwrap();
        let team: Vec<_> = effective.get(Resource::Team).unwrap().iter().copied().collect();
        assert_eq!(team, vec![Action::View]);

        let tasks = effective.get(Resource::Tasks).unwrap();
        assert_eq!(
            tasks.iter().copied().collect::<Vec<_>>(),
            vec![Action::View, Action::Create, Action::Edit]
        );
    }

    #[tokio::test]
    async fn test_manager_cannot_mutate_policy() {
        let resolver = resolver();
        let manager = principal(Role::Manager);

        let err = resolver
            .upsert_role_defaults(
                &manager,
                Role::Admin,
                ResourceActions::new().grant(Resource::Team, [Action::View]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        // 矩阵未被改动
        let admin = principal(Role::Admin);
        assert!(resolver.check(&admin, Resource::Finance, Action::Delete).unwrap());
    }

    #[tokio::test]
    async fn test_user_cannot_rewrite_own_override() {
        let resolver = resolver();
        let user = principal(Role::User);

        let err = resolver
            .upsert_override(
                &user,
                user.id,
                ResourceActions::new().grant(Resource::Finance, [Action::Delete]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(resolver.store.override_for(&user.id).is_none());
    }

    #[tokio::test]
    async fn test_admin_can_remove_override() {
        let resolver = resolver();
        let admin = principal(Role::Admin);
        let user = principal(Role::User);

        resolver
            .upsert_override(
                &admin,
                user.id,
                ResourceActions::new().grant(Resource::Team, [Action::View]),
            )
            .await
            .unwrap();
        resolver.remove_override(&admin, &user.id).await.unwrap();

        let effective = resolver.effective_permissions(&user).unwrap();
        assert!(!effective.allows(Resource::Team, Action::Edit));
        assert_eq!(
            effective.get(Resource::Team),
            resolver.store.role_defaults(Role::User).unwrap().get(Resource::Team)
        );
    }

    #[test]
    fn test_matrix_read_requires_team_view() {
        let resolver = resolver();
        // 默认矩阵里 USER 有 team:view，可以读
        assert!(resolver.matrix(&principal(Role::User)).is_ok());
    }

    #[test]
    fn test_missing_row_propagates_policy_not_found() {
        let snapshot: PolicySnapshot = serde_json::from_value(serde_json::json!({
            "matrix": { "rows": {} },
            "overrides": {}
        }))
        .unwrap();
        let store = PolicyStore::new(Arc::new(InMemoryPolicyRepository::new()), snapshot);
        let resolver = PermissionResolver::new(Arc::new(store));

        let err = resolver
            .check(&principal(Role::User), Resource::Tasks, Action::View)
            .unwrap_err();
        assert!(matches!(err, AppError::PolicyNotFound(_)));
    }
}
