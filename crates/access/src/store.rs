//! 策略存储
//!
//! 策略数据的唯一事实来源。快照以 `RwLock<Arc<...>>` 持有：
//! 读者克隆 Arc，写者构建新快照后整体替换，读端不会观察到
//! 写了一半的矩阵行。写者之间由独立的异步互斥串行化，持久化
//! 成功后才替换内存快照，调用返回后的读取必然看到新值。

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crewdesk_common::retry::{RetryConfig, with_retry};
use crewdesk_common::{Role, UserId};
use crewdesk_errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::model::{ResourceActions, RolePermissionMatrix};
use crate::repository::PolicyRepository;

/// 策略快照
///
/// 不可变的策略数据视图；解析器的每次决策都基于一个完整快照。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub matrix: RolePermissionMatrix,
    #[serde(default)]
    pub overrides: BTreeMap<UserId, ResourceActions>,
}

impl PolicySnapshot {
    /// 启动播种：内置默认矩阵，无覆盖
    pub fn bootstrap() -> Self {
        Self {
            matrix: RolePermissionMatrix::builtin_default(),
            overrides: BTreeMap::new(),
        }
    }
}

/// 策略存储
///
/// 本身不做授权（由调用方经 PermissionResolver 完成，避免
/// 循环依赖）；唯一例外是启动时播种。
pub struct PolicyStore {
    state: RwLock<Arc<PolicySnapshot>>,
    writer: tokio::sync::Mutex<()>,
    repo: Arc<dyn PolicyRepository>,
}

impl std::fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyStore").finish_non_exhaustive()
    }
}

impl PolicyStore {
    pub fn new(repo: Arc<dyn PolicyRepository>, snapshot: PolicySnapshot) -> Self {
        Self {
            state: RwLock::new(Arc::new(snapshot)),
            writer: tokio::sync::Mutex::new(()),
            repo,
        }
    }

    /// 启动加载
    ///
    /// 读取失败按配置重试有限次，耗尽后返回 PolicyUnavailable
    /// （调用方视为致命，失败关闭）。仓储为空时用内置默认播种。
    pub async fn bootstrap(
        repo: Arc<dyn PolicyRepository>,
        retry: &RetryConfig,
    ) -> AppResult<Self> {
        let loaded = with_retry(retry, "policy_load", || repo.load()).await?;

        let snapshot = match loaded {
            Some(snapshot) => {
                if !snapshot.matrix.is_total() {
                    // 行缺失是配置损坏，读取时会以 PolicyNotFound 拒绝
                    error!("Loaded policy matrix is missing role rows");
                }
                info!("Policy document loaded");
                snapshot
            }
            None => {
                let snapshot = PolicySnapshot::bootstrap();
                repo.save(&snapshot).await?;
                info!("Policy store seeded with built-in defaults");
                snapshot
            }
        };

        Ok(Self::new(repo, snapshot))
    }

    /// 当前策略快照
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.state
            .read()
            .expect("policy store lock poisoned")
            .clone()
    }

    /// 角色默认行
    ///
    /// 只有启动不变式被破坏（矩阵缺行）时才会失败，属于致命
    /// 配置错误。
    pub fn role_defaults(&self, role: Role) -> AppResult<ResourceActions> {
        self.snapshot()
            .matrix
            .row(role)
            .cloned()
            .ok_or_else(|| {
                AppError::policy_not_found(format!("No matrix row for role {}", role))
            })
    }

    /// 主体覆盖行，不存在时为 None
    pub fn override_for(&self, principal_id: &UserId) -> Option<ResourceActions> {
        self.snapshot().overrides.get(principal_id).cloned()
    }

    /// 整体替换某角色的默认行
    pub async fn upsert_role_defaults(&self, role: Role, row: ResourceActions) -> AppResult<()> {
        let _guard = self.writer.lock().await;
        let mut next = (*self.snapshot()).clone();
        next.matrix.set_row(role, row);
        info!(role = %role, "Role defaults updated");
        self.commit(next).await
    }

    /// 按资源键合并覆盖
    ///
    /// 本次调用提到的每个资源整体替换该资源的动作集，未提到的
    /// 资源保持不动。
    pub async fn upsert_override(
        &self,
        principal_id: UserId,
        partial: ResourceActions,
    ) -> AppResult<()> {
        let _guard = self.writer.lock().await;
        let mut next = (*self.snapshot()).clone();
        let entry = next.overrides.entry(principal_id).or_default();
        for (resource, actions) in partial.iter() {
            entry.set(*resource, actions.clone());
        }
        info!(principal_id = %principal_id, "Principal override updated");
        self.commit(next).await
    }

    /// 移除主体覆盖
    pub async fn remove_override(&self, principal_id: &UserId) -> AppResult<()> {
        let _guard = self.writer.lock().await;
        let mut next = (*self.snapshot()).clone();
        next.overrides.remove(principal_id);
        info!(principal_id = %principal_id, "Principal override removed");
        self.commit(next).await
    }

    /// 持久化后替换内存快照
    async fn commit(&self, next: PolicySnapshot) -> AppResult<()> {
        self.repo.save(&next).await?;
        *self.state.write().expect("policy store lock poisoned") = Arc::new(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Resource};
    use crate::repository::InMemoryPolicyRepository;
    use mockall::mock;

    mock! {
        Repo {}

        #[async_trait::async_trait]
        impl PolicyRepository for Repo {
            async fn load(&self) -> AppResult<Option<PolicySnapshot>>;
            async fn save(&self, snapshot: &PolicySnapshot) -> AppResult<()>;
        }
    }

    async fn store() -> PolicyStore {
        let repo = Arc::new(InMemoryPolicyRepository::new());
        PolicyStore::bootstrap(repo, &RetryConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_defaults() {
        let repo = Arc::new(InMemoryPolicyRepository::new());
        let store = PolicyStore::bootstrap(repo.clone(), &RetryConfig::default())
            .await
            .unwrap();

        assert!(store.snapshot().matrix.is_total());
        // 播种结果已持久化
        assert!(repo.load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bootstrap_retries_then_fails_closed() {
        let mut repo = MockRepo::new();
        repo.expect_load()
            .times(3)
            .returning(|| Err(AppError::policy_unavailable("disk on fire")));

        let retry = RetryConfig::new(
            3,
            std::time::Duration::from_millis(1),
            std::time::Duration::from_millis(5),
        );
        let err = PolicyStore::bootstrap(Arc::new(repo), &retry)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PolicyUnavailable(_)));
    }

    #[tokio::test]
    async fn test_write_visible_to_subsequent_reads() {
        let store = store().await;

        let row = ResourceActions::new().grant(Resource::Finance, [Action::View]);
        store.upsert_role_defaults(Role::User, row).await.unwrap();

        let defaults = store.role_defaults(Role::User).unwrap();
        assert!(defaults.allows(Resource::Finance, Action::View));
    }

    #[tokio::test]
    async fn test_upsert_role_defaults_idempotent() {
        let store = store().await;
        let row = ResourceActions::new().grant(Resource::Tasks, [Action::View, Action::Edit]);

        store
            .upsert_role_defaults(Role::Manager, row.clone())
            .await
            .unwrap();
        let first = store.role_defaults(Role::Manager).unwrap();

        store.upsert_role_defaults(Role::Manager, row).await.unwrap();
        let second = store.role_defaults(Role::Manager).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_upsert_role_defaults_normalizes_row() {
        let store = store().await;
        store
            .upsert_role_defaults(
                Role::User,
                ResourceActions::new().grant(Resource::Tasks, [Action::View]),
            )
            .await
            .unwrap();

        let row = store.role_defaults(Role::User).unwrap();
        assert!(row.is_total());
        assert!(!row.allows(Resource::Projects, Action::View));
    }

    #[tokio::test]
    async fn test_override_merges_at_resource_level() {
        let store = store().await;
        let id = UserId::new();

        store
            .upsert_override(
                id,
                ResourceActions::new().grant(Resource::Finance, [Action::View]),
            )
            .await
            .unwrap();
        store
            .upsert_override(
                id,
                ResourceActions::new().grant(Resource::Tasks, [Action::Delete]),
            )
            .await
            .unwrap();

        // 两次调用各自的资源键都保留
        let ovr = store.override_for(&id).unwrap();
        assert!(ovr.allows(Resource::Finance, Action::View));
        assert!(ovr.allows(Resource::Tasks, Action::Delete));

        // 再次提到 finance 时整体替换该资源的集合
        store
            .upsert_override(
                id,
                ResourceActions::new().grant(Resource::Finance, [Action::Edit]),
            )
            .await
            .unwrap();
        let ovr = store.override_for(&id).unwrap();
        assert!(ovr.allows(Resource::Finance, Action::Edit));
        assert!(!ovr.allows(Resource::Finance, Action::View));
        assert!(ovr.allows(Resource::Tasks, Action::Delete));
    }

    #[tokio::test]
    async fn test_remove_override() {
        let store = store().await;
        let id = UserId::new();

        store
            .upsert_override(
                id,
                ResourceActions::new().grant(Resource::Team, [Action::View]),
            )
            .await
            .unwrap();
        assert!(store.override_for(&id).is_some());

        store.remove_override(&id).await.unwrap();
        assert!(store.override_for(&id).is_none());
    }

    #[tokio::test]
    async fn test_missing_row_is_policy_not_found() {
        // 绕过播种，构造缺行快照模拟被破坏的配置
        let snapshot: PolicySnapshot = serde_json::from_value(serde_json::json!({
            "matrix": { "rows": { "ADMIN": {
                "projects": ["view"], "tasks": [], "team": [], "finance": []
            } } },
            "overrides": {}
        }))
        .unwrap();

        let store = PolicyStore::new(Arc::new(InMemoryPolicyRepository::new()), snapshot);
        let err = store.role_defaults(Role::Manager).unwrap_err();
        assert!(matches!(err, AppError::PolicyNotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_snapshot_unchanged() {
        let mut repo = MockRepo::new();
        repo.expect_save()
            .returning(|_| Err(AppError::policy_unavailable("disk full")));

        let store = PolicyStore::new(Arc::new(repo), PolicySnapshot::bootstrap());
        let before = store.role_defaults(Role::User).unwrap();

        let err = store
            .upsert_role_defaults(
                Role::User,
                ResourceActions::new().grant(Resource::Finance, [Action::Delete]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PolicyUnavailable(_)));

        // 持久化失败时内存快照也不推进
        assert_eq!(store.role_defaults(Role::User).unwrap(), before);
    }
}
