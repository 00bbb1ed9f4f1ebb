//! 策略仓储接口
//!
//! 策略文档很小（一个矩阵加若干覆盖），以单个 JSON 文档持久化。
//! 需要数据库后端时实现同一 trait 即可。

use std::path::PathBuf;

use async_trait::async_trait;
use crewdesk_errors::{AppError, AppResult};
use tracing::debug;

use crate::store::PolicySnapshot;

/// 策略仓储接口
#[async_trait]
pub trait PolicyRepository: Send + Sync {
    /// 加载策略文档，从未持久化过时返回 None
    async fn load(&self) -> AppResult<Option<PolicySnapshot>>;

    /// 持久化策略文档
    async fn save(&self, snapshot: &PolicySnapshot) -> AppResult<()>;
}

/// JSON 文件仓储
pub struct FilePolicyRepository {
    path: PathBuf,
}

impl FilePolicyRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PolicyRepository for FilePolicyRepository {
    async fn load(&self) -> AppResult<Option<PolicySnapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No policy document yet");
                return Ok(None);
            }
            Err(e) => {
                return Err(AppError::policy_unavailable(format!(
                    "Failed to read policy document {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let snapshot = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::policy_unavailable(format!(
                "Corrupt policy document {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &PolicySnapshot) -> AppResult<()> {
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| AppError::internal(format!("Failed to serialize policy: {}", e)))?;

        // 先写临时文件再改名，避免崩溃时留下半截文档
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
            AppError::policy_unavailable(format!(
                "Failed to write policy document {}: {}",
                tmp.display(),
                e
            ))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            AppError::policy_unavailable(format!(
                "Failed to replace policy document {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }
}

/// 内存仓储（测试与本地开发用）
#[derive(Default)]
pub struct InMemoryPolicyRepository {
    inner: tokio::sync::Mutex<Option<PolicySnapshot>>,
}

impl InMemoryPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyRepository for InMemoryPolicyRepository {
    async fn load(&self) -> AppResult<Option<PolicySnapshot>> {
        Ok(self.inner.lock().await.clone())
    }

    async fn save(&self, snapshot: &PolicySnapshot) -> AppResult<()> {
        *self.inner.lock().await = Some(snapshot.clone());
        Ok(())
    }
}
