//! crewdesk-access - 访问控制核心
//!
//! 角色→资源→动作矩阵、按主体覆盖、策略存储与权限解析。
//! 决策是 (策略快照, Principal, Resource, Action) 的纯函数，
//! 对 HTTP、UI 和路由一无所知。

pub mod model;
pub mod repository;
pub mod resolver;
pub mod store;

pub use model::{Action, ActionSet, Resource, ResourceActions, RolePermissionMatrix};
pub use repository::{FilePolicyRepository, InMemoryPolicyRepository, PolicyRepository};
pub use resolver::{MANAGE_POLICY, PermissionCheck, PermissionResolver};
pub use store::{PolicySnapshot, PolicyStore};
