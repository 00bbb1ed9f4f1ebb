//! 权限模型
//!
//! 受保护资源、动作与角色默认矩阵。矩阵是全映射：每个
//! (Role, Resource) 对都有显式（可为空）的动作集，空集表示
//! 拒绝，绝不缺席。

use std::collections::{BTreeMap, BTreeSet};

use crewdesk_common::Role;
use serde::{Deserialize, Serialize};

/// 受保护资源
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Projects,
    Tasks,
    Team,
    Finance,
}

impl Resource {
    pub const ALL: [Resource; 4] = [
        Resource::Projects,
        Resource::Tasks,
        Resource::Team,
        Resource::Finance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Projects => "projects",
            Resource::Tasks => "tasks",
            Resource::Team => "team",
            Resource::Finance => "finance",
        }
    }

    pub fn parse(s: &str) -> Option<Resource> {
        match s {
            "projects" => Some(Resource::Projects),
            "tasks" => Some(Resource::Tasks),
            "team" => Some(Resource::Team),
            "finance" => Some(Resource::Finance),
            _ => None,
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 资源上的操作
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::View, Action::Create, Action::Edit, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Action> {
        match s {
            "view" => Some(Action::View),
            "create" => Some(Action::Create),
            "edit" => Some(Action::Edit),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type ActionSet = BTreeSet<Action>;

/// 资源→动作集 行
///
/// 角色默认行是规范化的（每个资源都有条目）；覆盖行是稀疏的，
/// 只含被覆盖的资源。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceActions(BTreeMap<Resource, ActionSet>);

impl ResourceActions {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// 构建器风格的授权
    pub fn grant(mut self, resource: Resource, actions: impl IntoIterator<Item = Action>) -> Self {
        self.0.insert(resource, actions.into_iter().collect());
        self
    }

    /// 覆盖某资源的动作集（整体替换，不合并）
    pub fn set(&mut self, resource: Resource, actions: ActionSet) {
        self.0.insert(resource, actions);
    }

    pub fn get(&self, resource: Resource) -> Option<&ActionSet> {
        self.0.get(&resource)
    }

    pub fn allows(&self, resource: Resource, action: Action) -> bool {
        self.0.get(&resource).is_some_and(|set| set.contains(&action))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Resource, &ActionSet)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 每个资源都有显式条目（I1 的行级形式）
    pub fn is_total(&self) -> bool {
        Resource::ALL.iter().all(|r| self.0.contains_key(r))
    }

    /// 为缺失的资源补上显式空集
    pub fn normalized(mut self) -> Self {
        for resource in Resource::ALL {
            self.0.entry(resource).or_default();
        }
        self
    }

    /// self 在每个资源上都覆盖 other（单调特权检查用）
    pub fn is_superset_of(&self, other: &ResourceActions) -> bool {
        Resource::ALL.iter().all(|r| {
            let ours = self.0.get(r).cloned().unwrap_or_default();
            let theirs = other.0.get(r).cloned().unwrap_or_default();
            theirs.is_subset(&ours)
        })
    }
}

impl FromIterator<(Resource, ActionSet)> for ResourceActions {
    fn from_iter<T: IntoIterator<Item = (Resource, ActionSet)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 角色默认权限矩阵
///
/// 只能通过 PolicyStore 的管理写入变更；启动时以内置默认播种。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermissionMatrix {
    rows: BTreeMap<Role, ResourceActions>,
}

impl RolePermissionMatrix {
    /// 内置默认矩阵
    ///
    /// 满足单调特权：每个资源上 ADMIN ⊇ MANAGER ⊇ USER。
    /// 管理策略权限 (team, edit) 默认只有 ADMIN 持有。
    pub fn builtin_default() -> Self {
        let user = ResourceActions::new()
            .grant(Resource::Projects, [Action::View])
            .grant(Resource::Tasks, [Action::View, Action::Create, Action::Edit])
            .grant(Resource::Team, [Action::View])
            .normalized();

        let manager = ResourceActions::new()
            .grant(Resource::Projects, [Action::View, Action::Create, Action::Edit])
            .grant(
                Resource::Tasks,
                [Action::View, Action::Create, Action::Edit, Action::Delete],
            )
            .grant(Resource::Team, [Action::View])
            .grant(Resource::Finance, [Action::View])
            .normalized();

        let admin: ResourceActions = Resource::ALL
            .into_iter()
            .map(|r| (r, Action::ALL.into_iter().collect()))
            .collect();

        let mut rows = BTreeMap::new();
        rows.insert(Role::User, user);
        rows.insert(Role::Manager, manager);
        rows.insert(Role::Admin, admin);
        Self { rows }
    }

    pub fn row(&self, role: Role) -> Option<&ResourceActions> {
        self.rows.get(&role)
    }

    /// 整体替换某角色的行；行在存入前规范化
    pub fn set_row(&mut self, role: Role, row: ResourceActions) {
        self.rows.insert(role, row.normalized());
    }

    pub fn rows(&self) -> impl Iterator<Item = (&Role, &ResourceActions)> {
        self.rows.iter()
    }

    /// 每个 (Role, Resource) 对都有显式条目（I1）
    pub fn is_total(&self) -> bool {
        Role::ALL
            .iter()
            .all(|role| self.rows.get(role).is_some_and(|row| row.is_total()))
    }
}

impl Default for RolePermissionMatrix {
    fn default() -> Self {
        Self::builtin_default()
    }
}
