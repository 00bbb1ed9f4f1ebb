//! 网关共享状态

use std::sync::Arc;

use crewdesk_access::{PermissionCheck, PermissionResolver, PolicyStore};
use crewdesk_auth_core::{PrincipalResolver, TokenService};
use crewdesk_common::{Role, UserId};
use crewdesk_config::AppConfig;
use crewdesk_errors::{AppError, AppResult};
use secrecy::{ExposeSecret, Secret};

use crate::middleware::RouteTable;

/// 用户目录条目
#[derive(Clone)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub password_hash: Secret<String>,
    /// 服务端指定的角色；客户端可见的角色值只是显示提示
    pub role: Role,
}

/// 网关状态
///
/// PolicyStore 作为显式注入的单例传给解析器和每个执行点，
/// 没有环境全局量。
#[derive(Clone)]
pub struct GatewayState {
    pub principals: PrincipalResolver,
    pub tokens: TokenService,
    /// 三个执行点共享的检查接口，可用测试替身替换
    pub checker: Arc<dyn PermissionCheck>,
    /// 策略管理操作（自身再次校验调用主体）
    pub policy: Arc<PermissionResolver>,
    pub store: Arc<PolicyStore>,
    pub routes: Arc<RouteTable>,
    pub users: Arc<Vec<AuthUser>>,
}

impl GatewayState {
    pub fn new(config: &AppConfig, store: Arc<PolicyStore>, routes: RouteTable) -> AppResult<Self> {
        let tokens = TokenService::new(
            config.session.secret.expose_secret(),
            config.session.expires_in,
            config.session.issuer.clone(),
            config.session.audience.clone(),
        );

        let users = config
            .auth
            .users
            .iter()
            .map(|u| {
                let role = Role::parse(&u.role).ok_or_else(|| {
                    AppError::validation(format!(
                        "Unknown role '{}' for user {} in auth config",
                        u.role, u.email
                    ))
                })?;
                Ok(AuthUser {
                    id: UserId::from_uuid(u.id),
                    email: u.email.clone(),
                    password_hash: u.password_hash.clone(),
                    role,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        let policy = Arc::new(PermissionResolver::new(store.clone()));

        Ok(Self {
            principals: PrincipalResolver::new(tokens.clone()),
            tokens,
            checker: policy.clone(),
            policy,
            store,
            routes: Arc::new(routes),
            users: Arc::new(users),
        })
    }
}
