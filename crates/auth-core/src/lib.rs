//! crewdesk-auth-core - 认证核心库
//!
//! 会话令牌 (JWT) Claims、签发/校验与 Principal 解析

use chrono::{DateTime, Duration, Utc};
use crewdesk_common::{Role, UserId};
use crewdesk_errors::{AppError, AppResult};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 会话令牌 Claims
///
/// role 以字符串承载，解析为 Principal 时宽松转换：
/// 未知值退化为 USER（默认拒绝）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Email
    pub email: String,
    /// Role claim
    pub role: String,
    /// Expiration time
    pub exp: i64,
    /// Issued at
    pub iat: i64,
    /// JWT ID
    pub jti: String,
    /// Issuer
    #[serde(default)]
    pub iss: String,
    /// Audience
    #[serde(default)]
    pub aud: String,
}

impl Claims {
    pub fn new(
        user_id: &UserId,
        email: &str,
        role: Role,
        expires_in_secs: i64,
        issuer: &str,
        audience: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.as_str().to_string(),
            exp: (now + Duration::seconds(expires_in_secs)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::now_v7().to_string(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
        }
    }
}

/// 已认证主体
///
/// 从一次凭证解析构造，在单次请求/评估的生命周期内不可变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Principal {
    /// 从已验证的 Claims 构造 Principal
    ///
    /// 签名/过期校验由 TokenService 完成，这里只校验字段形状。
    pub fn from_claims(claims: &Claims) -> AppResult<Self> {
        let id = UserId::from_string(&claims.sub)
            .map_err(|_| AppError::unauthenticated("Invalid user ID in token"))?;

        if claims.email.is_empty() {
            return Err(AppError::unauthenticated("Empty email in token"));
        }

        let issued_at = DateTime::from_timestamp(claims.iat, 0)
            .ok_or_else(|| AppError::unauthenticated("Invalid iat in token"))?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AppError::unauthenticated("Invalid exp in token"))?;

        Ok(Self {
            id,
            email: claims.email.clone(),
            role: Role::from_claim(&claims.role),
            issued_at,
            expires_at,
        })
    }
}

/// Token 服务
///
/// HS256 签名，固定 issuer/audience，零时间偏差。签名令牌
/// 使 role 声明具备防篡改性：客户端改写令牌只会得到
/// Unauthenticated，而不是自我提权。
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expires_in: i64,
    issuer: String,
    audience: String,
}

impl TokenService {
    pub fn new(secret: &str, expires_in: i64, issuer: String, audience: String) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expires_in,
            issuer,
            audience,
        }
    }

    /// 签发会话令牌
    pub fn issue_session_token(
        &self,
        user_id: &UserId,
        email: &str,
        role: Role,
    ) -> AppResult<String> {
        let claims = Claims::new(
            user_id,
            email,
            role,
            self.expires_in,
            &self.issuer,
            &self.audience,
        );

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to sign session token: {}", e)))
    }

    /// 验证令牌
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.leeway = 0; // 不允许时间偏差

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::unauthenticated(format!("Invalid session token: {}", e)))?;

        let claims = token_data.claims;

        if claims.jti.is_empty() {
            return Err(AppError::unauthenticated("Token ID (jti) missing"));
        }

        Ok(claims)
    }

    pub fn expires_in(&self) -> i64 {
        self.expires_in
    }
}

/// 主体解析器
///
/// 把入站会话凭证变成类型化的 Principal 或一个确定的失败。
/// 不访问策略存储，不做网络 I/O。
#[derive(Clone)]
pub struct PrincipalResolver {
    tokens: TokenService,
}

impl PrincipalResolver {
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }

    /// 解析凭证
    ///
    /// 凭证缺失、格式错误或过期一律返回 Unauthenticated。
    pub fn resolve(&self, credential: Option<&str>) -> AppResult<Principal> {
        let token = credential
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::unauthenticated("Missing session credential"))?;

        let claims = self.tokens.validate_token(token)?;
        Principal::from_claims(&claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_service() -> TokenService {
        TokenService::new(
            "test_secret",
            3600,
            "crewdesk".to_string(),
            "crewdesk-web".to_string(),
        )
    }

    fn resolver() -> PrincipalResolver {
        PrincipalResolver::new(token_service())
    }

    #[test]
    fn test_resolve_valid_token() {
        let user_id = UserId::new();
        let token = token_service()
            .issue_session_token(&user_id, "manager@crewdesk.io", Role::Manager)
            .unwrap();

        let principal = resolver().resolve(Some(&token)).unwrap();
        assert_eq!(principal.id, user_id);
        assert_eq!(principal.email, "manager@crewdesk.io");
        assert_eq!(principal.role, Role::Manager);
        assert!(principal.expires_at > principal.issued_at);
    }

    #[test]
    fn test_resolve_missing_credential() {
        let err = resolver().resolve(None).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));

        let err = resolver().resolve(Some("")).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[test]
    fn test_resolve_malformed_credential() {
        let err = resolver().resolve(Some("not-a-jwt")).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[test]
    fn test_expired_token_is_unauthenticated_regardless_of_role() {
        // expires_in 为负，签出的令牌已过期
        let expired_service = TokenService::new(
            "test_secret",
            -60,
            "crewdesk".to_string(),
            "crewdesk-web".to_string(),
        );
        let token = expired_service
            .issue_session_token(&UserId::new(), "admin@crewdesk.io", Role::Admin)
            .unwrap();

        let err = resolver().resolve(Some(&token)).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let other_service = TokenService::new(
            "wrong_secret",
            3600,
            "crewdesk".to_string(),
            "crewdesk-web".to_string(),
        );
        let token = other_service
            .issue_session_token(&UserId::new(), "admin@crewdesk.io", Role::Admin)
            .unwrap();

        let err = resolver().resolve(Some(&token)).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let other_issuer = TokenService::new(
            "test_secret",
            3600,
            "someone-else".to_string(),
            "crewdesk-web".to_string(),
        );
        let token = other_issuer
            .issue_session_token(&UserId::new(), "user@crewdesk.io", Role::User)
            .unwrap();

        let err = resolver().resolve(Some(&token)).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[test]
    fn test_unknown_role_claim_degrades_to_user() {
        let mut claims = Claims::new(
            &UserId::new(),
            "user@crewdesk.io",
            Role::Admin,
            3600,
            "crewdesk",
            "crewdesk-web",
        );
        claims.role = "SUPERUSER".to_string();

        let principal = Principal::from_claims(&claims).unwrap();
        assert_eq!(principal.role, Role::User);
    }

    #[test]
    fn test_empty_email_rejected() {
        let mut claims = Claims::new(
            &UserId::new(),
            "user@crewdesk.io",
            Role::User,
            3600,
            "crewdesk",
            "crewdesk-web",
        );
        claims.email = String::new();

        let err = Principal::from_claims(&claims).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }
}
