//! 用户认证
//!
//! 注册、登录、令牌签发与校验。响应里附带嵌套的账号与医生摘要，
//! 登录时缺失的医生档案会被惰性补建。

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use oct_core::utils::{is_valid_email, is_valid_username};
use oct_core::{Doctor, OctError, Result, User};
use oct_database::{DatabaseQueries, DatabasePool, NewDoctor, NewUser};
use oct_storage::MediaStore;
use oct_workflow::IdentityResolver;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const ACCESS_TOKEN_TYPE: &str = "access";
const REFRESH_TOKEN_TYPE: &str = "refresh";

/// JWT Claims
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,        // 用户ID
    username: String,   // 用户名
    token_type: String, // access或refresh
    exp: usize,         // 过期时间
    iat: usize,         // 签发时间
    jti: String,        // JWT ID
}

/// 签发的令牌对:短期access加长期refresh
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// 令牌签发与校验
#[derive(Clone)]
pub struct TokenIssuer {
    secret: String,
    access_token_minutes: i64,
    refresh_token_days: i64,
}

impl TokenIssuer {
    pub fn new(secret: String, access_token_minutes: i64, refresh_token_days: i64) -> Self {
        Self {
            secret,
            access_token_minutes,
            refresh_token_days,
        }
    }

    /// 为账号签发access/refresh令牌对
    pub fn issue_pair(&self, user_id: Uuid, username: &str) -> Result<TokenPair> {
        let access = self.issue(
            user_id,
            username,
            ACCESS_TOKEN_TYPE,
            chrono::Duration::minutes(self.access_token_minutes),
        )?;
        let refresh = self.issue(
            user_id,
            username,
            REFRESH_TOKEN_TYPE,
            chrono::Duration::days(self.refresh_token_days),
        )?;

        Ok(TokenPair { access, refresh })
    }

    /// 用refresh令牌换新的access令牌
    pub fn refresh_access(&self, refresh_token: &str) -> Result<String> {
        let claims = self.decode(refresh_token, REFRESH_TOKEN_TYPE)?;
        let user_id = parse_subject(&claims.sub)?;

        self.issue(
            user_id,
            &claims.username,
            ACCESS_TOKEN_TYPE,
            chrono::Duration::minutes(self.access_token_minutes),
        )
    }

    /// 校验access令牌，返回认证主体
    pub fn verify_access(&self, token: &str) -> Result<AuthUser> {
        let claims = self.decode(token, ACCESS_TOKEN_TYPE)?;
        let user_id = parse_subject(&claims.sub)?;

        Ok(AuthUser {
            user_id,
            username: claims.username,
        })
    }

    fn issue(
        &self,
        user_id: Uuid,
        username: &str,
        token_type: &str,
        ttl: chrono::Duration,
    ) -> Result<String> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            token_type: token_type.to_string(),
            exp: (now + ttl).timestamp() as usize,
            iat: now.timestamp() as usize,
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| OctError::Internal(format!("token encoding failed: {}", e)))
    }

    /// refresh令牌不能冒充access令牌，反之亦然
    fn decode(&self, token: &str, expected_type: &str) -> Result<Claims> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| OctError::Unauthorized("Invalid or expired token".to_string()))?;

        if data.claims.token_type != expected_type {
            return Err(OctError::Unauthorized("Invalid token type".to_string()));
        }

        Ok(data.claims)
    }
}

fn parse_subject(sub: &str) -> Result<Uuid> {
    sub.parse::<Uuid>()
        .map_err(|_| OctError::Unauthorized("Invalid token subject".to_string()))
}

/// argon2id密码哈希
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| OctError::Internal(format!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

/// 认证服务
#[derive(Clone)]
pub struct AuthService {
    pool: DatabasePool,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(pool: DatabasePool, tokens: TokenIssuer) -> Self {
        Self { pool, tokens }
    }

    /// 注册新账号并创建医生档案
    ///
    /// 账号行与档案行在同一事务内提交；用户名或邮箱重复由唯一约束
    /// 拦下，映射为命名对应字段的冲突错误。
    pub async fn signup(&self, request: SignupRequest) -> Result<(User, Doctor, TokenPair)> {
        if !is_valid_username(&request.username) {
            return Err(OctError::validation("username", "Enter a valid username."));
        }
        if !is_valid_email(&request.email) {
            return Err(OctError::validation("email", "Enter a valid email address."));
        }
        if request.password.len() < 8 {
            return Err(OctError::validation(
                "password",
                "Password must be at least 8 characters.",
            ));
        }

        let new_user = NewUser {
            id: Uuid::new_v4(),
            username: request.username,
            email: request.email,
            password_hash: hash_password(&request.password)?,
            first_name: request.first_name,
            last_name: request.last_name,
        };

        let queries = DatabaseQueries::new(&self.pool);
        let mut tx = queries.begin().await?;
        DatabaseQueries::insert_user_tx(&mut tx, &new_user).await?;
        DatabaseQueries::insert_doctor_tx(&mut tx, &NewDoctor::general(new_user.id)).await?;
        tx.commit().await.map_err(|e| OctError::Database(e.to_string()))?;

        let user = queries
            .get_user_by_id(&new_user.id)
            .await?
            .ok_or_else(|| OctError::Internal("user missing after signup".to_string()))?;
        let doctor = queries
            .get_doctor_by_user_id(&new_user.id)
            .await?
            .ok_or_else(|| OctError::Internal("doctor missing after signup".to_string()))?;

        let pair = self.tokens.issue_pair(user.id, &user.username)?;
        info!("New doctor signed up: {}", user.username);
        Ok((user, doctor, pair))
    }

    /// 登录并签发令牌对
    pub async fn login(&self, request: LoginRequest) -> Result<(User, Doctor, TokenPair)> {
        let queries = DatabaseQueries::new(&self.pool);

        let user = queries
            .get_user_by_username(&request.username)
            .await?
            .ok_or_else(|| OctError::Unauthorized("Invalid username or password".to_string()))?;

        if !verify_password(&request.password, &user.password_hash) {
            return Err(OctError::Unauthorized("Invalid username or password".to_string()));
        }

        // 缺失的医生档案在签发令牌时惰性补建
        let doctor = IdentityResolver::new(&self.pool).resolve_or_create(user.id).await?;

        let pair = self.tokens.issue_pair(user.id, &user.username)?;
        Ok((user, doctor, pair))
    }

    pub fn refresh(&self, refresh_token: &str) -> Result<String> {
        self.tokens.refresh_access(refresh_token)
    }

    pub fn verify_access(&self, token: &str) -> Result<AuthUser> {
        self.tokens.verify_access(token)
    }
}

// ========== 请求与响应 ==========

/// 注册请求
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// 登录请求
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 刷新请求
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// 认证响应:令牌对加嵌套的账号与医生摘要
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub refresh: String,
    pub access: String,
    pub user: UserPayload,
}

impl AuthResponse {
    pub fn new(user: &User, doctor: &Doctor, pair: TokenPair, storage: &MediaStore) -> Self {
        Self {
            refresh: pair.refresh,
            access: pair.access,
            user: UserPayload::new(user, doctor, storage),
        }
    }
}

/// 账号摘要，嵌套医生档案
#[derive(Debug, Serialize)]
pub struct UserPayload {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub doctor: DoctorPayload,
}

impl UserPayload {
    pub fn new(user: &User, doctor: &Doctor, storage: &MediaStore) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            doctor: DoctorPayload::new(doctor, storage),
        }
    }
}

/// 医生档案摘要，头像以公开URL给出
#[derive(Debug, Serialize)]
pub struct DoctorPayload {
    pub hospital: Option<String>,
    pub specialty: Option<String>,
    pub role: String,
    pub license_number: Option<String>,
    pub profile_picture: Option<String>,
    pub phone_number: Option<String>,
}

impl DoctorPayload {
    pub fn new(doctor: &Doctor, storage: &MediaStore) -> Self {
        Self {
            hospital: doctor.hospital.clone(),
            specialty: doctor.specialty.clone(),
            role: doctor.role.clone(),
            license_number: doctor.license_number.clone(),
            profile_picture: storage.url_for(doctor.profile_picture.as_deref()),
            phone_number: doctor.phone_number.clone(),
        }
    }
}

// ========== 处理器 ==========

/// 注册处理器
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    let (user, doctor, pair) = state.auth.signup(request).await?;
    let response = AuthResponse::new(&user, &doctor, pair, &state.storage);

    Ok((StatusCode::CREATED, Json(response)))
}

/// 登录处理器
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let username = request.username.clone();

    match state.auth.login(request).await {
        Ok((user, doctor, pair)) => {
            info!("User logged in successfully: {}", user.username);
            Ok(Json(AuthResponse::new(&user, &doctor, pair, &state.storage)))
        }
        Err(e) => {
            warn!("Login failed for {}: {}", username, e);
            Err(e.into())
        }
    }
}

/// 令牌刷新处理器
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    let access = state.auth.refresh(&request.refresh)?;

    Ok(Json(json!({ "access": access })))
}

// ========== 提取器 ==========

/// 认证主体
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> ApiResult<Self> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError(OctError::Unauthorized("Missing bearer token".to_string())))?;

        state.auth.verify_access(token).map_err(ApiError::from)
    }
}

/// 可选认证主体:缺失或无效的令牌解析为None而不是错误
///
/// 影像与分析结果的列表接口用它实现"未认证得到空集合"的语义。
pub struct OptionalAuthUser(pub Option<AuthUser>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for OptionalAuthUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let user = bearer_token(&parts.headers).and_then(|token| state.auth.verify_access(token).ok());

        Ok(OptionalAuthUser(user))
    }
}

/// 从请求头提取Bearer令牌
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret".to_string(), 30, 7)
    }

    #[test]
    fn test_access_token_round_trip() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();

        let pair = issuer.issue_pair(user_id, "dr.a").unwrap();
        let auth_user = issuer.verify_access(&pair.access).unwrap();

        assert_eq!(auth_user.user_id, user_id);
        assert_eq!(auth_user.username, "dr.a");
    }

    #[test]
    fn test_refresh_token_cannot_act_as_access() {
        let issuer = issuer();
        let pair = issuer.issue_pair(Uuid::new_v4(), "dr.a").unwrap();

        assert!(issuer.verify_access(&pair.refresh).is_err());
    }

    #[test]
    fn test_refresh_issues_verifiable_access() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();
        let pair = issuer.issue_pair(user_id, "dr.a").unwrap();

        let access = issuer.refresh_access(&pair.refresh).unwrap();
        assert_eq!(issuer.verify_access(&access).unwrap().user_id, user_id);

        // access令牌也不能反过来换新令牌
        assert!(issuer.refresh_access(&pair.access).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let issuer = issuer();

        assert!(issuer.verify_access("not-a-token").is_err());
        assert!(issuer.verify_access("").is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let pair = issuer().issue_pair(Uuid::new_v4(), "dr.a").unwrap();
        let other = TokenIssuer::new("other-secret".to_string(), 30, 7);

        assert!(other.verify_access(&pair.access).is_err());
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("correct horse battery").unwrap();

        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong password", &hash));
        assert!(!verify_password("correct horse battery", "not-a-hash"));
    }
}
