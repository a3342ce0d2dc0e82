use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use axum_extra::{
    extract::cookie::{Cookie, CookieJar, SameSite},
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::user::{Claims, User};
use crate::services::otp_service::{self, OtpCheck};
use crate::{db, AppState};

pub const TOKEN_COOKIE: &str = "token";
const SESSION_DAYS: i64 = 14;

#[derive(Deserialize)]
pub struct SendCodePayload {
    pub phone: Option<String>,
}

/// 缺字段时按验证失败处理，而不是直接拒绝请求
#[derive(Deserialize)]
pub struct LoginForm {
    pub phone: Option<String>,
    pub code: Option<String>,
}

#[derive(Serialize)]
pub struct AuthMessage {
    pub success: bool,
    pub message: String,
}

fn auth_message(success: bool, message: &str) -> Json<AuthMessage> {
    Json(AuthMessage { success, message: message.to_string() })
}

/// 已登录的管理员；管理接口通过该提取器鉴权
#[derive(Debug, Clone)]
pub struct AdminUser(pub Claims);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        // Cookie 优先，其次 Authorization: Bearer
        let jar = CookieJar::from_headers(&parts.headers);
        let token = match jar.get(TOKEN_COOKIE) {
            Some(cookie) => cookie.value().to_string(),
            None => TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map(|TypedHeader(auth)| auth.token().to_string())
                .map_err(|_| AppError::Unauthorized)?,
        };

        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(state.config.secret_key.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            tracing::warn!("--- Token 校验失败: {}", e);
            AppError::Unauthorized
        })?;

        Ok(AdminUser(data.claims))
    }
}

/// 签发 JWT
pub fn issue_token(secret: &str, user_id: i64) -> Result<String, AppError> {
    let claims = Claims {
        sub: user_id,
        exp: (Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
        role: "admin".to_string(),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::Internal(format!("签发 Token 失败: {e}")))
}

/// 1. 发送短信验证码
pub async fn send_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SendCodePayload>,
) -> Result<Json<AuthMessage>, AppError> {
    let Some(phone) = payload.phone.filter(|p| !p.trim().is_empty()) else {
        return Ok(auth_message(false, "请输入手机号"));
    };
    tracing::info!(">>> 请求验证码: phone={}", phone);

    if state.config.allowed_phone.is_empty() || phone != state.config.allowed_phone {
        tracing::warn!("--- 未授权的手机号: {}", phone);
        return Ok(auth_message(false, "该手机号无权登录"));
    }

    let code = otp_service::generate_code();
    otp_service::store_code(&state.db, &phone, &code, Utc::now().timestamp()).await?;

    match state.sms.send_code(&phone, &code).await {
        Ok(()) => {
            tracing::info!("<<< 验证码已发送: phone={}", phone);
            Ok(auth_message(true, "验证码已发送"))
        }
        Err(e) => {
            tracing::error!("!!! 短信发送失败: phone={}, Error: {}", phone, e);
            Ok(auth_message(false, "短信发送失败"))
        }
    }
}

/// 2. 验证码登录
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let phone = form.phone.as_deref().map(str::trim).unwrap_or_default();
    tracing::info!(">>> 登录尝试: phone={}", phone);

    if state.config.allowed_phone.is_empty() || phone != state.config.allowed_phone {
        tracing::warn!("--- 登录失败: 手机号[{}]未授权", phone);
        return Ok((StatusCode::UNAUTHORIZED, auth_message(false, "该手机号无权登录")).into_response());
    }

    let code = form.code.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let check = match code {
        Some(code) => otp_service::verify_code(&state.db, phone, code, Utc::now().timestamp()).await?,
        None => OtpCheck::Mismatch,
    };
    if check != OtpCheck::Verified {
        tracing::warn!("--- 登录失败: phone={}, 原因={:?}", phone, check);
        return Ok((StatusCode::UNAUTHORIZED, auth_message(false, check.message())).into_response());
    }

    // 唯一的管理员账号，缺失时补建
    let admin = sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash FROM users WHERE username = 'admin'",
    )
    .fetch_optional(&state.db)
    .await?;
    let admin_id = match admin {
        Some(user) => user.id,
        None => db::create_admin(&state.db).await?,
    };

    let token = issue_token(&state.config.secret_key, admin_id)?;
    let cookie = Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(SESSION_DAYS))
        .build();

    tracing::info!("<<< 登录成功: admin id={}", admin_id);
    Ok((jar.add(cookie), Redirect::to("/")).into_response())
}

/// 3. 退出登录
pub async fn logout(_admin: AdminUser, jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(Cookie::build(TOKEN_COOKIE).path("/").build());
    (jar, Redirect::to("/"))
}
