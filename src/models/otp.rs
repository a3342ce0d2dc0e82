use sqlx::FromRow;

/// 短信验证码，按手机号唯一
#[derive(Debug, Clone, FromRow)]
pub struct Otp {
    pub id: i64,
    pub phone: String,
    pub code: String,
    pub issued_at: i64, // Unix 秒
}
