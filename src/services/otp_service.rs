use rand::Rng;
use sqlx::SqlitePool;

use crate::models::otp::Otp;

/// 验证码有效期 (秒)
pub const OTP_TTL_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Verified,
    NotRequested,
    Expired,
    Mismatch,
}

impl OtpCheck {
    /// 展示给用户的提示
    pub fn message(self) -> &'static str {
        match self {
            OtpCheck::Verified => "登录成功",
            OtpCheck::NotRequested => "尚未获取验证码或验证码已失效",
            OtpCheck::Expired => "验证码已过期，请重新获取",
            OtpCheck::Mismatch => "验证码错误",
        }
    }
}

/// 6 位数字验证码
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..6).map(|_| char::from(b'0' + rng.gen_range(0..10))).collect()
}

/// 保存验证码；同一手机号重复获取时覆盖旧码
pub async fn store_code(db: &SqlitePool, phone: &str, code: &str, now: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO otps (phone, code, issued_at) VALUES (?, ?, ?)
        ON CONFLICT (phone) DO UPDATE SET code = excluded.code, issued_at = excluded.issued_at
        "#,
    )
    .bind(phone)
    .bind(code)
    .bind(now)
    .execute(db)
    .await?;

    Ok(())
}

/// 校验验证码：过期或校验成功时删除记录
pub async fn verify_code(db: &SqlitePool, phone: &str, code: &str, now: i64) -> Result<OtpCheck, sqlx::Error> {
    let entry = sqlx::query_as::<_, Otp>("SELECT * FROM otps WHERE phone = ?")
        .bind(phone)
        .fetch_optional(db)
        .await?;

    let Some(entry) = entry else {
        return Ok(OtpCheck::NotRequested);
    };

    if now - entry.issued_at > OTP_TTL_SECS {
        delete(db, entry.id).await?;
        return Ok(OtpCheck::Expired);
    }

    if entry.code == code {
        delete(db, entry.id).await?;
        Ok(OtpCheck::Verified)
    } else {
        Ok(OtpCheck::Mismatch)
    }
}

async fn delete(db: &SqlitePool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM otps WHERE id = ?").bind(id).execute(db).await?;
    Ok(())
}
