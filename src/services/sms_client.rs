use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const SMS_PUSH_URL: &str = "https://push.spug.cc/sms";

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("未配置短信模板")]
    NotConfigured,

    #[error("网络错误: {0}")]
    Network(String),

    #[error("短信接口返回 {0}")]
    Status(u16),
}

/// Spug 短信推送
pub struct SmsClient {
    http: reqwest::Client,
    template_code: String,
}

impl SmsClient {
    pub fn new(template_code: impl Into<String>) -> Result<Self, SmsError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| SmsError::Network(e.to_string()))?;

        Ok(Self { http, template_code: template_code.into() })
    }

    pub async fn send_code(&self, phone: &str, code: &str) -> Result<(), SmsError> {
        if self.template_code.is_empty() {
            return Err(SmsError::NotConfigured);
        }

        let response = self
            .http
            .post(format!("{}/{}", SMS_PUSH_URL, self.template_code))
            .json(&json!({ "code": code, "to": phone }))
            .send()
            .await
            .map_err(|e| SmsError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SmsError::Status(status.as_u16()))
        }
    }
}
