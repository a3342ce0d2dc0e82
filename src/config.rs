use std::env;
use std::path::PathBuf;

/// 进程级配置，启动时从环境变量 (.env) 读取一次，之后随 AppState 显式传递
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// 站点对外的根地址，用于给 AI 助手拼接文章链接
    pub public_url: String,
    pub secret_key: String,
    pub upload_dir: PathBuf,
    pub deepseek_base_url: String,
    /// 默认 API Key，站点设置中的覆盖值优先
    pub deepseek_api_key: String,
    pub deepseek_model: String,
    pub allowed_phone: String,
    pub sms_template_code: String,
    pub enrich_workers: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: var_or("DATABASE_URL", "sqlite://blog.db?mode=rwc"),
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:15013"),
            public_url: var_or("PUBLIC_URL", "http://127.0.0.1:15013")
                .trim_end_matches('/')
                .to_string(),
            secret_key: var_or("SECRET_KEY", "your_secret_key_here"),
            upload_dir: PathBuf::from(var_or("UPLOAD_DIR", "static/uploads")),
            deepseek_base_url: var_or("DEEPSEEK_BASE_URL", "https://api.deepseek.com")
                .trim_end_matches('/')
                .to_string(),
            deepseek_api_key: var_or("DEEPSEEK_API_KEY", ""),
            deepseek_model: var_or("DEEPSEEK_MODEL", "deepseek-chat"),
            allowed_phone: var_or("ALLOWED_PHONE", ""),
            sms_template_code: var_or("SMS_TEMPLATE_CODE", ""),
            enrich_workers: env::var("ENRICH_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(2),
        }
    }
}

impl Default for Config {
    /// 测试与本地开发使用的默认值，不读取环境变量
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            bind_addr: "127.0.0.1:15013".to_string(),
            public_url: "http://127.0.0.1:15013".to_string(),
            secret_key: "your_secret_key_here".to_string(),
            upload_dir: PathBuf::from("static/uploads"),
            deepseek_base_url: "https://api.deepseek.com".to_string(),
            deepseek_api_key: String::new(),
            deepseek_model: "deepseek-chat".to_string(),
            allowed_phone: String::new(),
            sms_template_code: String::new(),
            enrich_workers: 2,
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
