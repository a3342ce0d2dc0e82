use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::models::site_setting::SiteSetting;

/// 站点设置缓存：启动时加载，设置保存或后台翻译完成后显式 reload
#[derive(Clone)]
pub struct SettingsStore {
    db: SqlitePool,
    current: Arc<RwLock<SiteSetting>>,
}

impl SettingsStore {
    pub async fn load(db: SqlitePool) -> Result<Self, sqlx::Error> {
        let settings = fetch_or_create(&db).await?;
        Ok(Self {
            db,
            current: Arc::new(RwLock::new(settings)),
        })
    }

    /// 当前设置的快照
    pub async fn current(&self) -> SiteSetting {
        self.current.read().await.clone()
    }

    pub async fn reload(&self) -> Result<SiteSetting, sqlx::Error> {
        let fresh = fetch_or_create(&self.db).await?;
        *self.current.write().await = fresh.clone();
        tracing::debug!("站点设置已重新加载");
        Ok(fresh)
    }
}

/// 读取唯一的设置行，不存在时创建默认行
pub async fn fetch_or_create(db: &SqlitePool) -> Result<SiteSetting, sqlx::Error> {
    let existing = sqlx::query_as::<_, SiteSetting>("SELECT * FROM site_settings ORDER BY id LIMIT 1")
        .fetch_optional(db)
        .await?;

    match existing {
        Some(settings) => Ok(settings),
        None => {
            tracing::info!("--- 站点设置不存在，创建默认设置");
            sqlx::query_as::<_, SiteSetting>(
                "INSERT INTO site_settings (blog_name) VALUES ('Wslll Blog') RETURNING *",
            )
            .fetch_one(db)
            .await
        }
    }
}
