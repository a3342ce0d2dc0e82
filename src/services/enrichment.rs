//! 后台 AI 加工：翻译标题/正文、生成中英文摘要
//!
//! Handler 落库后向 [`EnrichmentQueue`] 提交任务即返回，由固定数量的 worker
//! 重新读取数据行、逐字段调用模型，最后用一条 UPDATE 写回。
//! 每个字段只在当前为空时才生成。写回时再次校验字段仍为空且原文未变，
//! 已有内容永不覆盖，基于旧原文的结果直接丢弃。

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::{mpsc, Mutex};

use crate::models::photo::Photo;
use crate::models::post::Post;
use crate::services::ai_service::{AiOutcome, AiService};
use crate::services::renderer::Lang;
use crate::services::settings_store::{fetch_or_create, SettingsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichJob {
    Post(i64),
    Photo(i64),
    About,
}

/// 单次加工的结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichReport {
    /// 已写回的字段
    pub filled: Vec<&'static str>,
    /// 调用失败、留待下次保存时重试的字段
    pub degraded: Vec<&'static str>,
}

impl EnrichReport {
    fn take(&mut self, field: &'static str, outcome: AiOutcome) -> Option<String> {
        if outcome.is_degraded() {
            self.degraded.push(field);
        }
        let value = outcome.generated();
        if value.is_some() {
            self.filled.push(field);
        }
        value
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

pub struct Enricher {
    db: SqlitePool,
    ai: Arc<AiService>,
    settings: SettingsStore,
}

impl Enricher {
    pub fn new(db: SqlitePool, ai: Arc<AiService>, settings: SettingsStore) -> Self {
        Self { db, ai, settings }
    }

    /// 执行一个任务，错误只记录日志
    pub async fn run(&self, job: EnrichJob) {
        let result = match job {
            EnrichJob::Post(id) => self.enrich_post(id).await,
            EnrichJob::Photo(id) => self.enrich_photo(id).await,
            EnrichJob::About => self.enrich_about().await,
        };

        match result {
            Ok(Some(report)) => tracing::info!(
                "<<< AI 加工完成: {:?}, 写入 {:?}, 失败 {:?}",
                job,
                report.filled,
                report.degraded
            ),
            Ok(None) => tracing::debug!("--- AI 加工跳过: {:?} 已不存在", job),
            Err(e) => tracing::error!("!!! AI 加工异常: {:?}, Error: {}", job, e),
        }
    }

    /// 加工文章。返回 None 表示数据行在开始前或写回前已被删除
    pub async fn enrich_post(&self, id: i64) -> Result<Option<EnrichReport>, sqlx::Error> {
        let Some(post) = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
        else {
            return Ok(None);
        };

        tracing::info!(">>> 开始 AI 加工文章 {}", id);
        let mut report = EnrichReport::default();

        let mut title_en = None;
        if is_blank(post.title_en.as_deref()) {
            title_en = report.take("title_en", self.ai.translate(&post.title).await);
        }
        let mut content_en = None;
        if is_blank(post.content_en.as_deref()) {
            content_en = report.take("content_en", self.ai.translate(&post.content).await);
        }
        let mut summary_zh = None;
        if is_blank(post.summary_zh.as_deref()) {
            summary_zh = report.take("summary_zh", self.ai.summarize(&post.content, Lang::Zh).await);
        }
        let mut summary_en = None;
        if is_blank(post.summary_en.as_deref()) {
            summary_en = report.take("summary_en", self.ai.summarize(&post.content, Lang::En).await);
        }

        // 只在字段仍为空且原文未被修改时写入，原文已变的结果交给新任务重新生成
        let result = sqlx::query(
            r#"
            UPDATE posts SET
                title_en = CASE WHEN TRIM(COALESCE(title_en, '')) = '' AND title = ? THEN ? ELSE title_en END,
                content_en = CASE WHEN TRIM(COALESCE(content_en, '')) = '' AND content = ? THEN ? ELSE content_en END,
                summary_zh = CASE WHEN TRIM(COALESCE(summary_zh, '')) = '' AND content = ? THEN ? ELSE summary_zh END,
                summary_en = CASE WHEN TRIM(COALESCE(summary_en, '')) = '' AND content = ? THEN ? ELSE summary_en END
            WHERE id = ?
            "#,
        )
        .bind(&post.title)
        .bind(title_en)
        .bind(&post.content)
        .bind(content_en)
        .bind(&post.content)
        .bind(summary_zh)
        .bind(&post.content)
        .bind(summary_en)
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(report))
    }

    /// 加工照片：只翻译已填写的标题和描述
    pub async fn enrich_photo(&self, id: i64) -> Result<Option<EnrichReport>, sqlx::Error> {
        let Some(photo) = sqlx::query_as::<_, Photo>("SELECT * FROM photos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
        else {
            return Ok(None);
        };

        tracing::info!(">>> 开始 AI 加工照片 {}", id);
        let mut report = EnrichReport::default();

        let mut title_en = None;
        if let Some(title) = photo.title.as_deref().filter(|t| !t.trim().is_empty()) {
            if is_blank(photo.title_en.as_deref()) {
                title_en = report.take("title_en", self.ai.translate(title).await);
            }
        }
        let mut description_en = None;
        if let Some(desc) = photo.description.as_deref().filter(|d| !d.trim().is_empty()) {
            if is_blank(photo.description_en.as_deref()) {
                description_en = report.take("description_en", self.ai.translate(desc).await);
            }
        }

        let result = sqlx::query(
            r#"
            UPDATE photos SET
                title_en = CASE WHEN TRIM(COALESCE(title_en, '')) = '' AND title IS ? THEN ? ELSE title_en END,
                description_en = CASE
                    WHEN TRIM(COALESCE(description_en, '')) = '' AND description IS ? THEN ? ELSE description_en
                END
            WHERE id = ?
            "#,
        )
        .bind(&photo.title)
        .bind(title_en)
        .bind(&photo.description)
        .bind(description_en)
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(report))
    }

    /// 翻译"关于"页面，完成后刷新设置缓存
    pub async fn enrich_about(&self) -> Result<Option<EnrichReport>, sqlx::Error> {
        let settings = fetch_or_create(&self.db).await?;
        let mut report = EnrichReport::default();

        let about = settings.about_content.as_deref().unwrap_or("");
        if about.trim().is_empty() || !is_blank(settings.about_content_en.as_deref()) {
            return Ok(Some(report));
        }

        tracing::info!(">>> 开始 AI 翻译关于页面");
        let Some(about_en) = report.take("about_content_en", self.ai.translate(about).await) else {
            return Ok(Some(report));
        };

        let result = sqlx::query(
            r#"
            UPDATE site_settings
            SET about_content_en = CASE
                WHEN TRIM(COALESCE(about_content_en, '')) = '' AND about_content = ? THEN ? ELSE about_content_en
            END
            WHERE id = ?
            "#,
        )
        .bind(about)
        .bind(about_en)
        .bind(settings.id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.settings.reload().await?;
        Ok(Some(report))
    }
}

/// 后台加工任务队列：handler 提交后立即返回
#[derive(Clone)]
pub struct EnrichmentQueue {
    tx: mpsc::UnboundedSender<EnrichJob>,
}

impl EnrichmentQueue {
    /// 启动 workers 个后台 worker，共享同一个任务通道
    pub fn start(enricher: Arc<Enricher>, workers: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));

        for n in 0..workers.max(1) {
            tokio::spawn(worker_loop(n, rx.clone(), enricher.clone()));
        }

        Self { tx }
    }

    pub fn submit(&self, job: EnrichJob) {
        match self.tx.send(job) {
            Ok(()) => tracing::debug!("AI 加工任务已入队: {:?}", job),
            Err(e) => tracing::error!("!!! AI 加工任务入队失败: {:?}", e.0),
        }
    }
}

async fn worker_loop(
    n: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<EnrichJob>>>,
    enricher: Arc<Enricher>,
) {
    loop {
        let job = rx.lock().await.recv().await;
        let Some(job) = job else {
            tracing::debug!("AI 加工 worker {} 退出", n);
            break;
        };
        enricher.run(job).await;
    }
}
