use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

const SCHEMA: [&str; 6] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        title_en TEXT,
        content TEXT NOT NULL,
        content_en TEXT,
        summary_zh TEXT,
        summary_en TEXT,
        created_at DATETIME NOT NULL,
        custom_author TEXT,
        author_id INTEGER NOT NULL REFERENCES users (id),
        category_id INTEGER REFERENCES categories (id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS photos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        title TEXT,
        title_en TEXT,
        description TEXT,
        description_en TEXT,
        created_at DATETIME NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS site_settings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        blog_name TEXT NOT NULL DEFAULT 'Wslll Blog',
        about_content TEXT,
        about_content_en TEXT,
        social_links TEXT NOT NULL DEFAULT '[]',
        logo_filename TEXT,
        deepseek_api_key TEXT,
        notification_content TEXT,
        theme TEXT NOT NULL DEFAULT 'dark'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS otps (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        phone TEXT NOT NULL UNIQUE,
        code TEXT NOT NULL,
        issued_at INTEGER NOT NULL
    )
    "#,
];

/// 连接 SQLite 连接池
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// 内存库只存在于单个连接上，因此连接池固定为一个且永不回收
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
}

/// 建表并写入初始数据 (管理员、站点设置、默认分类)
pub async fn init_db(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    let admin_exists: Option<i64> =
        sqlx::query_scalar("SELECT id FROM users WHERE username = 'admin'")
            .fetch_optional(pool)
            .await?;
    if admin_exists.is_none() {
        create_admin(pool).await?;
        tracing::info!("<<< 已创建默认管理员账号");
    }

    let settings_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM site_settings LIMIT 1")
        .fetch_optional(pool)
        .await?;
    if settings_exists.is_none() {
        sqlx::query("INSERT INTO site_settings (blog_name) VALUES ('Wslll Blog')")
            .execute(pool)
            .await?;
        tracing::info!("<<< 已初始化站点设置");
    }

    let category_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM categories LIMIT 1")
        .fetch_optional(pool)
        .await?;
    if category_exists.is_none() {
        sqlx::query("INSERT INTO categories (name) VALUES ('Tech')")
            .execute(pool)
            .await?;
        tracing::info!("<<< 已初始化默认分类");
    }

    Ok(())
}

/// 创建管理员账号；登录只走短信验证码，密码随机生成且不对外暴露
pub async fn create_admin(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let random_pass: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(random_pass.as_bytes(), &salt)
        .map(|h| h.to_string())
        .unwrap_or_default();

    let id = sqlx::query_scalar(
        "INSERT INTO users (username, password_hash) VALUES ('admin', ?) RETURNING id",
    )
    .bind(password_hash)
    .fetch_one(pool)
    .await?;

    Ok(id)
}
