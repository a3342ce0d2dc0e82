use std::path::{Path, PathBuf};

use uuid::Uuid;

/// 清理用户上传的文件名：去掉路径与非 ASCII 字符，空白转下划线
pub fn secure_filename(name: &str) -> Option<String> {
    let flattened = name.replace(['/', '\\'], " ");
    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_');

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// 照片使用随机文件名避免重名，保留原扩展名
pub fn random_photo_name(original: &str) -> String {
    let ext: String = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    let stem = Uuid::new_v4().simple().to_string();
    if ext.is_empty() {
        stem
    } else {
        format!("{stem}.{ext}")
    }
}

/// 写入 dir/filename，目录不存在时创建
pub async fn save_file(dir: &Path, filename: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(filename);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}
