use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::metadata::{ItemId, Metadata};

/// 图片记录
#[derive(Debug, Clone, FromRow)]
pub struct ItemRecord {
    /// 图片绝对路径
    pub path: String,
    /// 向量在索引中的序号，为空表示等待重建
    pub ordinal: Option<i64>,
    pub width: i64,
    pub height: i64,
    pub format: Option<String>,
    pub size_bytes: i64,
    pub captured_at: Option<DateTime<Utc>>,
    /// 图片 blake3 哈希
    pub hash: Option<String>,
    /// JSON 数组
    pub tags: String,
}

impl ItemRecord {
    pub fn new(path: &str, ordinal: Option<usize>, meta: &Metadata) -> Self {
        Self {
            path: path.to_owned(),
            ordinal: ordinal.map(|o| o as i64),
            width: meta.width as i64,
            height: meta.height as i64,
            format: meta.format.clone(),
            size_bytes: meta.size_bytes as i64,
            captured_at: meta.captured_at,
            hash: meta.hash.clone(),
            tags: serde_json::to_string(&meta.tags).unwrap_or_else(|_| "[]".to_owned()),
        }
    }

    pub fn into_item(self) -> (ItemId, Metadata) {
        let tags = serde_json::from_str(&self.tags).unwrap_or_default();
        let meta = Metadata {
            width: self.width as u32,
            height: self.height as u32,
            format: self.format,
            size_bytes: self.size_bytes as u64,
            captured_at: self.captured_at,
            hash: self.hash,
            tags,
        };
        (self.path, meta)
    }
}
