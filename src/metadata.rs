use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use chrono::{DateTime, Utc};
use image::ImageReader;
use log::debug;
use serde::{Deserialize, Serialize};

/// 图片的唯一标识，即图片文件的绝对路径
pub type ItemId = String;

/// 图片元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub width: u32,
    pub height: u32,
    /// 图片格式，如 "png"
    pub format: Option<String>,
    /// 文件大小
    pub size_bytes: u64,
    /// 拍摄时间，取文件的修改时间
    pub captured_at: Option<DateTime<Utc>>,
    /// 文件内容的 blake3 哈希
    pub hash: Option<String>,
    pub tags: Vec<String>,
}

impl Metadata {
    /// 只有文件大小的元数据，用于无法读取图片头的情况
    pub fn minimal(size_bytes: u64) -> Self {
        Self { size_bytes, ..Default::default() }
    }

    /// 提取图片元数据
    ///
    /// 只读取图片头，任何一项失败都不会报错，而是留空
    pub fn extract(path: &Path, bytes: &[u8]) -> Self {
        let mut meta = Self::minimal(bytes.len() as u64);
        meta.hash = Some(blake3::hash(bytes).to_hex().to_string());
        meta.captured_at = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        match ImageReader::new(Cursor::new(bytes)).with_guessed_format() {
            Ok(reader) => {
                meta.format = reader
                    .format()
                    .and_then(|f| f.extensions_str().first())
                    .map(|ext| ext.to_string());
                match reader.into_dimensions() {
                    Ok((width, height)) => {
                        meta.width = width;
                        meta.height = height;
                    }
                    Err(e) => debug!("无法读取图片尺寸 {}: {}", path.display(), e),
                }
            }
            Err(e) => debug!("无法识别图片格式 {}: {}", path.display(), e),
        }
        meta
    }
}

/// 索引序号到图片的映射
///
/// 第 i 个插入的图片对应索引中的第 i 个向量
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    positions: Vec<ItemId>,
    records: HashMap<ItemId, Metadata>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// 追加一条记录，返回其序号
    ///
    /// 调用方需保证 id 不在表中
    pub fn insert(&mut self, id: ItemId, meta: Metadata) -> usize {
        debug_assert!(!self.records.contains_key(&id));
        self.positions.push(id.clone());
        self.records.insert(id, meta);
        self.positions.len() - 1
    }

    /// 指定序号的图片
    pub fn item_at(&self, ordinal: usize) -> Option<(&ItemId, &Metadata)> {
        let id = self.positions.get(ordinal)?;
        self.records.get(id).map(|meta| (id, meta))
    }

    /// 按序号顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ItemId, &Metadata)> {
        self.positions
            .iter()
            .enumerate()
            .filter_map(|(i, id)| self.records.get(id).map(|meta| (i, id, meta)))
    }
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, ImageFormat, RgbImage};

    use super::*;

    #[test]
    fn insert_assigns_sequential_ordinals() {
        let mut store = MetadataStore::new();
        assert_eq!(store.insert("/a.png".into(), Metadata::minimal(1)), 0);
        assert_eq!(store.insert("/b.png".into(), Metadata::minimal(2)), 1);
        assert!(store.contains("/a.png"));
        assert!(!store.contains("/c.png"));
        assert_eq!(store.item_at(1).map(|(_, m)| m.size_bytes), Some(2));
        assert!(store.item_at(2).is_none());
        let ids: Vec<_> = store.iter().map(|(_, id, _)| id.as_str()).collect();
        assert_eq!(ids, ["/a.png", "/b.png"]);
    }

    #[test]
    fn extract_reads_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.png");
        DynamicImage::ImageRgb8(RgbImage::new(7, 5)).save_with_format(&path, ImageFormat::Png).unwrap();
        let bytes = fs::read(&path).unwrap();

        let meta = Metadata::extract(&path, &bytes);
        assert_eq!((meta.width, meta.height), (7, 5));
        assert_eq!(meta.format.as_deref(), Some("png"));
        assert_eq!(meta.size_bytes, bytes.len() as u64);
        assert!(meta.captured_at.is_some());
        assert_eq!(meta.hash.map(|h| h.len()), Some(64));
    }

    #[test]
    fn extract_degrades_on_garbage() {
        let meta = Metadata::extract(Path::new("/nonexistent/y.png"), b"not an image");
        assert_eq!((meta.width, meta.height), (0, 0));
        assert_eq!(meta.size_bytes, 12);
        assert!(meta.captured_at.is_none());
    }
}
