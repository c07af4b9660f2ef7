//! 扫描目录和编码单张图片
//!
//! 这里的函数都是同步的，异步代码中应放在 `spawn_blocking` 里调用

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::{debug, info};
use regex::Regex;
use walkdir::WalkDir;

use crate::embedding::{Embedding, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::metadata::{ItemId, Metadata};

/// 支持的图片后缀名，不区分大小写
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tiff", "webp"];

static RE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    let re = format!("(?i)^({})$", SUPPORTED_EXTENSIONS.join("|"));
    Regex::new(&re).expect("failed to build regex")
});

/// 后缀名是否在支持列表中
pub fn is_supported(path: &Path) -> bool {
    path.extension().is_some_and(|ext| RE_SUFFIX.is_match(&ext.to_string_lossy()))
}

/// 图片的唯一标识
pub fn item_id(path: &Path) -> Result<ItemId> {
    Ok(std::path::absolute(path)?.to_string_lossy().into_owned())
}

/// 递归扫描目录下所有支持的图片
///
/// 结果按文件名排序，同一目录多次扫描的顺序相同。任何遍历错误都会使整个扫描失败。
pub fn scan_folder(path: &Path) -> Result<Vec<PathBuf>> {
    info!("开始扫描目录: {}", path.display());
    let mut entries = vec![];
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|source| Error::Scan { path: path.to_path_buf(), source })?;
        if entry.file_type().is_file() && is_supported(entry.path()) {
            entries.push(entry.into_path());
        }
    }
    info!("扫描完成，共 {} 张图片", entries.len());
    Ok(entries)
}

/// 读取文件内容，文件不存在时返回 NotFound
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::not_found(path.display().to_string()),
        _ => Error::Io(e),
    })
}

/// 解码图片，解码失败视为编码失败
pub fn decode(path: &Path, bytes: &[u8]) -> Result<image::DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| Error::encoding(format!("无法解码图片 {}: {}", path.display(), e)))
}

/// 读取、解码并编码一张图片，同时提取元数据
pub fn encode_file(provider: &dyn EmbeddingProvider, path: &Path) -> Result<(Embedding, Metadata)> {
    let bytes = read_file(path)?;
    let image = decode(path, &bytes)?;
    let vector = provider.encode_image(&image)?;
    debug!("编码完成: {}", path.display());
    Ok((vector, Metadata::extract(path, &bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_filter_ignores_case() {
        assert!(is_supported(Path::new("a/b.PNG")));
        assert!(is_supported(Path::new("c.Jpeg")));
        assert!(!is_supported(Path::new("d.txt")));
        assert!(!is_supported(Path::new("e.png.bak")));
        assert!(!is_supported(Path::new("png")));
    }

    #[test]
    fn scan_missing_folder_fails() {
        let result = scan_folder(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(Error::Scan { .. })));
    }

    #[test]
    fn scan_is_sorted_and_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        for name in ["b.png", "a.JPG", "sub/c.webp", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let names: Vec<_> = scan_folder(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.JPG", "b.png", "sub/c.webp"]);
    }

    #[test]
    fn missing_file_is_not_found() {
        assert!(matches!(read_file(Path::new("/no/such/file.png")), Err(Error::NotFound(_))));
    }
}
