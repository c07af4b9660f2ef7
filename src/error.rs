use std::path::PathBuf;

use thiserror::Error;

/// photosearch 的错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// 参数缺失或格式错误，在修改任何状态之前拒绝
    #[error("参数错误: {0}")]
    Validation(String),
    /// 任务 ID 不存在或文件不存在
    #[error("未找到: {0}")]
    NotFound(String),
    /// 模型无法处理该输入
    #[error("编码失败: {0}")]
    Encoding(String),
    /// 扫描目录失败，对整个操作是致命的
    #[error("扫描目录失败 {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("不支持的模型: {0}")]
    UnsupportedModel(String),
    #[error("模型加载失败 {model}: {reason}")]
    ModelLoad { model: String, reason: String },
    #[error("向量维度不匹配: 期望 {expected}，实际 {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// 持久化文件之间不一致或格式错误
    #[error("索引数据损坏: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("后台任务异常退出: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
