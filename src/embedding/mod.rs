//! 嵌入模型
//!
//! 所有模型都实现 [`EmbeddingProvider`]，由 [`ProviderFactory`] 根据模型名称创建。
//! 文本和图片被编码到同一个向量空间，向量在返回前已经归一化。

#[cfg(feature = "clip")]
mod clip;
mod pixel;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "clip")]
pub use self::clip::ClipProvider;
pub use self::pixel::{PixelLayout, PixelProvider};
use crate::error::{Error, Result};

/// 嵌入向量，长度由模型决定
pub type Embedding = Vec<f32>;

/// 未启用 clip 特性时使用内置的像素模型
#[cfg(feature = "clip")]
pub const DEFAULT_MODEL: &str = "clip-vit-base-patch32";
#[cfg(not(feature = "clip"))]
pub const DEFAULT_MODEL: &str = "pixel-rgb-8";

/// 生成向量空间的模型标识
///
/// 只有三个字段完全相同的两个模型才被视为同一个向量空间
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelIdentity {
    /// 模型名称
    pub name: String,
    /// 模型实现的版本，实现发生不兼容的变化时递增
    pub revision: u32,
    /// 向量维数
    pub dimension: usize,
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({}d)", self.name, self.revision, self.dimension)
    }
}

/// 嵌入模型
///
/// 编码是 CPU 密集的同步操作，异步代码中应放到 `spawn_blocking` 里调用
pub trait EmbeddingProvider: Send + Sync {
    /// 当前模型的标识
    fn identity(&self) -> &ModelIdentity;

    /// 将文本编码为单位向量
    fn encode_text(&self, text: &str) -> Result<Embedding>;

    /// 将解码后的图片编码为单位向量
    fn encode_image(&self, image: &DynamicImage) -> Result<Embedding>;

    fn dimension(&self) -> usize {
        self.identity().dimension
    }
}

/// 根据模型名称创建 [`EmbeddingProvider`]
pub trait ProviderFactory: Send + Sync {
    /// 创建失败时不会产生任何副作用
    fn create(&self, name: &str) -> Result<Arc<dyn EmbeddingProvider>>;
}

#[derive(Debug, Clone, Copy)]
enum Backend {
    Pixel(PixelLayout, u32),
    Clip,
    /// 已知但当前没有实现的模型
    Unavailable,
}

/// 模型目录中的一项
#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub name: &'static str,
    pub display_name: &'static str,
    backend: Backend,
}

impl ModelSpec {
    /// 当前构建能否加载该模型
    pub fn available(&self) -> bool {
        match self.backend {
            Backend::Pixel(..) => true,
            Backend::Clip => cfg!(feature = "clip"),
            Backend::Unavailable => false,
        }
    }
}

static MODELS: &[ModelSpec] = &[
    ModelSpec {
        name: "clip-vit-base-patch32",
        display_name: "CLIP ViT-B/32",
        backend: Backend::Clip,
    },
    ModelSpec {
        name: "clip-vit-large-patch14",
        display_name: "CLIP ViT-L/14",
        backend: Backend::Unavailable,
    },
    ModelSpec {
        name: "chinese-clip-vit-base-patch16",
        display_name: "Chinese CLIP ViT-B/16",
        backend: Backend::Unavailable,
    },
    ModelSpec {
        name: "multilingual-clip-vit-base-patch32",
        display_name: "Multilingual CLIP ViT-B/32",
        backend: Backend::Unavailable,
    },
    ModelSpec { name: "blip-base", display_name: "BLIP Base", backend: Backend::Unavailable },
    ModelSpec {
        name: "pixel-rgb-8",
        display_name: "Pixel RGB 8x8",
        backend: Backend::Pixel(PixelLayout::Rgb, 8),
    },
    ModelSpec {
        name: "pixel-gray-16",
        display_name: "Pixel Gray 16x16",
        backend: Backend::Pixel(PixelLayout::Gray, 16),
    },
];

/// 所有已知模型
pub fn catalog() -> &'static [ModelSpec] {
    MODELS
}

/// 查找模型
pub fn lookup(name: &str) -> Option<&'static ModelSpec> {
    MODELS.iter().find(|spec| spec.name == name)
}

/// 模型的显示名称，未知模型返回其本身
pub fn display_name(name: &str) -> &str {
    lookup(name).map(|spec| spec.display_name).unwrap_or(name)
}

/// 内置的模型工厂
#[derive(Debug, Clone, Default)]
pub struct BuiltinModels {
    /// 需要下载的模型文件的缓存目录
    pub cache_dir: Option<PathBuf>,
}

impl BuiltinModels {
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self { cache_dir }
    }
}

impl ProviderFactory for BuiltinModels {
    fn create(&self, name: &str) -> Result<Arc<dyn EmbeddingProvider>> {
        let spec = lookup(name).ok_or_else(|| Error::UnsupportedModel(name.to_owned()))?;
        info!("加载模型: {} ({})", spec.name, spec.display_name);
        match spec.backend {
            Backend::Pixel(layout, size) => Ok(Arc::new(PixelProvider::new(spec.name, layout, size))),
            #[cfg(feature = "clip")]
            Backend::Clip => Ok(Arc::new(ClipProvider::new(spec.name, self.cache_dir.clone())?)),
            #[cfg(not(feature = "clip"))]
            Backend::Clip => Err(Error::ModelLoad {
                model: name.to_owned(),
                reason: "当前构建未启用 clip 特性".to_owned(),
            }),
            Backend::Unavailable => Err(Error::ModelLoad {
                model: name.to_owned(),
                reason: "该模型暂未支持".to_owned(),
            }),
        }
    }
}

/// 将向量原地归一化为单位向量，零向量无法归一化
pub fn normalize(mut vector: Embedding) -> Result<Embedding> {
    let norm = l2_norm(&vector);
    if !norm.is_finite() || norm <= f32::EPSILON {
        return Err(Error::encoding("无法归一化零向量"));
    }
    vector.iter_mut().for_each(|v| *v /= norm);
    Ok(vector)
}

pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// 全零向量，与任何向量的内积都为 0
pub fn zero_vector(dimension: usize) -> Embedding {
    vec![0.0; dimension]
}

/// 编码图片，失败时返回零向量
///
/// 只用于单张图片的请求；批量处理时失败的图片应直接跳过
pub fn encode_image_or_zero(provider: &dyn EmbeddingProvider, image: &DynamicImage) -> Embedding {
    provider.encode_image(image).unwrap_or_else(|e| {
        warn!("图片编码失败，使用零向量代替: {e}");
        zero_vector(provider.dimension())
    })
}
