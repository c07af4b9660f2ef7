use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};

use super::{Embedding, EmbeddingProvider, ModelIdentity, normalize};
use crate::error::{Error, Result};

/// 颜色词表，中文词按字符匹配
const COLORS: &[(&[&str], [u8; 3])] = &[
    (&["red", "红"], [255, 0, 0]),
    (&["green", "绿"], [0, 255, 0]),
    (&["blue", "蓝"], [0, 0, 255]),
    (&["yellow", "黄"], [255, 255, 0]),
    (&["orange", "橙"], [255, 165, 0]),
    (&["purple", "violet", "紫"], [128, 0, 128]),
    (&["pink", "粉"], [255, 192, 203]),
    (&["cyan", "青"], [0, 255, 255]),
    (&["brown", "棕"], [139, 69, 19]),
    (&["black", "dark", "黑"], [0, 0, 0]),
    (&["white", "bright", "白"], [255, 255, 255]),
    (&["gray", "grey", "灰"], [128, 128, 128]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// 每个像素三个分量
    Rgb,
    /// 每个像素一个亮度分量
    Gray,
}

/// 像素模型
///
/// 将图片缩放到 size x size 后直接把像素值作为向量，适合查找相似或重复的图片。
/// 像素值被映射到 [-1, 1]，因此纯黑图片也能得到非零向量。文本只理解颜色词，
/// 编码结果与同色纯色图片相同。
pub struct PixelProvider {
    identity: ModelIdentity,
    layout: PixelLayout,
    size: u32,
}

impl PixelProvider {
    pub fn new(name: &str, layout: PixelLayout, size: u32) -> Self {
        let channels = match layout {
            PixelLayout::Rgb => 3,
            PixelLayout::Gray => 1,
        };
        let dimension = (size * size) as usize * channels;
        Self { identity: ModelIdentity { name: name.to_owned(), revision: 1, dimension }, layout, size }
    }

    fn color_of(text: &str) -> Option<[u8; 3]> {
        let text = text.to_lowercase();
        let words: Vec<&str> = text.split(|c: char| !c.is_alphanumeric()).collect();
        let matched: Vec<[u8; 3]> = COLORS
            .iter()
            .filter(|(names, _)| {
                names.iter().any(|name| match name.is_ascii() {
                    true => words.contains(name),
                    false => text.contains(name),
                })
            })
            .map(|(_, rgb)| *rgb)
            .collect();
        if matched.is_empty() {
            return None;
        }
        let mut mixed = [0u8; 3];
        for (i, channel) in mixed.iter_mut().enumerate() {
            let sum: u32 = matched.iter().map(|rgb| rgb[i] as u32).sum();
            *channel = (sum / matched.len() as u32) as u8;
        }
        Some(mixed)
    }
}

impl EmbeddingProvider for PixelProvider {
    fn identity(&self) -> &ModelIdentity {
        &self.identity
    }

    fn encode_text(&self, text: &str) -> Result<Embedding> {
        let rgb = Self::color_of(text)
            .ok_or_else(|| Error::encoding(format!("像素模型无法理解文本: {text}")))?;
        let image = RgbImage::from_pixel(self.size, self.size, Rgb(rgb));
        self.encode_image(&DynamicImage::ImageRgb8(image))
    }

    fn encode_image(&self, image: &DynamicImage) -> Result<Embedding> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::encoding("图片尺寸为 0"));
        }
        let resized = image.resize_exact(self.size, self.size, FilterType::Triangle);
        let raw = match self.layout {
            PixelLayout::Rgb => resized.to_rgb8().into_raw(),
            PixelLayout::Gray => resized.to_luma8().into_raw(),
        };
        let vector = raw.into_iter().map(|v| (v as f32 / 255.0 - 0.5) * 2.0).collect();
        normalize(vector)
    }
}
