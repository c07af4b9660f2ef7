use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Mutex;

use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};
use image::{DynamicImage, ImageFormat};
use log::debug;

use super::{Embedding, EmbeddingProvider, ModelIdentity, normalize};
use crate::error::{Error, Result};

const DIMENSION: usize = 512;

/// 基于 fastembed 的 CLIP ViT-B/32
///
/// fastembed 的模型推理需要可变引用，因此两个编码器都放在 Mutex 中
pub struct ClipProvider {
    identity: ModelIdentity,
    text: Mutex<TextEmbedding>,
    vision: Mutex<ImageEmbedding>,
}

impl ClipProvider {
    /// 加载模型，模型文件不存在时会先下载到 cache_dir
    pub fn new(name: &str, cache_dir: Option<PathBuf>) -> Result<Self> {
        let mut text_opts = InitOptions::new(EmbeddingModel::ClipVitB32);
        let mut vision_opts = ImageInitOptions::new(ImageEmbeddingModel::ClipVitB32);
        if let Some(dir) = cache_dir {
            text_opts = text_opts.with_cache_dir(dir.clone());
            vision_opts = vision_opts.with_cache_dir(dir);
        }
        let text = TextEmbedding::try_new(text_opts).map_err(|e| load_err(name, e))?;
        let vision = ImageEmbedding::try_new(vision_opts).map_err(|e| load_err(name, e))?;
        debug!("CLIP 模型加载完成");

        Ok(Self {
            identity: ModelIdentity { name: name.to_owned(), revision: 1, dimension: DIMENSION },
            text: Mutex::new(text),
            vision: Mutex::new(vision),
        })
    }
}

fn load_err(model: &str, err: impl std::fmt::Display) -> Error {
    Error::ModelLoad { model: model.to_owned(), reason: err.to_string() }
}

fn first(mut batch: Vec<Embedding>) -> Result<Embedding> {
    let vector = batch.pop().ok_or_else(|| Error::encoding("模型没有返回向量"))?;
    normalize(vector)
}

impl EmbeddingProvider for ClipProvider {
    fn identity(&self) -> &ModelIdentity {
        &self.identity
    }

    fn encode_text(&self, text: &str) -> Result<Embedding> {
        let mut model = self.text.lock().map_err(|e| Error::encoding(e.to_string()))?;
        let batch = model.embed(vec![text], None).map_err(|e| Error::encoding(e.to_string()))?;
        first(batch)
    }

    fn encode_image(&self, image: &DynamicImage) -> Result<Embedding> {
        let mut bytes = Cursor::new(vec![]);
        DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut bytes, ImageFormat::Png)?;
        let bytes = bytes.into_inner();

        let mut model = self.vision.lock().map_err(|e| Error::encoding(e.to_string()))?;
        let batch = model
            .embed_bytes(&[bytes.as_slice()], None)
            .map_err(|e| Error::encoding(e.to_string()))?;
        first(batch)
    }
}
