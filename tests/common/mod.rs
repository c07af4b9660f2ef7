#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbImage};
use photosearch::engine::{Engine, EngineOptions};
use photosearch::{ConfDir, embedding};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const RED: [u8; 3] = [255, 0, 0];
pub const GREEN: [u8; 3] = [0, 255, 0];
pub const BLUE: [u8; 3] = [0, 0, 255];

/// 写入一张纯色 PNG
pub fn solid_png(dir: &Path, name: &str, rgb: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    DynamicImage::ImageRgb8(RgbImage::from_pixel(24, 16, image::Rgb(rgb)))
        .save_with_format(&path, ImageFormat::Png)
        .unwrap();
    path
}

/// 写入一个后缀名正确但无法解码的文件
pub fn garbage(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"definitely not an image").unwrap();
    path
}

pub async fn open_engine(conf: &Path, model: Option<&str>) -> Engine {
    let mut options = EngineOptions::new(ConfDir::new(conf));
    options.model = model.map(str::to_owned);
    Engine::open(options).await.unwrap()
}

pub fn random_unit_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let v: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect();
            embedding::normalize(v).unwrap()
        })
        .collect()
}
