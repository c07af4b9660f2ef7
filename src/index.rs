use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use rayon::prelude::*;

use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"PSIX";
const VERSION: u32 = 1;
/// 魔数 4 字节，版本 4 字节，维数和数量各 8 字节
const HEADER_LEN: u64 = 24;

/// 向量数量超过该值时并行计算内积
const PARALLEL_THRESHOLD: usize = 4096;

/// 搜索结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// 向量在索引中的序号
    pub ordinal: usize,
    /// 与查询向量的内积，对单位向量来说即余弦相似度
    pub score: f32,
}

/// 只追加的扁平内积索引
///
/// 所有向量按追加顺序连续存放，序号即为其位置。索引不支持原地更新和删除，
/// 需要删除时只能整体重建。
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// 创建一个空索引
    pub fn new(dimension: usize) -> Self {
        Self { dimension, data: vec![] }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 索引中的向量数量
    pub fn count(&self) -> usize {
        if self.dimension == 0 { 0 } else { self.data.len() / self.dimension }
    }

    /// 添加一个向量，返回其序号
    pub fn add(&mut self, vector: &[f32]) -> Result<usize> {
        self.check_dimension(vector)?;
        let ordinal = self.count();
        self.data.extend_from_slice(vector);
        Ok(ordinal)
    }

    /// 获取指定序号的向量
    pub fn get(&self, ordinal: usize) -> Option<&[f32]> {
        self.data.chunks_exact(self.dimension.max(1)).nth(ordinal)
    }

    /// 搜索与 query 内积最大的 k 个向量
    ///
    /// 结果按分数从高到低排列，分数相同时序号小的在前，长度为 min(k, count)
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimension(query)?;
        let n = self.count();
        if k == 0 || n == 0 {
            return Ok(vec![]);
        }

        let scores: Vec<f32> = if n >= PARALLEL_THRESHOLD {
            self.data.par_chunks_exact(self.dimension).map(|v| inner_product(query, v)).collect()
        } else {
            self.data.chunks_exact(self.dimension).map(|v| inner_product(query, v)).collect()
        };

        let cmp = |a: &usize, b: &usize| scores[*b].total_cmp(&scores[*a]).then(a.cmp(b));
        let mut order: Vec<usize> = (0..n).collect();
        if k < n {
            order.select_nth_unstable_by(k - 1, cmp);
            order.truncate(k);
        }
        order.sort_unstable_by(cmp);

        Ok(order.into_iter().map(|ordinal| Neighbor { ordinal, score: scores[ordinal] }).collect())
    }

    /// 将索引写入文件
    ///
    /// 格式（小端序）：魔数、版本、维数、数量、原始向量数据
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(VERSION)?;
        writer.write_u64::<LittleEndian>(self.dimension as u64)?;
        writer.write_u64::<LittleEndian>(self.count() as u64)?;
        for &v in &self.data {
            writer.write_f32::<LittleEndian>(v)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        debug!("写入索引 {}: {} 条向量", path.display(), self.count());
        Ok(())
    }

    /// 从文件读取索引
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(|e| corrupt(path, e))?;
        if &magic != MAGIC {
            return Err(Error::Corrupt(format!("{} 不是索引文件", path.display())));
        }
        let version = reader.read_u32::<LittleEndian>().map_err(|e| corrupt(path, e))?;
        if version != VERSION {
            return Err(Error::Corrupt(format!("{} 的版本 {} 不受支持", path.display(), version)));
        }
        let dimension = reader.read_u64::<LittleEndian>().map_err(|e| corrupt(path, e))? as usize;
        let count = reader.read_u64::<LittleEndian>().map_err(|e| corrupt(path, e))? as usize;
        if dimension == 0 && count != 0 {
            return Err(Error::Corrupt(format!("{} 的维数为 0", path.display())));
        }

        let expected = (dimension as u64)
            .checked_mul(count as u64)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(HEADER_LEN));
        if expected != Some(file_len) {
            return Err(Error::Corrupt(format!("{} 的长度与头部不符", path.display())));
        }

        let mut data = vec![0f32; dimension * count];
        reader.read_f32_into::<LittleEndian>(&mut data).map_err(|e| corrupt(path, e))?;

        debug!("读取索引 {}: {} 条向量，维数 {}", path.display(), count, dimension);
        Ok(Self { dimension, data })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch { expected: self.dimension, actual: vector.len() });
        }
        Ok(())
    }
}

/// 两个向量的内积
#[inline]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn corrupt(path: &Path, err: std::io::Error) -> Error {
    match err.kind() {
        ErrorKind::UnexpectedEof => Error::Corrupt(format!("{} 被截断", path.display())),
        _ => Error::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_stored_vector() {
        let mut index = FlatIndex::new(2);
        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();
        assert_eq!(index.get(1), Some(&[0.0, 1.0][..]));
        assert_eq!(index.get(2), None);
    }

    #[test]
    fn ties_are_ordered_by_ordinal() {
        let mut index = FlatIndex::new(2);
        for _ in 0..5 {
            index.add(&[1.0, 0.0]).unwrap();
        }
        let result = index.search(&[1.0, 0.0], 3).unwrap();
        let ordinals: Vec<_> = result.iter().map(|n| n.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn zero_k_returns_nothing() {
        let mut index = FlatIndex::new(2);
        index.add(&[1.0, 0.0]).unwrap();
        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }
}
