//! 模型登记
//!
//! 索引中的向量只在生成它们的模型下有意义。模型描述文件记录了生成当前索引的模型，
//! 加载时与当前模型比较，不一致时丢弃旧向量，并把所有图片标记为等待重建。

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::ConfDir;
use crate::db::{Database, ItemRecord, crud};
use crate::embedding::{EmbeddingProvider, ModelIdentity};
use crate::error::{Error, Result};
use crate::index::{FlatIndex, Neighbor};
use crate::ingest;
use crate::metadata::{ItemId, Metadata, MetadataStore};

/// 一个模型下的索引和图片列表
///
/// 第 i 个向量对应 items 中第 i 张图片。orphans 是没有向量的图片，来自之前的模型，
/// 等待重建时重新编码。
pub struct Catalog {
    pub provider: Arc<dyn EmbeddingProvider>,
    pub index: FlatIndex,
    pub items: MetadataStore,
    pub orphans: Vec<(ItemId, Metadata)>,
}

impl Catalog {
    pub fn empty(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self::with_orphans(provider, vec![])
    }

    fn with_orphans(provider: Arc<dyn EmbeddingProvider>, orphans: Vec<(ItemId, Metadata)>) -> Self {
        let index = FlatIndex::new(provider.dimension());
        Self { provider, index, items: MetadataStore::new(), orphans }
    }

    pub fn identity(&self) -> &ModelIdentity {
        self.provider.identity()
    }

    pub fn count(&self) -> usize {
        self.index.count()
    }

    /// 追加一张图片，返回其序号
    ///
    /// 如果该图片在等待重建，将其移出等待列表并保留原有标签
    pub fn append(&mut self, id: ItemId, vector: &[f32], mut meta: Metadata) -> Result<usize> {
        if self.items.contains(&id) {
            return Err(Error::validation(format!("图片已存在: {id}")));
        }
        let ordinal = self.index.add(vector)?;
        if let Some(pos) = self.orphans.iter().position(|(orphan, _)| orphan == &id) {
            let (_, old) = self.orphans.swap_remove(pos);
            if meta.tags.is_empty() {
                meta.tags = old.tags;
            }
        }
        let position = self.items.insert(id, meta);
        debug_assert_eq!(ordinal, position);
        Ok(ordinal)
    }

    /// 图片是否在索引中或在等待重建
    pub fn knows(&self, id: &str) -> bool {
        self.items.contains(id) || self.orphans.iter().any(|(orphan, _)| orphan == id)
    }

    /// 所有已知图片，包括等待重建的
    pub fn all_items(&self) -> Vec<(ItemId, Metadata)> {
        self.items
            .iter()
            .map(|(_, id, meta)| (id.clone(), meta.clone()))
            .chain(self.orphans.iter().cloned())
            .collect()
    }

    /// 搜索并附带图片信息
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Neighbor, &ItemId, &Metadata)>> {
        let neighbors = self.index.search(query, k)?;
        Ok(neighbors
            .into_iter()
            .filter_map(|n| self.items.item_at(n.ordinal).map(|(id, meta)| (n, id, meta)))
            .collect())
    }

    fn records(&self) -> impl Iterator<Item = ItemRecord> + '_ {
        let live = self.items.iter().map(|(ordinal, id, meta)| ItemRecord::new(id, Some(ordinal), meta));
        let orphans = self.orphans.iter().map(|(id, meta)| ItemRecord::new(id, None, meta));
        live.chain(orphans)
    }
}

/// 模型描述文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub model: ModelIdentity,
    /// 保存时索引中的向量数量
    pub count: usize,
    pub saved_at: DateTime<Utc>,
}

impl ModelDescriptor {
    /// 读取模型描述文件，文件不存在时返回 None，无法解析时返回 Corrupt
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_reader(BufReader::new(file))
            .map(Some)
            .map_err(|e| Error::Corrupt(format!("模型描述文件 {} 格式错误: {}", path.display(), e)))
    }

    /// 先写入临时文件再重命名
    pub fn write(&self, path: &Path, tmp: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(tmp)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

/// 保存的索引与当前模型不一致
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelMismatch {
    /// 生成已保存索引的模型
    pub persisted: ModelIdentity,
    /// 当前使用的模型
    pub active: ModelIdentity,
    /// 等待重建的图片数量
    pub orphaned: usize,
}

/// 保存的索引无法使用而被丢弃，例如缺少模型描述文件或索引文件损坏
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscardedIndex {
    pub reason: String,
    /// 等待重建的图片数量
    pub orphaned: usize,
}

/// 加载结果
pub struct Loaded {
    pub catalog: Catalog,
    pub mismatch: Option<ModelMismatch>,
    pub discarded: Option<DiscardedIndex>,
}

impl Loaded {
    fn clean(catalog: Catalog) -> Self {
        Self { catalog, mismatch: None, discarded: None }
    }

    /// 丢弃所有向量，图片全部等待重建
    fn discard(provider: Arc<dyn EmbeddingProvider>, orphans: Vec<(ItemId, Metadata)>, reason: String) -> Self {
        if orphans.is_empty() {
            return Self::clean(Catalog::empty(provider));
        }
        warn!("{reason}，{} 张图片等待重建", orphans.len());
        let discarded = DiscardedIndex { reason, orphaned: orphans.len() };
        Self {
            catalog: Catalog::with_orphans(provider, orphans),
            mismatch: None,
            discarded: Some(discarded),
        }
    }
}

/// 加载指定模型下的索引
///
/// 模型不一致时返回空索引并报告不一致；缺少模型描述文件，或者描述文件、索引文件
/// 与数据库不一致时同样返回空索引并报告被丢弃的原因。图片列表都不会丢失。
pub async fn load_catalog(
    conf: &ConfDir,
    db: &Database,
    provider: Arc<dyn EmbeddingProvider>,
) -> Result<Loaded> {
    let descriptor = match ModelDescriptor::read(&conf.model_descriptor()) {
        Ok(Some(descriptor)) => Ok(descriptor),
        Ok(None) => Err("缺少模型描述文件".to_owned()),
        Err(Error::Corrupt(reason)) => Err(reason),
        Err(e) => return Err(e),
    };
    let live: Vec<_> = crud::get_indexed_items(db).await?;
    let mut orphans: Vec<_> =
        crud::get_orphaned_items(db).await?.into_iter().map(ItemRecord::into_item).collect();

    let active = provider.identity().clone();
    let descriptor = match descriptor {
        Ok(descriptor) => descriptor,
        Err(reason) => {
            orphans.extend(live.into_iter().map(ItemRecord::into_item));
            return Ok(Loaded::discard(provider, orphans, reason));
        }
    };

    if descriptor.model != active {
        let mut all: Vec<_> = live.into_iter().map(ItemRecord::into_item).collect();
        all.append(&mut orphans);
        warn!(
            "索引由模型 {} 生成，当前模型为 {}，{} 张图片等待重建",
            descriptor.model,
            active,
            all.len()
        );
        let mismatch = ModelMismatch { persisted: descriptor.model, active, orphaned: all.len() };
        let catalog = Catalog::with_orphans(provider, all);
        return Ok(Loaded { catalog, mismatch: Some(mismatch), discarded: None });
    }

    match read_index(conf, &descriptor, &live) {
        Ok(index) => {
            let mut items = MetadataStore::new();
            for record in live {
                let (id, meta) = record.into_item();
                items.insert(id, meta);
            }
            info!("加载索引完成: {} 条向量，模型 {}", index.count(), active);
            Ok(Loaded::clean(Catalog { provider, index, items, orphans }))
        }
        Err(Error::Corrupt(reason)) => {
            orphans.extend(live.into_iter().map(ItemRecord::into_item));
            Ok(Loaded::discard(provider, orphans, reason))
        }
        Err(e) => Err(e),
    }
}

fn read_index(conf: &ConfDir, descriptor: &ModelDescriptor, live: &[ItemRecord]) -> Result<FlatIndex> {
    let path = conf.index();
    let index = match FlatIndex::load(&path) {
        Ok(index) => index,
        Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound && descriptor.count == 0 => {
            FlatIndex::new(descriptor.model.dimension)
        }
        Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::Corrupt(format!("索引文件 {} 不存在", path.display())));
        }
        Err(e) => return Err(e),
    };

    if index.dimension() != descriptor.model.dimension {
        return Err(Error::Corrupt(format!(
            "索引维数 {} 与模型维数 {} 不一致",
            index.dimension(),
            descriptor.model.dimension
        )));
    }
    if index.count() != live.len() {
        return Err(Error::Corrupt(format!(
            "索引中有 {} 条向量，数据库中有 {} 张图片",
            index.count(),
            live.len()
        )));
    }
    let dense = live.iter().enumerate().all(|(i, r)| r.ordinal == Some(i as i64));
    if !dense {
        return Err(Error::Corrupt("数据库中的序号不连续".to_owned()));
    }
    Ok(index)
}

/// 保存索引、图片列表和模型描述
///
/// 索引先写入临时文件，数据库事务提交后再重命名，最后写入模型描述
pub async fn persist_catalog(conf: &ConfDir, db: &Database, catalog: &Catalog) -> Result<()> {
    fs::create_dir_all(conf.path())?;
    catalog.index.save(conf.index_tmp())?;

    let records: Vec<_> = catalog.records().collect();
    crud::replace_items(db, &records).await?;

    fs::rename(conf.index_tmp(), conf.index())?;
    let descriptor = ModelDescriptor {
        model: catalog.identity().clone(),
        count: catalog.count(),
        saved_at: Utc::now(),
    };
    descriptor.write(&conf.model_descriptor(), &conf.model_descriptor_tmp())?;
    info!("保存索引完成: {} 条向量，{} 张图片等待重建", catalog.count(), catalog.orphans.len());
    Ok(())
}

/// 使用 provider 重新编码所有图片，生成新的索引
///
/// 文件不存在或编码失败的图片会被丢弃。每处理一张图片调用一次 on_progress。
pub fn rebuild_catalog(
    provider: Arc<dyn EmbeddingProvider>,
    items: Vec<(ItemId, Metadata)>,
    mut on_progress: impl FnMut(usize),
) -> Result<Catalog> {
    info!("开始重建索引: {} 张图片，模型 {}", items.len(), provider.identity());
    let mut catalog = Catalog::empty(provider.clone());
    let mut dropped = 0;
    for (i, (id, old)) in items.into_iter().enumerate() {
        match ingest::encode_file(&*provider, Path::new(&id)) {
            Ok(_) if catalog.items.contains(&id) => {}
            Ok((vector, mut meta)) => {
                meta.tags = old.tags;
                catalog.append(id, &vector, meta)?;
            }
            Err(e) => {
                warn!("丢弃图片 {id}: {e}");
                dropped += 1;
            }
        }
        on_progress(i + 1);
    }
    info!("重建索引完成: {} 张图片，丢弃 {} 张", catalog.count(), dropped);
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{PixelLayout, PixelProvider};

    #[test]
    fn descriptor_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        assert_eq!(ModelDescriptor::read(&path).unwrap(), None);

        let descriptor = ModelDescriptor {
            model: ModelIdentity { name: "pixel-rgb-8".into(), revision: 1, dimension: 192 },
            count: 3,
            saved_at: Utc::now(),
        };
        descriptor.write(&path, &dir.path().join("model.json.tmp")).unwrap();
        assert_eq!(ModelDescriptor::read(&path).unwrap(), Some(descriptor));

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(ModelDescriptor::read(&path), Err(Error::Corrupt(_))));
    }

    #[test]
    fn append_rejects_duplicates() {
        let provider = Arc::new(PixelProvider::new("pixel-gray-16", PixelLayout::Gray, 16));
        let mut catalog = Catalog::empty(provider);
        let v = vec![1.0 / 16.0; 256];
        assert_eq!(catalog.append("/a".into(), &v, Metadata::default()).unwrap(), 0);
        assert!(catalog.append("/a".into(), &v, Metadata::default()).is_err());
        assert_eq!(catalog.count(), 1);
    }

    #[test]
    fn rebuild_drops_missing_files() {
        let provider = Arc::new(PixelProvider::new("pixel-gray-16", PixelLayout::Gray, 16));
        let mut calls = 0;
        let catalog = rebuild_catalog(
            provider,
            vec![("/no/such/a.png".into(), Metadata::default())],
            |_| calls += 1,
        )
        .unwrap();
        assert_eq!(catalog.count(), 0);
        assert_eq!(calls, 1);
    }
}
