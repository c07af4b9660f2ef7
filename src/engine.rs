//! 搜索引擎
//!
//! [`Engine`] 持有当前模型下的索引和图片列表。所有修改都要先获得写锁 `writer`，
//! 同一时间只有一个写者；搜索只获取 `catalog` 的读锁，不会看到修改了一半的索引。
//! 添加目录、重新索引和重建索引都在后台任务中进行，调用方通过任务 ID 查询进度。

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::spawn_blocking;

use crate::config::ConfDir;
use crate::db::{self, Database};
use crate::embedding::{
    self, BuiltinModels, DEFAULT_MODEL, Embedding, EmbeddingProvider, ProviderFactory,
    encode_image_or_zero, zero_vector,
};
use crate::error::{Error, Result};
use crate::index::inner_product;
use crate::ingest;
use crate::metadata::{ItemId, Metadata};
use crate::registry::{self, Catalog, DiscardedIndex, ModelDescriptor, ModelMismatch};
use crate::task::{Task, TaskContext, TaskHandle, TaskId, TaskKind, TaskTracker};

/// 图片描述的候选词
const DESCRIPTIONS: &[&str] = &[
    "一个人", "多个人", "风景", "建筑", "动物", "食物", "车辆", "花朵", "树木", "天空",
    "海洋", "山脉", "城市", "房屋", "道路", "桥梁", "公园", "森林", "沙滩", "雪景",
    "日落", "日出", "夜景", "室内", "户外", "儿童", "成人", "老人", "宠物", "鸟类",
    "猫", "狗", "汽车", "自行车", "飞机", "船只", "火车", "蛋糕", "水果", "蔬菜",
    "咖啡", "茶", "书籍", "电脑", "手机", "音乐", "运动", "游戏", "艺术", "雕塑",
    "红色", "绿色", "蓝色", "黄色", "黑色", "白色", "灰色",
];
const DESCRIPTION_THRESHOLD: f32 = 0.2;
const MAX_DESCRIPTIONS: usize = 10;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub conf_dir: ConfDir,
    /// 使用的模型，为空时沿用上次保存时的模型
    pub model: Option<String>,
}

impl EngineOptions {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self { conf_dir, model: None }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// 查询图片的来源
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub ordinal: usize,
    pub path: ItemId,
    /// 余弦相似度
    pub score: f32,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added(usize),
    /// 图片已在索引中
    Exists,
}

#[derive(Debug, Clone, Serialize)]
pub struct Features {
    pub path: PathBuf,
    pub model: String,
    pub vector: Embedding,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub display_name: String,
    pub revision: u32,
    pub dimension: usize,
    pub index_count: usize,
    /// 正在切换到的模型
    pub pending: Option<String>,
    pub mismatch: Option<ModelMismatch>,
    pub discarded: Option<DiscardedIndex>,
    /// 等待重建的图片数量
    pub orphaned: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorSummary {
    pub model: String,
    pub dimension: usize,
    pub norm: f32,
    /// 前 10 个分量
    pub head: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Description {
    pub text: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub path: PathBuf,
    pub metadata: Metadata,
    pub vector: VectorSummary,
    pub descriptions: Vec<Description>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub path: ItemId,
    pub title: String,
    pub captured_at: Option<DateTime<Utc>>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderCheck {
    pub valid: bool,
    pub image_count: usize,
    pub message: String,
    pub warning: Option<String>,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    conf: ConfDir,
    db: Database,
    factory: Arc<dyn ProviderFactory>,
    catalog: RwLock<Catalog>,
    /// 修改索引前必须持有
    writer: Mutex<()>,
    pending: StdMutex<Option<String>>,
    mismatch: StdRwLock<Option<ModelMismatch>>,
    discarded: StdRwLock<Option<DiscardedIndex>>,
    tasks: TaskTracker,
}

impl Engine {
    /// 使用内置模型打开引擎
    pub async fn open(opts: EngineOptions) -> Result<Self> {
        let factory = Arc::new(BuiltinModels::new(Some(opts.conf_dir.model_cache())));
        Self::open_with_factory(opts, factory).await
    }

    pub async fn open_with_factory(
        opts: EngineOptions,
        factory: Arc<dyn ProviderFactory>,
    ) -> Result<Self> {
        let conf = opts.conf_dir;
        fs::create_dir_all(conf.path())?;
        let db = db::init_db(conf.database()).await?;

        let name = match opts.model {
            Some(name) => name,
            None => match ModelDescriptor::read(&conf.model_descriptor()) {
                Ok(Some(descriptor)) => descriptor.model.name,
                Ok(None) | Err(Error::Corrupt(_)) => DEFAULT_MODEL.to_owned(),
                Err(e) => return Err(e),
            },
        };
        let provider = create_provider(factory.clone(), &name).await?;
        let loaded = registry::load_catalog(&conf, &db, provider).await?;
        info!("当前模型: {}，索引中有 {} 张图片", loaded.catalog.identity(), loaded.catalog.count());

        Ok(Self {
            inner: Arc::new(Inner {
                conf,
                db,
                factory,
                catalog: RwLock::new(loaded.catalog),
                writer: Mutex::new(()),
                pending: StdMutex::new(None),
                mismatch: StdRwLock::new(loaded.mismatch),
                discarded: StdRwLock::new(loaded.discarded),
                tasks: TaskTracker::new(),
            }),
        })
    }

    pub fn conf_dir(&self) -> &ConfDir {
        &self.inner.conf
    }

    /// 索引中的图片数量
    pub async fn count(&self) -> usize {
        self.inner.catalog.read().await.count()
    }

    pub fn mismatch(&self) -> Option<ModelMismatch> {
        self.inner.mismatch.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 加载时被丢弃的索引
    pub fn discarded(&self) -> Option<DiscardedIndex> {
        self.inner.discarded.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 保存索引
    pub async fn save(&self) -> Result<()> {
        let _writer = self.inner.writer.lock().await;
        self.persist().await
    }

    /// 调用方必须持有写锁
    async fn persist(&self) -> Result<()> {
        let catalog = self.inner.catalog.read().await;
        registry::persist_catalog(&self.inner.conf, &self.inner.db, &catalog).await?;
        self.refresh_signals(&catalog);
        Ok(())
    }

    /// 保存后更新等待重建的数量，没有等待重建的图片时清除不一致的报告
    fn refresh_signals(&self, catalog: &Catalog) {
        let orphaned = catalog.orphans.len();
        let mut mismatch = self.inner.mismatch.write().unwrap_or_else(|e| e.into_inner());
        *mismatch = mismatch.take().filter(|_| orphaned > 0).map(|m| ModelMismatch { orphaned, ..m });
        let mut discarded = self.inner.discarded.write().unwrap_or_else(|e| e.into_inner());
        *discarded = discarded.take().filter(|_| orphaned > 0).map(|d| DiscardedIndex { orphaned, ..d });
    }

    /// 提取单张图片的特征向量，解码或编码失败时返回零向量
    pub async fn extract_features(&self, path: impl AsRef<Path>) -> Result<Features> {
        let path = non_empty_path(path.as_ref())?;
        let bytes = ingest::read_file(&path)?;
        let provider = self.inner.catalog.read().await.provider.clone();
        let model = provider.identity().name.clone();
        let vector = {
            let path = path.clone();
            spawn_blocking(move || encode_bytes_or_zero(&*provider, &path, &bytes)).await?
        };
        Ok(Features { path, model, vector })
    }

    /// 文本搜索
    pub async fn search_by_text(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::validation("搜索内容不能为空"));
        }
        let catalog = self.inner.catalog.read().await;
        let provider = catalog.provider.clone();
        let text = query.to_owned();
        let vector = spawn_blocking(move || {
            provider.encode_text(&text).unwrap_or_else(|e| {
                warn!("文本编码失败，使用零向量代替: {e}");
                zero_vector(provider.dimension())
            })
        })
        .await?;
        debug!("搜索文本: {query}");
        hits(&catalog, &vector, top_k)
    }

    /// 以图搜图
    pub async fn search_by_image(&self, source: ImageSource, top_k: usize) -> Result<Vec<SearchHit>> {
        let (path, bytes) = match source {
            ImageSource::Path(path) => {
                let path = non_empty_path(&path)?;
                let bytes = ingest::read_file(&path)?;
                (path, bytes)
            }
            ImageSource::Bytes(bytes) if bytes.is_empty() => {
                return Err(Error::validation("图片内容不能为空"));
            }
            ImageSource::Bytes(bytes) => (PathBuf::from("<bytes>"), bytes),
        };
        let catalog = self.inner.catalog.read().await;
        let provider = catalog.provider.clone();
        let vector = spawn_blocking(move || encode_bytes_or_zero(&*provider, &path, &bytes)).await?;
        hits(&catalog, &vector, top_k)
    }

    /// 添加单张图片，不会保存索引
    pub async fn add_item(&self, path: impl AsRef<Path>) -> Result<AddOutcome> {
        let path = non_empty_path(path.as_ref())?;
        if !ingest::is_supported(&path) {
            return Err(Error::validation(format!("不支持的图片格式: {}", path.display())));
        }
        let _writer = self.inner.writer.lock().await;
        self.add_locked(&path).await
    }

    /// 调用方必须持有写锁
    async fn add_locked(&self, path: &Path) -> Result<AddOutcome> {
        let id = ingest::item_id(path)?;
        let provider = {
            let catalog = self.inner.catalog.read().await;
            if catalog.items.contains(&id) {
                return Ok(AddOutcome::Exists);
            }
            catalog.provider.clone()
        };
        let (vector, meta) = encode_path(provider, path.to_path_buf()).await?;
        let mut catalog = self.inner.catalog.write().await;
        let ordinal = catalog.append(id, &vector, meta)?;
        Ok(AddOutcome::Added(ordinal))
    }

    /// 在后台添加目录下的所有图片，返回任务 ID
    pub async fn process_folder(&self, path: impl AsRef<Path>) -> Result<TaskId> {
        let path = check_folder(path.as_ref())?;
        let ctx = TaskContext { folder: Some(path.clone()), model: None };
        let handle = self.inner.tasks.create(TaskKind::Ingest, ctx);
        let id = handle.id().to_owned();

        let engine = self.clone();
        tokio::spawn(async move {
            handle.start();
            match engine.ingest_folder(&handle, path).await {
                Ok(()) => handle.complete(),
                Err(e) => handle.fail(e.to_string()),
            }
        });
        Ok(id)
    }

    async fn ingest_folder(&self, handle: &TaskHandle, path: PathBuf) -> Result<()> {
        let files = scan(path).await?;
        let _writer = self.inner.writer.lock().await;
        self.ingest_locked(handle, files).await
    }

    /// 调用方必须持有写锁
    async fn ingest_locked(&self, handle: &TaskHandle, files: Vec<PathBuf>) -> Result<()> {
        handle.update_progress(0, files.len());
        for file in files {
            match self.add_locked(&file).await {
                Ok(AddOutcome::Added(ordinal)) => debug!("添加图片 #{ordinal}: {}", file.display()),
                Ok(AddOutcome::Exists) => debug!("跳过已添加图片: {}", file.display()),
                Err(e) => warn!("添加图片失败 {}: {}", file.display(), e),
            }
            handle.advance();
        }
        self.persist().await
    }

    /// 使用指定模型重新索引目录
    ///
    /// 任务开始执行时模型与当前模型不同，则先用新模型重建已有的索引，再添加目录中的图片；
    /// 否则只添加目录中的图片
    pub async fn reindex_folder(&self, path: impl AsRef<Path>, model: &str) -> Result<TaskId> {
        let path = check_folder(path.as_ref())?;
        let model = non_empty_model(model)?;
        let provider = create_provider(self.inner.factory.clone(), model).await?;

        let ctx = TaskContext { folder: Some(path.clone()), model: Some(model.to_owned()) };
        let handle = self.inner.tasks.create(TaskKind::Reindex, ctx);
        let id = handle.id().to_owned();

        let engine = self.clone();
        tokio::spawn(async move {
            handle.start();
            let files = match scan(path).await {
                Ok(files) => files,
                Err(e) => return handle.fail(e.to_string()),
            };
            let _writer = engine.inner.writer.lock().await;
            let same = engine.inner.catalog.read().await.identity() == provider.identity();
            if same {
                match engine.ingest_locked(&handle, files).await {
                    Ok(()) => handle.complete(),
                    Err(e) => handle.fail(e.to_string()),
                }
            } else {
                engine.rebuild_locked(handle, Some(provider), files, None).await;
            }
        });
        Ok(id)
    }

    /// 切换模型
    ///
    /// 模型加载失败时不修改任何状态。索引为空时立即切换并返回 None，
    /// 否则在后台用新模型重建索引，返回重建任务的 ID；重建完成前仍使用旧模型搜索。
    pub async fn set_model(&self, name: &str) -> Result<Option<TaskId>> {
        let name = non_empty_model(name)?;
        let provider = create_provider(self.inner.factory.clone(), name).await?;

        // 有切换正在排队时，当前模型不代表最终的模型
        let queued = self.pending().is_some();
        if !queued && self.inner.catalog.read().await.identity() == provider.identity() {
            debug!("模型未改变: {}", provider.identity());
            return Ok(None);
        }

        if let Ok(_writer) = self.inner.writer.try_lock() {
            let mut catalog = self.inner.catalog.write().await;
            if !queued && catalog.count() == 0 && catalog.orphans.is_empty() {
                info!("切换模型: {} -> {}", catalog.identity(), provider.identity());
                *catalog = Catalog::empty(provider);
                drop(catalog);
                self.persist().await?;
                return Ok(None);
            }
        }

        let ctx = TaskContext { folder: None, model: Some(name.to_owned()) };
        let handle = self.inner.tasks.create(TaskKind::Rebuild, ctx);
        let id = handle.id().to_owned();
        self.set_pending(Some(name.to_owned()));

        let engine = self.clone();
        tokio::spawn(async move {
            handle.start();
            engine.run_rebuild(handle, Some(provider), None).await;
        });
        Ok(Some(id))
    }

    /// 使用当前模型重建索引，重新编码所有已知图片
    ///
    /// 模型在任务开始执行时确定，排在前面的模型切换完成后使用切换后的模型
    pub async fn rebuild(&self) -> Result<TaskId> {
        let handle = self.inner.tasks.create(TaskKind::Rebuild, TaskContext::default());
        let id = handle.id().to_owned();

        let engine = self.clone();
        tokio::spawn(async move {
            handle.start();
            engine.run_rebuild(handle, None, None).await;
        });
        Ok(id)
    }

    /// 从索引中移除一张图片，返回重建任务的 ID
    ///
    /// 索引不支持删除，移除后用当前模型重建其余图片。图片文件不需要存在。
    pub async fn remove_item(&self, path: impl AsRef<Path>) -> Result<TaskId> {
        let path = non_empty_path(path.as_ref())?;
        let id = ingest::item_id(&path)?;
        if !self.inner.catalog.read().await.knows(&id) {
            return Err(Error::not_found(format!("索引中没有 {}", path.display())));
        }

        let ctx = TaskContext { folder: None, model: None };
        let handle = self.inner.tasks.create(TaskKind::Remove, ctx);
        let task_id = handle.id().to_owned();

        let engine = self.clone();
        tokio::spawn(async move {
            handle.start();
            info!("移除图片: {id}");
            engine.run_rebuild(handle, None, Some(id)).await;
        });
        Ok(task_id)
    }

    async fn run_rebuild(
        &self,
        handle: TaskHandle,
        target: Option<Arc<dyn EmbeddingProvider>>,
        removed: Option<ItemId>,
    ) {
        let _writer = self.inner.writer.lock().await;
        self.rebuild_locked(handle, target, vec![], removed).await;
    }

    /// 重建索引，之后再添加 files 中的图片
    ///
    /// target 为空时使用当前模型，否则切换到 target。removed 不会出现在新索引中。
    /// 只有全部成功后才替换当前索引，失败时当前索引保持不变。调用方必须持有写锁。
    async fn rebuild_locked(
        &self,
        handle: TaskHandle,
        target: Option<Arc<dyn EmbeddingProvider>>,
        files: Vec<PathBuf>,
        removed: Option<ItemId>,
    ) {
        let switch = target.is_some();
        let (provider, items) = {
            let catalog = self.inner.catalog.read().await;
            let provider = target.unwrap_or_else(|| catalog.provider.clone());
            let mut items = catalog.all_items();
            if let Some(removed) = &removed {
                items.retain(|(id, _)| id != removed);
            }
            (provider, items)
        };
        if switch {
            self.set_pending(Some(provider.identity().name.clone()));
        }
        handle.set_model(provider.identity().name.clone());
        let total = items.len() + files.len();
        handle.update_progress(0, total);

        let joined = spawn_blocking({
            let provider = provider.clone();
            move || {
                let result =
                    registry::rebuild_catalog(provider, items, |i| handle.update_progress(i, total));
                (result, handle)
            }
        })
        .await;
        let (result, handle) = match joined {
            Ok(joined) => joined,
            Err(e) => {
                error!("重建索引的线程异常退出: {e}");
                self.finish_switch(switch, false);
                return;
            }
        };
        let mut rebuilt = match result {
            Ok(rebuilt) => rebuilt,
            Err(e) => {
                self.finish_switch(switch, false);
                handle.fail(e.to_string());
                return;
            }
        };

        for file in files {
            if let Err(e) = add_to(&mut rebuilt, provider.clone(), &file).await {
                warn!("添加图片失败 {}: {}", file.display(), e);
            }
            handle.advance();
        }

        if let Err(e) = registry::persist_catalog(&self.inner.conf, &self.inner.db, &rebuilt).await {
            self.finish_switch(switch, false);
            handle.fail(e.to_string());
            return;
        }
        self.refresh_signals(&rebuilt);
        *self.inner.catalog.write().await = rebuilt;
        self.finish_switch(switch, true);
        handle.complete();
    }

    fn finish_switch(&self, switch: bool, success: bool) {
        if switch {
            self.set_pending(None);
        }
        if switch && success {
            info!("模型切换完成");
        }
    }

    fn pending(&self) -> Option<String> {
        self.inner.pending.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_pending(&self, model: Option<String>) {
        *self.inner.pending.lock().unwrap_or_else(|e| e.into_inner()) = model;
    }

    /// 查询任务状态
    pub fn task_status(&self, id: &str) -> Result<Task> {
        self.inner.tasks.get(id).ok_or_else(|| Error::not_found(format!("任务 {id}")))
    }

    /// 等待任务结束
    pub async fn wait_task(&self, id: &str) -> Result<Task> {
        self.inner.tasks.wait(id).await.ok_or_else(|| Error::not_found(format!("任务 {id}")))
    }

    /// 当前模型的信息
    pub async fn current_model(&self) -> ModelInfo {
        let catalog = self.inner.catalog.read().await;
        let identity = catalog.identity();
        ModelInfo {
            model_id: identity.name.clone(),
            display_name: embedding::display_name(&identity.name).to_owned(),
            revision: identity.revision,
            dimension: identity.dimension,
            index_count: catalog.count(),
            pending: self.pending(),
            mismatch: self.mismatch(),
            discarded: self.discarded(),
            orphaned: catalog.orphans.len(),
        }
    }

    /// 图片的详细信息，包括元数据、特征向量和可能的描述
    pub async fn image_info(&self, path: impl AsRef<Path>) -> Result<ImageInfo> {
        let path = non_empty_path(path.as_ref())?;
        if !path.exists() {
            return Err(Error::not_found(path.display().to_string()));
        }
        if !ingest::is_supported(&path) {
            return Err(Error::validation(format!("不是有效的图片文件: {}", path.display())));
        }
        let bytes = ingest::read_file(&path)?;
        let provider = self.inner.catalog.read().await.provider.clone();

        let info_path = path.clone();
        let (vector, descriptions, metadata) = spawn_blocking(move || {
            let vector = encode_bytes_or_zero(&*provider, &info_path, &bytes);
            let descriptions = describe(&*provider, &vector);
            let summary = VectorSummary {
                model: embedding::display_name(&provider.identity().name).to_owned(),
                dimension: vector.len(),
                norm: embedding::l2_norm(&vector),
                head: vector.iter().take(10).copied().collect(),
            };
            (summary, descriptions, Metadata::extract(&info_path, &bytes))
        })
        .await?;
        Ok(ImageInfo { path, metadata, vector, descriptions })
    }

    /// 按拍摄时间倒序列出文件仍然存在的图片
    pub async fn timeline(&self) -> Vec<TimelineEntry> {
        let catalog = self.inner.catalog.read().await;
        let mut entries: Vec<_> = catalog
            .items
            .iter()
            .filter(|(_, id, _)| Path::new(id.as_str()).exists())
            .map(|(_, id, meta)| TimelineEntry {
                path: id.clone(),
                title: Path::new(id.as_str())
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                captured_at: meta.captured_at,
                metadata: meta.clone(),
            })
            .collect();
        entries.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        entries
    }

    /// 检查目录是否存在且包含支持的图片，只检查第一层
    pub fn validate_folder(&self, path: impl AsRef<Path>) -> Result<FolderCheck> {
        let path = non_empty_path(path.as_ref())?;
        let invalid = |message: &str| FolderCheck {
            valid: false,
            image_count: 0,
            message: message.to_owned(),
            warning: None,
        };
        if !path.exists() {
            return Ok(invalid("文件夹不存在"));
        }
        if !path.is_dir() {
            return Ok(invalid("路径不是文件夹"));
        }
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                warn!("无法读取目录 {}: {}", path.display(), e);
                return Ok(FolderCheck {
                    valid: true,
                    image_count: 0,
                    message: "无法扫描文件夹内容，但可以尝试添加".to_owned(),
                    warning: Some("权限不足，将在处理时再次检查".to_owned()),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let image_count = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| ingest::is_supported(&entry.path()))
            .count();
        if image_count == 0 {
            return Ok(invalid("该文件夹中未找到支持的图片文件"));
        }
        Ok(FolderCheck {
            valid: true,
            image_count,
            message: format!("找到 {image_count} 个图片文件"),
            warning: None,
        })
    }
}

async fn create_provider(
    factory: Arc<dyn ProviderFactory>,
    name: &str,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let name = name.to_owned();
    spawn_blocking(move || factory.create(&name)).await?
}

async fn scan(path: PathBuf) -> Result<Vec<PathBuf>> {
    spawn_blocking(move || ingest::scan_folder(&path)).await?
}

async fn encode_path(
    provider: Arc<dyn EmbeddingProvider>,
    path: PathBuf,
) -> Result<(Embedding, Metadata)> {
    spawn_blocking(move || ingest::encode_file(&*provider, &path)).await?
}

/// 向尚未生效的索引中添加图片
async fn add_to(catalog: &mut Catalog, provider: Arc<dyn EmbeddingProvider>, path: &Path) -> Result<()> {
    let id = ingest::item_id(path)?;
    if catalog.items.contains(&id) {
        return Ok(());
    }
    let (vector, meta) = encode_path(provider, path.to_path_buf()).await?;
    catalog.append(id, &vector, meta)?;
    Ok(())
}

fn encode_bytes_or_zero(provider: &dyn EmbeddingProvider, path: &Path, bytes: &[u8]) -> Embedding {
    match ingest::decode(path, bytes) {
        Ok(image) => encode_image_or_zero(provider, &image),
        Err(e) => {
            warn!("{e}，使用零向量代替");
            zero_vector(provider.dimension())
        }
    }
}

fn describe(provider: &dyn EmbeddingProvider, vector: &[f32]) -> Vec<Description> {
    let norm = embedding::l2_norm(vector);
    if norm <= f32::EPSILON {
        return vec![];
    }
    let mut descriptions: Vec<_> = DESCRIPTIONS
        .iter()
        .filter_map(|text| {
            let text_vector = provider.encode_text(text).ok()?;
            let similarity = inner_product(vector, &text_vector) / norm;
            (similarity > DESCRIPTION_THRESHOLD)
                .then(|| Description { text: text.to_string(), similarity })
        })
        .collect();
    descriptions.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    descriptions.truncate(MAX_DESCRIPTIONS);
    descriptions
}

fn hits(catalog: &Catalog, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
    Ok(catalog
        .search(query, top_k)?
        .into_iter()
        .map(|(n, id, meta)| SearchHit {
            ordinal: n.ordinal,
            path: id.clone(),
            score: n.score,
            metadata: meta.clone(),
        })
        .collect())
}

fn non_empty_path(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(Error::validation("路径不能为空"));
    }
    Ok(path.to_path_buf())
}

fn non_empty_model(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("模型名称不能为空"));
    }
    Ok(name)
}

fn check_folder(path: &Path) -> Result<PathBuf> {
    let path = non_empty_path(path)?;
    if !path.exists() {
        return Err(Error::not_found(path.display().to_string()));
    }
    if !path.is_dir() {
        return Err(Error::validation(format!("不是目录: {}", path.display())));
    }
    Ok(path)
}
