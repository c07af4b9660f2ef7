//! 后台任务登记
//!
//! 每个任务只有一个写者，即创建任务时返回的 [`TaskHandle`]；读者通过 [`TaskTracker::get`]
//! 获得任务状态的完整拷贝，不会读到写了一半的状态。任务结束后保留到进程退出。

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// 添加目录
    Ingest,
    /// 使用指定模型重新索引目录
    Reindex,
    /// 重建索引
    Rebuild,
    /// 移除图片后重建索引
    Remove,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ingest => "ingest",
            Self::Reindex => "reindex",
            Self::Rebuild => "rebuild",
            Self::Remove => "remove",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// 任务的附加信息
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    pub folder: Option<PathBuf>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub total: usize,
    pub processed: usize,
    /// 百分比，total 为 0 时为 0
    pub progress: f32,
    pub error: Option<String>,
    pub folder: Option<PathBuf>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    fn recalc(&mut self) {
        self.progress = match self.total {
            0 => 0.0,
            total => (self.processed.min(total) as f32 / total as f32) * 100.0,
        };
    }
}

/// 任务登记表
#[derive(Default)]
pub struct TaskTracker {
    tasks: RwLock<HashMap<TaskId, watch::Receiver<Task>>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建一个等待中的任务，返回唯一的写者
    pub fn create(&self, kind: TaskKind, ctx: TaskContext) -> TaskHandle {
        let id = format!("{}-{}", kind, Uuid::new_v4().simple());
        let task = Task {
            id: id.clone(),
            kind,
            status: TaskStatus::Pending,
            total: 0,
            processed: 0,
            progress: 0.0,
            error: None,
            folder: ctx.folder,
            model: ctx.model,
            created_at: Utc::now(),
            finished_at: None,
        };
        let (tx, rx) = watch::channel(task);
        self.tasks.write().unwrap_or_else(|e| e.into_inner()).insert(id.clone(), rx);
        debug!("创建任务 {id}");
        TaskHandle { id, tx }
    }

    /// 任务状态的拷贝
    pub fn get(&self, id: &str) -> Option<Task> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks.get(id).map(|rx| rx.borrow().clone())
    }

    /// 等待任务结束
    pub async fn wait(&self, id: &str) -> Option<Task> {
        let mut rx = {
            let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
            tasks.get(id)?.clone()
        };
        let task = rx.wait_for(|task| task.status.is_terminal()).await.ok()?.clone();
        Some(task)
    }
}

/// 任务的写者
///
/// 在进入终止状态之前被丢弃的任务会被标记为失败
pub struct TaskHandle {
    id: TaskId,
    tx: watch::Sender<Task>,
}

impl TaskHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn start(&self) {
        self.tx.send_modify(|task| task.status = TaskStatus::Processing);
    }

    /// 记录任务实际使用的模型
    pub fn set_model(&self, model: impl Into<String>) {
        let model = model.into();
        self.tx.send_modify(|task| task.model = Some(model));
    }

    /// 更新进度，processed 不会减小
    pub fn update_progress(&self, processed: usize, total: usize) {
        self.tx.send_modify(|task| {
            task.total = total;
            task.processed = task.processed.max(processed);
            task.recalc();
        });
    }

    /// 已处理数量加一
    pub fn advance(&self) {
        self.tx.send_modify(|task| {
            task.processed += 1;
            task.recalc();
        });
    }

    pub fn complete(self) {
        self.tx.send_modify(|task| {
            task.status = TaskStatus::Completed;
            task.progress = 100.0;
            task.finished_at = Some(Utc::now());
        });
        info!("任务 {} 完成", self.id);
    }

    pub fn fail(self, msg: impl Into<String>) {
        let msg = msg.into();
        error!("任务 {} 失败: {}", self.id, msg);
        self.tx.send_modify(|task| {
            task.status = TaskStatus::Failed;
            task.error = Some(msg);
            task.finished_at = Some(Utc::now());
        });
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.tx.send_if_modified(|task| {
            if task.status.is_terminal() {
                return false;
            }
            task.status = TaskStatus::Failed;
            task.error = Some("任务异常退出".to_owned());
            task.finished_at = Some(Utc::now());
            true
        });
    }
}
