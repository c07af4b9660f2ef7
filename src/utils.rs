use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::Engine;
use crate::task::{Task, TaskStatus};

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        .expect("invalid progress bar template")
}

/// 轮询任务直到结束，同时显示进度条
pub async fn wait_with_progress(engine: &Engine, id: &str) -> anyhow::Result<Task> {
    let pb = ProgressBar::no_length().with_style(pb_style());
    let task = loop {
        let task = engine.task_status(id)?;
        pb.set_length(task.total as u64);
        pb.set_position(task.processed as u64);
        pb.set_message(format!("{:?}", task.status).to_lowercase());
        if task.status.is_terminal() {
            break task;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    };
    pb.finish_and_clear();

    match task.status {
        TaskStatus::Failed => {
            anyhow::bail!("任务失败: {}", task.error.as_deref().unwrap_or("未知错误"))
        }
        _ => Ok(task),
    }
}
