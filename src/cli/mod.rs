mod add;
mod features;
mod info;
mod model;
mod rebuild;
mod reindex;
mod remove;
mod search;
mod timeline;

pub use add::*;
pub use features::*;
pub use info::*;
pub use model::*;
pub use rebuild::*;
pub use reindex::*;
pub use remove::*;
pub use search::*;
pub use timeline::*;

use crate::config::Opts;
use crate::engine::{Engine, EngineOptions};

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// 按命令行参数打开引擎
async fn open_engine(opts: &Opts) -> anyhow::Result<Engine> {
    let mut options = EngineOptions::new(opts.conf_dir.clone());
    options.model = opts.model.clone();
    let engine = Engine::open(options).await?;
    if let Some(mismatch) = engine.mismatch() {
        eprintln!(
            "索引由模型 {} 生成，当前模型为 {}，{} 张图片需要运行 rebuild 重建",
            mismatch.persisted, mismatch.active, mismatch.orphaned
        );
    }
    if let Some(discarded) = engine.discarded() {
        eprintln!("{}，{} 张图片需要运行 rebuild 重建", discarded.reason, discarded.orphaned);
    }
    Ok(engine)
}
