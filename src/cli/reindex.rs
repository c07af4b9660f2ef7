use std::path::PathBuf;

use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::engine::{Engine, EngineOptions};
use crate::utils::wait_with_progress;

#[derive(Parser, Debug, Clone)]
pub struct ReindexCommand {
    /// 图片所在目录
    pub path: PathBuf,
}

impl SubCommandExtend for ReindexCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let Some(model) = &opts.model else {
            anyhow::bail!("需要通过 --model 指定使用的模型");
        };
        // 以上次保存时的模型打开，由重新索引完成切换
        let engine = Engine::open(EngineOptions::new(opts.conf_dir.clone())).await?;
        let id = engine.reindex_folder(&self.path, model).await?;
        wait_with_progress(&engine, &id).await?;
        let current = engine.current_model().await;
        println!("重新索引完成，模型 {}，索引中共 {} 张图片", current.model_id, current.index_count);
        Ok(())
    }
}
