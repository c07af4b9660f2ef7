use clap::Parser;

use crate::cli::{SubCommandExtend, open_engine};
use crate::config::Opts;
use crate::utils::wait_with_progress;

#[derive(Parser, Debug, Clone)]
pub struct RebuildCommand {}

impl SubCommandExtend for RebuildCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let engine = open_engine(opts).await?;
        let id = engine.rebuild().await?;
        let task = wait_with_progress(&engine, &id).await?;
        println!("重建完成，处理 {} 张图片，索引中共 {} 张", task.processed, engine.count().await);
        Ok(())
    }
}
