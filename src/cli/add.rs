use std::path::PathBuf;

use clap::Parser;

use crate::cli::{SubCommandExtend, open_engine};
use crate::config::Opts;
use crate::utils::wait_with_progress;

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    /// 图片所在目录，会递归扫描子目录
    pub path: PathBuf,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let engine = open_engine(opts).await?;
        let before = engine.count().await;

        let id = engine.process_folder(&self.path).await?;
        let task = wait_with_progress(&engine, &id).await?;

        let added = engine.count().await - before;
        println!("扫描 {} 张图片，新增 {} 张，索引中共 {} 张", task.total, added, engine.count().await);
        Ok(())
    }
}
