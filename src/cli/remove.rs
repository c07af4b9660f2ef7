use std::path::PathBuf;

use clap::Parser;

use crate::cli::{SubCommandExtend, open_engine};
use crate::config::Opts;
use crate::utils::wait_with_progress;

#[derive(Parser, Debug, Clone)]
pub struct RemoveCommand {
    /// 要移除的图片路径，文件可以已经不存在
    pub path: PathBuf,
}

impl SubCommandExtend for RemoveCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let engine = open_engine(opts).await?;
        let id = engine.remove_item(&self.path).await?;
        wait_with_progress(&engine, &id).await?;
        println!("已移除 {}，索引中共 {} 张图片", self.path.display(), engine.count().await);
        Ok(())
    }
}
