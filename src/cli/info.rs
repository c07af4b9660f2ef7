use std::path::PathBuf;

use clap::Parser;

use crate::cli::{SubCommandExtend, open_engine};
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct InfoCommand {
    /// 图片路径
    pub path: PathBuf,
}

impl SubCommandExtend for InfoCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let engine = open_engine(opts).await?;
        let info = engine.image_info(&self.path).await?;
        println!("{}", serde_json::to_string_pretty(&info)?);
        Ok(())
    }
}
