use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgGroup, Parser, ValueEnum};
use log::debug;

use crate::cli::{SubCommandExtend, open_engine};
use crate::config::Opts;
use crate::engine::{ImageSource, SearchHit};

#[derive(Parser, Debug, Clone)]
#[command(group(ArgGroup::new("query").required(true).args(["text", "image"])))]
pub struct SearchCommand {
    /// 搜索文本
    #[arg(short, long)]
    pub text: Option<String>,
    /// 被搜索的图片路径
    #[arg(short, long)]
    pub image: Option<PathBuf>,
    /// 显示的结果数量
    #[arg(short, long, value_name = "COUNT", default_value_t = 10)]
    pub k: usize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let engine = open_engine(opts).await?;

        let result = match (&self.text, &self.image) {
            (Some(text), _) => engine.search_by_text(text, self.k).await?,
            (None, Some(image)) => {
                engine.search_by_image(ImageSource::Path(image.clone()), self.k).await?
            }
            (None, None) => anyhow::bail!("需要提供 --text 或 --image"),
        };
        debug!("找到 {} 个结果", result.len());

        print_result(&result, self.output_format)
    }
}

fn print_result(result: &[SearchHit], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for hit in result {
                println!("{:.4}\t{}", hit.score, hit.path);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
