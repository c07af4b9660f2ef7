use clap::{Parser, Subcommand};

use crate::cli::{SubCommandExtend, open_engine};
use crate::config::Opts;
use crate::embedding;
use crate::utils::wait_with_progress;

#[derive(Parser, Debug, Clone)]
pub struct ModelCommand {
    /// 列出所有已知模型
    #[arg(long)]
    pub list: bool,
    #[command(subcommand)]
    pub action: Option<ModelAction>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ModelAction {
    /// 切换模型，索引不为空时会用新模型重建索引
    Set {
        /// 模型名称
        name: String,
    },
}

impl SubCommandExtend for ModelCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let engine = open_engine(opts).await?;

        if let Some(ModelAction::Set { name }) = &self.action {
            match engine.set_model(name).await? {
                Some(id) => {
                    wait_with_progress(&engine, &id).await?;
                    println!("模型已切换为 {}，索引重建完成", name);
                }
                None => println!("模型已切换为 {}", name),
            }
            return Ok(());
        }

        let current = engine.current_model().await;
        if self.list {
            for spec in embedding::catalog() {
                let mark = if spec.name == current.model_id { "*" } else { " " };
                let state = if spec.available() { "" } else { "\t(不可用)" };
                println!("{} {}\t{}{}", mark, spec.name, spec.display_name, state);
            }
            return Ok(());
        }

        println!("模型: {} ({})", current.model_id, current.display_name);
        println!("维数: {}", current.dimension);
        println!("索引数量: {}", current.index_count);
        if current.orphaned > 0 {
            println!("等待重建: {}", current.orphaned);
        }
        Ok(())
    }
}
