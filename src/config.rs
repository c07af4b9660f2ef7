use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;

#[derive(Parser, Debug, Clone)]
#[command(name = "photosearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// photosearch 配置文件目录
    #[arg(short, long, global = true, default_value_t = ConfDir::default())]
    pub conf_dir: ConfDir,
    /// 使用的嵌入模型，默认沿用上次保存索引时的模型
    #[arg(short, long, global = true)]
    pub model: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 添加目录中的图片到索引
    Add(AddCommand),
    /// 通过文本或图片搜索
    Search(SearchCommand),
    /// 输出图片的特征向量
    Features(FeaturesCommand),
    /// 显示图片的详细信息
    Info(InfoCommand),
    /// 查看或切换嵌入模型
    Model(ModelCommand),
    /// 使用指定模型重新索引目录
    Reindex(ReindexCommand),
    /// 使用当前模型重建索引
    Rebuild(RebuildCommand),
    /// 从索引中移除图片
    Remove(RemoveCommand),
    /// 按时间列出已索引的图片
    Timeline(TimelineCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("photosearch.db")
    }

    /// 返回索引文件的路径
    pub fn index(&self) -> PathBuf {
        self.path.join("index.bin")
    }

    /// 返回索引文件的临时路径
    pub fn index_tmp(&self) -> PathBuf {
        self.path.join("index.bin.tmp")
    }

    /// 返回模型描述文件的路径
    pub fn model_descriptor(&self) -> PathBuf {
        self.path.join("model.json")
    }

    pub fn model_descriptor_tmp(&self) -> PathBuf {
        self.path.join("model.json.tmp")
    }

    /// 返回模型文件缓存目录
    pub fn model_cache(&self) -> PathBuf {
        self.path.join("models")
    }
}

impl Default for ConfDir {
    fn default() -> Self {
        let path = ProjectDirs::from("", "", "photosearch")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".photosearch"));
        Self { path }
    }
}

impl fmt::Display for ConfDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
