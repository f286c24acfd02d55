use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::histogram::ColorSpace;
use crate::store::{Shape, StoreHeader};

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let path = ProjectDirs::from("", "", "framesearch")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("framesearch"));
    ConfDir { path }
});

/// 直方图布局
///
/// 未指定的参数沿用已有特征库的设置，特征库不存在时使用默认值
#[derive(Parser, Debug, Clone, Default)]
pub struct HistogramOptions {
    /// 直方图网格行数 [默认: 4]
    #[arg(long, value_name = "N")]
    pub hist_rows: Option<usize>,
    /// 直方图网格列数 [默认: 4]
    #[arg(long, value_name = "N")]
    pub hist_cols: Option<usize>,
    /// 每个网格的直方图区间数，必须是某个整数的立方 [默认: 64]
    #[arg(long, value_name = "N")]
    pub hist_bins: Option<usize>,
    /// 统计直方图使用的颜色空间 [默认: lab]
    #[arg(long, value_enum)]
    pub color_space: Option<ColorSpace>,
}

impl HistogramOptions {
    pub fn new(rows: usize, cols: usize, bins: usize, color_space: ColorSpace) -> Self {
        Self { hist_rows: Some(rows), hist_cols: Some(cols), hist_bins: Some(bins), color_space: Some(color_space) }
    }

    /// 以已有特征库的头部为基础，用显式指定的参数覆盖
    pub fn resolve(&self, existing: Option<&StoreHeader>) -> StoreHeader {
        let (shape, color_space) = match existing {
            Some(header) => (header.shape, header.color_space),
            None => (Shape::new(4, 4, 64), ColorSpace::Lab),
        };
        StoreHeader::new(
            Shape::new(
                self.hist_rows.unwrap_or(shape.rows),
                self.hist_cols.unwrap_or(shape.cols),
                self.hist_bins.unwrap_or(shape.bins),
            ),
            self.color_space.unwrap_or(color_space),
        )
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 以图搜图时返回的结果数量
    #[arg(long, value_name = "COUNT", default_value_t = 1000)]
    pub count: usize,
    /// 语义搜索在没有子集过滤时返回的结果数量
    #[arg(long, value_name = "N", default_value_t = 1000)]
    pub top_n: usize,
    /// 文本向量维度
    #[arg(long, value_name = "DIM", default_value_t = 384)]
    pub encoder_dim: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { count: 1000, top_n: 1000, encoder_dim: 384 }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "framesearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// framesearch 配置文件目录
    #[arg(short, long, default_value_t = CONF_DIR.clone())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 从清单文件导入视频帧
    Add(AddCommand),
    /// 从数据库中搜索视频帧
    Search(SearchCommand),
    /// 启动 HTTP 搜索服务
    Server(ServerCommand),
    /// 显示特征库和数据库的统计信息
    Info(InfoCommand),
    /// 导出全部直方图
    Export(ExportCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回元数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("framesearch.db")
    }

    /// 返回特征库文件的路径
    pub fn features(&self) -> PathBuf {
        self.path.join("features.mdb")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

impl std::fmt::Display for ConfDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
