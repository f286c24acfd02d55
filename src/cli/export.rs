use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use ndarray_npy::write_npy;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::HistogramOptions;
use crate::{FrameDBBuilder, Opts};

#[derive(Parser, Debug, Clone)]
pub struct ExportCommand {
    #[command(flatten)]
    pub histogram: HistogramOptions,
    /// 输出文件，格式为 `(N, rows, cols, bins)` 的 f32 数组
    #[arg(default_value = "histograms.npy")]
    pub output: PathBuf,
}

impl SubCommandExtend for ExportCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = FrameDBBuilder::new(opts.conf_dir.clone()).histogram(self.histogram.clone()).open().await?;
        let data = block_in_place(|| db.export())?;
        write_npy(&self.output, &data)?;
        info!("导出成功: {} 条直方图 -> {}", data.len_of(ndarray::Axis(0)), self.output.display());
        Ok(())
    }
}
