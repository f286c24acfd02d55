use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::HistogramOptions;
use crate::{FrameDBBuilder, Opts};

#[derive(Parser, Debug, Clone)]
pub struct InfoCommand {
    #[command(flatten)]
    pub histogram: HistogramOptions,
    /// 以 JSON 格式输出
    #[arg(long)]
    pub json: bool,
}

impl SubCommandExtend for InfoCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = FrameDBBuilder::new(opts.conf_dir.clone()).histogram(self.histogram.clone()).open().await?;
        let info = db.info().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&info)?);
            return Ok(());
        }

        println!("配置目录  : {}", opts.conf_dir);
        println!("格式版本  : {}", info.header.version);
        println!("直方图形状: {}", info.header.shape);
        println!("颜色空间  : {:?}", info.header.color_space);
        println!("特征数量  : {}", info.vectors);
        println!("条目数量  : {}", info.entries);
        Ok(())
    }
}
