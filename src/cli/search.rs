use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio::task::block_in_place;

use crate::FrameDBBuilder;
use crate::cli::SubCommandExtend;
use crate::config::{HistogramOptions, Opts, SearchOptions};
use crate::histogram::read_image;
use crate::model::Entry;
use crate::retrieval::Match;

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub histogram: HistogramOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 被搜索的图片路径
    #[arg(long, conflicts_with = "text", required_unless_present = "text")]
    pub image: Option<PathBuf>,
    /// 将透明或纯黑的像素视为背景，只比较图片的其余部分
    #[arg(long, requires = "image")]
    pub mask: bool,
    /// 文本查询，默认按逗号分隔的 token 匹配标签和描述
    #[arg(long)]
    pub text: Option<String>,
    /// 按描述文本的语义相似度查询
    #[arg(long, requires = "text")]
    pub embedding: bool,
    /// 只在这些条目中查询，多个 ID 用逗号分隔
    #[arg(long, value_name = "ID", value_delimiter = ',')]
    pub subset: Vec<i64>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

#[derive(Serialize)]
struct SearchResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f32>,
    #[serde(flatten)]
    entry: Entry,
}

impl From<&Match> for SearchResult {
    fn from(m: &Match) -> Self {
        Self { score: Some(m.score), entry: m.entry.as_ref().clone() }
    }
}

impl From<&Arc<Entry>> for SearchResult {
    fn from(entry: &Arc<Entry>) -> Self {
        Self { score: None, entry: entry.as_ref().clone() }
    }
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = FrameDBBuilder::new(opts.conf_dir.clone())
            .histogram(self.histogram.clone())
            .encoder_dim(self.search.encoder_dim)
            .open()
            .await?;

        let result = block_in_place(|| -> Result<Vec<SearchResult>> {
            if let Some(image) = &self.image {
                let matches = if self.mask {
                    db.image_query(&std::fs::read(image)?, self.search.count, &self.subset)?
                } else {
                    let query = db.extractor().extract(&read_image(image)?);
                    db.histogram_query(query.view(), self.search.count, &self.subset)?
                };
                return Ok(matches.iter().map(SearchResult::from).collect());
            }

            let text = self.text.as_deref().unwrap_or_default();
            if self.embedding {
                let matches = db.embedding_query(text, &self.subset, self.search.top_n);
                Ok(matches.iter().map(SearchResult::from).collect())
            } else {
                Ok(db.text_query(text, &self.subset).iter().map(SearchResult::from).collect())
            }
        })?;

        print_result(&result, self)
    }
}

fn print_result(result: &[SearchResult], opts: &SearchCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for r in result {
                let score = r.score.map(|s| format!("{s:.4}")).unwrap_or_else(|| "-".to_string());
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    score, r.entry.id, r.entry.movie_name, r.entry.frame_pos, r.entry.thumbnail_path
                );
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
