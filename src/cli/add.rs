use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use clap::Parser;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{info, warn};
use ndarray::Array3;
use rayon::prelude::*;
use regex::Regex;
use tokio::task::block_in_place;
use walkdir::WalkDir;

use crate::cli::SubCommandExtend;
use crate::config::{HistogramOptions, Opts};
use crate::histogram::read_image;
use crate::model::NewEntry;
use crate::utils::pb_style;
use crate::{FrameDB, FrameDBBuilder};

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub histogram: HistogramOptions,
    /// 清单文件，或者包含清单文件的目录
    ///
    /// 清单每一行为一个 JSON 对象：
    /// {"movie_name": "...", "frame_pos": 0, "thumbnail_path": "...", "caption": "...", "labels": ["..."]}
    #[arg(verbatim_doc_comment)]
    pub path: PathBuf,
    /// 扫描目录时使用的清单后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jsonl")]
    pub suffix: String,
    /// 在添加到数据库之前使用正则表达式对截图路径进行处理
    /// 例：--replace '^/mnt/data/(?<path>.+)$' 'data/$path'
    #[arg(short, long, num_args = 2, value_names = ["REGEX", "REPLACE"], verbatim_doc_comment)]
    pub replace: Vec<String>,
    /// 每次写入数据库的条目数量
    #[arg(long, value_name = "N", default_value_t = 256)]
    pub batch_size: usize,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let re_suf = Regex::new(&format!("(?i)^({})$", self.suffix.replace(',', "|")))?;
        let replace = match self.replace.as_slice() {
            [] => None,
            [re, rep] => Some((Regex::new(re)?, rep.clone())),
            _ => return Err(anyhow!("--replace 需要两个参数")),
        };

        let db = FrameDBBuilder::new(opts.conf_dir.clone()).histogram(self.histogram.clone()).open().await?;

        let manifests = scan_manifests(&self.path, &re_suf);
        info!("找到 {} 个清单文件", manifests.len());

        let mut pending = vec![];
        let mut seen = HashSet::new();
        for manifest in &manifests {
            for mut entry in read_manifest(manifest)? {
                if let Some((re, rep)) = &replace {
                    entry.thumbnail_path = re.replace(&entry.thumbnail_path, rep.as_str()).to_string();
                }
                if !seen.insert(entry.thumbnail_path.clone()) {
                    continue;
                }
                if db.contains_thumbnail(&entry.thumbnail_path).await? {
                    continue;
                }
                pending.push(entry);
            }
        }

        let skipped = seen.len() - pending.len();
        info!("待添加 {} 条, 跳过已存在的 {} 条", pending.len(), skipped);

        let pb = ProgressBar::new(pending.len() as u64).with_style(pb_style());
        let mut added = 0;
        for chunk in pending.chunks(self.batch_size.max(1)) {
            let batch = block_in_place(|| compute_histograms(&db, chunk, &pb));
            added += db.add_entries(&batch).await?.len();
        }
        pb.finish_with_message("截图添加完成");

        let total = db.reload().await?;
        info!("新增 {} 条, 数据库共 {} 条", added, total);
        Ok(())
    }
}

/// 查找清单文件，`path` 为文件时直接返回
fn scan_manifests(path: &Path, re_suf: &Regex) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut manifests = WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| re_suf.is_match(&ext.to_string_lossy())))
        .collect::<Vec<_>>();
    manifests.sort();
    manifests
}

/// 读取一个清单文件，无法解析的行会被跳过
fn read_manifest(path: &Path) -> Result<Vec<NewEntry>> {
    let content = fs::read_to_string(path)?;
    let mut entries = vec![];
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<NewEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("{}:{} 解析失败: {}", path.display(), lineno + 1, e),
        }
    }
    Ok(entries)
}

/// 并行计算一批截图的直方图，读取失败的截图会被跳过
fn compute_histograms(db: &FrameDB, entries: &[NewEntry], pb: &ProgressBar) -> Vec<(NewEntry, Array3<f32>)> {
    let extractor = db.extractor();
    entries
        .par_iter()
        .progress_with(pb.clone())
        .filter_map(|entry| match read_image(&entry.thumbnail_path) {
            Ok(image) => Some((entry.clone(), extractor.extract(&image))),
            Err(e) => {
                pb.println(format!("读取截图失败: {}: {}", entry.thumbnail_path, e));
                None
            }
        })
        .collect()
}
