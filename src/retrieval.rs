use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use ndarray::prelude::*;

use crate::catalog::EntryLookup;
use crate::error::{Error, Result};
use crate::histogram::{HistogramExtractor, decode_image, histogram_distance, read_image};
use crate::model::Entry;
use crate::store::{FeatureStore, Neighbor};

/// 返回给调用方的最大结果数量，结果用于前端列表展示
pub const MAX_RESULTS: usize = 2000;

/// 一条检索结果
#[derive(Debug, Clone)]
pub struct Match {
    pub entry: Arc<Entry>,
    /// 距离或相似度，具体含义取决于查询方式
    pub score: f32,
}

/// 以图搜图
pub struct RetrievalEngine {
    store: Arc<FeatureStore>,
    extractor: HistogramExtractor,
}

impl RetrievalEngine {
    /// 直方图的形状和颜色空间取自特征库头部
    pub fn new(store: Arc<FeatureStore>) -> Result<Self> {
        let header = *store.header();
        let extractor = HistogramExtractor::new(header.shape, header.color_space)?;
        Ok(Self { store, extractor })
    }

    pub fn store(&self) -> &FeatureStore {
        &self.store
    }

    pub fn extractor(&self) -> &HistogramExtractor {
        &self.extractor
    }

    /// 对特征库进行线性扫描，返回距离最小的 k 条
    pub fn rank(&self, query: ArrayView3<f32>, k: usize, candidates: Option<&[u64]>) -> Result<Vec<Neighbor>> {
        let start = Instant::now();
        let result = self.store.scan_and_rank(query, histogram_distance, k, candidates)?;
        debug!(
            "扫描完成: k = {}, 候选 = {:?}, 结果 {} 条, 耗时 {:.2}ms",
            k,
            candidates.map(|c| c.len()),
            result.len(),
            start.elapsed().as_secs_f32() * 1000.
        );
        Ok(result)
    }

    /// 使用上传的图片进行检索
    ///
    /// 透明或纯黑的像素视为背景，不参与比较，这样可以只用截图的一部分进行搜索。
    /// `candidate_ids` 不为空时只在这些条目中检索，全部无效时返回空列表。
    pub fn query_by_image<L>(
        &self,
        lookup: &L,
        raw_image: &[u8],
        k: usize,
        candidate_ids: Option<&[i64]>,
    ) -> Result<Vec<Match>>
    where
        L: EntryLookup + ?Sized,
    {
        let image = decode_image(raw_image)?;
        let query = self.extractor.extract_masked(&image)?;

        let bins = self.extractor.shape().bins;
        if query.slice(s![.., .., bins]).iter().all(|&m| m == 0.) {
            return Err(Error::InvalidMask("查询图片没有任何有效像素".to_string()));
        }

        self.query_by_histogram(lookup, query.view(), k, candidate_ids)
    }

    /// 查找与某个条目截图相似的条目
    pub fn query_similar<L>(&self, lookup: &L, entry: &Entry, k: usize) -> Result<Vec<Match>>
    where
        L: EntryLookup + ?Sized,
    {
        let image = read_image(&entry.thumbnail_path)?;
        let query = self.extractor.extract(&image);
        self.query_by_histogram(lookup, query.view(), k, None)
    }

    /// 使用已经计算好的查询直方图进行检索
    pub fn query_by_histogram<L>(
        &self,
        lookup: &L,
        query: ArrayView3<f32>,
        k: usize,
        candidate_ids: Option<&[i64]>,
    ) -> Result<Vec<Match>>
    where
        L: EntryLookup + ?Sized,
    {
        let candidates = match candidate_ids {
            Some(ids) => {
                let indices =
                    lookup.lookup_by_ids(ids).iter().map(|e| e.histogram_feature_index).collect::<Vec<_>>();
                if indices.is_empty() {
                    return Ok(vec![]);
                }
                Some(indices)
            }
            None => None,
        };

        let neighbors = self.rank(query, k, candidates.as_deref())?;

        let mut result = Vec::with_capacity(neighbors.len().min(MAX_RESULTS));
        for neighbor in neighbors {
            match lookup.lookup_by_index(neighbor.index) {
                Some(entry) => result.push(Match { entry, score: neighbor.score }),
                None => warn!("特征 {} 没有对应的条目", neighbor.index),
            }
            if result.len() == MAX_RESULTS {
                break;
            }
        }
        Ok(result)
    }
}
