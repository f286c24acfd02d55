use std::ops::Range;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use log::{debug, error, info};
use ndarray::prelude::*;
use serde::Serialize;

use crate::catalog::{Catalog, EntryLookup};
use crate::config::{ConfDir, HistogramOptions};
use crate::db::{Database, crud, init_db};
use crate::embedding::{HashingEncoder, TextEncoder};
use crate::error::{Error, Result};
use crate::histogram::HistogramExtractor;
use crate::metrics::{QueryKind, observe_query};
use crate::model::{Entry, NewEntry};
use crate::retrieval::{Match, RetrievalEngine};
use crate::store::{FeatureStore, StoreHeader};
use crate::tokens::{filter_by_ids, filter_by_tokens};

pub struct FrameDBBuilder {
    conf_dir: ConfDir,
    histogram: HistogramOptions,
    encoder_dim: usize,
    encoder: Option<Arc<dyn TextEncoder>>,
}

impl FrameDBBuilder {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self { conf_dir, histogram: HistogramOptions::default(), encoder_dim: 384, encoder: None }
    }

    /// 直方图布局，显式指定的参数必须与已有特征库一致
    pub fn histogram(mut self, histogram: HistogramOptions) -> Self {
        self.histogram = histogram;
        self
    }

    /// 默认编码器的向量维度
    pub fn encoder_dim(mut self, dim: usize) -> Self {
        self.encoder_dim = dim;
        self
    }

    /// 使用自定义的文本编码器
    pub fn encoder(mut self, encoder: Arc<dyn TextEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub async fn open(self) -> Result<FrameDB> {
        let encoder = match self.encoder {
            Some(encoder) => encoder,
            None if self.encoder_dim == 0 => {
                return Err(Error::InvalidConfig("文本向量维度必须大于 0".to_string()));
            }
            None => Arc::new(HashingEncoder::new(self.encoder_dim)),
        };

        let histogram = &self.histogram;
        let store = FeatureStore::open_with(self.conf_dir.features(), |existing| histogram.resolve(existing))?;
        let engine = RetrievalEngine::new(Arc::new(store))?;
        let db = init_db(self.conf_dir.database()).await?;

        let catalog = load_catalog(&db, encoder.as_ref()).await?;
        info!("加载元数据: {} 条", catalog.len());

        Ok(FrameDB {
            db,
            engine,
            encoder,
            catalog: RwLock::new(Arc::new(catalog)),
            bookmarks: RwLock::new(Arc::new(vec![])),
        })
    }
}

async fn load_catalog(db: &Database, encoder: &dyn TextEncoder) -> Result<Catalog> {
    let records = crud::get_entries(db).await?;
    let entries = records.into_iter().map(Entry::try_from).collect::<Result<Vec<_>>>()?;
    Ok(Catalog::new(entries, encoder))
}

/// 特征库和元数据库的统计信息
#[derive(Debug, Serialize)]
pub struct FrameDBInfo {
    pub header: StoreHeader,
    /// 特征库中的向量数量
    pub vectors: u64,
    /// 元数据库中的条目数量
    pub entries: u64,
}

/// 查询入口，持有特征库、元数据库以及内存中的元数据快照
pub struct FrameDB {
    db: Database,
    engine: RetrievalEngine,
    encoder: Arc<dyn TextEncoder>,
    catalog: RwLock<Arc<Catalog>>,
    bookmarks: RwLock<Arc<Vec<Arc<Entry>>>>,
}

impl FrameDB {
    /// 从元数据库重新构建快照
    ///
    /// 收藏列表中的条目会按 ID 重新解析，已经不存在的条目会被丢弃
    pub async fn reload(&self) -> Result<usize> {
        let start = Instant::now();
        let catalog = Arc::new(load_catalog(&self.db, self.encoder.as_ref()).await?);
        let len = catalog.len();

        let bookmark_ids = self.bookmarks().iter().map(|e| e.id).collect::<Vec<_>>();
        let bookmarks = catalog.lookup_by_ids(&bookmark_ids);

        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = catalog;
        *self.bookmarks.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(bookmarks);

        info!("加载元数据: {} 条, 耗时 {:.2}s", len, start.elapsed().as_secs_f32());
        Ok(len)
    }

    /// 当前的元数据快照
    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn store(&self) -> &FeatureStore {
        self.engine.store()
    }

    pub fn extractor(&self) -> &HistogramExtractor {
        self.engine.extractor()
    }

    /// 截图路径是否已经导入过
    pub async fn contains_thumbnail(&self, path: &str) -> Result<bool> {
        Ok(crud::check_thumbnail(&self.db, path).await?)
    }

    /// 导入一批条目，返回新条目的 ID
    ///
    /// 直方图在同一个事务中写入特征库，随后元数据在同一个事务中写入数据库。
    /// 快照不会自动更新，需要调用 [`FrameDB::reload`]。
    ///
    /// 特征库先于元数据提交。元数据写入失败时这批特征不会被回收，
    /// 之后的以图搜图仍会扫描到它们并在映射条目时丢弃，因此结果数量可能少于 k。
    pub async fn add_entries(&self, batch: &[(NewEntry, Array3<f32>)]) -> Result<Vec<i64>> {
        if batch.is_empty() {
            return Ok(vec![]);
        }
        let indices = self.store().append_batch(batch.iter().map(|(_, hist)| hist.view()))?;
        debug!("写入特征: {:?}", indices);

        match self.insert_entries(batch, indices.clone()).await {
            Ok(ids) => Ok(ids),
            Err(e) => {
                error!("写入元数据失败, 特征 {:?} 没有对应的条目: {}", indices, e);
                Err(e)
            }
        }
    }

    async fn insert_entries(&self, batch: &[(NewEntry, Array3<f32>)], indices: Range<u64>) -> Result<Vec<i64>> {
        let mut tx = self.db.begin().await?;
        let mut ids = Vec::with_capacity(batch.len());
        for ((entry, _), index) in batch.iter().zip(indices) {
            ids.push(crud::add_entry(&mut *tx, entry, index).await?);
        }
        tx.commit().await?;
        Ok(ids)
    }

    /// 根据 ID 获取条目
    pub fn entry(&self, id: i64) -> Result<Arc<Entry>> {
        self.catalog().get(id).ok_or_else(|| Error::NotFound(format!("条目 {id}")))
    }

    /// 按标签和描述进行 token 查询
    pub fn text_query(&self, query: &str, subset: &[i64]) -> Vec<Arc<Entry>> {
        let start = Instant::now();
        let catalog = self.catalog();
        let entries = filter_by_ids(catalog.all_entries().to_vec(), subset, |e| e.id);
        let result = filter_by_tokens(query, entries);
        self.observe(QueryKind::Text, start, result.len());
        result
    }

    /// 按描述文本的语义相似度查询
    ///
    /// 有子集过滤时先对全部语料排序，再进行过滤
    pub fn embedding_query(&self, query: &str, subset: &[i64], top_n: usize) -> Vec<Match> {
        let start = Instant::now();
        let catalog = self.catalog();
        let top_n = if subset.is_empty() { top_n } else { catalog.len() };
        let entries = catalog.all_entries();
        let ranked = catalog
            .captions()
            .search(self.encoder.as_ref(), query, top_n)
            .into_iter()
            .map(|(i, score)| Match { entry: entries[i].clone(), score })
            .collect::<Vec<_>>();
        let result = filter_by_ids(ranked, subset, |m| m.entry.id);
        self.observe(QueryKind::Embedding, start, result.len());
        result
    }

    /// 以图搜图，`subset` 为空时在全部条目中检索
    pub fn image_query(&self, image: &[u8], k: usize, subset: &[i64]) -> Result<Vec<Match>> {
        let start = Instant::now();
        let catalog = self.catalog();
        let candidates = (!subset.is_empty()).then_some(subset);
        let result = self.engine.query_by_image(catalog.as_ref(), image, k, candidates)?;
        self.observe(QueryKind::Image, start, result.len());
        Ok(result)
    }

    /// 使用已经计算好的直方图检索，可以不带掩码通道
    pub fn histogram_query(&self, query: ArrayView3<f32>, k: usize, subset: &[i64]) -> Result<Vec<Match>> {
        let start = Instant::now();
        let catalog = self.catalog();
        let candidates = (!subset.is_empty()).then_some(subset);
        let result = self.engine.query_by_histogram(catalog.as_ref(), query, k, candidates)?;
        self.observe(QueryKind::Image, start, result.len());
        Ok(result)
    }

    /// 查找与某个条目相似的条目
    pub fn similar(&self, id: i64, k: usize) -> Result<Vec<Match>> {
        let start = Instant::now();
        let catalog = self.catalog();
        let entry = catalog.get(id).ok_or_else(|| Error::NotFound(format!("条目 {id}")))?;
        let result = self.engine.query_similar(catalog.as_ref(), &entry, k)?;
        self.observe(QueryKind::Similar, start, result.len());
        Ok(result)
    }

    pub fn movie_clips(&self, movie: &str) -> Vec<Arc<Entry>> {
        self.catalog().movie_clips(movie)
    }

    pub fn labels(&self) -> Vec<String> {
        self.catalog().labels()
    }

    /// 只有元数据中存在的截图才允许访问
    pub fn thumbnail_known(&self, path: &str) -> bool {
        self.catalog().has_thumbnail(path)
    }

    pub fn bookmarks(&self) -> Arc<Vec<Arc<Entry>>> {
        self.bookmarks.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// 整体替换收藏列表，不存在的 ID 会被忽略
    pub fn update_bookmarks(&self, ids: &[i64]) -> usize {
        let bookmarks = self.catalog().lookup_by_ids(ids);
        let len = bookmarks.len();
        *self.bookmarks.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(bookmarks);
        len
    }

    pub async fn info(&self) -> Result<FrameDBInfo> {
        Ok(FrameDBInfo {
            header: *self.store().header(),
            vectors: self.store().len()?,
            entries: crud::count_entries(&self.db).await?,
        })
    }

    /// 导出全部直方图
    pub fn export(&self) -> Result<Array4<f32>> {
        self.store().export()
    }

    fn observe(&self, kind: QueryKind, start: Instant, results: usize) {
        let elapsed = start.elapsed().as_secs_f32();
        debug!("{:?} 查询: {} 条结果, 耗时 {:.2}ms", kind, results, elapsed * 1000.);
        observe_query(kind, elapsed, results);
    }
}
