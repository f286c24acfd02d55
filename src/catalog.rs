use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::embedding::{CaptionIndex, TextEncoder};
use crate::model::Entry;

/// 元数据查询接口
pub trait EntryLookup {
    /// 根据特征位置查询条目
    fn lookup_by_index(&self, index: u64) -> Option<Arc<Entry>>;

    /// 根据 ID 批量查询条目，不存在的 ID 会被忽略
    fn lookup_by_ids(&self, ids: &[i64]) -> Vec<Arc<Entry>>;

    /// 全部条目，顺序与 `all_captions` 一致
    fn all_entries(&self) -> &[Arc<Entry>];

    /// 全部描述文本
    fn all_captions(&self) -> Vec<&str> {
        self.all_entries().iter().map(|e| e.caption.as_str()).collect()
    }
}

/// 元数据快照
///
/// 启动时从数据库构建，之后只读；需要更新时整体重建并替换
pub struct Catalog {
    entries: Vec<Arc<Entry>>,
    by_index: HashMap<u64, Arc<Entry>>,
    by_id: HashMap<i64, Arc<Entry>>,
    captions: CaptionIndex,
}

impl Catalog {
    pub fn new(entries: Vec<Entry>, encoder: &dyn TextEncoder) -> Self {
        let entries = entries.into_iter().map(Arc::new).collect::<Vec<_>>();
        let by_index = entries.iter().map(|e| (e.histogram_feature_index, e.clone())).collect();
        let by_id = entries.iter().map(|e| (e.id, e.clone())).collect();
        let captions = CaptionIndex::build(encoder, &entries.iter().map(|e| e.caption.as_str()).collect::<Vec<_>>());
        Self { entries, by_index, by_id, captions }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<Arc<Entry>> {
        self.by_id.get(&id).cloned()
    }

    /// 某部电影的全部条目，按帧号排序
    pub fn movie_clips(&self, movie: &str) -> Vec<Arc<Entry>> {
        let mut clips =
            self.entries.iter().filter(|e| e.movie_name == movie).cloned().collect::<Vec<_>>();
        clips.sort_by_key(|e| e.frame_pos);
        clips
    }

    /// 所有出现过的标签，按字典序排列
    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().flat_map(|e| e.labels.iter().cloned()).collect::<BTreeSet<_>>().into_iter().collect()
    }

    /// 是否存在使用该截图路径的条目
    pub fn has_thumbnail(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e.thumbnail_path == path)
    }

    /// 描述文本向量
    pub fn captions(&self) -> &CaptionIndex {
        &self.captions
    }
}

impl EntryLookup for Catalog {
    fn lookup_by_index(&self, index: u64) -> Option<Arc<Entry>> {
        self.by_index.get(&index).cloned()
    }

    fn lookup_by_ids(&self, ids: &[i64]) -> Vec<Arc<Entry>> {
        ids.iter().filter_map(|id| self.get(*id)).collect()
    }

    fn all_entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }
}
