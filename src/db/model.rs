use sqlx::FromRow;

use crate::error::{Error, Result};
use crate::model::Entry;

/// 条目记录
#[derive(Debug, Clone, FromRow)]
pub struct EntryRecord {
    /// 条目 ID
    pub id: i64,
    /// 特征库中的位置
    pub histogram_feature_index: i64,
    /// 所属电影
    pub movie_name: String,
    /// 帧号
    pub frame_pos: i64,
    /// 截图路径
    pub thumbnail_path: String,
    /// 描述文本
    pub caption: String,
    /// 标签，JSON 数组
    pub labels: String,
}

impl TryFrom<EntryRecord> for Entry {
    type Error = Error;

    fn try_from(record: EntryRecord) -> Result<Self> {
        let labels = serde_json::from_str(&record.labels)
            .map_err(|e| Error::StoreCorrupt(format!("条目 {} 的标签无法解析: {e}", record.id)))?;
        let histogram_feature_index = u64::try_from(record.histogram_feature_index).map_err(|_| {
            Error::StoreCorrupt(format!("条目 {} 的特征位置无效: {}", record.id, record.histogram_feature_index))
        })?;
        Ok(Entry {
            id: record.id,
            histogram_feature_index,
            movie_name: record.movie_name,
            frame_pos: record.frame_pos,
            thumbnail_path: record.thumbnail_path,
            caption: record.caption,
            labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(labels: &str, index: i64) -> EntryRecord {
        EntryRecord {
            id: 7,
            histogram_feature_index: index,
            movie_name: "movie".to_string(),
            frame_pos: 120,
            thumbnail_path: "thumbs/120.png".to_string(),
            caption: "a dog".to_string(),
            labels: labels.to_string(),
        }
    }

    #[test]
    fn test_into_entry() {
        let entry = Entry::try_from(record(r#"["dog","ball"]"#, 3)).unwrap();
        assert_eq!(entry.histogram_feature_index, 3);
        assert_eq!(entry.labels, vec!["dog", "ball"]);
    }

    #[test]
    fn test_invalid_record() {
        assert!(matches!(Entry::try_from(record("dog", 3)), Err(Error::StoreCorrupt(_))));
        assert!(matches!(Entry::try_from(record("[]", -1)), Err(Error::StoreCorrupt(_))));
    }
}
