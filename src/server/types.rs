use axum::body::Bytes;
use axum_typed_multipart::TryFromMultipart;
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::Error;
use crate::model::Entry;
use crate::retrieval::Match;

/// 条目在视频中的位置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    /// 电影名称
    pub movie: String,
    /// 帧号
    #[serde(default)]
    pub frame_pos: i64,
}

/// 返回给前端的条目
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EntryDto {
    pub id: i64,
    pub location: Location,
    /// 截图地址
    pub thumbnail: String,
    pub caption: String,
    pub labels: Vec<String>,
    /// 图片查询为距离（越小越相似），语义查询为余弦相似度（越大越相似）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl From<&Entry> for EntryDto {
    fn from(entry: &Entry) -> Self {
        Self {
            id: entry.id,
            location: Location { movie: entry.movie_name.clone(), frame_pos: entry.frame_pos },
            thumbnail: thumbnail_url(&entry.thumbnail_path),
            caption: entry.caption.clone(),
            labels: entry.labels.clone(),
            score: None,
        }
    }
}

impl From<&Match> for EntryDto {
    fn from(m: &Match) -> Self {
        Self { score: Some(m.score), ..Self::from(m.entry.as_ref()) }
    }
}

/// 截图路径中的 `/` 替换为 `|`，使其可以作为单个路径参数
pub fn thumbnail_url(path: &str) -> String {
    format!("/screenshot/{}", path.replace('/', "|"))
}

/// `thumbnail_url` 的逆操作
pub fn thumbnail_path(param: &str) -> String {
    param.replace('|', "/")
}

/// 子集中的一项，可以是条目 ID，也可以是带有 `id` 字段的条目
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum SubqueryItem {
    Id(i64),
    Entry { id: i64 },
}

impl SubqueryItem {
    pub fn id(self) -> i64 {
        match self {
            Self::Id(id) | Self::Entry { id } => id,
        }
    }
}

pub fn subquery_ids(items: &[SubqueryItem]) -> Vec<i64> {
    items.iter().map(|item| item.id()).collect()
}

/// 解析表单中 JSON 格式的子集，空字符串和 `null` 表示不做限制
pub fn parse_subquery(raw: Option<&str>) -> Result<Vec<i64>, Error> {
    match raw.map(str::trim) {
        Some(s) if !s.is_empty() && s != "null" => {
            let items = serde_json::from_str::<Vec<SubqueryItem>>(s)
                .map_err(|e| Error::BadRequest(format!("无法解析子集: {e}")))?;
            Ok(subquery_ids(&items))
        }
        _ => Ok(vec![]),
    }
}

/// 解码 `data:image/...;base64,` 形式的图片，也接受不带前缀的 base64
pub fn decode_data_url(data: &str) -> Result<Vec<u8>, Error> {
    let data = data.trim();
    let payload = match data.strip_prefix("data:") {
        Some(rest) => {
            rest.split_once(";base64,").map(|(_, payload)| payload).ok_or_else(|| {
                Error::BadRequest("图片应为 base64 编码的 data URL".to_string())
            })?
        }
        None => data,
    };
    BASE64_STANDARD.decode(payload).map_err(|e| Error::BadRequest(format!("base64 解码失败: {e}")))
}

/// 文本查询请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryRequest {
    /// 查询字符串，token 查询时使用逗号分隔
    pub query: String,
    /// 只在这些条目中查询，为空时不做限制
    #[serde(default)]
    pub subquery: Vec<SubqueryItem>,
    /// 是否使用语义查询
    #[serde(default)]
    pub embedding: bool,
}

/// 以图搜图请求
#[derive(TryFromMultipart)]
pub struct QueryImageRequest {
    pub file: Bytes,
    pub subquery: Option<String>,
}

/// 以图搜图请求，图片为 base64 编码的 data URL
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryImageBase64Form {
    /// 例如 `data:image/png;base64,iVBORw0...`
    #[serde(rename = "imageBase64")]
    pub image_base64: String,
    /// JSON 格式的子集，例如 `[1, 2, {"id": 3}]`
    #[serde(default)]
    pub subquery: Option<String>,
}

/// 以图搜图表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct QueryImageForm {
    /// 上传的图片，透明或纯黑的像素视为背景
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// JSON 格式的子集，例如 `[1, 2, {"id": 3}]`
    pub subquery: Option<String>,
}

/// 条目 ID
#[derive(Debug, Deserialize, ToSchema)]
pub struct EntryId {
    pub id: i64,
}

/// 相似条目查询请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct SimilarRequest {
    pub query: EntryId,
}

/// 更新收藏请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct BookmarksRequest {
    pub bookmarks: Vec<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MovieQuery {
    pub location: Location,
}

/// 电影片段查询请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct MovieClipsRequest {
    pub query: MovieQuery,
}

/// 重新加载的结果
#[derive(Debug, Serialize, ToSchema)]
pub struct ReloadResponse {
    /// 加载的条目数量
    pub entries: usize,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn entry() -> Entry {
        Entry {
            id: 3,
            histogram_feature_index: 8,
            movie_name: "movie".to_string(),
            frame_pos: 240,
            thumbnail_path: "data/thumbs/movie/240.png".to_string(),
            caption: "a cat".to_string(),
            labels: vec!["cat".to_string()],
        }
    }

    #[test]
    fn test_entry_dto() {
        let dto = EntryDto::from(&entry());
        assert_eq!(dto.thumbnail, "/screenshot/data|thumbs|movie|240.png");
        assert_eq!(thumbnail_path("data|thumbs|movie|240.png"), entry().thumbnail_path);

        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["location"]["movie"], "movie");
        assert_eq!(json["location"]["frame_pos"], 240);
        assert!(json.get("score").is_none());

        let dto = EntryDto::from(&Match { entry: Arc::new(entry()), score: 0.25 });
        assert_eq!(serde_json::to_value(&dto).unwrap()["score"], 0.25);
    }

    #[test]
    fn test_subquery() {
        let req: QueryRequest =
            serde_json::from_str(r#"{"query": "cat", "subquery": [1, {"id": 2, "caption": "x"}]}"#).unwrap();
        assert_eq!(subquery_ids(&req.subquery), vec![1, 2]);
        assert!(!req.embedding);

        let req: MovieClipsRequest =
            serde_json::from_str(r#"{"query": {"id": 1, "location": {"movie": "m"}}}"#).unwrap();
        assert_eq!(req.query.location.movie, "m");
    }

    #[test]
    fn test_parse_subquery() {
        assert!(parse_subquery(None).unwrap().is_empty());
        assert!(parse_subquery(Some(" null ")).unwrap().is_empty());
        assert!(parse_subquery(Some("")).unwrap().is_empty());
        assert_eq!(parse_subquery(Some(r#"[4, {"id": 7, "thumbnail": "x"}]"#)).unwrap(), vec![4, 7]);
        assert!(matches!(parse_subquery(Some("[oops")), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_decode_data_url() {
        let encoded = BASE64_STANDARD.encode(b"\x89PNG");
        assert_eq!(decode_data_url(&format!("data:image/png;base64,{encoded}")).unwrap(), b"\x89PNG");
        assert_eq!(decode_data_url(&format!("data:image/jpeg;base64,{encoded}\n")).unwrap(), b"\x89PNG");
        assert_eq!(decode_data_url(&encoded).unwrap(), b"\x89PNG");
        assert!(matches!(decode_data_url("data:image/png,raw"), Err(Error::BadRequest(_))));
        assert!(matches!(decode_data_url("data:image/png;base64,@@@"), Err(Error::BadRequest(_))));
    }
}
