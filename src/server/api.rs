use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::{Form, Json};
use axum_auth::AuthBearer;
use axum_typed_multipart::TypedMultipart;
use image::ImageFormat;
use log::{debug, info};
use tokio::task::block_in_place;

use super::error::{AppError, Result};
use super::state::AppState;
use super::types::*;
use crate::error::Error;

/// 文本查询
///
/// `embedding` 为 false 时按标签和描述进行 token 查询，否则按描述文本的语义相似度排序
#[utoipa::path(
    post,
    path = "/query",
    request_body = QueryRequest,
    responses(
        (status = 200, body = Vec<EntryDto>),
    )
)]
pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<QueryRequest>,
) -> Result<Json<Vec<EntryDto>>> {
    let subset = subquery_ids(&data.subquery);
    info!("文本查询: {:?}, 语义 = {}, 子集 {} 条", data.query, data.embedding, subset.len());

    let result: Vec<EntryDto> = block_in_place(|| {
        if data.embedding {
            state
                .db
                .embedding_query(&data.query, &subset, state.search.top_n)
                .iter()
                .map(EntryDto::from)
                .collect()
        } else {
            state.db.text_query(&data.query, &subset).iter().map(|e| EntryDto::from(e.as_ref())).collect()
        }
    });
    Ok(Json(result))
}

/// 以图搜图
///
/// 接受 multipart 上传的图片文件，或者表单中 base64 编码的 `imageBase64` 字段
#[utoipa::path(
    post,
    path = "/query-image",
    request_body(content(
        (QueryImageForm = "multipart/form-data"),
        (QueryImageBase64Form = "application/x-www-form-urlencoded")
    )),
    responses(
        (status = 200, body = Vec<EntryDto>),
        (status = 400, description = "图片无法解码或没有有效像素"),
    )
)]
pub async fn query_image_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Vec<EntryDto>>> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let (image, subquery) = if is_multipart {
        let TypedMultipart(data) = TypedMultipart::<QueryImageRequest>::from_request(request, &state)
            .await
            .map_err(|e| Error::BadRequest(e.to_string()))?;
        (data.file, data.subquery)
    } else {
        let Form(data) = Form::<QueryImageBase64Form>::from_request(request, &state)
            .await
            .map_err(|e| Error::BadRequest(e.body_text()))?;
        (Bytes::from(decode_data_url(&data.image_base64)?), data.subquery)
    };
    let subset = parse_subquery(subquery.as_deref())?;
    info!("正在搜索上传图片: {} 字节, 子集 {} 条", image.len(), subset.len());

    let result = block_in_place(|| state.db.image_query(&image, state.search.count, &subset))?;
    Ok(Json(result.iter().map(EntryDto::from).collect()))
}

/// 查找与指定条目相似的条目
#[utoipa::path(
    post,
    path = "/similar",
    request_body = SimilarRequest,
    responses(
        (status = 200, body = Vec<EntryDto>),
        (status = 404, description = "条目不存在"),
    )
)]
pub async fn similar_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<SimilarRequest>,
) -> Result<Json<Vec<EntryDto>>> {
    let result = block_in_place(|| state.db.similar(data.query.id, state.search.count))?;
    Ok(Json(result.iter().map(EntryDto::from).collect()))
}

/// 替换收藏列表
#[utoipa::path(post, path = "/update-bookmarks", request_body = BookmarksRequest)]
pub async fn update_bookmarks_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<BookmarksRequest>,
) -> Result<&'static str> {
    state.db.update_bookmarks(&data.bookmarks);
    Ok("OK")
}

/// 获取收藏列表
#[utoipa::path(
    get,
    path = "/get-bookmarks",
    responses(
        (status = 200, body = Vec<EntryDto>),
    )
)]
pub async fn get_bookmarks_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<EntryDto>>> {
    Ok(Json(state.db.bookmarks().iter().map(|e| EntryDto::from(e.as_ref())).collect()))
}

/// 获取某部电影的全部片段，按帧号排序
#[utoipa::path(
    post,
    path = "/get-movie-clips",
    request_body = MovieClipsRequest,
    responses(
        (status = 200, body = Vec<EntryDto>),
    )
)]
pub async fn movie_clips_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<MovieClipsRequest>,
) -> Result<Json<Vec<EntryDto>>> {
    let clips = state.db.movie_clips(&data.query.location.movie);
    Ok(Json(clips.iter().map(|e| EntryDto::from(e.as_ref())).collect()))
}

/// 获取全部标签
#[utoipa::path(
    get,
    path = "/labels",
    responses(
        (status = 200, body = Vec<String>),
    )
)]
pub async fn labels_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.db.labels()))
}

/// 获取截图，路径中的 `/` 需要替换为 `|`
#[utoipa::path(
    get,
    path = "/screenshot/{file_path}",
    params(("file_path" = String, Path, description = "截图路径")),
    responses(
        (status = 200, content_type = "image/*"),
        (status = 404, description = "截图不存在"),
    )
)]
pub async fn screenshot_handler(
    State(state): State<Arc<AppState>>,
    Path(file_path): Path<String>,
) -> Result<impl IntoResponse> {
    let path = thumbnail_path(&file_path);
    if !state.db.thumbnail_known(&path) {
        return Err(Error::NotFound(format!("截图 {path}")).into());
    }
    let data = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AppError::from(Error::NotFound(format!("截图 {path}"))),
        _ => AppError::from(e),
    })?;
    let mime = ImageFormat::from_path(&path).map(|f| f.to_mime_type()).unwrap_or("application/octet-stream");
    Ok(([(header::CONTENT_TYPE, mime)], data))
}

/// 从数据库重新加载元数据
#[utoipa::path(
    post,
    path = "/reload",
    responses(
        (status = 200, body = ReloadResponse),
        (status = 401, description = "token 无效"),
    )
)]
pub async fn reload_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
) -> Result<impl IntoResponse> {
    if token != state.token {
        return Ok((StatusCode::UNAUTHORIZED, "invalid token").into_response());
    }
    let entries = state.db.reload().await?;
    Ok(Json(ReloadResponse { entries }).into_response())
}

/// 将选中的帧提交给评测服务器
#[utoipa::path(
    get,
    path = "/submit/{video}/{frame}",
    params(
        ("video" = String, Path, description = "电影名称"),
        ("frame" = i64, Path, description = "帧号"),
    ),
    responses(
        (status = 200, body = String),
        (status = 400, description = "未配置提交服务器"),
        (status = 502, description = "提交服务器请求失败"),
    )
)]
pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    Path((video, frame)): Path<(String, i64)>,
) -> Result<&'static str> {
    let client = state.submit.as_ref().ok_or_else(|| Error::BadRequest("未配置提交服务器".to_string()))?;
    let response = client.submit(&video, frame).await?;
    debug!("提交服务器响应: {response}");
    Ok("Submitted")
}
