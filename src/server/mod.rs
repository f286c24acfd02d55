mod api;
mod error;
mod state;
mod submit;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{MethodRouter, get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::state::*;
pub use self::submit::SubmitClient;
pub use self::types::{EntryDto, Location};

#[derive(OpenApi)]
#[openapi(
    paths(
        api::query_handler,
        api::query_image_handler,
        api::similar_handler,
        api::update_bookmarks_handler,
        api::get_bookmarks_handler,
        api::movie_clips_handler,
        api::labels_handler,
        api::screenshot_handler,
        api::reload_handler,
        api::submit_handler,
    ),
    components(schemas(
        types::EntryDto,
        types::Location,
        types::SubqueryItem,
        types::QueryRequest,
        types::QueryImageForm,
        types::QueryImageBase64Form,
        types::EntryId,
        types::SimilarRequest,
        types::BookmarksRequest,
        types::MovieQuery,
        types::MovieClipsRequest,
        types::ReloadResponse,
    ))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    let routes: Vec<(&str, MethodRouter<Arc<AppState>>)> = vec![
        ("/query", post(api::query_handler)),
        ("/query-image", post(api::query_image_handler)),
        ("/similar", post(api::similar_handler)),
        ("/update-bookmarks", post(api::update_bookmarks_handler)),
        ("/get-bookmarks", get(api::get_bookmarks_handler)),
        ("/get-movie-clips", post(api::movie_clips_handler)),
        ("/labels", get(api::labels_handler)),
        ("/reload", post(api::reload_handler)),
        ("/submit/{video}/{frame}", get(api::submit_handler)),
    ];

    // 同时接受带结尾斜杠的路径
    routes
        .into_iter()
        .fold(Router::new(), |router, (path, handler)| {
            router.route(path, handler.clone()).route(&format!("{path}/"), handler)
        })
        .route("/screenshot/{file_path}", get(api::screenshot_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        // 上传限制：10M
        .layer(RequestBodyLimitLayer::new(1024 * 1024 * 10))
        .with_state(state)
}
