use std::sync::Arc;

use super::submit::SubmitClient;
use crate::FrameDB;
use crate::cli::server::ServerCommand;
use crate::config::SearchOptions;
use crate::error::Result;

/// 应用状态
pub struct AppState {
    /// 检索入口
    pub db: FrameDB,
    /// 搜索配置选项
    pub search: SearchOptions,
    /// 鉴权 token
    pub token: String,
    /// 未配置提交服务器时为 `None`
    pub submit: Option<SubmitClient>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(db: FrameDB, opts: ServerCommand) -> Result<Arc<Self>> {
        let submit = match &opts.submit_server {
            Some(server) => Some(SubmitClient::new(server, opts.member.clone())?),
            None => None,
        };
        Ok(Arc::new(AppState { db, search: opts.search, token: opts.token, submit }))
    }
}
