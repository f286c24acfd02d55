use std::time::Duration;

use log::info;
use reqwest::{Client, Url};

use crate::error::{Error, Result};

/// 将选中的帧提交给评测服务器
#[derive(Debug, Clone)]
pub struct SubmitClient {
    client: Client,
    server: Url,
    member: String,
}

impl SubmitClient {
    pub fn new(server: &str, member: impl Into<String>) -> Result<Self> {
        let server =
            Url::parse(server).map_err(|e| Error::InvalidConfig(format!("提交服务器地址无效: {server}: {e}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("无法创建 HTTP 客户端: {e}")))?;
        Ok(Self { client, server, member: member.into() })
    }

    /// `<server>?item=<video>&frame=<frame>&session=<member>`
    pub fn submit_url(&self, video: &str, frame: i64) -> Url {
        let mut url = self.server.clone();
        url.query_pairs_mut()
            .append_pair("item", video)
            .append_pair("frame", &frame.to_string())
            .append_pair("session", &self.member);
        url
    }

    /// 提交一帧，返回评测服务器的响应内容
    pub async fn submit(&self, video: &str, frame: i64) -> reqwest::Result<String> {
        let url = self.submit_url(video, frame);
        info!("提交结果: {url}");
        let response = self.client.get(url).send().await?.error_for_status()?;
        response.text().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_url() {
        let client = SubmitClient::new("http://vbs.local:8080/submit", "team-7").unwrap();
        assert_eq!(
            client.submit_url("movie 1", 240).as_str(),
            "http://vbs.local:8080/submit?item=movie+1&frame=240&session=team-7"
        );

        // 地址中已有的参数会被保留
        let client = SubmitClient::new("http://vbs.local/submit?round=2", "").unwrap();
        assert_eq!(client.submit_url("m", 0).as_str(), "http://vbs.local/submit?round=2&item=m&frame=0&session=");
    }

    #[test]
    fn test_invalid_server() {
        assert!(matches!(SubmitClient::new("not a url", "team-7"), Err(Error::InvalidConfig(_))));
    }
}
