use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;

use crate::error::Error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// API错误类型
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn status(&self) -> StatusCode {
        // 提交服务器的请求失败
        if self.0.is::<reqwest::Error>() {
            return StatusCode::BAD_GATEWAY;
        }
        match self.0.downcast_ref::<Error>() {
            Some(Error::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("请求处理失败: {:#}", self.0);
        }
        (status, self.0.to_string()).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Error::NotFound("条目 1".into()), StatusCode::NOT_FOUND)]
    #[case(Error::Decode("bad".into()), StatusCode::BAD_REQUEST)]
    #[case(Error::InvalidMask("empty".into()), StatusCode::BAD_REQUEST)]
    #[case(Error::shape_mismatch((1, 2, 3), (1, 2, 4)), StatusCode::BAD_REQUEST)]
    #[case(Error::BadRequest("form".into()), StatusCode::BAD_REQUEST)]
    #[case(Error::EmptyStore, StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(Error::StoreCorrupt("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_status(#[case] err: Error, #[case] status: StatusCode) {
        assert_eq!(AppError::from(err).status(), status);
    }

    #[test]
    fn test_other_errors() {
        let err = AppError::from(anyhow::anyhow!("boom"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        assert_eq!(AppError::from(err).status(), StatusCode::BAD_GATEWAY);
    }
}
