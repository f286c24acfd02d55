use thiserror::Error;

/// framesearch 的错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// 向量形状与特征库不一致
    #[error("向量形状不匹配: 期望 {expected}, 实际 {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// 特征库损坏，或者与当前配置不兼容
    #[error("特征库损坏: {0}")]
    StoreCorrupt(String),

    /// 访问了不存在的特征位置
    #[error("特征索引越界: {index} (共 {len} 个)")]
    IndexOutOfRange { index: u64, len: u64 },

    /// 特征库为空
    #[error("特征库为空")]
    EmptyStore,

    /// 查询掩码无效，例如全部为 0
    #[error("无效的掩码: {0}")]
    InvalidMask(String),

    /// 图片解码失败
    #[error("图片解码失败: {0}")]
    Decode(String),

    /// 元数据中找不到对应记录
    #[error("未找到: {0}")]
    NotFound(String),

    /// 请求内容无法解析
    #[error("无效的请求: {0}")]
    BadRequest(String),

    /// 配置参数不合法
    #[error("无效的配置: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Lmdb(#[from] heed::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn shape_mismatch(expected: impl std::fmt::Debug, actual: impl std::fmt::Debug) -> Self {
        Self::ShapeMismatch { expected: format!("{expected:?}"), actual: format!("{actual:?}") }
    }

    /// 是否为查询参数导致的错误，这类错误应当以 4xx 的形式返回给调用方
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Decode(_)
                | Self::InvalidMask(_)
                | Self::ShapeMismatch { .. }
                | Self::InvalidConfig(_)
                | Self::BadRequest(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
