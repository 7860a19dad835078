//! Feed 索引错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedIndexError {
    #[error("无效的属性: {attribute} 在 store {store_id} 的商品目录中不存在")]
    InvalidAttribute { attribute: String, store_id: i64 },

    #[error("条件树格式错误: {0}")]
    MalformedConditions(String),

    #[error("store 不存在: {0}")]
    ScopeNotFound(i64),

    #[error("持久化失败: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("feed 不存在: {0}")]
    FeedNotFound(i64),

    #[error("无效的操作符: 属性 {attribute} 不支持 {operator}")]
    UnsupportedOperator { attribute: String, operator: String },

    #[error("类型不匹配: 属性 {attribute} 期望 {expected}, 实际 {actual}")]
    ValueTypeMismatch {
        attribute: String,
        expected: String,
        actual: String,
    },
}

pub type Result<T> = std::result::Result<T, FeedIndexError>;

impl FeedIndexError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAttribute { .. } => "INVALID_ATTRIBUTE",
            Self::MalformedConditions(_) => "MALFORMED_CONDITIONS",
            Self::ScopeNotFound(_) => "SCOPE_NOT_FOUND",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::FeedNotFound(_) => "FEED_NOT_FOUND",
            Self::UnsupportedOperator { .. } => "UNSUPPORTED_OPERATOR",
            Self::ValueTypeMismatch { .. } => "VALUE_TYPE_MISMATCH",
        }
    }

    /// 是否为可重试错误
    ///
    /// 只有持久化失败可以重试，且调用方需要重试整个 update_index 调用。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}
