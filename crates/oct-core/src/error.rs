//! 错误定义模块

use thiserror::Error;

/// OCT系统统一错误类型
#[derive(Error, Debug)]
pub enum OctError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("验证错误: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("冲突错误: {field}: {message}")]
    Conflict { field: String, message: String },

    #[error("认证错误: {0}")]
    Unauthorized(String),

    #[error("权限错误: {0}")]
    Forbidden(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("影像分析错误: {0}")]
    Analysis(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl OctError {
    /// 携带字段名的验证错误
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        OctError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 携带字段名的冲突错误
    pub fn conflict(field: impl Into<String>, message: impl Into<String>) -> Self {
        OctError::Conflict {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// OCT系统统一结果类型
pub type Result<T> = std::result::Result<T, OctError>;
