//! 影像分类服务接口

use async_trait::async_trait;
use oct_core::Result;

/// 一次分类调用的输出
#[derive(Debug, Clone)]
pub struct Classification {
    pub label: String,
    pub findings: String,
    /// 标注后的处理图，服务未生成时为空
    pub processed_image: Option<Vec<u8>>,
}

/// 影像分类服务
///
/// 输入为已存储影像的可解析位置；调用方在当前请求内同步等待结果，
/// 失败由调用方决定回滚范围。
#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    async fn classify(&self, image_location: &str) -> Result<Classification>;
}
