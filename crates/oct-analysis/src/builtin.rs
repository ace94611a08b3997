//! 内置占位分类器
//!
//! 未配置远程分类服务时使用，给出确定性的保守结论，保证上传流程
//! 始终产出带标签与所见描述的分析结果。

use crate::oracle::{Classification, ClassificationOracle};
use async_trait::async_trait;
use oct_core::Result;

pub struct BuiltinClassifier;

#[async_trait]
impl ClassificationOracle for BuiltinClassifier {
    async fn classify(&self, image_location: &str) -> Result<Classification> {
        tracing::warn!("No classification endpoint configured, using builtin classifier");

        Ok(Classification {
            label: "pending_review".to_string(),
            findings: format!(
                "Automated classification is not configured. Image stored at {} awaits manual review.",
                image_location
            ),
            processed_image: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builtin_classifier_is_deterministic() {
        let classifier = BuiltinClassifier;

        let first = classifier.classify("oct_scans/a.png").await.unwrap();
        let second = classifier.classify("oct_scans/a.png").await.unwrap();

        assert_eq!(first.label, second.label);
        assert_eq!(first.findings, second.findings);
        assert!(first.processed_image.is_none());
    }

    #[tokio::test]
    async fn test_builtin_classifier_fills_required_fields() {
        let classification = BuiltinClassifier.classify("oct_scans/b.png").await.unwrap();

        // 上传流程要求分类与所见描述都非空
        assert!(!classification.label.is_empty());
        assert!(!classification.findings.is_empty());
    }
}
