//! 远程分类服务客户端

use crate::oracle::{Classification, ClassificationOracle};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use oct_core::{OctError, Result};
use serde::{Deserialize, Serialize};

/// 远程分类请求体
#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    image_location: &'a str,
}

/// 远程分类响应体，处理图以base64编码传输
#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    classification: String,
    findings: String,
    processed_image: Option<String>,
}

/// 远程分类服务客户端
pub struct RemoteClassifier {
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteClassifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ClassificationOracle for RemoteClassifier {
    async fn classify(&self, image_location: &str) -> Result<Classification> {
        tracing::debug!("Requesting classification for {}", image_location);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ClassifyRequest { image_location })
            .send()
            .await
            .map_err(|e| OctError::Analysis(format!("classification request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(OctError::Analysis(format!(
                "classification service returned status {}",
                response.status()
            )));
        }

        let body: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| OctError::Analysis(format!("invalid classification response: {}", e)))?;

        let processed_image = body
            .processed_image
            .map(|encoded| {
                general_purpose::STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                    OctError::Analysis(format!("invalid processed image encoding: {}", e))
                })
            })
            .transpose()?;

        Ok(Classification {
            label: body.classification,
            findings: body.findings,
            processed_image,
        })
    }
}
