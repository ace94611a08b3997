//! 媒体文件存储管理

use oct_core::utils::generate_storage_name;
use oct_core::Result;
use std::path::{Path, PathBuf};

/// 媒体存储管理器
///
/// 文件按类别子目录存放，库内只记录相对路径；
/// 公开URL由配置的基础地址在出口处解析，空引用保持为空。
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    base_url: String,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    /// 存储文件，返回媒体库内相对路径
    pub async fn store(&self, category: &str, original_name: &str, data: &[u8]) -> Result<String> {
        let relative = format!("{}/{}", category, generate_storage_name(original_name));
        let full_path = self.root.join(&relative);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&full_path, data).await?;
        tracing::debug!("Stored media file at {}", relative);
        Ok(relative)
    }

    /// 读取文件
    pub async fn load(&self, relative: &str) -> Result<Vec<u8>> {
        let full_path = self.root.join(relative);
        let data = tokio::fs::read(full_path).await?;
        Ok(data)
    }

    /// 解析相对路径的公开URL
    pub fn url_for(&self, relative: Option<&str>) -> Option<String> {
        relative.map(|path| format!("{}/{}", self.base_url.trim_end_matches('/'), path))
    }

    /// 媒体库根目录，用于挂载静态文件服务
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path(), "http://localhost:8080/media");

        let relative = store.store("oct_scans", "scan.png", b"fake png").await.unwrap();
        assert!(relative.starts_with("oct_scans/"));
        assert!(relative.ends_with("scan.png"));

        let data = store.load(&relative).await.unwrap();
        assert_eq!(data, b"fake png");
    }

    #[tokio::test]
    async fn test_same_name_does_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path(), "http://localhost:8080/media");

        let first = store.store("oct_scans", "scan.png", b"one").await.unwrap();
        let second = store.store("oct_scans", "scan.png", b"two").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.load(&first).await.unwrap(), b"one");
        assert_eq!(store.load(&second).await.unwrap(), b"two");
    }

    #[test]
    fn test_url_resolution() {
        let store = MediaStore::new("/srv/media", "http://localhost:8080/media/");

        assert_eq!(
            store.url_for(Some("profile_pics/a.png")),
            Some("http://localhost:8080/media/profile_pics/a.png".to_string())
        );
        assert_eq!(store.url_for(None), None);
    }
}
