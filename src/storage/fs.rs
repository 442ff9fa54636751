use super::{Storage, StorageError, WriteRequest};
use crate::BoxFuture;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// 本地文件系统存储；相对路径以 `root` 为基准
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf, StorageError> {
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(StorageError::InvalidPath(path.to_path_buf()));
        }
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.root.join(path))
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl Storage for FsStorage {
    fn ensure_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let full = self.resolve(path)?;
            tokio::fs::create_dir_all(&full)
                .await
                .map_err(io_error(&full))
        })
    }

    fn write(&self, request: WriteRequest) -> BoxFuture<'_, Result<(), StorageError>> {
        Box::pin(async move {
            let full = self.resolve(&request.path)?;
            if let Some(parent) = full.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(io_error(parent))?;
            }
            tokio::fs::write(&full, &request.body)
                .await
                .map_err(io_error(&full))?;
            tracing::debug!(
                "已写入 {} [{}] {} 字节",
                full.display(),
                request.category,
                request.size
            );
            Ok(())
        })
    }

    fn read<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Option<Vec<u8>>, StorageError>> {
        Box::pin(async move {
            let full = self.resolve(path)?;
            match tokio::fs::read(&full).await {
                Ok(data) => Ok(Some(data)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(io_error(&full)(e)),
            }
        })
    }

    fn remove<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let full = self.resolve(path)?;
            let meta = match tokio::fs::metadata(&full).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(io_error(&full)(e)),
            };
            let result = if meta.is_dir() {
                tokio::fs::remove_dir_all(&full).await
            } else {
                tokio::fs::remove_file(&full).await
            };
            result.map_err(io_error(&full))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ArtifactCategory;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn request(path: &str, body: &str) -> WriteRequest {
        WriteRequest {
            path: PathBuf::from(path),
            body: body.as_bytes().to_vec(),
            size: body.len(),
            category: ArtifactCategory::Page,
            locale: None,
            content_type: "text/html; charset=utf-8".into(),
            checksum: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_write_read_remove() {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path());

        storage
            .write(request("public/about/index.html", "<h1>About</h1>"))
            .await
            .unwrap();
        let data = storage
            .read(Path::new("public/about/index.html"))
            .await
            .unwrap();
        assert_eq!(data.as_deref(), Some("<h1>About</h1>".as_bytes()));

        storage.remove(Path::new("public")).await.unwrap();
        assert!(!tmp.path().join("public").exists());
        // 再次删除不存在的目录
        storage.remove(Path::new("public")).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_returns_none() {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path());
        assert!(storage.read(Path::new("nope.json")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_parent_dir_rejected() {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path());
        let err = storage
            .write(request("../escape.html", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
    }
}
