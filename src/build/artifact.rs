use crate::build::incremental::hash_bytes;
use crate::error::BuildError;
use crate::storage::{ArtifactCategory, Storage, WriteRequest};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// 一次产物写入
#[derive(Debug, Clone)]
pub struct ArtifactWrite {
    pub path: PathBuf,
    pub content: Vec<u8>,
    pub category: ArtifactCategory,
    pub locale: Option<String>,
    pub content_type: Option<String>,
    pub checksum: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl ArtifactWrite {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<Vec<u8>>, category: ArtifactCategory) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            category,
            locale: None,
            content_type: None,
            checksum: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_owned(), value.into());
        self
    }
}

/// 写入回执；dry run 时 `written` 为 false
#[derive(Debug, Clone)]
pub struct WriteReceipt {
    pub path: PathBuf,
    pub checksum: String,
    pub size: usize,
    pub written: bool,
}

/// Storage 之上的产物写入层：计算校验和、记忆已创建目录、支持 dry run
pub struct ArtifactWriter {
    storage: Arc<dyn Storage>,
    dry_run: bool,
    /// 单次建目录加写入的时限
    timeout: Duration,
    ensured: Mutex<HashSet<PathBuf>>,
}

impl ArtifactWriter {
    pub fn new(storage: Arc<dyn Storage>, dry_run: bool) -> Self {
        Self {
            storage,
            dry_run,
            timeout: DEFAULT_WRITE_TIMEOUT,
            ensured: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn write_file(&self, artifact: ArtifactWrite) -> Result<WriteReceipt, BuildError> {
        let size = artifact.content.len();
        let category = artifact.category;
        let checksum = match artifact.checksum {
            Some(sum) if !sum.is_empty() => sum,
            _ => hash_bytes(&artifact.content),
        };

        if self.dry_run {
            tracing::debug!("[dry run] 跳过写入 {}", artifact.path.display());
            return Ok(WriteReceipt {
                path: artifact.path,
                checksum,
                size,
                written: false,
            });
        }

        let path = artifact.path.clone();
        let content_type = artifact
            .content_type
            .unwrap_or_else(|| content_type_for(&artifact.path).to_owned());
        let request = WriteRequest {
            path: artifact.path,
            body: artifact.content,
            size,
            category: artifact.category,
            locale: artifact.locale,
            content_type,
            checksum: checksum.clone(),
            metadata: artifact.metadata,
        };
        let store = async {
            if let Some(parent) = path.parent() {
                self.ensure_dir(parent).await?;
            }
            self.storage.write(request).await
        };
        match tokio::time::timeout(self.timeout, store).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                return Err(BuildError::StorageWrite { path, source });
            }
            Err(_) => {
                tracing::error!("写入 {} 超过 {:?}", path.display(), self.timeout);
                return Err(BuildError::StorageTimeout {
                    path,
                    timeout: self.timeout,
                });
            }
        }

        tracing::debug!("已写入 {} [{}]", path.display(), category);
        Ok(WriteReceipt {
            path,
            checksum,
            size,
            written: true,
        })
    }

    /// 每个目录在一次构建中最多创建一次
    async fn ensure_dir(&self, dir: &Path) -> Result<(), crate::storage::StorageError> {
        if dir.as_os_str().is_empty() {
            return Ok(());
        }
        let mut ensured = self.ensured.lock().await;
        if ensured.contains(dir) {
            return Ok(());
        }
        self.storage.ensure_dir(dir).await?;
        ensured.insert(dir.to_path_buf());
        Ok(())
    }
}

/// 根据扩展名推断 MIME 类型
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("xml") => "application/xml; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageOp};

    #[tokio::test]
    async fn test_write_computes_checksum_and_memoizes_dirs() {
        let storage = Arc::new(MemoryStorage::new());
        let writer = ArtifactWriter::new(storage.clone(), false);

        let receipt = writer
            .write_file(ArtifactWrite::new("public/a/index.html", "a", ArtifactCategory::Page).locale("en"))
            .await
            .unwrap();
        writer
            .write_file(ArtifactWrite::new("public/a/feed.xml", "b", ArtifactCategory::Feed))
            .await
            .unwrap();

        assert!(receipt.written);
        assert_eq!(receipt.size, 1);
        assert_eq!(receipt.checksum, hash_bytes(b"a"));

        let ensures = storage
            .ops()
            .into_iter()
            .filter(|op| matches!(op, StorageOp::EnsureDir(_)))
            .count();
        assert_eq!(ensures, 1);
        assert_eq!(storage.writes(ArtifactCategory::Page), 1);
        assert_eq!(storage.writes(ArtifactCategory::Feed), 1);
    }

    #[tokio::test]
    async fn test_dry_run_skips_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let writer = ArtifactWriter::new(storage.clone(), true);
        let receipt = writer
            .write_file(ArtifactWrite::new("public/index.html", "x", ArtifactCategory::Page))
            .await
            .unwrap();
        assert!(!receipt.written);
        assert!(storage.ops().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_storage_write() {
        let storage = Arc::new(MemoryStorage::new());
        storage.fail_writes(true);
        let writer = ArtifactWriter::new(storage, false);
        let err = writer
            .write_file(ArtifactWrite::new("public/index.html", "x", ArtifactCategory::Page))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::StorageWrite { .. }));
        assert!(err.to_string().contains("storage write failed"));
    }

    #[tokio::test]
    async fn test_stalled_storage_times_out() {
        let storage = Arc::new(MemoryStorage::new());
        storage.stall_writes(true);
        let writer = ArtifactWriter::new(storage.clone(), false).with_timeout(Duration::from_millis(50));
        let err = writer
            .write_file(ArtifactWrite::new("public/index.html", "x", ArtifactCategory::Page))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::StorageTimeout { .. }));
        assert!(err.to_string().contains("timed out"));
        assert_eq!(storage.writes(ArtifactCategory::Page), 0);
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a/site.CSS")), "text/css; charset=utf-8");
        assert_eq!(content_type_for(Path::new("robots.txt")), "text/plain; charset=utf-8");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }
}
