mod fs;
mod memory;

pub use fs::FsStorage;
pub use memory::{MemoryStorage, StorageOp};

use crate::BoxFuture;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// 产物类别，随写入请求传给存储层
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactCategory {
    Page,
    Asset,
    Sitemap,
    Feed,
    Manifest,
}

impl ArtifactCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Asset => "asset",
            Self::Sitemap => "sitemap",
            Self::Feed => "feed",
            Self::Manifest => "manifest",
        }
    }
}

impl fmt::Display for ArtifactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{}：{source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("存储不可用：{0}")]
    Unavailable(String),

    #[error("非法路径：{}", .0.display())]
    InvalidPath(PathBuf),
}

#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub path: PathBuf,
    pub body: Vec<u8>,
    pub size: usize,
    pub category: ArtifactCategory,
    pub locale: Option<String>,
    pub content_type: String,
    pub checksum: String,
    pub metadata: BTreeMap<String, String>,
}

/// 产物存储后端，实现需支持并发调用
pub trait Storage: Send + Sync {
    fn ensure_dir<'a>(&'a self, path: &'a std::path::Path) -> BoxFuture<'a, Result<(), StorageError>>;

    fn write(&self, request: WriteRequest) -> BoxFuture<'_, Result<(), StorageError>>;

    /// 读取文件，不存在时返回 `Ok(None)`
    fn read<'a>(
        &'a self,
        path: &'a std::path::Path,
    ) -> BoxFuture<'a, Result<Option<Vec<u8>>, StorageError>>;

    /// 递归删除目录或文件，目标不存在视为成功
    fn remove<'a>(&'a self, path: &'a std::path::Path) -> BoxFuture<'a, Result<(), StorageError>>;
}
