use super::{ArtifactCategory, Storage, StorageError, WriteRequest};
use crate::BoxFuture;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// 存储调用记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    EnsureDir(PathBuf),
    Write {
        path: PathBuf,
        category: ArtifactCategory,
        locale: Option<String>,
        checksum: String,
    },
    Read(PathBuf),
    Remove(PathBuf),
}

/// 内存存储：保存文件内容并记录每一次调用
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    ops: Mutex<Vec<StorageOp>>,
    fail_writes: AtomicBool,
    stall_writes: AtomicBool,
    stall_reads: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的所有写入都返回 `Unavailable`
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 之后的建目录与写入永不完成
    pub fn stall_writes(&self, stall: bool) {
        self.stall_writes.store(stall, Ordering::SeqCst);
    }

    /// 之后的读取永不完成
    pub fn stall_reads(&self, stall: bool) {
        self.stall_reads.store(stall, Ordering::SeqCst);
    }

    pub fn ops(&self) -> Vec<StorageOp> {
        lock(&self.ops).clone()
    }

    pub fn clear_ops(&self) {
        lock(&self.ops).clear();
    }

    /// 指定类别的写入次数
    pub fn writes(&self, category: ArtifactCategory) -> usize {
        lock(&self.ops)
            .iter()
            .filter(|op| matches!(op, StorageOp::Write { category: c, .. } if *c == category))
            .count()
    }

    pub fn removes(&self) -> Vec<PathBuf> {
        lock(&self.ops)
            .iter()
            .filter_map(|op| match op {
                StorageOp::Remove(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        lock(&self.files)
            .get(path.as_ref())
            .map(|data| String::from_utf8_lossy(data).into_owned())
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        lock(&self.files).keys().cloned().collect()
    }
}

impl Storage for MemoryStorage {
    fn ensure_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            if self.stall_writes.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            lock(&self.ops).push(StorageOp::EnsureDir(path.to_path_buf()));
            Ok(())
        })
    }

    fn write(&self, request: WriteRequest) -> BoxFuture<'_, Result<(), StorageError>> {
        Box::pin(async move {
            if self.stall_writes.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("写入已禁用".into()));
            }
            lock(&self.ops).push(StorageOp::Write {
                path: request.path.clone(),
                category: request.category,
                locale: request.locale.clone(),
                checksum: request.checksum.clone(),
            });
            lock(&self.files).insert(request.path, request.body);
            Ok(())
        })
    }

    fn read<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Option<Vec<u8>>, StorageError>> {
        Box::pin(async move {
            if self.stall_reads.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            lock(&self.ops).push(StorageOp::Read(path.to_path_buf()));
            Ok(lock(&self.files).get(path).cloned())
        })
    }

    fn remove<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            lock(&self.ops).push(StorageOp::Remove(path.to_path_buf()));
            lock(&self.files).retain(|p, _| !p.starts_with(path));
            Ok(())
        })
    }
}
