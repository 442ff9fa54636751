use crate::error::BuildError;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

pub const MANIFEST_VERSION: u32 = 1;

/// 计算任意字节数据的 SHA-256 哈希（十六进制）
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub fn page_key(page_id: &str, locale: &str) -> String {
    format!("{page_id}:{locale}")
}

/// 构建清单：上一次成功构建的页面与资源哈希
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    #[serde(default)]
    pub build_id: Option<String>,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    /// "{page}:{locale}" → 条目
    #[serde(default)]
    pub pages: BTreeMap<String, ManifestEntry>,
    /// 输出路径 → 条目
    #[serde(default)]
    pub assets: BTreeMap<String, AssetEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub page_id: String,
    pub locale_code: String,
    pub hash: String,
    pub output_path: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub hash: String,
    pub updated_at: DateTime<Utc>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            build_id: None,
            generated_at: None,
            pages: BTreeMap::new(),
            assets: BTreeMap::new(),
        }
    }
}

impl Manifest {
    /// 通过存储读取清单，不存在或无法解析时返回空表
    ///
    /// 读取超过 `timeout` 返回 `StorageTimeout`。
    pub async fn load(storage: &dyn Storage, path: &Path, timeout: Duration) -> Result<Self, BuildError> {
        let read = match tokio::time::timeout(timeout, storage.read(path)).await {
            Ok(read) => read,
            Err(_) => {
                return Err(BuildError::StorageTimeout {
                    path: path.to_path_buf(),
                    timeout,
                });
            }
        };
        let data = match read {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!("构建清单不存在：{}", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                tracing::warn!("读取构建清单失败，按全量构建处理：{e}");
                return Ok(Self::default());
            }
        };
        let manifest = match serde_json::from_slice::<Manifest>(&data) {
            Ok(manifest) if manifest.version == MANIFEST_VERSION => manifest,
            Ok(manifest) => {
                tracing::warn!("构建清单版本 {} 不受支持，忽略", manifest.version);
                Self::default()
            }
            Err(e) => {
                tracing::warn!("解析构建清单失败，按全量构建处理：{e}");
                Self::default()
            }
        };
        Ok(manifest)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn entry(&self, page_id: &str, locale: &str) -> Option<&ManifestEntry> {
        self.pages.get(&page_key(page_id, locale))
    }

    /// 哈希与输出路径都未变化时可跳过
    pub fn page_unchanged(&self, page_id: &str, locale: &str, hash: &str, output_path: &str) -> bool {
        self.entry(page_id, locale)
            .is_some_and(|e| e.hash == hash && e.output_path == output_path)
    }

    pub fn record_page(&mut self, entry: ManifestEntry) {
        let key = page_key(&entry.page_id, &entry.locale_code);
        self.pages.insert(key, entry);
    }

    /// 丢弃不在当前快照中的页面条目
    pub fn retain_pages(&mut self, keys: &HashSet<String>) {
        self.pages.retain(|key, _| keys.contains(key));
    }

    pub fn asset_unchanged(&self, output_path: &str, hash: &str) -> bool {
        self.assets.get(output_path).is_some_and(|e| e.hash == hash)
    }

    pub fn record_asset(&mut self, output_path: String, entry: AssetEntry) {
        self.assets.insert(output_path, entry);
    }

    pub fn stamp(&mut self, build_id: String, generated_at: DateTime<Utc>) {
        self.version = MANIFEST_VERSION;
        self.build_id = Some(build_id);
        self.generated_at = Some(generated_at);
    }
}

/// 页面增量跳过策略
#[derive(Debug, Clone, Copy)]
pub struct SkipPolicy<'a> {
    manifest: &'a Manifest,
    enabled: bool,
}

impl<'a> SkipPolicy<'a> {
    /// `incremental` 关闭或 `force` 时永不跳过
    pub fn new(manifest: &'a Manifest, incremental: bool, force: bool) -> Self {
        Self {
            manifest,
            enabled: incremental && !force,
        }
    }

    pub fn should_skip_page(&self, page_id: &str, locale: &str, hash: &str, planned_output: &str) -> bool {
        self.enabled && self.manifest.page_unchanged(page_id, locale, hash, planned_output)
    }

    pub fn should_skip_asset(&self, output_path: &str, hash: &str) -> bool {
        self.enabled && self.manifest.asset_unchanged(output_path, hash)
    }
}
