use crate::model::Theme;
use crate::BoxFuture;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("资源不存在：{0}")]
    NotFound(String),

    #[error("非法资源路径：{0}")]
    InvalidPath(String),

    #[error("读取资源 {} 失败：{source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// 主题资源定位
pub trait AssetResolver: Send + Sync {
    fn open<'a>(
        &'a self,
        theme: &'a Theme,
        asset_path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<u8>, AssetError>>;

    fn resolve_path(&self, theme: &Theme, asset_path: &str) -> Result<PathBuf, AssetError>;
}

/// 规范化主题资源的相对路径，拒绝绝对路径与 `..`
pub fn normalize_asset_path(raw: &str) -> Result<PathBuf, AssetError> {
    let trimmed = raw.trim().trim_start_matches("./");
    if trimmed.is_empty() {
        return Err(AssetError::InvalidPath(raw.to_owned()));
    }
    let mut out = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(AssetError::InvalidPath(raw.to_owned())),
        }
    }
    if out.as_os_str().is_empty() {
        return Err(AssetError::InvalidPath(raw.to_owned()));
    }
    Ok(out)
}

/// 从 `themes_dir/{theme.name}/{base_path}` 读取资源
#[derive(Debug, Clone)]
pub struct FsAssetResolver {
    themes_dir: PathBuf,
}

impl FsAssetResolver {
    pub fn new(themes_dir: impl Into<PathBuf>) -> Self {
        Self {
            themes_dir: themes_dir.into(),
        }
    }
}

impl AssetResolver for FsAssetResolver {
    fn open<'a>(
        &'a self,
        theme: &'a Theme,
        asset_path: &'a str,
    ) -> BoxFuture<'a, Result<Vec<u8>, AssetError>> {
        Box::pin(async move {
            let path = self.resolve_path(theme, asset_path)?;
            tokio::fs::read(&path).await.map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    AssetError::NotFound(asset_path.to_owned())
                } else {
                    AssetError::Io { path, source }
                }
            })
        })
    }

    fn resolve_path(&self, theme: &Theme, asset_path: &str) -> Result<PathBuf, AssetError> {
        let relative = normalize_asset_path(asset_path)?;
        let mut path = self.themes_dir.join(&theme.name);
        let base = theme.assets.base_path.trim_matches('/');
        if !base.is_empty() {
            path.push(normalize_asset_path(base)?);
        }
        Ok(path.join(relative))
    }
}
