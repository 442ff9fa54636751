use crate::build::result::BuildResult;
use crate::render::RenderError;
use crate::shortcode::ShortcodeError;
use crate::source::SourceError;
use crate::storage::StorageError;
use crate::theme::AssetError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BuildError>;

/// 构建过程中的错误
///
/// `TemplateRequired`、`RenderTimeout`、`StorageWrite`、`StorageTimeout`、`AssetTimeout` 与 `Hook`
/// 会中止当前操作；其余单页错误记录在诊断中，构建结束时以 `PagesFailed` 汇总。
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("template required: 页面 {page_id} 的模板 {template_id:?} 无法解析")]
    TemplateRequired { page_id: String, template_id: String },

    #[error("render timed out: 页面 {page_id}（{locale}）超过 {timeout:?} 未完成渲染")]
    RenderTimeout {
        page_id: String,
        locale: String,
        timeout: Duration,
    },

    #[error("渲染页面 {page_id}（{locale}）失败：{source}")]
    Render {
        page_id: String,
        locale: String,
        #[source]
        source: RenderError,
    },

    #[error("页面 {page_id}（{locale}）短代码处理失败：{source}")]
    Shortcode {
        page_id: String,
        locale: String,
        #[source]
        source: ShortcodeError,
    },

    #[error("storage write failed: {}：{source}", .path.display())]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("storage timed out: {} 超过 {timeout:?} 未完成", .path.display())]
    StorageTimeout { path: PathBuf, timeout: Duration },

    #[error("存储操作失败：{0}")]
    Storage(#[from] StorageError),

    #[error("asset copy deadline exceeded: {timeout:?} 内仅完成 {copied} 个资源")]
    AssetTimeout { timeout: Duration, copied: usize },

    #[error("复制主题 {theme} 的资源 {path} 失败：{source}")]
    Asset {
        theme: String,
        path: String,
        #[source]
        source: AssetError,
    },

    #[error("hook {hook} 执行失败：{cause:#}")]
    Hook {
        hook: &'static str,
        cause: anyhow::Error,
    },

    #[error("读取站点数据失败：{0}")]
    Source(#[from] SourceError),

    #[error("页面 {page_id} 不存在或缺少 {locale} 翻译")]
    PageNotFound { page_id: String, locale: String },

    #[error("{failed} 个页面或资源构建失败")]
    PagesFailed { failed: usize },

    #[error("序列化失败：{0}")]
    Manifest(#[from] serde_json::Error),

    #[error("后台任务异常：{0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BuildError {
    pub(crate) fn hook(hook: &'static str, cause: anyhow::Error) -> Self {
        Self::Hook { hook, cause }
    }

    /// 是否为中止整个操作的错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TemplateRequired { .. }
                | Self::RenderTimeout { .. }
                | Self::StorageWrite { .. }
                | Self::StorageTimeout { .. }
                | Self::Storage(_)
                | Self::AssetTimeout { .. }
                | Self::Hook { .. }
                | Self::Source(_)
                | Self::Join(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::RenderTimeout { .. } | Self::StorageTimeout { .. } | Self::AssetTimeout { .. }
        )
    }
}

/// 构建失败：错误与已积累的部分结果一并返回
///
/// 调用方应把它视为“部分成功”，从 `result.diagnostics` / `result.errors` 中查看细节。
#[derive(Debug, Error)]
#[error("{error}")]
pub struct BuildFailure {
    pub error: Arc<BuildError>,
    pub result: Box<BuildResult>,
}

impl BuildFailure {
    pub fn kind(&self) -> &BuildError {
        &self.error
    }

    pub fn into_result(self) -> BuildResult {
        *self.result
    }
}
