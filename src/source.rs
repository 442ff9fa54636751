mod memory;

pub use memory::MemorySource;

use crate::model::{Content, Locale, Menu, Page, Template, Theme, Widget};
use crate::BoxFuture;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{entity} {id} 不存在")]
    NotFound { entity: &'static str, id: String },

    #[error("数据源不可用：{0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// 站点数据的只读访问接口
///
/// `content`、`template`、`menu` 找不到时返回 `Ok(None)`。
pub trait SiteSource: Send + Sync {
    fn pages(&self) -> BoxFuture<'_, SourceResult<Vec<Page>>>;

    fn content<'a>(&'a self, id: &'a str) -> BoxFuture<'a, SourceResult<Option<Content>>>;

    fn locales(&self) -> BoxFuture<'_, SourceResult<Vec<Locale>>>;

    fn template<'a>(&'a self, id: &'a str) -> BoxFuture<'a, SourceResult<Option<Template>>>;

    fn themes(&self) -> BoxFuture<'_, SourceResult<Vec<Theme>>>;

    fn menu<'a>(
        &'a self,
        code: &'a str,
        locale: &'a str,
    ) -> BoxFuture<'a, SourceResult<Option<Menu>>>;

    /// 页面在指定语言下已解析的组件
    fn widgets<'a>(
        &'a self,
        page_id: &'a str,
        locale: &'a str,
    ) -> BoxFuture<'a, SourceResult<Vec<Widget>>>;
}
