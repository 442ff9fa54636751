use crate::model::{Block, Content, ContentTranslation, Menu, PageTranslation, Template, Widget};
use chrono::{DateTime, Utc};
use minijinja::{AutoEscape, Environment, ErrorKind, State, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("模板 {0} 不存在")]
    NotFound(String),

    #[error("模板 {name} 渲染失败：{message}")]
    Template { name: String, message: String },
}

impl RenderError {
    fn from_engine(name: &str, err: minijinja::Error) -> Self {
        if err.kind() == ErrorKind::TemplateNotFound {
            Self::NotFound(name.to_owned())
        } else {
            Self::Template {
                name: name.to_owned(),
                message: format!("{err:#}"),
            }
        }
    }
}

/// 模板引擎接口，实现需支持多线程并发调用
pub trait Renderer: Send + Sync {
    fn render_template(&self, name: &str, ctx: &TemplateContext) -> Result<String, RenderError>;

    fn render_string(&self, source: &str, ctx: &TemplateContext) -> Result<String, RenderError>;
}

/// 传给模板的完整上下文
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    pub site: SiteView,
    pub page: PageView,
    pub helpers: LocaleHelpers,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteView {
    pub base_url: String,
    pub title: String,
    pub description: String,
    pub extra: BTreeMap<String, serde_json::Value>,
    pub locale: String,
    pub default_locale: String,
    pub locales: Vec<String>,
    /// 当前语言下的菜单（别名 → 菜单）
    pub menus: BTreeMap<String, Menu>,
}

/// 页面数据；content / blocks 中的文本已经过短代码处理
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageView {
    pub id: String,
    pub locale: String,
    pub url: String,
    pub output_path: String,
    pub template: Template,
    pub translation: PageTranslation,
    pub content: Option<Content>,
    pub content_translation: Option<ContentTranslation>,
    pub blocks: Vec<Block>,
    pub widgets: Vec<Widget>,
    pub hash: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// 与语言相关的 URL 辅助数据
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocaleHelpers {
    pub base_url: String,
    pub locale: String,
    /// 语言路径前缀，默认语言为空串，其余为 "/{locale}"
    pub prefix: String,
}

impl LocaleHelpers {
    pub fn absolute_url(&self, path: &str) -> String {
        join_url(&self.base_url, &self.prefix, path)
    }
}

/// 拼接 base_url、语言前缀与站内路径
pub(crate) fn join_url(base_url: &str, prefix: &str, path: &str) -> String {
    let path = path.trim();
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_owned();
    }
    let base = base_url.trim_end_matches('/');
    let rest = path.trim_start_matches('/');
    format!("{base}{prefix}/{rest}")
}

/// 基于 MiniJinja 的 Renderer
pub struct MiniJinjaRenderer {
    env: Environment<'static>,
}

impl MiniJinjaRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        // 正文与区块本身就是 HTML
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_function("absolute_url", absolute_url);
        Self { env }
    }

    /// 从模板目录按名称加载
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let mut renderer = Self::new();
        renderer
            .env
            .set_loader(minijinja::path_loader(dir.as_ref().to_path_buf()));
        renderer
    }

    pub fn add_template(&mut self, name: &str, source: &str) -> Result<(), RenderError> {
        self.env
            .add_template_owned(name.to_owned(), source.to_owned())
            .map_err(|e| RenderError::from_engine(name, e))
    }

    pub fn with_template(mut self, name: &str, source: &str) -> Result<Self, RenderError> {
        self.add_template(name, source)?;
        Ok(self)
    }
}

impl Default for MiniJinjaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for MiniJinjaRenderer {
    fn render_template(&self, name: &str, ctx: &TemplateContext) -> Result<String, RenderError> {
        let tmpl = self
            .env
            .get_template(name)
            .map_err(|e| RenderError::from_engine(name, e))?;
        tmpl.render(Value::from_serialize(ctx))
            .map_err(|e| RenderError::from_engine(name, e))
    }

    fn render_string(&self, source: &str, ctx: &TemplateContext) -> Result<String, RenderError> {
        self.env
            .render_str(source, Value::from_serialize(ctx))
            .map_err(|e| RenderError::from_engine("<string>", e))
    }
}

/// 模板函数 `absolute_url(path)`，读取上下文中的 helpers
fn absolute_url(state: &State, path: String) -> Result<String, minijinja::Error> {
    let helpers = state.lookup("helpers").unwrap_or_default();
    let attr = |key: &str| {
        helpers
            .get_attr(key)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default()
    };
    Ok(join_url(&attr("base_url"), &attr("prefix"), &path))
}
