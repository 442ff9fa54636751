use crate::build::incremental::page_key;
use crate::model::{Block, Content, ContentTranslation, Menu, Page, PageTranslation, Template, Theme, Widget};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 单次构建的不可变快照
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub generated_at: DateTime<Utc>,
    pub default_locale: String,
    pub locales: Vec<String>,
    pub pages: Vec<Arc<PageData>>,
    pub site: SiteMetadata,
    /// 语言 → 菜单别名 → 菜单
    pub menus: BTreeMap<String, BTreeMap<String, Menu>>,
    pub themes: Vec<Theme>,
    /// 未按页面或语言过滤
    pub full_snapshot: bool,
    pub prefix_default_locale: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteMetadata {
    pub base_url: String,
    pub title: String,
    pub description: String,
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// 一个（页面，语言）组合的全部渲染输入
#[derive(Debug, Clone)]
pub struct PageData {
    pub page: Arc<Page>,
    pub locale: String,
    pub translation: PageTranslation,
    pub content: Option<Arc<Content>>,
    pub content_translation: Option<ContentTranslation>,
    pub template: Template,
    pub blocks: Vec<Block>,
    pub widgets: Vec<Widget>,
    pub metadata: PageMetadata,
    /// 相对输出目录的路径，如 "fr/about/index.html"
    pub output_path: String,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct PageMetadata {
    pub hash: String,
    pub last_modified: Option<DateTime<Utc>>,
}

impl PageData {
    pub fn key(&self) -> String {
        page_key(&self.page.id, &self.locale)
    }

    /// feed 条目 GUID
    pub fn guid(&self) -> String {
        self.key()
    }
}

impl BuildContext {
    pub fn locale_prefix(&self, locale: &str) -> String {
        locale_prefix(locale, &self.default_locale, self.prefix_default_locale)
    }

    pub fn menus_for(&self, locale: &str) -> BTreeMap<String, Menu> {
        self.menus.get(locale).cloned().unwrap_or_default()
    }

    pub fn pages_in(&self, locale: &str) -> impl Iterator<Item = &Arc<PageData>> {
        self.pages.iter().filter(move |p| p.locale == locale)
    }
}

/// 默认语言不带前缀（除非显式开启），其余为 "/{locale}"
pub fn locale_prefix(locale: &str, default_locale: &str, prefix_default: bool) -> String {
    if locale == default_locale && !prefix_default {
        String::new()
    } else {
        format!("/{locale}")
    }
}

/// 由站内路径计算相对输出路径与 URL
pub fn output_location(base_url: &str, prefix: &str, path: &str) -> (String, String) {
    let segment = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect::<Vec<_>>()
        .join("/");
    let dir = format!("{}/{segment}", prefix.trim_start_matches('/'));
    let dir = dir.trim_matches('/');
    let output = if dir.is_empty() {
        "index.html".to_owned()
    } else {
        format!("{dir}/index.html")
    };
    let url = if segment.is_empty() {
        format!("{base_url}{prefix}/")
    } else {
        format!("{base_url}{prefix}/{segment}/")
    };
    (output, url)
}
