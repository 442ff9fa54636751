//! CMS 实体快照（只读，由 [`SiteSource`](crate::source::SiteSource) 提供）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Draft,
    #[default]
    Published,
    Archived,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub template_id: String,
    #[serde(default)]
    pub content_id: Option<String>,
    #[serde(default)]
    pub status: PageStatus,
    #[serde(default)]
    pub translations: Vec<PageTranslation>,
    #[serde(default)]
    pub blocks: Vec<Block>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Page {
    pub fn is_published(&self) -> bool {
        self.status == PageStatus::Published
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageTranslation {
    pub locale: String,
    pub title: String,
    /// 站内路径，如 "/" 或 "/about"
    pub path: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub seo_title: Option<String>,
    #[serde(default)]
    pub seo_description: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    pub id: String,
    #[serde(default)]
    pub content_type: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub translations: Vec<ContentTranslation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentTranslation {
    pub locale: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub summary: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// 页面区块；`locale` 为空表示与语言无关
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub region: String,
    pub kind: String,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub settings: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    pub area: String,
    pub kind: String,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub settings: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub theme_id: String,
    pub name: String,
    /// 交给 Renderer 的模板名
    pub path: String,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Theme {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub assets: ThemeAssets,
}

/// 主题声明的静态资源，路径相对 `base_path`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThemeAssets {
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub scripts: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

impl ThemeAssets {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.styles
            .iter()
            .chain(&self.scripts)
            .chain(&self.files)
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.styles.len() + self.scripts.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Locale {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Menu {
    pub code: String,
    #[serde(default)]
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MenuItem {
    pub label: String,
    pub url: String,
    #[serde(default)]
    pub children: Vec<MenuItem>,
}
