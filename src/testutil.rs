//! 单元测试共用的站点夹具

use crate::config::{GeneratorConfig, SiteInfo};
use crate::model::{Block, Content, ContentTranslation, Menu, MenuItem, Page, PageStatus, PageTranslation, Template, Theme, ThemeAssets};
use crate::render::{MiniJinjaRenderer, RenderError, Renderer, TemplateContext};
use crate::source::MemorySource;
use crate::theme::{normalize_asset_path, AssetError, AssetResolver};
use crate::BoxFuture;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

pub fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, day, 8, 0, 0).unwrap()
}

pub fn translation(locale: &str, title: &str, path: &str) -> PageTranslation {
    PageTranslation {
        locale: locale.into(),
        title: title.into(),
        path: path.into(),
        updated_at: Some(ts(2)),
        ..Default::default()
    }
}

fn block(id: &str, region: &str, locale: Option<&str>, body: &str) -> Block {
    Block {
        id: id.into(),
        region: region.into(),
        kind: "html".into(),
        locale: locale.map(str::to_owned),
        body: body.into(),
        ..Default::default()
    }
}

pub fn source() -> MemorySource {
    MemorySource::new()
        .with_locale("en", true)
        .with_locale("fr", false)
        .with_template(Template {
            id: "tpl-page".into(),
            theme_id: "aurora".into(),
            name: "Page".into(),
            path: "page.html".into(),
            updated_at: Some(ts(1)),
        })
        .with_theme(Theme {
            id: "aurora".into(),
            name: "aurora".into(),
            enabled: true,
            assets: ThemeAssets {
                base_path: "static".into(),
                styles: vec!["css/site.css".into()],
                scripts: vec!["js/app.js".into()],
                files: vec![],
            },
        })
        .with_menu(
            "en",
            Menu {
                code: "primary".into(),
                items: vec![MenuItem {
                    label: "About".into(),
                    url: "/about/".into(),
                    children: vec![],
                }],
            },
        )
        .with_page(Page {
            id: "home".into(),
            template_id: "tpl-page".into(),
            status: PageStatus::Published,
            translations: vec![translation("en", "Home", "/"), translation("fr", "Accueil", "/")],
            blocks: vec![
                block("hero-en", "hero", Some("en"), "Welcome"),
                block("hero-fr", "hero", Some("fr"), "Bienvenue"),
                block("footer", "footer", None, "© {{< year >}}"),
            ],
            created_at: Some(ts(1)),
            updated_at: Some(ts(2)),
            published_at: Some(ts(1)),
            ..Default::default()
        })
        .with_page(Page {
            id: "about".into(),
            template_id: "tpl-page".into(),
            status: PageStatus::Published,
            translations: vec![
                PageTranslation {
                    summary: "  Who   we\n are ".into(),
                    ..translation("en", "About", "/about")
                },
                translation("fr", "À propos", "/a-propos"),
            ],
            created_at: Some(ts(1)),
            updated_at: Some(ts(3)),
            published_at: Some(ts(3)),
            ..Default::default()
        })
        .with_page(Page {
            id: "hello".into(),
            template_id: "tpl-page".into(),
            content_id: Some("c1".into()),
            status: PageStatus::Published,
            translations: vec![translation("en", "Hello", "/blog/hello")],
            created_at: Some(ts(4)),
            updated_at: Some(ts(4)),
            ..Default::default()
        })
        .with_page(Page {
            id: "draft".into(),
            template_id: "tpl-page".into(),
            status: PageStatus::Draft,
            translations: vec![translation("en", "Draft", "/draft")],
            ..Default::default()
        })
        .with_content(Content {
            id: "c1".into(),
            content_type: "post".into(),
            published_at: Some(ts(5)),
            created_at: Some(ts(4)),
            updated_at: Some(ts(6)),
            translations: vec![ContentTranslation {
                locale: "en".into(),
                title: "Hello".into(),
                body: "<p>Hello {{< year >}}</p>".into(),
                summary: "First post".into(),
                updated_at: Some(ts(6)),
            }],
        })
}

pub fn config() -> GeneratorConfig {
    GeneratorConfig {
        base_url: "https://example.com".into(),
        menus: [("main".to_owned(), "primary".to_owned())].into_iter().collect(),
        site: SiteInfo {
            title: "Example".into(),
            description: "Example site".into(),
            extra: BTreeMap::new(),
        },
        ..Default::default()
    }
}

pub fn renderer() -> MiniJinjaRenderer {
    MiniJinjaRenderer::new()
        .with_template(
            "page.html",
            "<h1>{{ page.translation.title }}</h1>\
             {% for b in page.blocks %}<div>{{ b.body }}</div>{% endfor %}\
             {% if page.content_translation %}{{ page.content_translation.body }}{% endif %}",
        )
        .unwrap()
}

/// 对指定页面人为延迟的 Renderer
pub struct SlowRenderer {
    pub inner: MiniJinjaRenderer,
    pub slow_page: String,
    pub delay: Duration,
}

impl Renderer for SlowRenderer {
    fn render_template(&self, name: &str, ctx: &TemplateContext) -> Result<String, RenderError> {
        if ctx.page.id == self.slow_page {
            std::thread::sleep(self.delay);
        }
        self.inner.render_template(name, ctx)
    }

    fn render_string(&self, source: &str, ctx: &TemplateContext) -> Result<String, RenderError> {
        self.inner.render_string(source, ctx)
    }
}

/// 内存中的主题资源
#[derive(Default)]
pub struct MemoryAssets {
    pub files: HashMap<String, Vec<u8>>,
    pub delay: Option<Duration>,
}

impl MemoryAssets {
    pub fn with(mut self, path: &str, data: &str) -> Self {
        self.files.insert(path.to_owned(), data.as_bytes().to_vec());
        self
    }
}

impl AssetResolver for MemoryAssets {
    fn open<'a>(&'a self, theme: &'a Theme, asset_path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, AssetError>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let path = self.resolve_path(theme, asset_path)?;
            self.files
                .get(path.to_string_lossy().as_ref())
                .cloned()
                .ok_or_else(|| AssetError::NotFound(asset_path.to_owned()))
        })
    }

    fn resolve_path(&self, theme: &Theme, asset_path: &str) -> Result<PathBuf, AssetError> {
        Ok(PathBuf::from(&theme.name).join(normalize_asset_path(asset_path)?))
    }
}

pub fn assets() -> MemoryAssets {
    MemoryAssets::default()
        .with("aurora/css/site.css", "body{margin:0}")
        .with("aurora/js/app.js", "console.log(1)")
}
