#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use cms_sitegen::model::{Content, ContentTranslation, Page, PageStatus, PageTranslation, Template, Theme, ThemeAssets};
use cms_sitegen::render::{RenderError, Renderer, TemplateContext};
use cms_sitegen::theme::AssetResolver;
use cms_sitegen::{
    AssetError, BoxFuture, FixedClock, Generator, GeneratorConfig, MemorySource, MemoryStorage, MiniJinjaRenderer,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

/// 测试日志，RUST_LOG 控制级别
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
}

pub const CONFIG: &str = r#"
output_dir = "public"
base_url = "https://blog.example.org/"
workers = 2
render_timeout = "2s"
asset_copy_timeout = "10s"

[site]
title = "Field Notes"
description = "Notes from the field"
"#;

pub fn config() -> GeneratorConfig {
    GeneratorConfig::from_toml_str(CONFIG).unwrap()
}

fn tr(locale: &str, title: &str, path: &str) -> PageTranslation {
    PageTranslation {
        locale: locale.into(),
        title: title.into(),
        path: path.into(),
        updated_at: Some(ts(2)),
        ..Default::default()
    }
}

fn page(id: &str, translations: Vec<PageTranslation>, published: u32) -> Page {
    Page {
        id: id.into(),
        template_id: "default".into(),
        status: PageStatus::Published,
        translations,
        created_at: Some(ts(1)),
        updated_at: Some(ts(published)),
        published_at: Some(ts(published)),
        ..Default::default()
    }
}

/// 三个页面：index（en/de）、guide（en/de）、news（仅 en，关联内容）
pub fn source() -> MemorySource {
    MemorySource::new()
        .with_locale("en", true)
        .with_locale("de", false)
        .with_template(Template {
            id: "default".into(),
            theme_id: "paper".into(),
            name: "Default".into(),
            path: "default.html".into(),
            updated_at: None,
        })
        .with_theme(Theme {
            id: "paper".into(),
            name: "paper".into(),
            enabled: true,
            assets: ThemeAssets {
                styles: vec!["main.css".into()],
                ..Default::default()
            },
        })
        .with_page(page("index", vec![tr("en", "Home", "/"), tr("de", "Start", "/")], 1))
        .with_page(page("guide", vec![tr("en", "Guide", "/guide"), tr("de", "Anleitung", "/anleitung")], 3))
        .with_page(Page {
            content_id: Some("n1".into()),
            ..page("news", vec![tr("en", "News", "/news/launch")], 4)
        })
        .with_content(Content {
            id: "n1".into(),
            content_type: "article".into(),
            published_at: Some(ts(4)),
            updated_at: Some(ts(5)),
            translations: vec![ContentTranslation {
                locale: "en".into(),
                title: "Launch".into(),
                body: "<p>We launched.</p>".into(),
                summary: "Launch day".into(),
                updated_at: Some(ts(5)),
            }],
            ..Default::default()
        })
}

pub fn renderer() -> MiniJinjaRenderer {
    MiniJinjaRenderer::new()
        .with_template(
            "default.html",
            "<html lang=\"{{ page.locale }}\"><title>{{ page.translation.title }} | {{ site.title }}</title>\
             <link rel=\"canonical\" href=\"{{ page.url }}\">\
             {% if page.content_translation %}{{ page.content_translation.body }}{% endif %}</html>",
        )
        .unwrap()
}

/// 渲染指定页面前阻塞一段时间
pub struct StallingRenderer {
    pub inner: MiniJinjaRenderer,
    pub page_id: String,
    pub stall: Duration,
}

impl Renderer for StallingRenderer {
    fn render_template(&self, name: &str, ctx: &TemplateContext) -> Result<String, RenderError> {
        if ctx.page.id == self.page_id {
            std::thread::sleep(self.stall);
        }
        self.inner.render_template(name, ctx)
    }

    fn render_string(&self, source: &str, ctx: &TemplateContext) -> Result<String, RenderError> {
        self.inner.render_string(source, ctx)
    }
}

#[derive(Default)]
pub struct StaticAssets {
    files: HashMap<String, Vec<u8>>,
}

impl StaticAssets {
    pub fn paper() -> Self {
        let mut files = HashMap::new();
        files.insert("main.css".to_owned(), b"main{max-width:60ch}".to_vec());
        Self { files }
    }
}

impl AssetResolver for StaticAssets {
    fn open<'a>(&'a self, _theme: &'a Theme, asset_path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, AssetError>> {
        Box::pin(async move {
            self.files
                .get(asset_path)
                .cloned()
                .ok_or_else(|| AssetError::NotFound(asset_path.to_owned()))
        })
    }

    fn resolve_path(&self, theme: &Theme, asset_path: &str) -> Result<PathBuf, AssetError> {
        Ok(PathBuf::from(&theme.name).join(asset_path))
    }
}

pub fn generator_with(config: GeneratorConfig, storage: Arc<MemoryStorage>) -> Generator {
    init_tracing();
    Generator::new(config, Arc::new(source()), Arc::new(renderer()), storage)
        .with_asset_resolver(Arc::new(StaticAssets::paper()))
        .with_clock(Arc::new(FixedClock(ts(20))))
}

pub fn generator(storage: Arc<MemoryStorage>) -> Generator {
    generator_with(config(), storage)
}
