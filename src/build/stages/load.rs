use crate::build::context::{locale_prefix, output_location, BuildContext, PageData, PageMetadata, SiteMetadata};
use crate::build::incremental::hash_bytes;
use crate::build::BuildOptions;
use crate::config::GeneratorConfig;
use crate::error::BuildError;
use crate::model::{Block, Content, ContentTranslation, Menu, PageTranslation, Template, Widget};
use crate::source::SiteSource;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// 参与页面哈希的字段
#[derive(Serialize)]
struct Fingerprint<'a> {
    translation: &'a PageTranslation,
    content_id: Option<&'a str>,
    content_type: Option<&'a str>,
    content_published_at: Option<DateTime<Utc>>,
    content_translation: Option<&'a ContentTranslation>,
    blocks: &'a [Block],
    widgets: &'a [Widget],
    template_id: &'a str,
    template_path: &'a str,
    template_updated_at: Option<DateTime<Utc>>,
    published_at: Option<DateTime<Utc>>,
    /// 模板上下文中的站点信息与当前语言菜单
    site: &'a SiteMetadata,
    menus: Option<&'a BTreeMap<String, Menu>>,
}

/// 读取数据源，生成本次构建的上下文快照
pub async fn load_context(
    source: &dyn SiteSource,
    config: &GeneratorConfig,
    opts: &BuildOptions,
    generated_at: DateTime<Utc>,
) -> Result<BuildContext, BuildError> {
    let catalog = source.locales().await?;

    let mut locales: Vec<String> = if config.locales.is_empty() {
        catalog
            .iter()
            .filter(|l| l.active)
            .map(|l| l.code.clone())
            .collect()
    } else {
        config.locales.clone()
    };

    let default_locale = if !config.default_locale.is_empty() {
        config.default_locale.clone()
    } else if let Some(l) = catalog.iter().find(|l| l.is_default) {
        l.code.clone()
    } else {
        locales.first().cloned().unwrap_or_default()
    };
    if locales.is_empty() && !default_locale.is_empty() {
        locales.push(default_locale.clone());
    }

    let requested: Vec<String> = if opts.locales.is_empty() {
        locales.clone()
    } else {
        opts.locales
            .iter()
            .filter(|code| {
                let known = locales.contains(*code);
                if !known {
                    tracing::warn!("语言 {} 未启用，忽略", code);
                }
                known
            })
            .cloned()
            .collect()
    };

    let site = SiteMetadata {
        base_url: config.base_url.clone(),
        title: config.site.title.clone(),
        description: config.site.description.clone(),
        extra: config.site.extra.clone(),
    };

    let mut menus: BTreeMap<String, BTreeMap<String, Menu>> = BTreeMap::new();
    for locale in &requested {
        let resolved = menus.entry(locale.clone()).or_default();
        for (alias, code) in &config.menus {
            match source.menu(code, locale).await? {
                Some(menu) => {
                    resolved.insert(alias.clone(), menu);
                }
                None => tracing::warn!("菜单 {}（{}）在 {} 下不存在", alias, code, locale),
            }
        }
    }

    let mut templates: HashMap<String, Template> = HashMap::new();
    let mut contents: HashMap<String, Option<Arc<Content>>> = HashMap::new();
    let mut seen = HashSet::new();
    let mut pages = Vec::new();

    for page in source.pages().await? {
        if !page.is_published() {
            tracing::debug!("跳过未发布页面：{}", page.id);
            continue;
        }
        if !opts.wants_page(&page.id) || !seen.insert(page.id.clone()) {
            continue;
        }

        let matched: Vec<(&String, &PageTranslation)> = requested
            .iter()
            .filter_map(|locale| {
                best_match(&page.translations, locale, |t| &t.locale).map(|t| (locale, t))
            })
            .collect();
        if matched.is_empty() {
            tracing::debug!("页面 {} 在请求的语言中没有翻译", page.id);
            continue;
        }

        let template = resolve_template(source, &mut templates, &page.id, &page.template_id).await?;

        let content = match &page.content_id {
            Some(id) if !id.is_empty() => match contents.get(id) {
                Some(cached) => cached.clone(),
                None => {
                    let loaded = source.content(id).await?.map(Arc::new);
                    if loaded.is_none() {
                        tracing::warn!("页面 {} 引用的内容 {} 不存在", page.id, id);
                    }
                    contents.insert(id.clone(), loaded.clone());
                    loaded
                }
            },
            _ => None,
        };

        let page = Arc::new(page.clone());
        for (locale, translation) in matched {
            let content_translation = content
                .as_ref()
                .and_then(|c| best_match(&c.translations, locale, |t| &t.locale))
                .cloned();

            let mut blocks: Vec<Block> = page
                .blocks
                .iter()
                .filter(|b| match &b.locale {
                    None => true,
                    Some(code) => code.eq_ignore_ascii_case(locale) || code.eq_ignore_ascii_case(&translation.locale),
                })
                .cloned()
                .collect();
            blocks.sort_by(|a, b| a.region.cmp(&b.region).then(a.position.cmp(&b.position)));

            let mut widgets = source.widgets(&page.id, locale).await?;
            widgets.sort_by(|a, b| a.area.cmp(&b.area).then(a.position.cmp(&b.position)));

            let fingerprint = Fingerprint {
                translation,
                content_id: content.as_ref().map(|c| c.id.as_str()),
                content_type: content.as_ref().map(|c| c.content_type.as_str()),
                content_published_at: content.as_ref().and_then(|c| c.published_at),
                content_translation: content_translation.as_ref(),
                blocks: &blocks,
                widgets: &widgets,
                template_id: &template.id,
                template_path: &template.path,
                template_updated_at: template.updated_at,
                published_at: page.published_at,
                site: &site,
                menus: menus.get(locale.as_str()),
            };
            let hash = hash_bytes(&serde_json::to_vec(&fingerprint)?);

            let last_modified = [
                translation.updated_at,
                page.updated_at,
                content.as_ref().and_then(|c| c.updated_at),
                content_translation.as_ref().and_then(|t| t.updated_at),
            ]
            .into_iter()
            .flatten()
            .max();

            let prefix = locale_prefix(locale, &default_locale, config.prefix_default_locale);
            let (output_path, url) = output_location(&config.base_url, &prefix, &translation.path);

            pages.push(Arc::new(PageData {
                page: page.clone(),
                locale: locale.clone(),
                translation: translation.clone(),
                content: content.clone(),
                content_translation,
                template: template.clone(),
                blocks,
                widgets,
                metadata: PageMetadata {
                    hash,
                    last_modified,
                },
                output_path,
                url,
            }));
        }
    }

    let themes = source
        .themes()
        .await?
        .into_iter()
        .filter(|t| t.enabled)
        .collect::<Vec<_>>();

    tracing::info!(
        "已加载构建上下文：{} 个页面，语言 {:?}，默认语言 {}",
        pages.len(),
        requested,
        default_locale
    );

    Ok(BuildContext {
        generated_at,
        default_locale,
        locales: requested,
        pages,
        site,
        menus,
        themes,
        full_snapshot: !opts.is_filtered(),
        prefix_default_locale: config.prefix_default_locale,
    })
}

async fn resolve_template(
    source: &dyn SiteSource,
    cache: &mut HashMap<String, Template>,
    page_id: &str,
    template_id: &str,
) -> Result<Template, BuildError> {
    let required = || BuildError::TemplateRequired {
        page_id: page_id.to_owned(),
        template_id: template_id.to_owned(),
    };
    if template_id.trim().is_empty() {
        return Err(required());
    }
    if let Some(template) = cache.get(template_id) {
        return Ok(template.clone());
    }
    let template = source.template(template_id).await?.ok_or_else(required)?;
    if template.path.trim().is_empty() {
        return Err(required());
    }
    cache.insert(template_id.to_owned(), template.clone());
    Ok(template)
}

/// 选择最匹配的翻译：精确匹配、忽略大小写、再回退到基础语言（en-US → en）
pub(crate) fn best_match<'a, T>(items: &'a [T], locale: &str, code: impl Fn(&T) -> &str) -> Option<&'a T> {
    if let Some(item) = items.iter().find(|t| code(t) == locale) {
        return Some(item);
    }
    if let Some(item) = items.iter().find(|t| code(t).eq_ignore_ascii_case(locale)) {
        return Some(item);
    }
    let base = locale.split(['-', '_']).next().unwrap_or(locale);
    if base.len() == locale.len() {
        return None;
    }
    items.iter().find(|t| code(t).eq_ignore_ascii_case(base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Menu, MenuItem, Page, PageStatus};
    use crate::testutil;

    #[test]
    fn test_best_match() {
        fn code(s: &String) -> &str {
            s
        }
        let items = ["en".to_owned(), "fr-CA".to_owned()];
        assert_eq!(best_match(&items, "en", code).map(String::as_str), Some("en"));
        assert_eq!(best_match(&items, "EN", code).map(String::as_str), Some("en"));
        assert_eq!(best_match(&items, "en-US", code).map(String::as_str), Some("en"));
        assert_eq!(best_match(&items, "fr-ca", code).map(String::as_str), Some("fr-CA"));
        assert!(best_match(&items, "fr", code).is_none());
        assert!(best_match(&items, "de", code).is_none());
    }

    #[tokio::test]
    async fn test_load_full_snapshot() {
        let source = testutil::source();
        let config = testutil::config();
        let ctx = load_context(&source, &config, &BuildOptions::default(), testutil::ts(10))
            .await
            .unwrap();

        assert_eq!(ctx.default_locale, "en");
        assert_eq!(ctx.locales, vec!["en", "fr"]);
        assert!(ctx.full_snapshot);
        // home×2 + about×2 + hello(en)；草稿不加载
        assert_eq!(ctx.pages.len(), 5);
        assert!(ctx.pages.iter().all(|p| p.page.id != "draft"));

        let about_fr = ctx
            .pages
            .iter()
            .find(|p| p.page.id == "about" && p.locale == "fr")
            .unwrap();
        assert_eq!(about_fr.output_path, "fr/a-propos/index.html");
        assert_eq!(about_fr.url, "https://example.com/fr/a-propos/");
        assert_eq!(about_fr.metadata.hash.len(), 64);

        let home_en = ctx.pages.iter().find(|p| p.key() == "home:en").unwrap();
        assert_eq!(home_en.output_path, "index.html");
        assert_eq!(ctx.menus["en"]["main"].code, "primary");
        assert!(ctx.menus["fr"].is_empty());
    }

    #[tokio::test]
    async fn test_missing_translation_is_omitted() {
        let source = testutil::source();
        let opts = BuildOptions {
            locales: vec!["fr".into()],
            ..Default::default()
        };
        let ctx = load_context(&source, &testutil::config(), &opts, testutil::ts(10))
            .await
            .unwrap();
        assert!(!ctx.full_snapshot);
        assert_eq!(ctx.pages.len(), 2);
        assert!(ctx.pages.iter().all(|p| p.page.id != "hello"));
    }

    #[tokio::test]
    async fn test_blocks_filtered_by_locale() {
        let source = testutil::source();
        let ctx = load_context(&source, &testutil::config(), &BuildOptions::default(), testutil::ts(10))
            .await
            .unwrap();
        let home_fr = ctx.pages.iter().find(|p| p.key() == "home:fr").unwrap();
        let ids: Vec<_> = home_fr.blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["footer", "hero-fr"]);
    }

    #[tokio::test]
    async fn test_hash_changes_with_translation() {
        let config = testutil::config();
        let opts = BuildOptions::default();
        let before = load_context(&testutil::source(), &config, &opts, testutil::ts(10))
            .await
            .unwrap();

        let mut source = testutil::source();
        let about = source.pages_mut().iter_mut().find(|p| p.id == "about").unwrap();
        about.translations[0].title = "About us".into();
        let after = load_context(&source, &config, &opts, testutil::ts(10)).await.unwrap();

        let hash = |ctx: &BuildContext, key: &str| {
            ctx.pages.iter().find(|p| p.key() == key).unwrap().metadata.hash.clone()
        };
        assert_ne!(hash(&before, "about:en"), hash(&after, "about:en"));
        assert_eq!(hash(&before, "about:fr"), hash(&after, "about:fr"));
    }

    #[tokio::test]
    async fn test_hash_follows_menus_and_site() {
        let config = testutil::config();
        let opts = BuildOptions::default();
        let hash = |ctx: &BuildContext, key: &str| {
            ctx.pages.iter().find(|p| p.key() == key).unwrap().metadata.hash.clone()
        };
        let before = load_context(&testutil::source(), &config, &opts, testutil::ts(10))
            .await
            .unwrap();

        // 只改英文菜单：英文页面全部变化，法文页面不受影响
        let source = testutil::source().with_menu(
            "en",
            Menu {
                code: "primary".into(),
                items: vec![MenuItem {
                    label: "Contact".into(),
                    url: "/contact/".into(),
                    children: vec![],
                }],
            },
        );
        let menu_edit = load_context(&source, &config, &opts, testutil::ts(10)).await.unwrap();
        for key in ["home:en", "about:en", "hello:en"] {
            assert_ne!(hash(&before, key), hash(&menu_edit, key), "{key}");
        }
        assert_eq!(hash(&before, "home:fr"), hash(&menu_edit, "home:fr"));

        let mut retitled = testutil::config();
        retitled.site.title = "Renamed".into();
        let site_edit = load_context(&testutil::source(), &retitled, &opts, testutil::ts(10))
            .await
            .unwrap();
        assert_ne!(hash(&before, "home:fr"), hash(&site_edit, "home:fr"));
    }

    #[tokio::test]
    async fn test_missing_template_is_fatal() {
        let source = testutil::source().with_page(Page {
            id: "orphan".into(),
            template_id: "tpl-missing".into(),
            status: PageStatus::Published,
            translations: vec![testutil::translation("en", "Orphan", "/orphan")],
            ..Default::default()
        });
        let err = load_context(&source, &testutil::config(), &BuildOptions::default(), testutil::ts(10))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::TemplateRequired { ref page_id, .. } if page_id == "orphan"));
    }

    #[tokio::test]
    async fn test_configured_locales_and_default() {
        let source = testutil::source().with_menu(
            "fr",
            Menu {
                code: "primary".into(),
                items: vec![],
            },
        );
        let mut config = testutil::config();
        config.locales = vec!["fr".into(), "en".into()];
        config.default_locale = "fr".into();
        let ctx = load_context(&source, &config, &BuildOptions::default(), testutil::ts(10))
            .await
            .unwrap();
        let home_fr = ctx.pages.iter().find(|p| p.key() == "home:fr").unwrap();
        assert_eq!(home_fr.output_path, "index.html");
        let home_en = ctx.pages.iter().find(|p| p.key() == "home:en").unwrap();
        assert_eq!(home_en.output_path, "en/index.html");
        assert_eq!(ctx.menus["fr"]["main"].code, "primary");
    }
}
