use crate::build::context::{BuildContext, PageData};
use crate::build::stages::finalize::xml_escape;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// 每个 feed 最多条目数
pub const MAX_FEED_ITEMS: usize = 100;

pub const RSS_ALIAS: &str = "feed.xml";
pub const ATOM_ALIAS: &str = "feed.atom.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss,
    Atom,
}

impl FeedFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Rss => "application/rss+xml; charset=utf-8",
            Self::Atom => "application/atom+xml; charset=utf-8",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// 一个待写出的 feed 文档，`path` 相对输出目录
#[derive(Debug, Clone)]
pub struct FeedDocument {
    pub path: String,
    pub locale: String,
    pub format: FeedFormat,
    pub body: String,
    /// 默认语言的别名文档（feed.xml / feed.atom.xml）
    pub alias: bool,
}

/// 为每个有页面的语言生成 RSS 与 Atom，并为默认语言追加别名
pub fn build_feeds(ctx: &BuildContext) -> Vec<FeedDocument> {
    let mut docs = Vec::new();
    for locale in &ctx.locales {
        let items = collect_items(ctx, locale);
        if items.is_empty() {
            tracing::debug!("语言 {} 没有可输出的 feed 条目", locale);
            continue;
        }

        let rss = FeedDocument {
            path: format!("{locale}.rss.xml"),
            locale: locale.clone(),
            format: FeedFormat::Rss,
            body: render_rss(ctx, locale, &format!("{locale}.rss.xml"), &items),
            alias: false,
        };
        let atom = FeedDocument {
            path: format!("{locale}.atom.xml"),
            locale: locale.clone(),
            format: FeedFormat::Atom,
            body: render_atom(ctx, locale, &format!("{locale}.atom.xml"), &items),
            alias: false,
        };

        if *locale == ctx.default_locale {
            docs.push(FeedDocument {
                path: RSS_ALIAS.to_owned(),
                alias: true,
                ..rss.clone()
            });
            docs.push(FeedDocument {
                path: ATOM_ALIAS.to_owned(),
                alias: true,
                ..atom.clone()
            });
        }
        docs.push(rss);
        docs.push(atom);
    }
    docs
}

/// 选出某语言的 feed 条目：按发布时间、更新时间倒序，再按 GUID 升序，GUID 去重
pub fn collect_items(ctx: &BuildContext, locale: &str) -> Vec<FeedItem> {
    let mut items: Vec<FeedItem> = ctx
        .pages_in(locale)
        .map(|page| feed_item(ctx, page))
        .collect();
    items.sort_by(|a, b| {
        b.published
            .cmp(&a.published)
            .then_with(|| b.updated.cmp(&a.updated))
            .then_with(|| a.guid.cmp(&b.guid))
    });
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.guid.clone()));
    items.truncate(MAX_FEED_ITEMS);
    items
}

fn feed_item(ctx: &BuildContext, page: &PageData) -> FeedItem {
    let summary = [
        Some(page.translation.summary.as_str()),
        page.content_translation.as_ref().map(|t| t.summary.as_str()),
    ]
    .into_iter()
    .flatten()
    .map(normalize_whitespace)
    .find(|s| !s.is_empty())
    .unwrap_or_default();

    let content = page.content.as_deref();
    let published = page
        .page
        .published_at
        .or(content.and_then(|c| c.published_at))
        .or(page.metadata.last_modified)
        .or(page.page.created_at)
        .unwrap_or(ctx.generated_at);
    let updated = page
        .metadata
        .last_modified
        .or(page.page.updated_at)
        .or(content.and_then(|c| c.updated_at))
        .unwrap_or(published);

    FeedItem {
        guid: page.guid(),
        title: page.translation.title.clone(),
        link: page.url.clone(),
        summary,
        published,
        updated,
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn channel_link(ctx: &BuildContext, locale: &str) -> String {
    format!("{}{}/", ctx.site.base_url, ctx.locale_prefix(locale))
}

fn render_rss(ctx: &BuildContext, locale: &str, self_path: &str, items: &[FeedItem]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<rss version=\"2.0\" xmlns:atom=\"http://www.w3.org/2005/Atom\">\n");
    xml.push_str("  <channel>\n");
    xml.push_str(&format!("    <title>{}</title>\n", xml_escape(&ctx.site.title)));
    xml.push_str(&format!("    <link>{}</link>\n", xml_escape(&channel_link(ctx, locale))));
    xml.push_str(&format!("    <description>{}</description>\n", xml_escape(&ctx.site.description)));
    xml.push_str(&format!("    <language>{}</language>\n", xml_escape(locale)));
    xml.push_str(&format!(
        "    <lastBuildDate>{}</lastBuildDate>\n",
        ctx.generated_at.to_rfc2822()
    ));
    xml.push_str(&format!(
        "    <atom:link href=\"{}/{}\" rel=\"self\" type=\"application/rss+xml\" />\n",
        xml_escape(&ctx.site.base_url),
        xml_escape(self_path)
    ));

    for item in items {
        xml.push_str("    <item>\n");
        xml.push_str(&format!("      <title>{}</title>\n", xml_escape(&item.title)));
        xml.push_str(&format!("      <link>{}</link>\n", xml_escape(&item.link)));
        xml.push_str(&format!(
            "      <guid isPermaLink=\"false\">{}</guid>\n",
            xml_escape(&item.guid)
        ));
        xml.push_str(&format!("      <pubDate>{}</pubDate>\n", item.published.to_rfc2822()));
        if !item.summary.is_empty() {
            xml.push_str(&format!(
                "      <description>{}</description>\n",
                xml_escape(&item.summary)
            ));
        }
        xml.push_str("    </item>\n");
    }

    xml.push_str("  </channel>\n</rss>\n");
    xml
}

fn render_atom(ctx: &BuildContext, locale: &str, self_path: &str, items: &[FeedItem]) -> String {
    let link = channel_link(ctx, locale);
    let updated = items
        .iter()
        .map(|i| i.updated)
        .max()
        .unwrap_or(ctx.generated_at);

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<feed xmlns=\"http://www.w3.org/2005/Atom\" xml:lang=\"{}\">\n",
        xml_escape(locale)
    ));
    xml.push_str(&format!("  <title>{}</title>\n", xml_escape(&ctx.site.title)));
    xml.push_str(&format!("  <link href=\"{}\" />\n", xml_escape(&link)));
    xml.push_str(&format!(
        "  <link href=\"{}/{}\" rel=\"self\" />\n",
        xml_escape(&ctx.site.base_url),
        xml_escape(self_path)
    ));
    xml.push_str(&format!("  <id>{}</id>\n", xml_escape(&link)));
    xml.push_str(&format!("  <updated>{}</updated>\n", updated.to_rfc3339()));

    for item in items {
        xml.push_str("  <entry>\n");
        xml.push_str(&format!("    <title>{}</title>\n", xml_escape(&item.title)));
        xml.push_str(&format!("    <link href=\"{}\" />\n", xml_escape(&item.link)));
        xml.push_str(&format!("    <id>urn:page:{}</id>\n", xml_escape(&item.guid)));
        xml.push_str(&format!("    <published>{}</published>\n", item.published.to_rfc3339()));
        xml.push_str(&format!("    <updated>{}</updated>\n", item.updated.to_rfc3339()));
        if !item.summary.is_empty() {
            xml.push_str(&format!("    <summary>{}</summary>\n", xml_escape(&item.summary)));
        }
        xml.push_str("  </entry>\n");
    }

    xml.push_str("</feed>\n");
    xml
}
