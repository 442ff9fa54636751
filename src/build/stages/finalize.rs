use crate::build::context::BuildContext;
use crate::config::GeneratorConfig;
use std::collections::{BTreeMap, HashSet};

/// 生成 sitemap.xml，覆盖上下文中的全部页面（不只是本次重建的部分）
pub fn build_sitemap(ctx: &BuildContext) -> String {
    let multilingual = ctx.locales.len() > 1;

    // 页面 → 各语言版本
    let mut alternates: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
    for page in &ctx.pages {
        alternates
            .entry(page.page.id.as_str())
            .or_default()
            .push((page.locale.as_str(), page.url.as_str()));
    }

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\"");
    if multilingual {
        xml.push_str(" xmlns:xhtml=\"http://www.w3.org/1999/xhtml\"");
    }
    xml.push_str(">\n");

    let mut seen = HashSet::new();
    for page in &ctx.pages {
        if !seen.insert(page.key()) {
            continue;
        }
        xml.push_str("  <url>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", xml_escape(&page.url)));
        let lastmod = page.metadata.last_modified.unwrap_or(ctx.generated_at);
        xml.push_str(&format!("    <lastmod>{}</lastmod>\n", lastmod.format("%Y-%m-%d")));

        let versions = alternates.get(page.page.id.as_str()).map(Vec::as_slice).unwrap_or_default();
        if multilingual && versions.len() > 1 {
            for (locale, href) in versions {
                xml.push_str(&format!(
                    "    <xhtml:link rel=\"alternate\" hreflang=\"{}\" href=\"{}\" />\n",
                    xml_escape(locale),
                    xml_escape(href)
                ));
            }
        }
        xml.push_str("  </url>\n");
    }

    xml.push_str("</urlset>\n");
    xml
}

/// 生成 robots.txt
pub fn build_robots(config: &GeneratorConfig, sitemap_enabled: bool) -> String {
    let mut out = String::from("User-agent: *\n");
    if config.robots_disallow.is_empty() {
        out.push_str("Allow: /\n");
    } else {
        for path in &config.robots_disallow {
            out.push_str(&format!("Disallow: {path}\n"));
        }
    }
    if sitemap_enabled {
        out.push_str(&format!("\nSitemap: {}/sitemap.xml\n", config.base_url));
    }
    out
}

pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
