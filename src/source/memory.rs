use super::{SiteSource, SourceResult};
use crate::model::{Content, Locale, Menu, Page, Template, Theme, Widget};
use crate::BoxFuture;
use std::collections::HashMap;

/// 内存中的站点快照，供测试与嵌入式场景使用
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pages: Vec<Page>,
    contents: HashMap<String, Content>,
    locales: Vec<Locale>,
    templates: HashMap<String, Template>,
    themes: Vec<Theme>,
    menus: HashMap<(String, String), Menu>,
    widgets: HashMap<(String, String), Vec<Widget>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locale(mut self, code: &str, is_default: bool) -> Self {
        self.locales.push(Locale {
            code: code.to_owned(),
            name: code.to_owned(),
            is_default,
            active: true,
        });
        self
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.pages.push(page);
        self
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.contents.insert(content.id.clone(), content);
        self
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.templates.insert(template.id.clone(), template);
        self
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.themes.push(theme);
        self
    }

    pub fn with_menu(mut self, locale: &str, menu: Menu) -> Self {
        self.menus
            .insert((menu.code.clone(), locale.to_owned()), menu);
        self
    }

    pub fn with_widgets(mut self, page_id: &str, locale: &str, widgets: Vec<Widget>) -> Self {
        self.widgets
            .insert((page_id.to_owned(), locale.to_owned()), widgets);
        self
    }

    pub fn pages_mut(&mut self) -> &mut Vec<Page> {
        &mut self.pages
    }
}

impl SiteSource for MemorySource {
    fn pages(&self) -> BoxFuture<'_, SourceResult<Vec<Page>>> {
        Box::pin(async move { Ok(self.pages.clone()) })
    }

    fn content<'a>(&'a self, id: &'a str) -> BoxFuture<'a, SourceResult<Option<Content>>> {
        Box::pin(async move { Ok(self.contents.get(id).cloned()) })
    }

    fn locales(&self) -> BoxFuture<'_, SourceResult<Vec<Locale>>> {
        Box::pin(async move { Ok(self.locales.clone()) })
    }

    fn template<'a>(&'a self, id: &'a str) -> BoxFuture<'a, SourceResult<Option<Template>>> {
        Box::pin(async move { Ok(self.templates.get(id).cloned()) })
    }

    fn themes(&self) -> BoxFuture<'_, SourceResult<Vec<Theme>>> {
        Box::pin(async move { Ok(self.themes.clone()) })
    }

    fn menu<'a>(
        &'a self,
        code: &'a str,
        locale: &'a str,
    ) -> BoxFuture<'a, SourceResult<Option<Menu>>> {
        Box::pin(async move {
            Ok(self
                .menus
                .get(&(code.to_owned(), locale.to_owned()))
                .cloned())
        })
    }

    fn widgets<'a>(
        &'a self,
        page_id: &'a str,
        locale: &'a str,
    ) -> BoxFuture<'a, SourceResult<Vec<Widget>>> {
        Box::pin(async move {
            Ok(self
                .widgets
                .get(&(page_id.to_owned(), locale.to_owned()))
                .cloned()
                .unwrap_or_default())
        })
    }
}
