use crate::build::artifact::{ArtifactWrite, ArtifactWriter};
use crate::build::context::{BuildContext, PageData};
use crate::build::result::{PageOutcome, RenderedPage};
use crate::error::BuildError;
use crate::hooks::BuildHooks;
use crate::render::{LocaleHelpers, PageView, Renderer, SiteView, TemplateContext};
use crate::shortcode::ShortcodeRenderer;
use crate::storage::ArtifactCategory;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinSet;

/// 渲染阶段共享的协作者
#[derive(Clone)]
pub struct RenderEnv {
    pub ctx: Arc<BuildContext>,
    pub renderer: Arc<dyn Renderer>,
    pub shortcodes: Arc<dyn ShortcodeRenderer>,
    pub writer: Arc<ArtifactWriter>,
    pub hooks: Arc<dyn BuildHooks>,
    pub output_dir: PathBuf,
    pub render_timeout: Duration,
    pub workers: usize,
}

/// 单个页面的渲染结果
#[derive(Debug, Clone)]
pub struct PageReport {
    pub page: Arc<PageData>,
    pub outcome: PageOutcome,
    pub rendered: Option<RenderedPage>,
    pub err: Option<Arc<BuildError>>,
}

#[derive(Debug, Default)]
pub struct RenderOutcome {
    pub reports: Vec<PageReport>,
    /// 第一个致命错误
    pub fatal: Option<Arc<BuildError>>,
    /// 因中止而未开始的页面
    pub pending: Vec<Arc<PageData>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// 固定数量的工作任务从共享队列取页面渲染，全部结束后返回
///
/// 出现致命错误后空闲的工作任务不再取新页面，进行中的页面在各自的超时内结束。
pub async fn render_pages(env: RenderEnv, jobs: Vec<Arc<PageData>>) -> RenderOutcome {
    if jobs.is_empty() {
        return RenderOutcome::default();
    }

    let workers = env.workers.max(1).min(jobs.len());
    let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
    let outcome = Arc::new(Mutex::new(RenderOutcome::default()));
    let abort = Arc::new(AtomicBool::new(false));
    let env = Arc::new(env);

    tracing::debug!("启动 {} 个渲染任务", workers);
    let mut set = JoinSet::new();
    for _ in 0..workers {
        let env = env.clone();
        let queue = queue.clone();
        let outcome = outcome.clone();
        let abort = abort.clone();
        set.spawn(async move {
            loop {
                if abort.load(Ordering::SeqCst) {
                    break;
                }
                let Some(page) = lock(&queue).pop_front() else {
                    break;
                };
                let report = render_one(&env, page).await;
                let mut acc = lock(&outcome);
                if let Some(err) = report.err.as_ref().filter(|e| e.is_fatal()) {
                    abort.store(true, Ordering::SeqCst);
                    acc.fatal.get_or_insert_with(|| err.clone());
                }
                acc.reports.push(report);
            }
        });
    }

    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            tracing::error!("渲染任务异常退出：{e}");
            abort.store(true, Ordering::SeqCst);
            lock(&outcome)
                .fatal
                .get_or_insert_with(|| Arc::new(BuildError::Join(e)));
        }
    }

    let mut result = std::mem::take(&mut *lock(&outcome));
    result.pending = lock(&queue).drain(..).collect();
    result
}

async fn render_one(env: &RenderEnv, page: Arc<PageData>) -> PageReport {
    let fail = |page: Arc<PageData>, err: BuildError| {
        tracing::error!("页面 {}（{}）构建失败：{}", page.page.id, page.locale, err);
        PageReport {
            page,
            outcome: PageOutcome::Failed,
            rendered: None,
            err: Some(Arc::new(err)),
        }
    };

    let tctx = match template_context(env, &page) {
        Ok(tctx) => tctx,
        Err(e) => return fail(page, e),
    };

    let renderer = env.renderer.clone();
    let name = page.template.path.clone();
    let task = tokio::task::spawn_blocking(move || renderer.render_template(&name, &tctx));
    let html = match tokio::time::timeout(env.render_timeout, task).await {
        Err(_) => {
            let err = BuildError::RenderTimeout {
                page_id: page.page.id.clone(),
                locale: page.locale.clone(),
                timeout: env.render_timeout,
            };
            return fail(page, err);
        }
        Ok(Err(join)) => return fail(page, BuildError::Join(join)),
        Ok(Ok(Err(source))) => {
            let err = BuildError::Render {
                page_id: page.page.id.clone(),
                locale: page.locale.clone(),
                source,
            };
            return fail(page, err);
        }
        Ok(Ok(Ok(html))) => html,
    };

    let artifact = ArtifactWrite::new(
        env.output_dir.join(&page.output_path),
        html,
        ArtifactCategory::Page,
    )
    .locale(page.locale.clone())
    .content_type("text/html; charset=utf-8")
    .meta("page_id", page.page.id.clone())
    .meta("template", page.template.path.clone());
    let receipt = match env.writer.write_file(artifact).await {
        Ok(receipt) => receipt,
        Err(e) => return fail(page, e),
    };

    if !receipt.written {
        return PageReport {
            page,
            outcome: PageOutcome::Rendered,
            rendered: None,
            err: None,
        };
    }

    let rendered = RenderedPage {
        page_id: page.page.id.clone(),
        locale: page.locale.clone(),
        output: receipt.path,
        checksum: receipt.checksum,
    };
    if let Err(cause) = env.hooks.after_page(&rendered) {
        return fail(page, BuildError::hook("after_page", cause));
    }
    tracing::debug!("已渲染 {}（{}）", rendered.page_id, rendered.locale);
    PageReport {
        page,
        outcome: PageOutcome::Rendered,
        rendered: Some(rendered),
        err: None,
    }
}

/// 组装模板上下文，对摘要、正文与区块做短代码展开
pub fn template_context(env: &RenderEnv, page: &PageData) -> Result<TemplateContext, BuildError> {
    let ctx = &env.ctx;
    let locale = page.locale.as_str();
    let expand = |text: &str| {
        env.shortcodes
            .render(text, locale)
            .map_err(|source| BuildError::Shortcode {
                page_id: page.page.id.clone(),
                locale: locale.to_owned(),
                source,
            })
    };

    let mut translation = page.translation.clone();
    translation.summary = expand(&translation.summary)?;

    let content_translation = match &page.content_translation {
        Some(ct) => {
            let mut ct = ct.clone();
            ct.body = expand(&ct.body)?;
            ct.summary = expand(&ct.summary)?;
            Some(ct)
        }
        None => None,
    };

    let mut blocks = page.blocks.clone();
    for block in &mut blocks {
        block.body = expand(&block.body)?;
    }

    let prefix = ctx.locale_prefix(locale);
    Ok(TemplateContext {
        site: SiteView {
            base_url: ctx.site.base_url.clone(),
            title: ctx.site.title.clone(),
            description: ctx.site.description.clone(),
            extra: ctx.site.extra.clone(),
            locale: locale.to_owned(),
            default_locale: ctx.default_locale.clone(),
            locales: ctx.locales.clone(),
            menus: ctx.menus_for(locale),
        },
        page: PageView {
            id: page.page.id.clone(),
            locale: locale.to_owned(),
            url: page.url.clone(),
            output_path: page.output_path.clone(),
            template: page.template.clone(),
            translation,
            content: page.content.as_deref().cloned(),
            content_translation,
            blocks,
            widgets: page.widgets.clone(),
            hash: page.metadata.hash.clone(),
            last_modified: page.metadata.last_modified,
        },
        helpers: LocaleHelpers {
            base_url: ctx.site.base_url.clone(),
            locale: locale.to_owned(),
            prefix,
        },
        generated_at: ctx.generated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::stages::load::load_context;
    use crate::build::BuildOptions;
    use crate::hooks::NoopHooks;
    use crate::render::MiniJinjaRenderer;
    use crate::shortcode::{Passthrough, ShortcodeRegistry};
    use crate::storage::MemoryStorage;
    use crate::testutil;

    async fn env_with(
        renderer: Arc<dyn Renderer>,
        storage: Arc<MemoryStorage>,
        workers: usize,
        timeout: Duration,
    ) -> (RenderEnv, Vec<Arc<PageData>>) {
        let ctx = load_context(
            &testutil::source(),
            &testutil::config(),
            &BuildOptions::default(),
            testutil::ts(10),
        )
        .await
        .unwrap();
        let jobs = ctx.pages.clone();
        let env = RenderEnv {
            ctx: Arc::new(ctx),
            renderer,
            shortcodes: Arc::new(ShortcodeRegistry::new().with("year", |_| Ok("2026".into()))),
            writer: Arc::new(ArtifactWriter::new(storage, false)),
            hooks: Arc::new(NoopHooks),
            output_dir: PathBuf::from("public"),
            render_timeout: timeout,
            workers,
        };
        (env, jobs)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_renders_every_page_with_pool() {
        let storage = Arc::new(MemoryStorage::new());
        let (env, jobs) = env_with(Arc::new(testutil::renderer()), storage.clone(), 3, Duration::from_secs(5)).await;
        let outcome = render_pages(env, jobs).await;

        assert!(outcome.fatal.is_none());
        assert!(outcome.pending.is_empty());
        assert_eq!(outcome.reports.len(), 5);
        assert!(outcome.reports.iter().all(|r| r.outcome == PageOutcome::Rendered));
        assert_eq!(storage.writes(ArtifactCategory::Page), 5);

        let hello = storage.file("public/blog/hello/index.html").unwrap();
        assert!(hello.contains("<p>Hello 2026</p>"), "{hello}");
        let home_fr = storage.file("public/fr/index.html").unwrap();
        assert!(home_fr.contains("<div>© 2026</div><div>Bienvenue</div>"), "{home_fr}");
    }

    #[tokio::test]
    async fn test_render_error_is_recorded_and_not_fatal() {
        let storage = Arc::new(MemoryStorage::new());
        let (env, jobs) = env_with(Arc::new(MiniJinjaRenderer::new()), storage.clone(), 1, Duration::from_secs(5)).await;
        let outcome = render_pages(env, jobs).await;

        assert!(outcome.fatal.is_none());
        assert_eq!(outcome.reports.len(), 5);
        assert!(outcome.reports.iter().all(|r| r.outcome == PageOutcome::Failed));
        assert!(matches!(
            outcome.reports[0].err.as_deref(),
            Some(BuildError::Render { .. })
        ));
        assert_eq!(storage.writes(ArtifactCategory::Page), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_aborts_remaining_jobs() {
        let storage = Arc::new(MemoryStorage::new());
        let renderer = testutil::SlowRenderer {
            inner: testutil::renderer(),
            slow_page: "home".into(),
            delay: Duration::from_millis(300),
        };
        let (env, jobs) = env_with(Arc::new(renderer), storage, 1, Duration::from_millis(50)).await;
        let outcome = render_pages(env, jobs).await;

        let fatal = outcome.fatal.expect("timeout should be fatal");
        assert!(fatal.to_string().contains("timed out"));
        assert_eq!(outcome.reports.len(), 1);
        assert_eq!(outcome.pending.len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_keeps_pages_finished_before_it() {
        let storage = Arc::new(MemoryStorage::new());
        let renderer = testutil::SlowRenderer {
            inner: testutil::renderer(),
            slow_page: "about".into(),
            delay: Duration::from_millis(300),
        };
        let (env, jobs) = env_with(Arc::new(renderer), storage.clone(), 1, Duration::from_millis(50)).await;
        let outcome = render_pages(env, jobs).await;

        assert!(outcome.fatal.as_deref().is_some_and(BuildError::is_timeout));
        let done: Vec<_> = outcome
            .reports
            .iter()
            .filter(|r| r.outcome == PageOutcome::Rendered)
            .map(|r| r.page.key())
            .collect();
        assert_eq!(done, vec!["home:en", "home:fr"]);
        assert!(outcome.reports.iter().filter(|r| r.outcome == PageOutcome::Rendered).all(|r| r.rendered.is_some()));
        let pending: Vec<_> = outcome.pending.iter().map(|p| p.key()).collect();
        assert_eq!(pending, vec!["about:fr", "hello:en"]);
        assert_eq!(storage.writes(ArtifactCategory::Page), 2);
    }

    struct RejectAbout;

    impl BuildHooks for RejectAbout {
        fn after_page(&self, page: &RenderedPage) -> anyhow::Result<()> {
            anyhow::ensure!(page.page_id != "about", "about is frozen");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_after_page_failure_is_not_reported_as_rendered() {
        let storage = Arc::new(MemoryStorage::new());
        let (mut env, jobs) = env_with(Arc::new(testutil::renderer()), storage, 1, Duration::from_secs(5)).await;
        env.hooks = Arc::new(RejectAbout);
        let outcome = render_pages(env, jobs).await;

        assert!(matches!(
            outcome.fatal.as_deref(),
            Some(BuildError::Hook { hook: "after_page", .. })
        ));
        let about = outcome.reports.iter().find(|r| r.page.key() == "about:en").unwrap();
        assert_eq!(about.outcome, PageOutcome::Failed);
        assert!(about.rendered.is_none());
        for report in &outcome.reports {
            assert_eq!(report.rendered.is_some(), report.outcome == PageOutcome::Rendered);
        }
    }

    #[tokio::test]
    async fn test_storage_failure_fails_fast() {
        let storage = Arc::new(MemoryStorage::new());
        storage.fail_writes(true);
        let (env, jobs) = env_with(Arc::new(testutil::renderer()), storage, 1, Duration::from_secs(5)).await;
        let outcome = render_pages(env, jobs).await;

        assert!(matches!(outcome.fatal.as_deref(), Some(BuildError::StorageWrite { .. })));
        assert_eq!(outcome.reports.len(), 1);
        assert_eq!(outcome.pending.len(), 4);
    }

    #[tokio::test]
    async fn test_template_context_without_shortcodes() {
        let storage = Arc::new(MemoryStorage::new());
        let (mut env, jobs) = env_with(Arc::new(testutil::renderer()), storage, 1, Duration::from_secs(5)).await;
        env.shortcodes = Arc::new(Passthrough);
        let about = jobs.iter().find(|p| p.key() == "about:fr").unwrap();
        let tctx = template_context(&env, about).unwrap();
        assert_eq!(tctx.helpers.prefix, "/fr");
        assert_eq!(tctx.page.url, "https://example.com/fr/a-propos/");
        assert_eq!(tctx.site.locales, vec!["en", "fr"]);
        assert!(tctx.site.menus.is_empty());
    }
}
