use crate::build::artifact::{ArtifactWrite, ArtifactWriter};
use crate::build::context::{BuildContext, PageData};
use crate::build::events::{BuildEvent, BuildTrigger};
use crate::build::incremental::{Manifest, ManifestEntry, SkipPolicy};
use crate::build::result::{BuildResult, Diagnostic, PageOutcome};
use crate::build::stages::assets::{copy_assets, AssetReport};
use crate::build::stages::feed::build_feeds;
use crate::build::stages::finalize::{build_robots, build_sitemap};
use crate::build::stages::load::load_context;
use crate::build::stages::render::{render_pages, RenderEnv, RenderOutcome};
use crate::build::BuildOptions;
use crate::clock::{Clock, SystemClock};
use crate::config::GeneratorConfig;
use crate::error::{BuildError, BuildFailure};
use crate::hooks::{BuildHooks, NoopHooks};
use crate::render::Renderer;
use crate::shortcode::{Passthrough, ShortcodeRenderer};
use crate::source::SiteSource;
use crate::storage::{ArtifactCategory, Storage};
use crate::theme::AssetResolver;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// 静态站点构建器
///
/// 每次调用 `build` / `build_page` / `build_assets` 都从头加载快照，
/// 跨调用保留的只有存储中的构建清单。
pub struct Generator {
    config: Arc<GeneratorConfig>,
    source: Arc<dyn SiteSource>,
    renderer: Arc<dyn Renderer>,
    storage: Arc<dyn Storage>,
    assets: Option<Arc<dyn AssetResolver>>,
    hooks: Arc<dyn BuildHooks>,
    shortcodes: Arc<dyn ShortcodeRenderer>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<BuildEvent>,
}

/// 一次调用的计时与事件上下文
struct Run<'a> {
    generator: &'a Generator,
    started: Instant,
    result: BuildResult,
}

impl Run<'_> {
    fn stage_begin(&self, stage: &'static str) -> Instant {
        self.generator.emit(BuildEvent::StageBegin { stage });
        Instant::now()
    }

    fn stage_end(&self, stage: &'static str, begin: Instant) -> Duration {
        let elapsed = begin.elapsed();
        self.generator.emit(BuildEvent::StageEnd {
            stage,
            elapsed_ms: elapsed.as_millis() as u64,
        });
        tracing::info!("阶段 {} 完成，耗时 {:.2}s", stage, elapsed.as_secs_f64());
        elapsed
    }

    /// 结束本次调用并携带部分结果返回错误
    fn fail(mut self, error: impl Into<Arc<BuildError>>) -> BuildFailure {
        let error = error.into();
        if !matches!(*error, BuildError::PagesFailed { .. }) {
            self.result.push_error(error.clone());
        }
        self.result.metrics.total = self.started.elapsed();
        tracing::error!("构建 {} 失败：{}", self.result.build_id, error);
        self.generator.emit(BuildEvent::Failed {
            build_id: self.result.build_id.to_string(),
            error: error.to_string(),
        });
        BuildFailure {
            error,
            result: Box::new(self.result),
        }
    }

    fn finish(mut self) -> BuildResult {
        let result = &mut self.result;
        result.metrics.total = self.started.elapsed();
        tracing::info!(
            "构建完成，耗时 {:.2}s（渲染 {}，跳过 {}，资源 {}/{}，feed {}）",
            result.metrics.total.as_secs_f64(),
            result.pages_built,
            result.pages_skipped,
            result.assets_built,
            result.assets_skipped,
            result.feeds_built,
        );
        self.generator.emit(BuildEvent::Finished {
            build_id: result.build_id.to_string(),
            total_ms: result.metrics.total.as_millis() as u64,
            pages_built: result.pages_built,
            pages_skipped: result.pages_skipped,
            assets_built: result.assets_built,
            feeds_built: result.feeds_built,
        });
        self.result
    }

    /// 合并渲染结果；返回致命错误与成功渲染的页面
    fn absorb(&mut self, outcome: RenderOutcome) -> (Option<Arc<BuildError>>, Vec<Arc<PageData>>) {
        let result = &mut self.result;
        let mut built = Vec::new();
        for report in outcome.reports {
            if report.outcome == PageOutcome::Rendered {
                result.pages_built += 1;
                built.push(report.page.clone());
            }
            if let Some(rendered) = report.rendered {
                result.rendered.push(rendered);
            }
            if let Some(err) = &report.err {
                result.push_error(err.clone());
            }
            result.diagnostics.push(Diagnostic {
                page_id: report.page.page.id.clone(),
                locale: report.page.locale.clone(),
                template: report.page.template.path.clone(),
                outcome: report.outcome,
                err: report.err,
            });
        }
        for page in outcome.pending {
            result.diagnostics.push(Diagnostic {
                page_id: page.page.id.clone(),
                locale: page.locale.clone(),
                template: page.template.path.clone(),
                outcome: PageOutcome::Cancelled,
                err: None,
            });
        }
        (outcome.fatal, built)
    }
}

impl Generator {
    pub fn new(
        config: GeneratorConfig,
        source: Arc<dyn SiteSource>,
        renderer: Arc<dyn Renderer>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config: Arc::new(config),
            source,
            renderer,
            storage,
            assets: None,
            hooks: Arc::new(NoopHooks),
            shortcodes: Arc::new(Passthrough),
            clock: Arc::new(SystemClock),
            events,
        }
    }

    pub fn with_asset_resolver(mut self, resolver: Arc<dyn AssetResolver>) -> Self {
        self.assets = Some(resolver);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn BuildHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_shortcodes(mut self, shortcodes: Arc<dyn ShortcodeRenderer>) -> Self {
        self.shortcodes = shortcodes;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// 订阅构建进度事件
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: BuildEvent) {
        // 没有订阅者时发送失败，忽略
        let _ = self.events.send(event);
    }

    fn begin(&self, trigger: BuildTrigger, dry_run: bool) -> Run<'_> {
        let result = BuildResult::new(dry_run);
        tracing::info!("开始构建 {}（{}，dry run: {}）", result.build_id, trigger.as_str(), dry_run);
        self.emit(BuildEvent::Started {
            build_id: result.build_id.to_string(),
            trigger,
        });
        Run {
            generator: self,
            started: Instant::now(),
            result,
        }
    }

    fn render_env(&self, ctx: &Arc<BuildContext>, writer: &Arc<ArtifactWriter>) -> RenderEnv {
        RenderEnv {
            ctx: ctx.clone(),
            renderer: self.renderer.clone(),
            shortcodes: self.shortcodes.clone(),
            writer: writer.clone(),
            hooks: self.hooks.clone(),
            output_dir: self.config.output_dir.clone(),
            render_timeout: self.config.render_timeout,
            workers: self.config.workers,
        }
    }

    async fn load_manifest(&self) -> Result<Manifest, BuildError> {
        if !self.config.incremental {
            return Ok(Manifest::default());
        }
        Manifest::load(
            self.storage.as_ref(),
            &self.config.manifest_path(),
            self.config.storage_timeout,
        )
        .await
    }

    fn writer(&self, dry_run: bool) -> ArtifactWriter {
        ArtifactWriter::new(self.storage.clone(), dry_run).with_timeout(self.config.storage_timeout)
    }

    /// 删除输出目录，受 `storage_timeout` 限制
    async fn remove_output(&self) -> Result<(), BuildError> {
        let output_dir = &self.config.output_dir;
        match tokio::time::timeout(self.config.storage_timeout, self.storage.remove(output_dir)).await {
            Ok(removed) => removed.map_err(BuildError::Storage),
            Err(_) => Err(BuildError::StorageTimeout {
                path: output_dir.clone(),
                timeout: self.config.storage_timeout,
            }),
        }
    }

    async fn write_manifest(
        &self,
        writer: &ArtifactWriter,
        manifest: &mut Manifest,
        build_id: String,
        now: DateTime<Utc>,
    ) -> Result<(), BuildError> {
        manifest.stamp(build_id, now);
        let json = manifest.to_json()?;
        writer
            .write_file(
                ArtifactWrite::new(self.config.manifest_path(), json, ArtifactCategory::Manifest)
                    .content_type("application/json"),
            )
            .await?;
        tracing::debug!(
            "已写入构建清单：{} 个页面，{} 个资源",
            manifest.pages.len(),
            manifest.assets.len()
        );
        Ok(())
    }

    /// 完整构建：增量判断、渲染、sitemap/robots、feed、资源与构建清单
    pub async fn build(&self, opts: BuildOptions) -> Result<BuildResult, BuildFailure> {
        let mut run = self.begin(BuildTrigger::Full, opts.dry_run);
        let mut opts = opts;

        if let Err(cause) = self.hooks.before_build(&opts) {
            return Err(run.fail(BuildError::hook("before_build", cause)));
        }

        if self.config.clean_build && !opts.dry_run {
            tracing::info!("clean_build 已开启，清空输出目录 {}", self.config.output_dir.display());
            if let Err(e) = self.remove_output().await {
                return Err(run.fail(e));
            }
            opts.force = true;
        }

        let now = self.clock.now();
        let begin = run.stage_begin("context");
        let ctx = match load_context(self.source.as_ref(), &self.config, &opts, now).await {
            Ok(ctx) => Arc::new(ctx),
            Err(e) => return Err(run.fail(e)),
        };
        run.result.metrics.context = run.stage_end("context", begin);

        let manifest = match self.load_manifest().await {
            Ok(manifest) => manifest,
            Err(e) => return Err(run.fail(e)),
        };
        let writer = Arc::new(self.writer(opts.dry_run));

        // 增量判断
        let policy = SkipPolicy::new(&manifest, self.config.incremental, opts.force);
        let mut jobs = Vec::new();
        for page in &ctx.pages {
            if policy.should_skip_page(&page.page.id, &page.locale, &page.metadata.hash, &page.output_path) {
                run.result.pages_skipped += 1;
                run.result.diagnostics.push(Diagnostic {
                    page_id: page.page.id.clone(),
                    locale: page.locale.clone(),
                    template: page.template.path.clone(),
                    outcome: PageOutcome::Skipped,
                    err: None,
                });
            } else {
                jobs.push(page.clone());
            }
        }
        tracing::info!(
            "共 {} 个页面，待渲染 {}，未变化 {}",
            ctx.pages.len(),
            jobs.len(),
            run.result.pages_skipped
        );

        let begin = run.stage_begin("render");
        let outcome = render_pages(self.render_env(&ctx, &writer), jobs).await;
        let (fatal, built) = run.absorb(outcome);
        run.result.metrics.render = run.stage_end("render", begin);
        if let Some(err) = fatal {
            return Err(run.fail(err));
        }

        // sitemap 与 feed 需要完整快照，部分构建时保留上一次的文件
        if ctx.full_snapshot && (self.config.generate_sitemap || self.config.generate_robots) {
            let begin = run.stage_begin("sitemap");
            if self.config.generate_sitemap {
                let artifact = ArtifactWrite::new(
                    self.config.output_dir.join("sitemap.xml"),
                    build_sitemap(&ctx),
                    ArtifactCategory::Sitemap,
                )
                .content_type("application/xml; charset=utf-8");
                if let Err(e) = writer.write_file(artifact).await {
                    return Err(run.fail(e));
                }
            }
            if self.config.generate_robots {
                let artifact = ArtifactWrite::new(
                    self.config.output_dir.join("robots.txt"),
                    build_robots(&self.config, self.config.generate_sitemap),
                    ArtifactCategory::Sitemap,
                )
                .content_type("text/plain; charset=utf-8");
                if let Err(e) = writer.write_file(artifact).await {
                    return Err(run.fail(e));
                }
            }
            run.result.metrics.sitemap = run.stage_end("sitemap", begin);
        } else if !ctx.full_snapshot {
            tracing::debug!("部分构建，跳过 sitemap 与 feed");
        }

        if ctx.full_snapshot && self.config.generate_feeds {
            let begin = run.stage_begin("feed");
            for doc in build_feeds(&ctx) {
                let artifact = ArtifactWrite::new(
                    self.config.output_dir.join(&doc.path),
                    doc.body,
                    ArtifactCategory::Feed,
                )
                .locale(doc.locale)
                .content_type(doc.format.content_type())
                .meta("alias", doc.alias.to_string());
                if let Err(e) = writer.write_file(artifact).await {
                    return Err(run.fail(e));
                }
                run.result.feeds_built += 1;
            }
            run.result.metrics.feed = run.stage_end("feed", begin);
        }

        let mut assets: Option<AssetReport> = None;
        if self.config.copy_assets {
            match &self.assets {
                Some(resolver) => {
                    let begin = run.stage_begin("assets");
                    let mut report = AssetReport::default();
                    let copied = copy_assets(
                        resolver.as_ref(),
                        &writer,
                        &ctx.themes,
                        &self.config.output_dir,
                        self.config.asset_copy_timeout,
                        policy,
                        now,
                        &mut report,
                    )
                    .await;
                    run.result.assets_built += report.built;
                    run.result.assets_skipped += report.skipped;
                    for err in report.errors.drain(..) {
                        run.result.push_error(err);
                    }
                    run.result.metrics.assets = run.stage_end("assets", begin);
                    if let Err(e) = copied {
                        return Err(run.fail(e));
                    }
                    assets = Some(report);
                }
                None => tracing::debug!("未配置资源解析器，跳过资源复制"),
            }
        }

        if !run.result.errors.is_empty() {
            let failed = run.result.errors.len();
            return Err(run.fail(BuildError::PagesFailed { failed }));
        }

        if self.config.incremental {
            let begin = run.stage_begin("manifest");
            let mut next = manifest.clone();
            for page in &built {
                next.record_page(manifest_entry(page, now));
            }
            if ctx.full_snapshot {
                let keys: HashSet<String> = ctx.pages.iter().map(|p| p.key()).collect();
                next.retain_pages(&keys);
            }
            if let Some(report) = assets {
                if ctx.full_snapshot {
                    next.assets.clear();
                }
                for (path, entry) in report.entries {
                    next.record_asset(path, entry);
                }
            }
            let build_id = run.result.build_id.to_string();
            if let Err(e) = self.write_manifest(&writer, &mut next, build_id, now).await {
                return Err(run.fail(e));
            }
            run.result.metrics.manifest = run.stage_end("manifest", begin);
        }

        if let Err(cause) = self.hooks.after_build(&opts, &run.result) {
            return Err(run.fail(BuildError::hook("after_build", cause)));
        }
        Ok(run.finish())
    }

    /// 强制渲染单个页面的一个语言版本，并合并进构建清单
    pub async fn build_page(&self, page_id: &str, locale: &str) -> Result<BuildResult, BuildFailure> {
        let mut run = self.begin(BuildTrigger::Page, false);
        let opts = BuildOptions {
            locales: vec![locale.to_owned()],
            page_ids: vec![page_id.to_owned()],
            force: true,
            dry_run: false,
        };

        if let Err(cause) = self.hooks.before_build(&opts) {
            return Err(run.fail(BuildError::hook("before_build", cause)));
        }

        let now = self.clock.now();
        let begin = run.stage_begin("context");
        let ctx = match load_context(self.source.as_ref(), &self.config, &opts, now).await {
            Ok(ctx) => Arc::new(ctx),
            Err(e) => return Err(run.fail(e)),
        };
        run.result.metrics.context = run.stage_end("context", begin);
        if ctx.pages.is_empty() {
            return Err(run.fail(BuildError::PageNotFound {
                page_id: page_id.to_owned(),
                locale: locale.to_owned(),
            }));
        }

        let writer = Arc::new(self.writer(false));
        let begin = run.stage_begin("render");
        let outcome = render_pages(self.render_env(&ctx, &writer), ctx.pages.clone()).await;
        let (fatal, built) = run.absorb(outcome);
        run.result.metrics.render = run.stage_end("render", begin);
        if let Some(err) = fatal {
            return Err(run.fail(err));
        }
        if !run.result.errors.is_empty() {
            let failed = run.result.errors.len();
            return Err(run.fail(BuildError::PagesFailed { failed }));
        }

        if self.config.incremental {
            let begin = run.stage_begin("manifest");
            let mut manifest = match self.load_manifest().await {
                Ok(manifest) => manifest,
                Err(e) => return Err(run.fail(e)),
            };
            for page in &built {
                manifest.record_page(manifest_entry(page, now));
            }
            let build_id = run.result.build_id.to_string();
            if let Err(e) = self.write_manifest(&writer, &mut manifest, build_id, now).await {
                return Err(run.fail(e));
            }
            run.result.metrics.manifest = run.stage_end("manifest", begin);
        }

        if let Err(cause) = self.hooks.after_build(&opts, &run.result) {
            return Err(run.fail(BuildError::hook("after_build", cause)));
        }
        Ok(run.finish())
    }

    /// 强制复制所有启用主题的资源
    pub async fn build_assets(&self) -> Result<BuildResult, BuildFailure> {
        let mut run = self.begin(BuildTrigger::Assets, false);
        let opts = BuildOptions::forced();

        if let Err(cause) = self.hooks.before_build(&opts) {
            return Err(run.fail(BuildError::hook("before_build", cause)));
        }

        let Some(resolver) = &self.assets else {
            tracing::warn!("未配置资源解析器，没有资源可复制");
            if let Err(cause) = self.hooks.after_build(&opts, &run.result) {
                return Err(run.fail(BuildError::hook("after_build", cause)));
            }
            return Ok(run.finish());
        };

        let themes = match self.source.themes().await {
            Ok(themes) => themes.into_iter().filter(|t| t.enabled).collect::<Vec<_>>(),
            Err(e) => return Err(run.fail(BuildError::Source(e))),
        };

        let now = self.clock.now();
        let manifest = match self.load_manifest().await {
            Ok(manifest) => manifest,
            Err(e) => return Err(run.fail(e)),
        };
        let writer = self.writer(false);
        let begin = run.stage_begin("assets");
        let mut report = AssetReport::default();
        let copied = copy_assets(
            resolver.as_ref(),
            &writer,
            &themes,
            &self.config.output_dir,
            self.config.asset_copy_timeout,
            SkipPolicy::new(&manifest, self.config.incremental, true),
            now,
            &mut report,
        )
        .await;
        run.result.assets_built = report.built;
        for err in report.errors.drain(..) {
            run.result.push_error(err);
        }
        run.result.metrics.assets = run.stage_end("assets", begin);
        if let Err(e) = copied {
            return Err(run.fail(e));
        }
        if !run.result.errors.is_empty() {
            let failed = run.result.errors.len();
            return Err(run.fail(BuildError::PagesFailed { failed }));
        }

        if self.config.incremental {
            let mut next = manifest;
            for (path, entry) in report.entries {
                next.record_asset(path, entry);
            }
            let build_id = run.result.build_id.to_string();
            if let Err(e) = self.write_manifest(&writer, &mut next, build_id, now).await {
                return Err(run.fail(e));
            }
        }

        if let Err(cause) = self.hooks.after_build(&opts, &run.result) {
            return Err(run.fail(BuildError::hook("after_build", cause)));
        }
        Ok(run.finish())
    }

    /// 删除整个输出目录，与渲染无关
    pub async fn clean(&self) -> Result<(), BuildError> {
        let started = Instant::now();
        let build_id = ulid::Ulid::new().to_string();
        self.emit(BuildEvent::Started {
            build_id: build_id.clone(),
            trigger: BuildTrigger::Clean,
        });

        match self.clean_output().await {
            Ok(()) => {
                self.emit(BuildEvent::Finished {
                    build_id,
                    total_ms: started.elapsed().as_millis() as u64,
                    pages_built: 0,
                    pages_skipped: 0,
                    assets_built: 0,
                    feeds_built: 0,
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!("清除输出目录失败：{}", e);
                self.emit(BuildEvent::Failed {
                    build_id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn clean_output(&self) -> Result<(), BuildError> {
        let output_dir = &self.config.output_dir;
        self.hooks
            .before_clean(output_dir)
            .map_err(|cause| BuildError::hook("before_clean", cause))?;
        self.remove_output().await?;
        tracing::info!("已清除输出目录：{}", output_dir.display());
        self.hooks
            .after_clean(output_dir)
            .map_err(|cause| BuildError::hook("after_clean", cause))?;
        Ok(())
    }
}

fn manifest_entry(page: &PageData, now: DateTime<Utc>) -> ManifestEntry {
    ManifestEntry {
        page_id: page.page.id.clone(),
        locale_code: page.locale.clone(),
        hash: page.metadata.hash.clone(),
        output_path: page.output_path.clone(),
        updated_at: now,
    }
}
