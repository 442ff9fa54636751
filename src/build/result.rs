use crate::error::BuildError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use ulid::Ulid;

/// 构建结果：计数、已写页面、逐页诊断与错误
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub build_id: Ulid,
    pub pages_built: usize,
    pub pages_skipped: usize,
    pub assets_built: usize,
    pub assets_skipped: usize,
    pub feeds_built: usize,
    pub rendered: Vec<RenderedPage>,
    pub diagnostics: Vec<Diagnostic>,
    pub errors: Vec<Arc<BuildError>>,
    pub metrics: BuildMetrics,
    pub dry_run: bool,
}

impl BuildResult {
    pub fn new(dry_run: bool) -> Self {
        Self {
            build_id: Ulid::new(),
            pages_built: 0,
            pages_skipped: 0,
            assets_built: 0,
            assets_skipped: 0,
            feeds_built: 0,
            rendered: Vec::new(),
            diagnostics: Vec::new(),
            errors: Vec::new(),
            metrics: BuildMetrics::default(),
            dry_run,
        }
    }

    pub fn diagnostic(&self, page_id: &str, locale: &str) -> Option<&Diagnostic> {
        self.diagnostics
            .iter()
            .find(|d| d.page_id == page_id && d.locale == locale)
    }

    pub fn failed_pages(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.outcome == PageOutcome::Failed)
            .count()
    }

    /// 记录错误，同一个错误实例只记录一次
    pub(crate) fn push_error(&mut self, err: Arc<BuildError>) {
        if !self.errors.iter().any(|e| Arc::ptr_eq(e, &err)) {
            self.errors.push(err);
        }
    }
}

/// 各阶段耗时
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildMetrics {
    pub context: Duration,
    pub render: Duration,
    pub sitemap: Duration,
    pub feed: Duration,
    pub assets: Duration,
    pub manifest: Duration,
    pub total: Duration,
}

/// 实际写出的页面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub page_id: String,
    pub locale: String,
    pub output: PathBuf,
    pub checksum: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Rendered,
    Skipped,
    Failed,
    /// 因致命错误中止而未开始
    Cancelled,
}

/// 每个候选页面的构建决策
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub page_id: String,
    pub locale: String,
    pub template: String,
    pub outcome: PageOutcome,
    pub err: Option<Arc<BuildError>>,
}
