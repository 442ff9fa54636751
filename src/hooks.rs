use crate::build::result::{BuildResult, RenderedPage};
use crate::build::BuildOptions;
use std::path::Path;
use std::sync::Arc;

/// 构建生命周期钩子，全部默认为空操作
///
/// 任一钩子返回错误都会中止当前操作。`after_page` 可能在多个工作任务中并发调用。
pub trait BuildHooks: Send + Sync {
    fn before_build(&self, _opts: &BuildOptions) -> anyhow::Result<()> {
        Ok(())
    }

    fn after_build(&self, _opts: &BuildOptions, _result: &BuildResult) -> anyhow::Result<()> {
        Ok(())
    }

    fn after_page(&self, _page: &RenderedPage) -> anyhow::Result<()> {
        Ok(())
    }

    fn before_clean(&self, _output_dir: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    fn after_clean(&self, _output_dir: &Path) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl BuildHooks for NoopHooks {}

/// 按优先级组合多个钩子，数值小的先执行，遇到第一个错误即停止
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: Vec<(i32, Arc<dyn BuildHooks>)>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, priority: i32, hook: Arc<dyn BuildHooks>) {
        self.hooks.push((priority, hook));
        // 稳定排序，同优先级保持注册顺序
        self.hooks.sort_by_key(|(p, _)| *p);
    }

    pub fn with(mut self, priority: i32, hook: Arc<dyn BuildHooks>) -> Self {
        self.add(priority, hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    fn each(&self, f: impl Fn(&dyn BuildHooks) -> anyhow::Result<()>) -> anyhow::Result<()> {
        for (priority, hook) in &self.hooks {
            f(hook.as_ref()).map_err(|e| e.context(format!("priority={priority}")))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl BuildHooks for HookRegistry {
    fn before_build(&self, opts: &BuildOptions) -> anyhow::Result<()> {
        self.each(|h| h.before_build(opts))
    }

    fn after_build(&self, opts: &BuildOptions, result: &BuildResult) -> anyhow::Result<()> {
        self.each(|h| h.after_build(opts, result))
    }

    fn after_page(&self, page: &RenderedPage) -> anyhow::Result<()> {
        self.each(|h| h.after_page(page))
    }

    fn before_clean(&self, output_dir: &Path) -> anyhow::Result<()> {
        self.each(|h| h.before_clean(output_dir))
    }

    fn after_clean(&self, output_dir: &Path) -> anyhow::Result<()> {
        self.each(|h| h.after_clean(output_dir))
    }
}
