pub mod artifact;
pub mod context;
pub mod events;
pub mod incremental;
pub mod pipeline;
pub mod result;
pub mod stages;

/// 单次构建的运行参数
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// 仅构建这些语言，为空表示全部
    pub locales: Vec<String>,
    /// 仅构建这些页面，为空表示全部
    pub page_ids: Vec<String>,
    /// 跳过增量判断，强制渲染
    pub force: bool,
    /// 只计算决策与诊断，不写入存储
    pub dry_run: bool,
}

impl BuildOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    /// 是否只构建站点的一部分
    pub fn is_filtered(&self) -> bool {
        !self.locales.is_empty() || !self.page_ids.is_empty()
    }

    pub(crate) fn wants_page(&self, page_id: &str) -> bool {
        self.page_ids.is_empty() || self.page_ids.iter().any(|id| id == page_id)
    }
}
