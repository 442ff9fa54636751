//! 无头 CMS 的静态站点构建管道。
//!
//! 从 [`SiteSource`] 读取页面、翻译、内容、菜单、模板与组件快照，
//! 通过注入的 [`Renderer`] 渲染，经 [`Storage`] 写出 HTML、sitemap、
//! robots.txt、RSS/Atom 与主题资源。入口为 [`Generator`]。

use std::future::Future;
use std::pin::Pin;

pub mod build;
pub mod clock;
pub mod config;
pub mod error;
pub mod hooks;
pub mod model;
pub mod render;
pub mod shortcode;
pub mod source;
pub mod storage;
pub mod theme;

#[cfg(test)]
mod testutil;

/// 协作者 trait 使用的装箱 future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use build::events::BuildEvent;
pub use build::pipeline::Generator;
pub use build::result::{BuildMetrics, BuildResult, Diagnostic, PageOutcome, RenderedPage};
pub use build::BuildOptions;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::GeneratorConfig;
pub use error::{BuildError, BuildFailure};
pub use hooks::{BuildHooks, HookRegistry, NoopHooks};
pub use render::{MiniJinjaRenderer, RenderError, Renderer, TemplateContext};
pub use shortcode::{Passthrough, ShortcodeRegistry, ShortcodeRenderer};
pub use source::{MemorySource, SiteSource, SourceError};
pub use storage::{ArtifactCategory, FsStorage, MemoryStorage, Storage, StorageError, WriteRequest};
pub use theme::{AssetError, AssetResolver, FsAssetResolver};
